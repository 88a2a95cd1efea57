//! Accelerator lifecycle guards.
//!
//! External accelerator engines (NNPACK, LibDNN, OpenCL) require one-time
//! global setup before the first kernel invocation. Each engine family gets a
//! process-wide [`EngineGuard`], created lazily on first access, whose
//! `initialize` call is idempotent and safe to race from multiple threads:
//! exactly one physical setup attempt runs on the success path, and every
//! caller observes a consistent outcome.
//!
//! A failed setup leaves the guard uninitialized rather than poisoned, so a
//! later call re-runs the probe and observes the same failure
//! deterministically. For a missing driver or library this will simply fail
//! again for the lifetime of the process; the retry exists so that callers
//! see an error, not a wedged state.
//!
//! Backends targeting an accelerator invoke their guard lazily on first use.
//! Nothing in this crate initializes an engine at process start.

use std::sync::{Mutex, PoisonError};

use lazy_static::lazy_static;

use crate::backend::BackendType;
use crate::error::{Error, Result};

/// Engine-specific setup routine. Runs at most once per process on the
/// success path; reports failure synchronously.
pub type EngineProbe = Box<dyn Fn() -> core::result::Result<(), String> + Send + Sync>;

/// Idempotent one-time initializer for one accelerator engine family.
pub struct EngineGuard {
    engine: BackendType,
    probe: EngineProbe,
    ready: Mutex<bool>,
}

impl EngineGuard {
    /// Builds a guard around an engine's setup routine.
    ///
    /// Embedders that link real engine bindings construct their guard with a
    /// probe that calls the engine's init entry point.
    pub fn new(
        engine: BackendType,
        probe: impl Fn() -> core::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            engine,
            probe: Box::new(probe),
            ready: Mutex::new(false),
        }
    }

    /// Engine family this guard initializes.
    pub fn engine(&self) -> BackendType {
        self.engine
    }

    /// Runs the engine's one-time setup if it has not succeeded yet.
    ///
    /// The first successful call flips the process-wide state to
    /// initialized; every later call returns without touching the engine.
    /// Concurrent callers serialize on the guard's lock, so the setup routine
    /// never runs twice on the success path and all racers agree on the
    /// outcome before proceeding.
    ///
    /// # Errors
    /// [`Error::AcceleratorInitFailed`] when the setup routine reports
    /// failure. The state stays uninitialized.
    pub fn initialize(&self) -> Result<()> {
        // A poisoned lock only means a previous probe panicked; the flag is
        // still false, so recover the guard and continue.
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        if *ready {
            return Ok(());
        }
        (self.probe)().map_err(|reason| Error::AcceleratorInitFailed {
            engine: self.engine,
            reason,
        })?;
        *ready = true;
        Ok(())
    }

    /// Whether the one-time setup has already succeeded.
    pub fn is_initialized(&self) -> bool {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for EngineGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineGuard")
            .field("engine", &self.engine)
            .field("ready", &self.is_initialized())
            .finish()
    }
}

fn missing_engine(name: &'static str) -> impl Fn() -> core::result::Result<(), String> {
    move || Err(format!("{name} runtime is not linked into this build"))
}

lazy_static! {
    static ref NNPACK_RUNTIME: EngineGuard =
        EngineGuard::new(BackendType::Nnpack, missing_engine("NNPACK"));
    static ref LIBDNN_RUNTIME: EngineGuard =
        EngineGuard::new(BackendType::Libdnn, missing_engine("LibDNN"));
    static ref OPENCL_RUNTIME: EngineGuard =
        EngineGuard::new(BackendType::OpenCl, missing_engine("OpenCL"));
}

/// Process-wide guard for the given engine family, or `None` for engines
/// that need no global setup (`Internal`, `Avx`).
pub fn runtime(kind: BackendType) -> Option<&'static EngineGuard> {
    match kind {
        BackendType::Nnpack => Some(&NNPACK_RUNTIME),
        BackendType::Libdnn => Some(&LIBDNN_RUNTIME),
        BackendType::OpenCl => Some(&OPENCL_RUNTIME),
        BackendType::Internal | BackendType::Avx => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn test_initialize_runs_setup_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let guard = EngineGuard::new(BackendType::Nnpack, move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        for _ in 0..5 {
            guard.initialize().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(guard.is_initialized());
    }

    #[test]
    fn test_failed_setup_is_not_poisoned() {
        let works = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&works);
        let guard = EngineGuard::new(BackendType::OpenCl, move || {
            if flag.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err("driver absent".into())
            }
        });

        let err = guard.initialize().unwrap_err();
        assert!(matches!(err, Error::AcceleratorInitFailed { .. }));
        assert!(!guard.is_initialized());

        // The same failure is observed again, deterministically.
        assert!(guard.initialize().is_err());

        // Once the engine comes up, a retry succeeds.
        works.store(true, Ordering::SeqCst);
        guard.initialize().unwrap();
        assert!(guard.is_initialized());
    }

    #[test]
    fn test_concurrent_initialize_runs_setup_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let guard = Arc::new(EngineGuard::new(BackendType::Libdnn, move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let g = Arc::clone(&guard);
                thread::spawn(move || g.initialize().is_ok())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_process_runtimes_report_missing_engines() {
        for kind in [BackendType::Nnpack, BackendType::Libdnn, BackendType::OpenCl] {
            let guard = runtime(kind).unwrap();
            assert_eq!(guard.engine(), kind);
            assert!(matches!(
                guard.initialize(),
                Err(Error::AcceleratorInitFailed { engine, .. }) if engine == kind
            ));
        }
        assert!(runtime(BackendType::Internal).is_none());
        assert!(runtime(BackendType::Avx).is_none());
    }
}
