//! Backend selection module.
//!
//! This module names the available compute engines, picks a sensible default
//! for the current build, and constructs engine instances behind the
//! [`Backend`] contract.
//!
//! # Supported Engines
//!
//! - `Internal` — reference kernels in pure Rust (default).
//! - `Nnpack` — NNPACK accelerator library (external, consumed through its
//!   one-time initialization contract).
//! - `Libdnn` — LibDNN accelerator library (external).
//! - `Avx` — vectorized kernels using AVX2 (enabled via the `simd` feature).
//! - `OpenCl` — GPU offload through OpenCL (external).
//!
//! Accelerator engines are opaque collaborators: they must be initialized
//! exactly once per process before first use, which is the job of the
//! [`accel`](crate::accel) lifecycle guards. This crate ships kernels for
//! `Internal` and `Avx`; the remaining kinds surface
//! [`Error::AcceleratorInitFailed`] until their runtime libraries are linked.

use core::fmt;
use std::sync::Arc;

use crate::accel;
use crate::context::OpContext;
use crate::error::{Error, Result};
use crate::ops::dispatch::{AvxBackend, Backend, InternalBackend};

/// Enumeration of the compute engine families a backend instance can belong
/// to.
///
/// The set is closed: every concrete [`Backend`] reports exactly one of these
/// values from [`Backend::kind`], and that value matches the engine family it
/// actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackendType {
    /// Reference kernels in pure Rust.
    Internal = 0,
    /// NNPACK accelerator library.
    Nnpack,
    /// LibDNN accelerator library.
    Libdnn,
    /// AVX2-vectorized kernels.
    Avx,
    /// GPU offload through OpenCL.
    OpenCl,
}

impl BackendType {
    /// Every descriptor value, in discriminant order.
    pub const ALL: [Self; 5] = [
        Self::Internal,
        Self::Nnpack,
        Self::Libdnn,
        Self::Avx,
        Self::OpenCl,
    ];

    /// Fixed human-readable label for diagnostics and logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Internal => "Internal",
            Self::Nnpack => "NNPACK",
            Self::Libdnn => "LibDNN",
            Self::Avx => "AVX",
            Self::OpenCl => "OpenCL",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decodes a raw discriminant, e.g. one read from a serialized network
/// description.
///
/// A value outside the closed enumeration is a programming error and fails
/// with [`Error::UnsupportedEnumValue`] rather than mapping to a placeholder
/// engine.
impl TryFrom<u8> for BackendType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Internal),
            1 => Ok(Self::Nnpack),
            2 => Ok(Self::Libdnn),
            3 => Ok(Self::Avx),
            4 => Ok(Self::OpenCl),
            _ => Err(Error::UnsupportedEnumValue(value)),
        }
    }
}

/// Returns the engine a layer should use when the user specifies none.
///
/// Pure and deterministic: the answer depends only on build capability flags,
/// so repeated calls always agree. Priority order, highest first:
///
/// 1. `Avx` — when the `simd` feature is enabled and the build targets an
///    AVX2-capable x86-64 platform.
/// 2. `Internal` — always available.
///
/// Future capability flags must be inserted here with an explicit rank, never
/// left to declaration order.
///
/// # Example
///
/// ```rust
/// use corenn::backend::default_engine;
///
/// assert_eq!(default_engine(), default_engine());
/// ```
pub fn default_engine() -> BackendType {
    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    return BackendType::Avx;

    #[cfg(not(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2")))]
    BackendType::Internal
}

/// Constructs a concrete engine behind the [`Backend`] contract.
///
/// `ctx` carries solution-dependent parameters (algorithm choice, transform
/// strategy); `None` means every such parameter defaults to the engine's own
/// choice. The caller keeps ownership of the context through its own `Arc`
/// handle.
///
/// Accelerator-backed kinds run their one-time engine initialization through
/// the process-wide lifecycle guard before anything else; when the engine
/// library is absent this fails with [`Error::AcceleratorInitFailed`].
///
/// # Example
///
/// ```rust
/// use corenn::backend::{create_backend, BackendType};
///
/// let backend = create_backend(BackendType::Internal, None).unwrap();
/// assert_eq!(backend.kind(), BackendType::Internal);
/// ```
pub fn create_backend(
    kind: BackendType,
    ctx: Option<Arc<OpContext>>,
) -> Result<Box<dyn Backend>> {
    match kind {
        BackendType::Internal => Ok(Box::new(InternalBackend::new(ctx))),
        BackendType::Avx => Ok(Box::new(AvxBackend::new(ctx))),
        BackendType::Nnpack | BackendType::Libdnn | BackendType::OpenCl => {
            if let Some(guard) = accel::runtime(kind) {
                guard.initialize()?;
            }
            // The probe can only succeed once real engine bindings are
            // linked; their kernels are registered out of tree.
            Err(Error::AcceleratorInitFailed {
                engine: kind,
                reason: "no kernel bindings registered for this engine".into(),
            })
        }
    }
}
