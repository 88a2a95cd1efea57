//! Error taxonomy for the dispatch layer.
//!
//! Every fallible entry point in this crate returns [`Result`]. The dispatch
//! layer performs no local recovery: each error is surfaced synchronously to
//! the immediate caller (the layer or training loop), which decides whether
//! to abort the run or report upward. An operation either fully writes its
//! declared outputs or writes none of them and fails.

use thiserror::Error;

use crate::backend::BackendType;

/// All error conditions produced by the backend dispatch layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A raw descriptor value outside the closed [`BackendType`] enumeration
    /// reached formatting or dispatch logic. Always a programming error in
    /// the caller, never recoverable.
    #[error("unsupported backend descriptor value {0}")]
    UnsupportedEnumValue(u8),

    /// The external accelerator engine's one-time setup reported failure.
    /// The initialization state stays uninitialized, so later calls observe
    /// the same failure deterministically instead of a poisoned state.
    #[error("failed to initialize {engine} engine: {reason}")]
    AcceleratorInitFailed {
        /// Engine family whose setup failed.
        engine: BackendType,
        /// Engine-reported failure description.
        reason: String,
    },

    /// Caller-supplied buffer counts or dimensions are incompatible with the
    /// bound layer's parameters. The operation writes nothing.
    #[error("{op}: shape mismatch, expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Operation that rejected its buffers.
        op: &'static str,
        /// What the bound layer's parameters require.
        expected: String,
        /// What the caller supplied.
        actual: String,
    },

    /// An operation was invoked before [`bind_layer`] established a live
    /// layer binding, or after the bound layer was dropped.
    ///
    /// [`bind_layer`]: crate::ops::dispatch::Backend::bind_layer
    #[error("operation invoked on a backend with no bound layer")]
    UnboundLayer,
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;
