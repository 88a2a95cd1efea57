//! Per-invocation operation context.
//!
//! A backend may be handed an [`OpContext`] at construction time carrying
//! solution-dependent parameters: which convolution formulation to run and
//! which transform strategy the engine should prefer. The dispatch layer
//! never interprets these beyond passing them to the kernels; a backend
//! constructed without a context falls back to engine-chosen defaults
//! (automatic algorithm selection, tuple-based transforms) rather than
//! failing.
//!
//! The context is owned by whoever constructs the backend; backends hold a
//! shared handle and treat it as read-only.

/// Convolution formulation requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvAlgorithm {
    /// Let the engine pick; the reference engine currently picks `Direct`.
    #[default]
    Auto,
    /// Straightforward nested-loop convolution.
    Direct,
    /// Lower the input into patch rows and run the kernel as a matrix
    /// product. Pays an extra allocation, wins on larger kernels.
    Im2col,
}

/// Transform strategy hint for engines that precompute kernel transforms.
///
/// The reference kernels ignore this; accelerator engines that support block
/// transforms read it through [`OpContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformStrategy {
    /// Tuple-based transforms, accepted by every algorithm.
    #[default]
    TupleBased,
    /// Block-based transforms.
    BlockBased,
}

/// Solution-dependent parameters carried alongside operation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpContext {
    /// Requested convolution formulation.
    pub algorithm: ConvAlgorithm,
    /// Requested transform strategy.
    pub strategy: TransformStrategy,
}

impl OpContext {
    /// Builds a context with explicit parameters.
    pub fn new(algorithm: ConvAlgorithm, strategy: TransformStrategy) -> Self {
        Self {
            algorithm,
            strategy,
        }
    }
}
