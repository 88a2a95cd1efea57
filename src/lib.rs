//! corenn: the pluggable compute-backend dispatch core of a small CNN
//! runtime.
//!
//! Network layers (convolution, deconvolution, max-pooling, fully-connected)
//! invoke forward and backward numeric kernels through one uniform contract,
//! without knowing which engine — reference, vectorized, or an external
//! accelerator library — actually executes them.
//!
//! # What this crate owns
//!
//! - The closed [`BackendType`](backend::BackendType) descriptor naming the
//!   engine families, with fixed diagnostic labels.
//! - The [`default_engine`](backend::default_engine) selection policy mapping
//!   build capability flags to an engine.
//! - The [`Backend`](ops::dispatch::Backend) contract: four operation
//!   families, each with full-precision, quantized, and effective-quantized
//!   variants where they make sense.
//! - Process-wide [`accel`] lifecycle guards for accelerator engines that
//!   need one-time global setup.
//! - Reference and AVX kernel implementations.
//!
//! # What it deliberately does not own
//!
//! The layer graph and training loop, tensor allocation strategy, weight
//! serialization, and the accelerator libraries themselves — those are
//! external collaborators. Tensor buffers are owned by the caller for the
//! duration of each call; the layer binding and operation context are
//! non-owning references.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use corenn::backend::{create_backend, default_engine};
//! use corenn::params::{FullyParams, LayerKind, LayerSpec};
//! use corenn::tensors::Ten32;
//!
//! let params = FullyParams { in_size: 2, out_size: 1, has_bias: false };
//! let layer = Arc::new(LayerSpec::new(LayerKind::Fully(params)));
//!
//! let mut backend = create_backend(default_engine(), None).unwrap();
//! backend.bind_layer(&layer);
//!
//! let in_data = vec![
//!     Ten32::new([2], vec![1.0, 2.0]),
//!     Ten32::new([1, 2], vec![3.0, 4.0]),
//! ];
//! let mut out_data = vec![Ten32::zeros([1])];
//! backend.fully(&in_data, &mut out_data).unwrap();
//! assert_eq!(out_data[0].data, vec![11.0]);
//! ```

pub mod accel;
pub mod backend;
pub mod context;
pub mod error;
pub mod ops;
pub mod params;
pub mod tensors;

pub use crate::backend::{BackendType, create_backend, default_engine};
pub use crate::error::{Error, Result};
pub use crate::ops::dispatch::Backend;
