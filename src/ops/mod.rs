//! # Operation Kernels and the Backend Contract
//!
//! This module houses the numeric kernels and the polymorphic contract
//! through which layers invoke them.
//!
//! ## Submodules
//!
//! - [`cpu`] — reference kernels in pure Rust (default engine, universal
//!   fallback)
//! - [`avx`] — vectorized inner products (AVX2 via the `simd` feature, with a
//!   portable fallback)
//! - [`dispatch`] — the [`Backend`](dispatch::Backend) trait and the concrete
//!   engines implementing it
//!
//! ## Extending the Backend
//!
//! To add a new engine:
//!
//! 1. Add its descriptor to [`BackendType`](crate::backend::BackendType) with
//!    an explicit selector rank
//! 2. Implement its kernels (or delegate to [`cpu`])
//! 3. Implement [`Backend`](dispatch::Backend) for it and wire it into
//!    [`create_backend`](crate::backend::create_backend); engines that need
//!    one-time global setup go through [`accel`](crate::accel)
//!
//! Shape validation lives in [`dispatch`], backend-agnostic, so kernels can
//! assume well-formed buffers.

pub mod avx;
pub mod cpu;
pub mod dispatch;
