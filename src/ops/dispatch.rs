//! Operation Dispatch Layer
//!
//! This module defines the [`Backend`] contract — the full set of numeric
//! operations every concrete engine must provide — and the engines that ship
//! in-tree. Layers hold a `Box<dyn Backend>` and call these operations for
//! every forward/backward pass; swapping engines never touches layer code.
//!
//! # Contract
//!
//! - Forward operations read `in_data` and write results into the buffers
//!   already referenced by `out_data` (caller pre-allocates correct shapes).
//! - Backward operations are handed the forward inputs/outputs plus the
//!   gradient flowing into the outputs, and accumulate the gradient flowing
//!   into the inputs (and parameter gradients) into `in_grad`.
//! - Every operation validates buffer counts and shapes against the bound
//!   layer's parameters *before* touching any buffer: a failing call leaves
//!   every buffer exactly as it found it.
//! - Calls are synchronous and atomic with respect to their declared
//!   outputs; kernels may parallelize internally but partial writes are
//!   never observable.
//!
//! # Precision variants
//!
//! conv2d, deconv2d, and fully-connected carry quantized (`_q`) and
//! effective-quantized (`_eq`) forward paths and a quantized backward path;
//! the three forward variants are mutually exclusive per call and chosen by
//! the caller. Max-pooling has no learnable parameters and an exact
//! gradient, so quantization variants would add nothing and are omitted.

use std::sync::{Arc, Weak};

use crate::backend::BackendType;
use crate::context::{ConvAlgorithm, OpContext};
use crate::error::{Error, Result};
use crate::ops::{avx, cpu};
use crate::params::{
    ConvParams, DeconvParams, FullyParams, LayerKind, LayerSpec, MaxPoolParams, QuantParams,
};
use crate::tensors::Ten32;

/// The polymorphic contract every compute engine implements.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use corenn::backend::{create_backend, BackendType};
/// use corenn::params::{ConvParams, LayerKind, LayerSpec};
/// use corenn::tensors::Ten32;
///
/// let params = ConvParams {
///     in_channels: 1, out_channels: 1, in_h: 5, in_w: 5,
///     kernel_h: 3, kernel_w: 3, stride: 1, padding: 0, has_bias: false,
/// };
/// let layer = Arc::new(LayerSpec::new(LayerKind::Conv(params)));
///
/// let mut backend = create_backend(BackendType::Internal, None).unwrap();
/// backend.bind_layer(&layer);
///
/// let in_data = vec![
///     Ten32::filled([1, 5, 5], 1.0),      // input
///     Ten32::filled([1, 1, 3, 3], 1.0),   // weights
/// ];
/// let mut out_data = vec![Ten32::zeros([1, 3, 3])];
/// backend.conv2d(&in_data, &mut out_data).unwrap();
/// assert!(out_data[0].data.iter().all(|&v| v == 9.0));
/// ```
pub trait Backend {
    /// Convolution forward pass, full precision.
    fn conv2d(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Convolution forward pass, quantized numerics.
    fn conv2d_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Convolution forward pass with quantization parameters pre-folded into
    /// the weights.
    fn conv2d_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Convolution backward pass, full precision.
    fn conv2d_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()>;

    /// Convolution backward pass, quantized numerics.
    fn conv2d_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()>;

    /// Deconvolution forward pass, full precision.
    fn deconv2d(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Deconvolution forward pass, quantized numerics.
    fn deconv2d_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Deconvolution forward pass with pre-folded weights.
    fn deconv2d_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Deconvolution backward pass, full precision.
    fn deconv2d_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()>;

    /// Deconvolution backward pass, quantized numerics.
    fn deconv2d_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()>;

    /// Max-pooling forward pass.
    fn maxpool(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Max-pooling backward pass; the gradient routes to the argmax of each
    /// window.
    fn maxpool_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()>;

    /// Fully-connected forward pass, full precision.
    fn fully(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Fully-connected forward pass, quantized numerics.
    fn fully_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Fully-connected forward pass with pre-folded weights.
    fn fully_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()>;

    /// Fully-connected backward pass, full precision.
    fn fully_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()>;

    /// Fully-connected backward pass, quantized numerics.
    fn fully_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()>;

    /// Read-only accessor for the operation context this engine was built
    /// with, if any.
    fn context(&self) -> Option<&OpContext>;

    /// Rebinds the layer whose metadata the engine reads during kernel
    /// execution. Must be called before any operation; operations invoked
    /// without a live binding fail with [`Error::UnboundLayer`].
    fn bind_layer(&mut self, layer: &Arc<LayerSpec>);

    /// The engine family descriptor. Consistent for the lifetime of the
    /// instance and in agreement with the concrete type.
    fn kind(&self) -> BackendType;
}

// ---------------------------------------------------------------------------
// Shape validation, backend-agnostic.
// ---------------------------------------------------------------------------

fn check_count(op: &'static str, what: &'static str, got: usize, want: usize) -> Result<()> {
    if got == want {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            op,
            expected: format!("{want} {what}"),
            actual: got.to_string(),
        })
    }
}

fn check_shape(op: &'static str, what: &'static str, t: &Ten32, want: &[usize]) -> Result<()> {
    if t.shape == want {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            op,
            expected: format!("{what} shape {want:?}"),
            actual: format!("{:?}", t.shape),
        })
    }
}

fn family_name(kind: &LayerKind) -> &'static str {
    match kind {
        LayerKind::Conv(_) => "conv2d",
        LayerKind::Deconv(_) => "deconv2d",
        LayerKind::MaxPool(_) => "maxpool",
        LayerKind::Fully(_) => "fully-connected",
    }
}

fn family_mismatch(op: &'static str, spec: &LayerSpec) -> Error {
    Error::ShapeMismatch {
        op,
        expected: "a layer binding of the matching operation family".into(),
        actual: format!("{} layer", family_name(&spec.kind)),
    }
}

/// Shape queries shared by the three families with learnable weights.
trait LearnableShapes {
    fn has_bias(&self) -> bool;
    fn in_buffer_count(&self) -> usize;
    fn input_shape(&self) -> Vec<usize>;
    fn weight_shape(&self) -> Vec<usize>;
    fn bias_shape(&self) -> Vec<usize>;
    fn output_shape(&self) -> Vec<usize>;
}

macro_rules! learnable_shapes {
    ($ty:ty) => {
        impl LearnableShapes for $ty {
            fn has_bias(&self) -> bool {
                self.has_bias
            }
            fn in_buffer_count(&self) -> usize {
                <$ty>::in_buffer_count(self)
            }
            fn input_shape(&self) -> Vec<usize> {
                <$ty>::input_shape(self)
            }
            fn weight_shape(&self) -> Vec<usize> {
                <$ty>::weight_shape(self)
            }
            fn bias_shape(&self) -> Vec<usize> {
                <$ty>::bias_shape(self)
            }
            fn output_shape(&self) -> Vec<usize> {
                <$ty>::output_shape(self)
            }
        }
    };
}

learnable_shapes!(ConvParams);
learnable_shapes!(DeconvParams);
learnable_shapes!(FullyParams);

fn validate_forward<P: LearnableShapes>(
    op: &'static str,
    p: &P,
    in_data: &[Ten32],
    out_data: &[Ten32],
) -> Result<()> {
    check_count(op, "input buffers", in_data.len(), p.in_buffer_count())?;
    check_count(op, "output buffers", out_data.len(), 1)?;
    check_shape(op, "input", &in_data[0], &p.input_shape())?;
    check_shape(op, "weight", &in_data[1], &p.weight_shape())?;
    if p.has_bias() {
        check_shape(op, "bias", &in_data[2], &p.bias_shape())?;
    }
    check_shape(op, "output", &out_data[0], &p.output_shape())
}

fn validate_backward<P: LearnableShapes>(
    op: &'static str,
    p: &P,
    in_data: &[Ten32],
    out_data: &[Ten32],
    out_grad: &[Ten32],
    in_grad: &[Ten32],
) -> Result<()> {
    validate_forward(op, p, in_data, out_data)?;
    check_count(op, "out_grad buffers", out_grad.len(), 1)?;
    check_shape(op, "out_grad", &out_grad[0], &p.output_shape())?;
    check_count(op, "in_grad buffers", in_grad.len(), p.in_buffer_count())?;
    check_shape(op, "input gradient", &in_grad[0], &p.input_shape())?;
    check_shape(op, "weight gradient", &in_grad[1], &p.weight_shape())?;
    if p.has_bias() {
        check_shape(op, "bias gradient", &in_grad[2], &p.bias_shape())?;
    }
    Ok(())
}

fn validate_maxpool_forward(
    op: &'static str,
    p: &MaxPoolParams,
    in_data: &[Ten32],
    out_data: &[Ten32],
) -> Result<()> {
    check_count(op, "input buffers", in_data.len(), 1)?;
    check_count(op, "output buffers", out_data.len(), 1)?;
    check_shape(op, "input", &in_data[0], &p.input_shape())?;
    check_shape(op, "output", &out_data[0], &p.output_shape())
}

fn validate_maxpool_backward(
    op: &'static str,
    p: &MaxPoolParams,
    in_data: &[Ten32],
    out_data: &[Ten32],
    out_grad: &[Ten32],
    in_grad: &[Ten32],
) -> Result<()> {
    validate_maxpool_forward(op, p, in_data, out_data)?;
    check_count(op, "out_grad buffers", out_grad.len(), 1)?;
    check_shape(op, "out_grad", &out_grad[0], &p.output_shape())?;
    check_count(op, "in_grad buffers", in_grad.len(), 1)?;
    check_shape(op, "input gradient", &in_grad[0], &p.input_shape())
}

/// Splits a validated `in_data` sequence into (input, weights, bias).
fn learnable_inputs(has_bias: bool, in_data: &[Ten32]) -> (&[f32], &[f32], Option<&[f32]>) {
    let bias = if has_bias {
        Some(in_data[2].data.as_slice())
    } else {
        None
    };
    (&in_data[0].data, &in_data[1].data, bias)
}

/// Splits a validated `in_grad` sequence into (input, weight, bias)
/// gradient buffers.
fn learnable_grads(in_grad: &mut [Ten32]) -> (&mut [f32], &mut [f32], Option<&mut [f32]>) {
    let (din, rest) = in_grad.split_at_mut(1);
    let (dw, db) = rest.split_at_mut(1);
    (
        din[0].data.as_mut_slice(),
        dw[0].data.as_mut_slice(),
        db.first_mut().map(|t| t.data.as_mut_slice()),
    )
}

// ---------------------------------------------------------------------------
// Internal engine: reference kernels.
// ---------------------------------------------------------------------------

/// The reference engine. Always available, and the numerical baseline every
/// other engine is tested against.
pub struct InternalBackend {
    ctx: Option<Arc<OpContext>>,
    layer: Weak<LayerSpec>,
}

impl InternalBackend {
    /// Builds a reference engine, optionally with caller-owned solution
    /// parameters. Without a context every parameter defaults to the
    /// engine's own choice.
    pub fn new(ctx: Option<Arc<OpContext>>) -> Self {
        Self {
            ctx,
            layer: Weak::new(),
        }
    }

    /// Resolves the live layer binding, revalidating that the layer still
    /// exists.
    fn layer(&self) -> Result<Arc<LayerSpec>> {
        self.layer.upgrade().ok_or(Error::UnboundLayer)
    }

    fn algorithm(&self) -> ConvAlgorithm {
        self.ctx.as_deref().map_or_else(Default::default, |c| c.algorithm)
    }

    fn conv_spec(&self, op: &'static str) -> Result<(ConvParams, QuantParams)> {
        let spec = self.layer()?;
        match spec.kind {
            LayerKind::Conv(p) => Ok((p, spec.quant)),
            _ => Err(family_mismatch(op, &spec)),
        }
    }

    fn deconv_spec(&self, op: &'static str) -> Result<(DeconvParams, QuantParams)> {
        let spec = self.layer()?;
        match spec.kind {
            LayerKind::Deconv(p) => Ok((p, spec.quant)),
            _ => Err(family_mismatch(op, &spec)),
        }
    }

    fn maxpool_spec(&self, op: &'static str) -> Result<MaxPoolParams> {
        let spec = self.layer()?;
        match spec.kind {
            LayerKind::MaxPool(p) => Ok(p),
            _ => Err(family_mismatch(op, &spec)),
        }
    }

    fn fully_spec(&self, op: &'static str) -> Result<(FullyParams, QuantParams)> {
        let spec = self.layer()?;
        match spec.kind {
            LayerKind::Fully(p) => Ok((p, spec.quant)),
            _ => Err(family_mismatch(op, &spec)),
        }
    }
}

impl Backend for InternalBackend {
    fn conv2d(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, _) = self.conv_spec("conv2d")?;
        validate_forward("conv2d", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        match self.algorithm() {
            ConvAlgorithm::Im2col => {
                cpu::conv2d_forward_im2col(&p, input, weights, bias, &mut out_data[0].data);
            }
            ConvAlgorithm::Auto | ConvAlgorithm::Direct => {
                cpu::conv2d_forward(&p, input, weights, bias, &mut out_data[0].data);
            }
        }
        Ok(())
    }

    fn conv2d_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, q) = self.conv_spec("conv2d_q")?;
        validate_forward("conv2d_q", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::conv2d_forward_q(&p, &q, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn conv2d_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, q) = self.conv_spec("conv2d_eq")?;
        validate_forward("conv2d_eq", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::conv2d_forward_eq(&p, &q, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn conv2d_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        let (p, _) = self.conv_spec("conv2d_backward")?;
        validate_backward("conv2d_backward", &p, in_data, out_data, out_grad, in_grad)?;
        let (input, weights, _) = learnable_inputs(p.has_bias, in_data);
        let (din, dw, db) = learnable_grads(in_grad);
        cpu::conv2d_backward(&p, input, weights, &out_grad[0].data, din, dw, db);
        Ok(())
    }

    fn conv2d_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        let (p, q) = self.conv_spec("conv2d_backward_q")?;
        validate_backward("conv2d_backward_q", &p, in_data, out_data, out_grad, in_grad)?;
        let (input, weights, _) = learnable_inputs(p.has_bias, in_data);
        let (din, dw, db) = learnable_grads(in_grad);
        cpu::conv2d_backward_q(&p, &q, input, weights, &out_grad[0].data, din, dw, db);
        Ok(())
    }

    fn deconv2d(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, _) = self.deconv_spec("deconv2d")?;
        validate_forward("deconv2d", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::deconv2d_forward(&p, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn deconv2d_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, q) = self.deconv_spec("deconv2d_q")?;
        validate_forward("deconv2d_q", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::deconv2d_forward_q(&p, &q, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn deconv2d_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, q) = self.deconv_spec("deconv2d_eq")?;
        validate_forward("deconv2d_eq", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::deconv2d_forward_eq(&p, &q, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn deconv2d_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        let (p, _) = self.deconv_spec("deconv2d_backward")?;
        validate_backward("deconv2d_backward", &p, in_data, out_data, out_grad, in_grad)?;
        let (input, weights, _) = learnable_inputs(p.has_bias, in_data);
        let (din, dw, db) = learnable_grads(in_grad);
        cpu::deconv2d_backward(&p, input, weights, &out_grad[0].data, din, dw, db);
        Ok(())
    }

    fn deconv2d_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        let (p, q) = self.deconv_spec("deconv2d_backward_q")?;
        validate_backward("deconv2d_backward_q", &p, in_data, out_data, out_grad, in_grad)?;
        let (input, weights, _) = learnable_inputs(p.has_bias, in_data);
        let (din, dw, db) = learnable_grads(in_grad);
        cpu::deconv2d_backward_q(&p, &q, input, weights, &out_grad[0].data, din, dw, db);
        Ok(())
    }

    fn maxpool(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let p = self.maxpool_spec("maxpool")?;
        validate_maxpool_forward("maxpool", &p, in_data, out_data)?;
        cpu::maxpool_forward(&p, &in_data[0].data, &mut out_data[0].data);
        Ok(())
    }

    fn maxpool_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        let p = self.maxpool_spec("maxpool_backward")?;
        validate_maxpool_backward("maxpool_backward", &p, in_data, out_data, out_grad, in_grad)?;
        cpu::maxpool_backward(&p, &in_data[0].data, &out_grad[0].data, &mut in_grad[0].data);
        Ok(())
    }

    fn fully(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, _) = self.fully_spec("fully")?;
        validate_forward("fully", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::fully_forward(&p, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn fully_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, q) = self.fully_spec("fully_q")?;
        validate_forward("fully_q", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::fully_forward_q(&p, &q, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn fully_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, q) = self.fully_spec("fully_eq")?;
        validate_forward("fully_eq", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        cpu::fully_forward_eq(&p, &q, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn fully_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        let (p, _) = self.fully_spec("fully_backward")?;
        validate_backward("fully_backward", &p, in_data, out_data, out_grad, in_grad)?;
        let (input, weights, _) = learnable_inputs(p.has_bias, in_data);
        let (din, dw, db) = learnable_grads(in_grad);
        cpu::fully_backward(&p, input, weights, &out_grad[0].data, din, dw, db);
        Ok(())
    }

    fn fully_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        let (p, q) = self.fully_spec("fully_backward_q")?;
        validate_backward("fully_backward_q", &p, in_data, out_data, out_grad, in_grad)?;
        let (input, weights, _) = learnable_inputs(p.has_bias, in_data);
        let (din, dw, db) = learnable_grads(in_grad);
        cpu::fully_backward_q(&p, &q, input, weights, &out_grad[0].data, din, dw, db);
        Ok(())
    }

    fn context(&self) -> Option<&OpContext> {
        self.ctx.as_deref()
    }

    fn bind_layer(&mut self, layer: &Arc<LayerSpec>) {
        self.layer = Arc::downgrade(layer);
    }

    fn kind(&self) -> BackendType {
        BackendType::Internal
    }
}

// ---------------------------------------------------------------------------
// AVX engine: vectorized inner products, reference kernels for the rest.
// ---------------------------------------------------------------------------

/// The vectorized engine. Forward conv2d and fully-connected run through the
/// AVX inner-product kernels; every other operation delegates to the
/// reference engine, which shares the layer binding and context.
pub struct AvxBackend {
    inner: InternalBackend,
}

impl AvxBackend {
    /// Builds a vectorized engine, optionally with caller-owned solution
    /// parameters.
    pub fn new(ctx: Option<Arc<OpContext>>) -> Self {
        Self {
            inner: InternalBackend::new(ctx),
        }
    }
}

impl Backend for AvxBackend {
    fn conv2d(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, _) = self.inner.conv_spec("conv2d")?;
        validate_forward("conv2d", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        avx::conv2d_forward(&p, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn conv2d_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.conv2d_q(in_data, out_data)
    }

    fn conv2d_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.conv2d_eq(in_data, out_data)
    }

    fn conv2d_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        self.inner.conv2d_backward(in_data, out_data, out_grad, in_grad)
    }

    fn conv2d_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        self.inner.conv2d_backward_q(in_data, out_data, out_grad, in_grad)
    }

    fn deconv2d(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.deconv2d(in_data, out_data)
    }

    fn deconv2d_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.deconv2d_q(in_data, out_data)
    }

    fn deconv2d_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.deconv2d_eq(in_data, out_data)
    }

    fn deconv2d_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        self.inner.deconv2d_backward(in_data, out_data, out_grad, in_grad)
    }

    fn deconv2d_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        self.inner.deconv2d_backward_q(in_data, out_data, out_grad, in_grad)
    }

    fn maxpool(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.maxpool(in_data, out_data)
    }

    fn maxpool_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        self.inner.maxpool_backward(in_data, out_data, out_grad, in_grad)
    }

    fn fully(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        let (p, _) = self.inner.fully_spec("fully")?;
        validate_forward("fully", &p, in_data, out_data)?;
        let (input, weights, bias) = learnable_inputs(p.has_bias, in_data);
        avx::fully_forward(&p, input, weights, bias, &mut out_data[0].data);
        Ok(())
    }

    fn fully_q(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.fully_q(in_data, out_data)
    }

    fn fully_eq(&self, in_data: &[Ten32], out_data: &mut [Ten32]) -> Result<()> {
        self.inner.fully_eq(in_data, out_data)
    }

    fn fully_backward(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        self.inner.fully_backward(in_data, out_data, out_grad, in_grad)
    }

    fn fully_backward_q(
        &self,
        in_data: &[Ten32],
        out_data: &[Ten32],
        out_grad: &mut [Ten32],
        in_grad: &mut [Ten32],
    ) -> Result<()> {
        self.inner.fully_backward_q(in_data, out_data, out_grad, in_grad)
    }

    fn context(&self) -> Option<&OpContext> {
        self.inner.context()
    }

    fn bind_layer(&mut self, layer: &Arc<LayerSpec>) {
        self.inner.bind_layer(layer);
    }

    fn kind(&self) -> BackendType {
        BackendType::Avx
    }
}
