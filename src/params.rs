//! Layer metadata queried by backends through the layer binding.
//!
//! A backend never sees the layer graph. What it sees is a [`LayerSpec`]: the
//! per-family shape parameters (kernel extents, stride, padding, channel
//! depths) plus the quantization policy, bound to the backend with
//! [`bind_layer`] and read on every kernel invocation. The binding is a
//! non-owning `Weak` handle, so a layer that has been dropped is detected and
//! rejected instead of dangling.
//!
//! [`bind_layer`]: crate::ops::dispatch::Backend::bind_layer

/// Quantization policy for the reduced-precision execution paths.
///
/// The scheme itself is pluggable: the dispatch layer only asks the bound
/// layer for a scale and zero-point and applies them symmetrically to
/// activations and weights. Values quantize to `i8` and accumulate in `i32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    /// Real value represented by one quantized step.
    pub scale: f32,
    /// Quantized value representing real zero.
    pub zero_point: i32,
}

impl Default for QuantParams {
    /// Symmetric mapping of roughly [-1, 1] onto the i8 range.
    fn default() -> Self {
        Self {
            scale: 1.0 / 127.0,
            zero_point: 0,
        }
    }
}

impl QuantParams {
    /// Quantizes a buffer to its i8 representation, saturating at the type
    /// bounds.
    pub fn quantize(&self, data: &[f32]) -> Vec<i8> {
        data.iter()
            .map(|&x| {
                ((x / self.scale).round() as i32 + self.zero_point).clamp(-128, 127) as i8
            })
            .collect()
    }

    /// Maps one quantized value back to real space.
    pub fn dequantize_one(&self, q: i8) -> f32 {
        (q as i32 - self.zero_point) as f32 * self.scale
    }

    /// Quantizes and immediately dequantizes a buffer, yielding the values
    /// the integer kernels effectively compute with.
    pub fn roundtrip(&self, data: &[f32]) -> Vec<f32> {
        self.quantize(data)
            .into_iter()
            .map(|q| self.dequantize_one(q))
            .collect()
    }
}

/// Parameters of a 2D convolution layer.
///
/// Buffers are laid out row-major: input `[in_channels, in_h, in_w]`, weights
/// `[out_channels, in_channels, kernel_h, kernel_w]`, bias `[out_channels]`,
/// output `[out_channels, out_h, out_w]`. Padding is symmetric, stride is
/// shared by both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub in_channels: usize,
    pub out_channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride: usize,
    pub padding: usize,
    pub has_bias: bool,
}

impl ConvParams {
    pub fn out_h(&self) -> usize {
        (self.in_h + 2 * self.padding - self.kernel_h) / self.stride + 1
    }

    pub fn out_w(&self) -> usize {
        (self.in_w + 2 * self.padding - self.kernel_w) / self.stride + 1
    }

    /// Elements in one im2col patch (one output pixel's receptive field).
    pub fn patch_len(&self) -> usize {
        self.in_channels * self.kernel_h * self.kernel_w
    }

    pub fn input_shape(&self) -> Vec<usize> {
        vec![self.in_channels, self.in_h, self.in_w]
    }

    pub fn weight_shape(&self) -> Vec<usize> {
        vec![
            self.out_channels,
            self.in_channels,
            self.kernel_h,
            self.kernel_w,
        ]
    }

    pub fn bias_shape(&self) -> Vec<usize> {
        vec![self.out_channels]
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.out_channels, self.out_h(), self.out_w()]
    }

    /// Buffers expected in `in_data`/`in_grad`: input, weights, and bias when
    /// present.
    pub fn in_buffer_count(&self) -> usize {
        if self.has_bias { 3 } else { 2 }
    }
}

/// Parameters of a 2D deconvolution (transposed convolution) layer.
///
/// Same buffer layout conventions as [`ConvParams`]; the spatial output
/// extents grow instead of shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeconvParams {
    pub in_channels: usize,
    pub out_channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride: usize,
    pub padding: usize,
    pub has_bias: bool,
}

impl DeconvParams {
    pub fn out_h(&self) -> usize {
        (self.in_h - 1) * self.stride + self.kernel_h - 2 * self.padding
    }

    pub fn out_w(&self) -> usize {
        (self.in_w - 1) * self.stride + self.kernel_w - 2 * self.padding
    }

    pub fn input_shape(&self) -> Vec<usize> {
        vec![self.in_channels, self.in_h, self.in_w]
    }

    pub fn weight_shape(&self) -> Vec<usize> {
        vec![
            self.out_channels,
            self.in_channels,
            self.kernel_h,
            self.kernel_w,
        ]
    }

    pub fn bias_shape(&self) -> Vec<usize> {
        vec![self.out_channels]
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.out_channels, self.out_h(), self.out_w()]
    }

    pub fn in_buffer_count(&self) -> usize {
        if self.has_bias { 3 } else { 2 }
    }
}

/// Parameters of a 2D max-pooling layer.
///
/// No learnable parameters; `in_data` carries the input buffer only. Windows
/// that would run past the input edge are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPoolParams {
    pub channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub pool_h: usize,
    pub pool_w: usize,
    pub stride: usize,
}

impl MaxPoolParams {
    pub fn out_h(&self) -> usize {
        (self.in_h - self.pool_h) / self.stride + 1
    }

    pub fn out_w(&self) -> usize {
        (self.in_w - self.pool_w) / self.stride + 1
    }

    pub fn input_shape(&self) -> Vec<usize> {
        vec![self.channels, self.in_h, self.in_w]
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.channels, self.out_h(), self.out_w()]
    }
}

/// Parameters of a fully-connected layer.
///
/// Weights are `[out_size, in_size]` row-major, so each output neuron owns a
/// contiguous weight row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullyParams {
    pub in_size: usize,
    pub out_size: usize,
    pub has_bias: bool,
}

impl FullyParams {
    pub fn input_shape(&self) -> Vec<usize> {
        vec![self.in_size]
    }

    pub fn weight_shape(&self) -> Vec<usize> {
        vec![self.out_size, self.in_size]
    }

    pub fn bias_shape(&self) -> Vec<usize> {
        vec![self.out_size]
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.out_size]
    }

    pub fn in_buffer_count(&self) -> usize {
        if self.has_bias { 3 } else { 2 }
    }
}

/// Which operation family the bound layer belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerKind {
    Conv(ConvParams),
    Deconv(DeconvParams),
    MaxPool(MaxPoolParams),
    Fully(FullyParams),
}

/// The metadata surface a backend reads through its layer binding.
///
/// Callers construct one per layer, keep it in an `Arc`, and hand backends a
/// reference via `bind_layer`. The backend never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Family parameters.
    pub kind: LayerKind,
    /// Quantization policy for the `_q`/`_eq` execution paths.
    pub quant: QuantParams,
}

impl LayerSpec {
    /// Layer metadata with the default quantization policy.
    pub fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            quant: QuantParams::default(),
        }
    }

    /// Layer metadata with an explicit quantization policy.
    pub fn with_quant(kind: LayerKind, quant: QuantParams) -> Self {
        Self { kind, quant }
    }
}
