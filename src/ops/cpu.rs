//! Reference ("Internal") kernels.
//!
//! This module provides the pure-Rust implementations of every operation
//! family the dispatch layer exposes: conv2d, deconv2d, max-pooling, and
//! fully-connected, forward and backward, plus the quantized execution
//! paths.
//!
//! These kernels are the default engine and the fallback for every other
//! backend; they favor clarity over speed but still parallelize over output
//! channels/rows with [`rayon`](https://docs.rs/rayon).
//!
//! ## Conventions
//!
//! - Buffers are flat row-major slices; shapes and strides come from the
//!   params structs, already validated by the dispatch layer.
//! - Forward kernels overwrite their output buffer completely.
//! - Backward kernels accumulate into the gradient buffers (`+=`), matching
//!   how a training loop sums gradients across a batch.
//! - Quantized forward paths quantize operands to i8, accumulate in i32, and
//!   rescale; quantized backward paths differentiate the round-tripped
//!   operands so gradients match what the integer forward pass computed.

use rayon::prelude::*;

use crate::params::{ConvParams, DeconvParams, FullyParams, MaxPoolParams, QuantParams};

/// Direct nested-loop convolution forward pass.
pub fn conv2d_forward(
    p: &ConvParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let (out_h, out_w) = (p.out_h(), p.out_w());
    let plane = out_h * out_w;

    output
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(oc, out_plane)| {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = bias.map_or(0.0, |b| b[oc]);
                    for ic in 0..p.in_channels {
                        for ky in 0..p.kernel_h {
                            for kx in 0..p.kernel_w {
                                let iy = (oy * p.stride + ky) as isize - p.padding as isize;
                                let ix = (ox * p.stride + kx) as isize - p.padding as isize;
                                if iy < 0
                                    || ix < 0
                                    || iy >= p.in_h as isize
                                    || ix >= p.in_w as isize
                                {
                                    continue;
                                }
                                let ii =
                                    ic * p.in_h * p.in_w + iy as usize * p.in_w + ix as usize;
                                let wi = ((oc * p.in_channels + ic) * p.kernel_h + ky)
                                    * p.kernel_w
                                    + kx;
                                acc += input[ii] * weights[wi];
                            }
                        }
                    }
                    out_plane[oy * out_w + ox] = acc;
                }
            }
        });
}

/// Lowers the input into patch-major im2col form: one contiguous row of
/// `patch_len` elements per output pixel, inner order `(ic, ky, kx)` to match
/// the weight layout. Out-of-bounds (padding) taps are zero.
pub(crate) fn im2col_patches(p: &ConvParams, input: &[f32]) -> Vec<f32> {
    let (out_h, out_w) = (p.out_h(), p.out_w());
    let k = p.patch_len();
    let mut patches = vec![0.0f32; out_h * out_w * k];

    for oy in 0..out_h {
        for ox in 0..out_w {
            let row = &mut patches[(oy * out_w + ox) * k..(oy * out_w + ox + 1) * k];
            let mut i = 0;
            for ic in 0..p.in_channels {
                for ky in 0..p.kernel_h {
                    for kx in 0..p.kernel_w {
                        let iy = (oy * p.stride + ky) as isize - p.padding as isize;
                        let ix = (ox * p.stride + kx) as isize - p.padding as isize;
                        if iy >= 0 && ix >= 0 && iy < p.in_h as isize && ix < p.in_w as isize {
                            row[i] =
                                input[ic * p.in_h * p.in_w + iy as usize * p.in_w + ix as usize];
                        }
                        i += 1;
                    }
                }
            }
        }
    }
    patches
}

/// Convolution forward pass as a matrix product over im2col patches.
///
/// Numerically identical to [`conv2d_forward`]; selected through the
/// operation context when the caller asks for the `Im2col` formulation.
pub fn conv2d_forward_im2col(
    p: &ConvParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let patches = im2col_patches(p, input);
    let k = p.patch_len();
    let plane = p.out_h() * p.out_w();
    let patches = &patches[..];

    output
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(oc, out_plane)| {
            let wrow = &weights[oc * k..(oc + 1) * k];
            for (pix, out) in out_plane.iter_mut().enumerate() {
                let patch = &patches[pix * k..(pix + 1) * k];
                let mut acc: f32 = wrow.iter().zip(patch).map(|(w, x)| w * x).sum();
                if let Some(b) = bias {
                    acc += b[oc];
                }
                *out = acc;
            }
        });
}

/// Quantized convolution forward pass: i8 operands, i32 accumulation,
/// rescale by `scale²`, bias applied in real space.
pub fn conv2d_forward_q(
    p: &ConvParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let qin = q.quantize(input);
    let qw = q.quantize(weights);
    let (qin, qw) = (&qin[..], &qw[..]);
    let zp = q.zero_point;
    let rescale = q.scale * q.scale;

    let (out_h, out_w) = (p.out_h(), p.out_w());
    let plane = out_h * out_w;

    output
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(oc, out_plane)| {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc: i32 = 0;
                    for ic in 0..p.in_channels {
                        for ky in 0..p.kernel_h {
                            for kx in 0..p.kernel_w {
                                let iy = (oy * p.stride + ky) as isize - p.padding as isize;
                                let ix = (ox * p.stride + kx) as isize - p.padding as isize;
                                if iy < 0
                                    || ix < 0
                                    || iy >= p.in_h as isize
                                    || ix >= p.in_w as isize
                                {
                                    continue;
                                }
                                let ii =
                                    ic * p.in_h * p.in_w + iy as usize * p.in_w + ix as usize;
                                let wi = ((oc * p.in_channels + ic) * p.kernel_h + ky)
                                    * p.kernel_w
                                    + kx;
                                acc += (qin[ii] as i32 - zp) * (qw[wi] as i32 - zp);
                            }
                        }
                    }
                    let mut v = acc as f32 * rescale;
                    if let Some(b) = bias {
                        v += b[oc];
                    }
                    out_plane[oy * out_w + ox] = v;
                }
            }
        });
}

/// Effective-quantized convolution forward pass.
///
/// The weights are assumed pre-folded with the quantization parameters, so
/// only the activations pass through the quantization grid; the product is
/// accumulated in real space against the folded weights.
pub fn conv2d_forward_eq(
    p: &ConvParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let rin = q.roundtrip(input);
    conv2d_forward(p, &rin, weights, bias, output);
}

/// Convolution backward pass.
///
/// Accumulates the input gradient, the weight gradient, and (when present)
/// the bias gradient from the gradient flowing into the outputs.
pub fn conv2d_backward(
    p: &ConvParams,
    input: &[f32],
    weights: &[f32],
    out_grad: &[f32],
    grad_input: &mut [f32],
    grad_weights: &mut [f32],
    mut grad_bias: Option<&mut [f32]>,
) {
    let (out_h, out_w) = (p.out_h(), p.out_w());

    for oc in 0..p.out_channels {
        for oy in 0..out_h {
            for ox in 0..out_w {
                let g = out_grad[oc * out_h * out_w + oy * out_w + ox];
                if let Some(gb) = grad_bias.as_mut() {
                    gb[oc] += g;
                }
                for ic in 0..p.in_channels {
                    for ky in 0..p.kernel_h {
                        for kx in 0..p.kernel_w {
                            let iy = (oy * p.stride + ky) as isize - p.padding as isize;
                            let ix = (ox * p.stride + kx) as isize - p.padding as isize;
                            if iy < 0 || ix < 0 || iy >= p.in_h as isize || ix >= p.in_w as isize
                            {
                                continue;
                            }
                            let ii = ic * p.in_h * p.in_w + iy as usize * p.in_w + ix as usize;
                            let wi =
                                ((oc * p.in_channels + ic) * p.kernel_h + ky) * p.kernel_w + kx;
                            grad_input[ii] += weights[wi] * g;
                            grad_weights[wi] += input[ii] * g;
                        }
                    }
                }
            }
        }
    }
}

/// Quantized convolution backward pass: differentiates the round-tripped
/// operands the integer forward pass computed with.
pub fn conv2d_backward_q(
    p: &ConvParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    out_grad: &[f32],
    grad_input: &mut [f32],
    grad_weights: &mut [f32],
    grad_bias: Option<&mut [f32]>,
) {
    let rin = q.roundtrip(input);
    let rw = q.roundtrip(weights);
    conv2d_backward(p, &rin, &rw, out_grad, grad_input, grad_weights, grad_bias);
}

/// Deconvolution (transposed convolution) forward pass, written in gather
/// form so output channels parallelize without write races.
pub fn deconv2d_forward(
    p: &DeconvParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let (out_h, out_w) = (p.out_h(), p.out_w());
    let plane = out_h * out_w;

    output
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(oc, out_plane)| {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = bias.map_or(0.0, |b| b[oc]);
                    for ic in 0..p.in_channels {
                        for ky in 0..p.kernel_h {
                            for kx in 0..p.kernel_w {
                                let ty = oy as isize + p.padding as isize - ky as isize;
                                let tx = ox as isize + p.padding as isize - kx as isize;
                                if ty < 0 || tx < 0 {
                                    continue;
                                }
                                let (ty, tx) = (ty as usize, tx as usize);
                                if ty % p.stride != 0 || tx % p.stride != 0 {
                                    continue;
                                }
                                let (iy, ix) = (ty / p.stride, tx / p.stride);
                                if iy >= p.in_h || ix >= p.in_w {
                                    continue;
                                }
                                let ii = ic * p.in_h * p.in_w + iy * p.in_w + ix;
                                let wi = ((oc * p.in_channels + ic) * p.kernel_h + ky)
                                    * p.kernel_w
                                    + kx;
                                acc += input[ii] * weights[wi];
                            }
                        }
                    }
                    out_plane[oy * out_w + ox] = acc;
                }
            }
        });
}

/// Quantized deconvolution forward pass: runs the reference kernel on the
/// requantized operands.
pub fn deconv2d_forward_q(
    p: &DeconvParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let rin = q.roundtrip(input);
    let rw = q.roundtrip(weights);
    deconv2d_forward(p, &rin, &rw, bias, output);
}

/// Effective-quantized deconvolution forward pass; weights are pre-folded.
pub fn deconv2d_forward_eq(
    p: &DeconvParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let rin = q.roundtrip(input);
    deconv2d_forward(p, &rin, weights, bias, output);
}

/// Deconvolution backward pass.
pub fn deconv2d_backward(
    p: &DeconvParams,
    input: &[f32],
    weights: &[f32],
    out_grad: &[f32],
    grad_input: &mut [f32],
    grad_weights: &mut [f32],
    mut grad_bias: Option<&mut [f32]>,
) {
    let (out_h, out_w) = (p.out_h(), p.out_w());

    if let Some(gb) = grad_bias.as_mut() {
        for oc in 0..p.out_channels {
            let plane = &out_grad[oc * out_h * out_w..(oc + 1) * out_h * out_w];
            gb[oc] += plane.iter().sum::<f32>();
        }
    }

    for ic in 0..p.in_channels {
        for iy in 0..p.in_h {
            for ix in 0..p.in_w {
                let ii = ic * p.in_h * p.in_w + iy * p.in_w + ix;
                let x = input[ii];
                for oc in 0..p.out_channels {
                    for ky in 0..p.kernel_h {
                        for kx in 0..p.kernel_w {
                            let oy = (iy * p.stride + ky) as isize - p.padding as isize;
                            let ox = (ix * p.stride + kx) as isize - p.padding as isize;
                            if oy < 0 || ox < 0 || oy >= out_h as isize || ox >= out_w as isize {
                                continue;
                            }
                            let oi =
                                oc * out_h * out_w + oy as usize * out_w + ox as usize;
                            let wi =
                                ((oc * p.in_channels + ic) * p.kernel_h + ky) * p.kernel_w + kx;
                            let g = out_grad[oi];
                            grad_input[ii] += weights[wi] * g;
                            grad_weights[wi] += x * g;
                        }
                    }
                }
            }
        }
    }
}

/// Quantized deconvolution backward pass over round-tripped operands.
pub fn deconv2d_backward_q(
    p: &DeconvParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    out_grad: &[f32],
    grad_input: &mut [f32],
    grad_weights: &mut [f32],
    grad_bias: Option<&mut [f32]>,
) {
    let rin = q.roundtrip(input);
    let rw = q.roundtrip(weights);
    deconv2d_backward(p, &rin, &rw, out_grad, grad_input, grad_weights, grad_bias);
}

/// Max-pooling forward pass. Windows that run past the input edge are
/// truncated.
pub fn maxpool_forward(p: &MaxPoolParams, input: &[f32], output: &mut [f32]) {
    let (out_h, out_w) = (p.out_h(), p.out_w());
    let plane = out_h * out_w;

    output
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(c, out_plane)| {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut best = f32::NEG_INFINITY;
                    for ky in 0..p.pool_h {
                        for kx in 0..p.pool_w {
                            let iy = oy * p.stride + ky;
                            let ix = ox * p.stride + kx;
                            if iy >= p.in_h || ix >= p.in_w {
                                continue;
                            }
                            let v = input[c * p.in_h * p.in_w + iy * p.in_w + ix];
                            if v > best {
                                best = v;
                            }
                        }
                    }
                    out_plane[oy * out_w + ox] = best;
                }
            }
        });
}

/// Max-pooling backward pass: the whole gradient of each window routes to
/// the position that produced the max. Ties go to the first position in scan
/// order.
pub fn maxpool_backward(
    p: &MaxPoolParams,
    input: &[f32],
    out_grad: &[f32],
    grad_input: &mut [f32],
) {
    let (out_h, out_w) = (p.out_h(), p.out_w());

    for c in 0..p.channels {
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut best = f32::NEG_INFINITY;
                let mut best_idx = 0usize;
                for ky in 0..p.pool_h {
                    for kx in 0..p.pool_w {
                        let iy = oy * p.stride + ky;
                        let ix = ox * p.stride + kx;
                        if iy >= p.in_h || ix >= p.in_w {
                            continue;
                        }
                        let idx = c * p.in_h * p.in_w + iy * p.in_w + ix;
                        if input[idx] > best {
                            best = input[idx];
                            best_idx = idx;
                        }
                    }
                }
                grad_input[best_idx] += out_grad[c * out_h * out_w + oy * out_w + ox];
            }
        }
    }
}

/// Fully-connected forward pass: `out[o] = Σᵢ w[o][i]·x[i] (+ b[o])`.
pub fn fully_forward(
    p: &FullyParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    output.par_iter_mut().enumerate().for_each(|(o, out)| {
        let row = &weights[o * p.in_size..(o + 1) * p.in_size];
        let mut acc: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
        if let Some(b) = bias {
            acc += b[o];
        }
        *out = acc;
    });
}

/// Quantized fully-connected forward pass with i32 accumulation.
pub fn fully_forward_q(
    p: &FullyParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let qin = q.quantize(input);
    let qw = q.quantize(weights);
    let (qin, qw) = (&qin[..], &qw[..]);
    let zp = q.zero_point;
    let rescale = q.scale * q.scale;

    output.par_iter_mut().enumerate().for_each(|(o, out)| {
        let row = &qw[o * p.in_size..(o + 1) * p.in_size];
        let acc: i32 = row
            .iter()
            .zip(qin)
            .map(|(&w, &x)| (w as i32 - zp) * (x as i32 - zp))
            .sum();
        let mut v = acc as f32 * rescale;
        if let Some(b) = bias {
            v += b[o];
        }
        *out = v;
    });
}

/// Effective-quantized fully-connected forward pass; weights are pre-folded.
pub fn fully_forward_eq(
    p: &FullyParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let rin = q.roundtrip(input);
    fully_forward(p, &rin, weights, bias, output);
}

/// Fully-connected backward pass.
pub fn fully_backward(
    p: &FullyParams,
    input: &[f32],
    weights: &[f32],
    out_grad: &[f32],
    grad_input: &mut [f32],
    grad_weights: &mut [f32],
    mut grad_bias: Option<&mut [f32]>,
) {
    for o in 0..p.out_size {
        let g = out_grad[o];
        if let Some(gb) = grad_bias.as_mut() {
            gb[o] += g;
        }
        let row = &weights[o * p.in_size..(o + 1) * p.in_size];
        let grad_row = &mut grad_weights[o * p.in_size..(o + 1) * p.in_size];
        for i in 0..p.in_size {
            grad_input[i] += row[i] * g;
            grad_row[i] += input[i] * g;
        }
    }
}

/// Quantized fully-connected backward pass over round-tripped operands.
pub fn fully_backward_q(
    p: &FullyParams,
    q: &QuantParams,
    input: &[f32],
    weights: &[f32],
    out_grad: &[f32],
    grad_input: &mut [f32],
    grad_weights: &mut [f32],
    grad_bias: Option<&mut [f32]>,
) {
    let rin = q.roundtrip(input);
    let rw = q.roundtrip(weights);
    fully_backward(p, &rin, &rw, out_grad, grad_input, grad_weights, grad_bias);
}
