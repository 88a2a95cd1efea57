//! Vectorized kernels for the AVX engine.
//!
//! The heavy inner products of convolution and fully-connected layers run
//! through [`dot`], which uses AVX2 fused multiply-adds when the build
//! enables them (`--features=simd` on an AVX2-capable x86-64 target) and a
//! pure-Rust loop otherwise, so the `Avx` engine compiles everywhere.
//!
//! Operations without a dense inner product (pooling, gradient scatter) gain
//! nothing from vectorization; the AVX backend delegates those to the
//! reference kernels in [`cpu`](super::cpu).

use rayon::prelude::*;

use crate::ops::cpu;
use crate::params::{ConvParams, FullyParams};

/// Dense inner product of two equal-length slices.
#[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    use core::arch::x86_64::{
        _mm256_fmadd_ps, _mm256_loadu_ps, _mm256_setzero_ps, _mm256_storeu_ps,
    };

    unsafe {
        let mut acc = _mm256_setzero_ps();
        let mut i = 0;
        while i + 8 <= a.len() {
            let x = _mm256_loadu_ps(a.as_ptr().add(i));
            let y = _mm256_loadu_ps(b.as_ptr().add(i));
            acc = _mm256_fmadd_ps(x, y, acc);
            i += 8;
        }

        let mut buf = [0.0f32; 8];
        _mm256_storeu_ps(buf.as_mut_ptr(), acc);
        let mut sum: f32 = buf.iter().sum();

        while i < a.len() {
            sum += a[i] * b[i];
            i += 1;
        }
        sum
    }
}

/// Dense inner product of two equal-length slices (scalar fallback).
#[cfg(not(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2")))]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Convolution forward pass over im2col patches, one [`dot`] per output
/// pixel.
pub fn conv2d_forward(
    p: &ConvParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    let patches = cpu::im2col_patches(p, input);
    let patches = &patches[..];
    let k = p.patch_len();
    let plane = p.out_h() * p.out_w();

    output
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(oc, out_plane)| {
            let wrow = &weights[oc * k..(oc + 1) * k];
            for (pix, out) in out_plane.iter_mut().enumerate() {
                let mut acc = dot(wrow, &patches[pix * k..(pix + 1) * k]);
                if let Some(b) = bias {
                    acc += b[oc];
                }
                *out = acc;
            }
        });
}

/// Fully-connected forward pass, one [`dot`] per output neuron.
pub fn fully_forward(
    p: &FullyParams,
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
) {
    output.par_iter_mut().enumerate().for_each(|(o, out)| {
        let mut acc = dot(&weights[o * p.in_size..(o + 1) * p.in_size], input);
        if let Some(b) = bias {
            acc += b[o];
        }
        *out = acc;
    });
}
