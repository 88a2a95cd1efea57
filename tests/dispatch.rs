use corenn::Backend;
use corenn::backend::{BackendType, create_backend};
use corenn::context::{ConvAlgorithm, OpContext, TransformStrategy};
use corenn::error::Error;
use corenn::params::{
    ConvParams, DeconvParams, FullyParams, LayerKind, LayerSpec, MaxPoolParams,
};
use corenn::tensors::Ten32;

use rand::Rng;
use std::sync::Arc;

fn conv_5x5_3x3() -> ConvParams {
    ConvParams {
        in_channels: 1,
        out_channels: 1,
        in_h: 5,
        in_w: 5,
        kernel_h: 3,
        kernel_w: 3,
        stride: 1,
        padding: 0,
        has_bias: false,
    }
}

fn bound_internal(layer: &Arc<LayerSpec>) -> Box<dyn Backend> {
    let mut backend = create_backend(BackendType::Internal, None).unwrap();
    backend.bind_layer(layer);
    backend
}

fn assert_close(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < tol, "{x} vs {y} exceeds tolerance {tol}");
    }
}

#[test]
fn test_conv2d_forward_ones() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let mut out_data = vec![Ten32::zeros([1, 3, 3])];
    backend.conv2d(&in_data, &mut out_data).unwrap();

    assert_eq!(out_data[0].shape, vec![1, 3, 3]);
    assert_eq!(out_data[0].data, vec![9.0; 9]);
}

#[test]
fn test_conv2d_forward_leaves_inputs_unmodified() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let snapshot = in_data.clone();
    let mut out_data = vec![Ten32::zeros([1, 3, 3])];
    backend.conv2d(&in_data, &mut out_data).unwrap();

    assert_eq!(in_data, snapshot);
}

#[test]
fn test_conv2d_backward_accumulation_law() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let out_data = vec![Ten32::filled([1, 3, 3], 9.0)];
    let mut out_grad = vec![Ten32::filled([1, 3, 3], 1.0)];
    let mut in_grad = vec![Ten32::zeros([1, 5, 5]), Ten32::zeros([1, 1, 3, 3])];

    backend
        .conv2d_backward(&in_data, &out_data, &mut out_grad, &mut in_grad)
        .unwrap();

    // Each input cell accumulates one contribution per kernel position
    // covering it: the outer product of [1, 2, 3, 2, 1] with itself.
    let cover = [1.0f32, 2.0, 3.0, 2.0, 1.0];
    let mut expected = Vec::new();
    for y in &cover {
        for x in &cover {
            expected.push(y * x);
        }
    }
    assert_eq!(in_grad[0].data, expected);

    // Every weight tap sees all 9 output positions over an all-ones input.
    assert_eq!(in_grad[1].data, vec![9.0; 9]);
}

#[test]
fn test_conv2d_with_bias() {
    let p = ConvParams {
        has_bias: true,
        ..conv_5x5_3x3()
    };
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(p)));
    let backend = bound_internal(&layer);

    let in_data = vec![
        Ten32::filled([1, 5, 5], 1.0),
        Ten32::filled([1, 1, 3, 3], 1.0),
        Ten32::new([1], vec![1.0]),
    ];
    let mut out_data = vec![Ten32::zeros([1, 3, 3])];
    backend.conv2d(&in_data, &mut out_data).unwrap();
    assert_eq!(out_data[0].data, vec![10.0; 9]);

    let mut out_grad = vec![Ten32::filled([1, 3, 3], 1.0)];
    let mut in_grad = vec![
        Ten32::zeros([1, 5, 5]),
        Ten32::zeros([1, 1, 3, 3]),
        Ten32::zeros([1]),
    ];
    backend
        .conv2d_backward(&in_data, &out_data, &mut out_grad, &mut in_grad)
        .unwrap();
    assert_eq!(in_grad[2].data, vec![9.0]);
}

#[test]
fn test_conv2d_im2col_matches_direct() {
    let mut rng = rand::rng();
    let input: Vec<f32> = (0..25).map(|_| rng.random_range(-1.0..1.0)).collect();
    let weights: Vec<f32> = (0..9).map(|_| rng.random_range(-1.0..1.0)).collect();

    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let in_data = vec![
        Ten32::new([1, 5, 5], input),
        Ten32::new([1, 1, 3, 3], weights),
    ];

    let direct_backend = bound_internal(&layer);
    let mut direct = vec![Ten32::zeros([1, 3, 3])];
    direct_backend.conv2d(&in_data, &mut direct).unwrap();

    let ctx = Arc::new(OpContext::new(
        ConvAlgorithm::Im2col,
        TransformStrategy::TupleBased,
    ));
    let mut im2col_backend = create_backend(BackendType::Internal, Some(ctx)).unwrap();
    im2col_backend.bind_layer(&layer);
    let mut lowered = vec![Ten32::zeros([1, 3, 3])];
    im2col_backend.conv2d(&in_data, &mut lowered).unwrap();

    assert_close(&direct[0].data, &lowered[0].data, 1e-4);
}

#[test]
fn test_conv2d_quantized_close_to_full_precision() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let mut q_out = vec![Ten32::zeros([1, 3, 3])];
    backend.conv2d_q(&in_data, &mut q_out).unwrap();
    assert_close(&q_out[0].data, &vec![9.0; 9], 1e-2);

    let mut eq_out = vec![Ten32::zeros([1, 3, 3])];
    backend.conv2d_eq(&in_data, &mut eq_out).unwrap();
    assert_close(&eq_out[0].data, &vec![9.0; 9], 1e-2);
}

#[test]
fn test_conv2d_backward_quantized_close_to_full_precision() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let out_data = vec![Ten32::filled([1, 3, 3], 9.0)];
    let mut out_grad = vec![Ten32::filled([1, 3, 3], 1.0)];

    let mut full = vec![Ten32::zeros([1, 5, 5]), Ten32::zeros([1, 1, 3, 3])];
    backend
        .conv2d_backward(&in_data, &out_data, &mut out_grad, &mut full)
        .unwrap();

    let mut quant = vec![Ten32::zeros([1, 5, 5]), Ten32::zeros([1, 1, 3, 3])];
    backend
        .conv2d_backward_q(&in_data, &out_data, &mut out_grad, &mut quant)
        .unwrap();

    assert_close(&full[0].data, &quant[0].data, 1e-2);
    assert_close(&full[1].data, &quant[1].data, 1e-2);
}

#[test]
fn test_deconv2d_forward_scatter_counts() {
    let p = DeconvParams {
        in_channels: 1,
        out_channels: 1,
        in_h: 2,
        in_w: 2,
        kernel_h: 2,
        kernel_w: 2,
        stride: 1,
        padding: 0,
        has_bias: false,
    };
    let layer = Arc::new(LayerSpec::new(LayerKind::Deconv(p)));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 2, 2], 1.0), Ten32::filled([1, 1, 2, 2], 1.0)];
    let mut out_data = vec![Ten32::zeros([1, 3, 3])];
    backend.deconv2d(&in_data, &mut out_data).unwrap();

    // Overlap counts of a 2x2 kernel scattered from a 2x2 input.
    assert_eq!(
        out_data[0].data,
        vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]
    );
}

#[test]
fn test_deconv2d_backward() {
    let p = DeconvParams {
        in_channels: 1,
        out_channels: 1,
        in_h: 2,
        in_w: 2,
        kernel_h: 2,
        kernel_w: 2,
        stride: 1,
        padding: 0,
        has_bias: false,
    };
    let layer = Arc::new(LayerSpec::new(LayerKind::Deconv(p)));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 2, 2], 1.0), Ten32::filled([1, 1, 2, 2], 1.0)];
    let out_data = vec![Ten32::zeros([1, 3, 3])];
    let mut out_grad = vec![Ten32::filled([1, 3, 3], 1.0)];
    let mut in_grad = vec![Ten32::zeros([1, 2, 2]), Ten32::zeros([1, 1, 2, 2])];

    backend
        .deconv2d_backward(&in_data, &out_data, &mut out_grad, &mut in_grad)
        .unwrap();

    // Every input cell scatters through all 4 kernel taps.
    assert_eq!(in_grad[0].data, vec![4.0; 4]);
    // Every kernel tap is driven by all 4 input cells.
    assert_eq!(in_grad[1].data, vec![4.0; 4]);
}

#[test]
fn test_maxpool_forward_and_routed_gradient() {
    let p = MaxPoolParams {
        channels: 1,
        in_h: 2,
        in_w: 2,
        pool_h: 2,
        pool_w: 2,
        stride: 2,
    };
    let layer = Arc::new(LayerSpec::new(LayerKind::MaxPool(p)));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::new([1, 2, 2], vec![1.0, 5.0, 3.0, 2.0])];
    let mut out_data = vec![Ten32::zeros([1, 1, 1])];
    backend.maxpool(&in_data, &mut out_data).unwrap();
    assert_eq!(out_data[0].data, vec![5.0]);

    let mut out_grad = vec![Ten32::new([1, 1, 1], vec![1.0])];
    let mut in_grad = vec![Ten32::zeros([1, 2, 2])];
    backend
        .maxpool_backward(&in_data, &out_data, &mut out_grad, &mut in_grad)
        .unwrap();

    // Full gradient lands on the position holding the max, zero elsewhere.
    assert_eq!(in_grad[0].data, vec![0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn test_maxpool_gradient_is_conserved() {
    let p = MaxPoolParams {
        channels: 2,
        in_h: 4,
        in_w: 4,
        pool_h: 2,
        pool_w: 2,
        stride: 2,
    };
    let layer = Arc::new(LayerSpec::new(LayerKind::MaxPool(p)));
    let backend = bound_internal(&layer);

    let mut rng = rand::rng();
    let input: Vec<f32> = (0..32).map(|_| rng.random_range(-1.0..1.0)).collect();
    let grads: Vec<f32> = (0..8).map(|_| rng.random_range(-1.0..1.0)).collect();

    let in_data = vec![Ten32::new([2, 4, 4], input)];
    let mut out_data = vec![Ten32::zeros([2, 2, 2])];
    backend.maxpool(&in_data, &mut out_data).unwrap();

    let mut out_grad = vec![Ten32::new([2, 2, 2], grads.clone())];
    let mut in_grad = vec![Ten32::zeros([2, 4, 4])];
    backend
        .maxpool_backward(&in_data, &out_data, &mut out_grad, &mut in_grad)
        .unwrap();

    let routed: f32 = in_grad[0].data.iter().sum();
    let fed: f32 = grads.iter().sum();
    assert!((routed - fed).abs() < 1e-5);
}

#[test]
fn test_fully_forward_and_backward() {
    let p = FullyParams {
        in_size: 3,
        out_size: 2,
        has_bias: true,
    };
    let layer = Arc::new(LayerSpec::new(LayerKind::Fully(p)));
    let backend = bound_internal(&layer);

    let in_data = vec![
        Ten32::new([3], vec![1.0, 2.0, 3.0]),
        Ten32::new([2, 3], vec![1.0, 0.0, -1.0, 2.0, 1.0, 0.0]),
        Ten32::new([2], vec![0.5, -0.5]),
    ];
    let mut out_data = vec![Ten32::zeros([2])];
    backend.fully(&in_data, &mut out_data).unwrap();
    assert_eq!(out_data[0].data, vec![-1.5, 3.5]);

    let mut out_grad = vec![Ten32::new([2], vec![1.0, 1.0])];
    let mut in_grad = vec![
        Ten32::zeros([3]),
        Ten32::zeros([2, 3]),
        Ten32::zeros([2]),
    ];
    backend
        .fully_backward(&in_data, &out_data, &mut out_grad, &mut in_grad)
        .unwrap();

    // din = wᵀ·g, dw = g⊗x, db = g
    assert_eq!(in_grad[0].data, vec![3.0, 1.0, -1.0]);
    assert_eq!(in_grad[1].data, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    assert_eq!(in_grad[2].data, vec![1.0, 1.0]);
}

#[test]
fn test_fully_quantized_variants_close_to_full_precision() {
    let p = FullyParams {
        in_size: 2,
        out_size: 1,
        has_bias: false,
    };
    let layer = Arc::new(LayerSpec::new(LayerKind::Fully(p)));
    let backend = bound_internal(&layer);

    let in_data = vec![
        Ten32::new([2], vec![0.5, -0.5]),
        Ten32::new([1, 2], vec![1.0, 0.5]),
    ];
    let mut full = vec![Ten32::zeros([1])];
    backend.fully(&in_data, &mut full).unwrap();

    let mut quant = vec![Ten32::zeros([1])];
    backend.fully_q(&in_data, &mut quant).unwrap();
    assert_close(&full[0].data, &quant[0].data, 1e-2);

    let mut eff = vec![Ten32::zeros([1])];
    backend.fully_eq(&in_data, &mut eff).unwrap();
    assert_close(&full[0].data, &eff[0].data, 1e-2);
}

#[test]
fn test_operation_before_bind_fails() {
    let backend = create_backend(BackendType::Internal, None).unwrap();
    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let mut out_data = vec![Ten32::zeros([1, 3, 3])];

    assert!(matches!(
        backend.conv2d(&in_data, &mut out_data),
        Err(Error::UnboundLayer)
    ));
}

#[test]
fn test_binding_is_revalidated_after_layer_drop() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);
    drop(layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let mut out_data = vec![Ten32::zeros([1, 3, 3])];
    assert!(matches!(
        backend.conv2d(&in_data, &mut out_data),
        Err(Error::UnboundLayer)
    ));
}

#[test]
fn test_rebinding_switches_layer_metadata() {
    let conv = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let fully = Arc::new(LayerSpec::new(LayerKind::Fully(FullyParams {
        in_size: 2,
        out_size: 1,
        has_bias: false,
    })));

    let mut backend = create_backend(BackendType::Internal, None).unwrap();
    backend.bind_layer(&conv);
    backend.bind_layer(&fully);

    let in_data = vec![
        Ten32::new([2], vec![1.0, 2.0]),
        Ten32::new([1, 2], vec![3.0, 4.0]),
    ];
    let mut out_data = vec![Ten32::zeros([1])];
    backend.fully(&in_data, &mut out_data).unwrap();
    assert_eq!(out_data[0].data, vec![11.0]);

    // The old family is no longer reachable through the binding.
    let conv_in = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let mut conv_out = vec![Ten32::zeros([1, 3, 3])];
    assert!(matches!(
        backend.conv2d(&conv_in, &mut conv_out),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_shape_mismatch_leaves_buffers_untouched() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    // Wrong spatial extents for the bound layer.
    let mut out_data = vec![Ten32::filled([1, 4, 4], 7.0)];
    assert!(matches!(
        backend.conv2d(&in_data, &mut out_data),
        Err(Error::ShapeMismatch { .. })
    ));
    assert_eq!(out_data[0].data, vec![7.0; 16]);

    // Wrong buffer count.
    let short = vec![Ten32::filled([1, 5, 5], 1.0)];
    let mut out_ok = vec![Ten32::filled([1, 3, 3], 7.0)];
    assert!(matches!(
        backend.conv2d(&short, &mut out_ok),
        Err(Error::ShapeMismatch { .. })
    ));
    assert_eq!(out_ok[0].data, vec![7.0; 9]);
}

#[test]
fn test_backward_shape_mismatch_rejected() {
    let layer = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));
    let backend = bound_internal(&layer);

    let in_data = vec![Ten32::filled([1, 5, 5], 1.0), Ten32::filled([1, 1, 3, 3], 1.0)];
    let out_data = vec![Ten32::zeros([1, 3, 3])];
    let mut out_grad = vec![Ten32::zeros([1, 3, 3])];
    // Input-gradient buffer with the wrong shape.
    let mut in_grad = vec![Ten32::zeros([1, 4, 4]), Ten32::zeros([1, 1, 3, 3])];

    assert!(matches!(
        backend.conv2d_backward(&in_data, &out_data, &mut out_grad, &mut in_grad),
        Err(Error::ShapeMismatch { .. })
    ));
    assert_eq!(in_grad[0].data, vec![0.0; 16]);
}

#[test]
fn test_avx_backend_matches_internal() {
    let conv = Arc::new(LayerSpec::new(LayerKind::Conv(conv_5x5_3x3())));

    let internal = bound_internal(&conv);
    let mut avx = create_backend(BackendType::Avx, None).unwrap();
    avx.bind_layer(&conv);
    assert_eq!(avx.kind(), BackendType::Avx);

    let in_data = vec![
        Ten32::new([1, 5, 5], (0..25).map(|i| (i % 5) as f32).collect()),
        Ten32::new([1, 1, 3, 3], (0..9).map(|i| (i as f32) - 4.0).collect()),
    ];
    let mut reference = vec![Ten32::zeros([1, 3, 3])];
    internal.conv2d(&in_data, &mut reference).unwrap();

    let mut vectorized = vec![Ten32::zeros([1, 3, 3])];
    avx.conv2d(&in_data, &mut vectorized).unwrap();

    assert_eq!(reference[0].data, vectorized[0].data);
}
