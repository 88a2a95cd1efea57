use corenn::backend::{BackendType, create_backend, default_engine};
use corenn::context::{ConvAlgorithm, OpContext, TransformStrategy};
use corenn::error::Error;

use std::sync::Arc;

#[test]
fn test_labels_are_fixed_and_nonempty() {
    let expected = [
        (BackendType::Internal, "Internal"),
        (BackendType::Nnpack, "NNPACK"),
        (BackendType::Libdnn, "LibDNN"),
        (BackendType::Avx, "AVX"),
        (BackendType::OpenCl, "OpenCL"),
    ];
    for (kind, label) in expected {
        assert!(!kind.label().is_empty());
        assert_eq!(kind.label(), label);
        assert_eq!(kind.to_string(), label);
    }
}

#[test]
fn test_descriptor_discriminant_roundtrip() {
    for kind in BackendType::ALL {
        assert_eq!(BackendType::try_from(kind as u8).unwrap(), kind);
    }
}

#[test]
fn test_unknown_discriminant_is_rejected() {
    for raw in [5u8, 9, 255] {
        match BackendType::try_from(raw) {
            Err(Error::UnsupportedEnumValue(v)) => assert_eq!(v, raw),
            other => panic!("expected UnsupportedEnumValue, got {other:?}"),
        }
    }
}

#[test]
fn test_default_engine_is_deterministic() {
    let first = default_engine();
    for _ in 0..10 {
        assert_eq!(default_engine(), first);
    }
    assert!(first == BackendType::Internal || first == BackendType::Avx);
}

#[test]
fn test_kind_agrees_with_concrete_identity() {
    for kind in [BackendType::Internal, BackendType::Avx] {
        let backend = create_backend(kind, None).unwrap();
        assert_eq!(backend.kind(), kind);
        // and stays consistent
        assert_eq!(backend.kind(), kind);
    }
}

#[test]
fn test_accelerator_kinds_fail_without_linked_engine() {
    for kind in [BackendType::Nnpack, BackendType::Libdnn, BackendType::OpenCl] {
        match create_backend(kind, None) {
            Err(Error::AcceleratorInitFailed { engine, .. }) => assert_eq!(engine, kind),
            other => panic!("expected AcceleratorInitFailed for {kind}, got {:?}", other.err()),
        }
    }
}

#[test]
fn test_backend_without_context_defaults() {
    let backend = create_backend(BackendType::Internal, None).unwrap();
    assert!(backend.context().is_none());
}

#[test]
fn test_backend_reports_caller_context() {
    let ctx = Arc::new(OpContext::new(
        ConvAlgorithm::Im2col,
        TransformStrategy::TupleBased,
    ));
    let backend = create_backend(BackendType::Internal, Some(Arc::clone(&ctx))).unwrap();
    assert_eq!(backend.context(), Some(&*ctx));
}

#[test]
fn test_context_defaults_are_engine_chosen() {
    let ctx = OpContext::default();
    assert_eq!(ctx.algorithm, ConvAlgorithm::Auto);
    assert_eq!(ctx.strategy, TransformStrategy::TupleBased);
}
