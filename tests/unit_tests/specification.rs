//! Specification parsing, set/get operations and dispatch-table routing.

use crate::unit_tests::fixtures::{LaplaceKernel, ProblemBuilder, SetupRecordingKernel};
use hati::error::EquationsError;
use hati::registry::KernelRegistry;
use hati::specification::{classes, types, EquationsClass, Specification};
use std::sync::Arc;

#[test]
fn empty_specification_fails_as_not_allocated() {
    assert!(matches!(
        Specification::new(&[]),
        Err(EquationsError::SpecificationNotAllocated)
    ));
}

#[test]
fn unknown_class_echoes_the_offending_value() {
    let err = Specification::new(&[137]).unwrap_err();
    match err {
        EquationsError::InvalidSpecification(message) => {
            assert!(message.contains("137"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn resolve_on_unregistered_class_is_not_implemented() {
    let registry = KernelRegistry::<f64>::new();
    let specification = Specification::new(&[classes::MODAL]).unwrap();
    assert!(matches!(
        registry.resolve(&specification),
        Err(EquationsError::NotImplemented(_))
    ));
}

#[test]
fn type_level_registration_wins_over_class_level() {
    let mut registry = KernelRegistry::<f64>::new();
    let generic: Arc<dyn hati::kernel::PhysicsKernel<f64>> = Arc::new(LaplaceKernel);
    let strang: Arc<dyn hati::kernel::PhysicsKernel<f64>> = Arc::new(SetupRecordingKernel::default());
    registry.register(EquationsClass::Bioelectrics, Arc::clone(&generic));
    registry.register_type(
        EquationsClass::Bioelectrics,
        types::MONODOMAIN_STRANG_SPLITTING,
        Arc::clone(&strang),
    );

    let generic_spec =
        Specification::new(&[classes::BIOELECTRICS, types::MONODOMAIN_EQUATION]).unwrap();
    let strang_spec =
        Specification::new(&[classes::BIOELECTRICS, types::MONODOMAIN_STRANG_SPLITTING]).unwrap();

    let resolved_generic = registry.resolve(&generic_spec).unwrap();
    let resolved_strang = registry.resolve(&strang_spec).unwrap();
    assert!(Arc::ptr_eq(&resolved_generic, &generic));
    assert!(Arc::ptr_eq(&resolved_strang, &strang));
}

#[test]
fn class_without_type_resolves_to_the_class_entry() {
    let mut registry = KernelRegistry::<f64>::new();
    let kernel: Arc<dyn hati::kernel::PhysicsKernel<f64>> = Arc::new(LaplaceKernel);
    registry.register(EquationsClass::ClassicalField, Arc::clone(&kernel));
    let specification = Specification::new(&[classes::CLASSICAL_FIELD]).unwrap();
    assert!(Arc::ptr_eq(&registry.resolve(&specification).unwrap(), &kernel));
}

#[test]
fn specification_get_reports_required_buffer_size() {
    let (set, _registry) = ProblemBuilder::linear(2).build(Arc::new(LaplaceKernel));
    assert_eq!(set.specification_size().unwrap(), 2);

    let mut too_small = [0_i32; 1];
    let err = set.specification_get(&mut too_small).unwrap_err();
    match err {
        EquationsError::BufferTooSmall { required, actual } => {
            assert_eq!(required, 2);
            assert_eq!(actual, 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains('2'));

    let mut buffer = [0_i32; 2];
    set.specification_get(&mut buffer).unwrap();
    assert_eq!(buffer, [classes::CLASSICAL_FIELD, types::LAPLACE_EQUATION]);
}

#[test]
fn specification_set_is_rejected_after_finish() {
    let (mut set, _registry) = ProblemBuilder::linear(2).build(Arc::new(LaplaceKernel));
    assert!(matches!(
        set.specification_set(&[classes::ELASTICITY]),
        Err(EquationsError::AlreadyFinished(_))
    ));
}

#[test]
fn specification_set_rejects_an_empty_specification() {
    let mut region = hati::field::Region::new(crate::unit_tests::fixtures::REGION);
    let mut registry = KernelRegistry::<f64>::new();
    registry.register(EquationsClass::ClassicalField, Arc::new(LaplaceKernel));
    let geometry = crate::unit_tests::fixtures::chain_geometry(2);
    let decomposition =
        hati::distributed::Decomposition::undistributed(crate::unit_tests::fixtures::DECOMPOSITION, 2, 3);
    let mut set = hati::equations_set::EquationsSet::create_start(
        1,
        &mut region,
        decomposition,
        geometry,
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    assert!(matches!(
        set.specification_set(&[]),
        Err(EquationsError::SpecificationNotAllocated)
    ));
}
