//! Two-phase creation protocol of the equations set and its sub-objects.

use crate::unit_tests::fixtures::{
    chain_geometry, LaplaceKernel, ProblemBuilder, SetupRecordingKernel, DECOMPOSITION, REGION,
};
use hati::distributed::Decomposition;
use hati::equations::{EquationsLinearity, EquationsTimeDependence};
use hati::equations_set::EquationsSet;
use hati::error::EquationsError;
use hati::field::{Field, Region};
use hati::kernel::{SetupAction, SetupType};
use hati::registry::KernelRegistry;
use hati::specification::{classes, EquationsClass, SolutionMethod};
use std::sync::Arc;

fn registry_with_laplace() -> KernelRegistry<f64> {
    let mut registry = KernelRegistry::new();
    registry.register(EquationsClass::ClassicalField, Arc::new(LaplaceKernel));
    registry
}

#[test]
fn create_start_requires_a_finished_geometry_field() {
    let registry = registry_with_laplace();
    let mut region = Region::new(REGION);
    let geometry = Field::<f64>::new("geometry", REGION, DECOMPOSITION);
    let err = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        geometry,
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap_err();
    assert!(matches!(err, EquationsError::NotFinished("geometry field")));
}

#[test]
fn create_start_detects_region_and_decomposition_mismatches() {
    let registry = registry_with_laplace();

    let mut other_region = Region::new(9);
    let err = EquationsSet::create_start(
        1,
        &mut other_region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EquationsError::RegionMismatch { expected: 9, found: REGION }
    ));

    let mut region = Region::new(REGION);
    let err = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(5, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EquationsError::DecompositionMismatch { expected: 5, found: DECOMPOSITION }
    ));
}

#[test]
fn duplicate_user_numbers_on_a_region_are_rejected() {
    let registry = registry_with_laplace();
    let mut region = Region::new(REGION);
    let _first = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    let err = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap_err();
    assert!(err.to_string().contains("already in use"));
}

#[test]
fn create_finish_twice_is_already_finished() {
    let registry = registry_with_laplace();
    let mut region = Region::new(REGION);
    let mut set = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    set.create_finish(&registry).unwrap();
    assert!(matches!(
        set.create_finish(&registry),
        Err(EquationsError::AlreadyFinished("equations set"))
    ));
}

#[test]
fn auto_created_dependent_field_has_two_variables() {
    let (set, _registry) = ProblemBuilder::linear(3).build(Arc::new(LaplaceKernel));
    let dependent = set.dependent_field().unwrap();
    assert_eq!(dependent.num_variables(), 2);
    assert_eq!(dependent.variable(0).unwrap().num_dofs(), 4);
    assert_eq!(dependent.variable(1).unwrap().num_dofs(), 4);
    assert_eq!(dependent.num_dofs(), 8);
}

#[test]
fn dependent_create_start_twice_is_already_finished() {
    let (mut set, registry) = ProblemBuilder::linear(2).build(Arc::new(LaplaceKernel));
    assert!(matches!(
        set.dependent_create_start(None, &registry),
        Err(EquationsError::AlreadyFinished("dependent field"))
    ));
}

#[test]
fn user_supplied_dependent_field_is_cross_checked() {
    let registry = registry_with_laplace();
    let mut region = Region::new(REGION);
    let mut set = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    set.create_finish(&registry).unwrap();

    let mut foreign = Field::<f64>::new("dependent", 4, DECOMPOSITION);
    foreign
        .add_variable("u", 3, 0, vec![], vec![])
        .unwrap();
    foreign.finish().unwrap();
    assert!(matches!(
        set.dependent_create_start(Some(foreign), &registry),
        Err(EquationsError::RegionMismatch { .. })
    ));
}

#[test]
fn equations_creation_requires_a_finished_dependent_field() {
    let registry = registry_with_laplace();
    let mut region = Region::new(REGION);
    let mut set = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    set.create_finish(&registry).unwrap();
    assert!(matches!(
        set.equations_create_start(
            EquationsLinearity::Linear,
            EquationsTimeDependence::Static,
            &registry
        ),
        Err(EquationsError::NotAssociated("dependent field"))
    ));
}

#[test]
fn default_kernel_rejects_non_fem_solution_methods() {
    let registry = registry_with_laplace();
    let mut region = Region::new(REGION);
    let mut set = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    assert!(matches!(
        set.solution_method_set(SolutionMethod::BoundaryElement, &registry),
        Err(EquationsError::NotImplemented(_))
    ));
    set.solution_method_set(SolutionMethod::FiniteElement, &registry)
        .unwrap();
    set.create_finish(&registry).unwrap();
    assert!(matches!(
        set.solution_method_set(SolutionMethod::FiniteElement, &registry),
        Err(EquationsError::AlreadyFinished("equations set"))
    ));
}

#[test]
fn setup_hooks_are_dispatched_per_lifecycle_phase() {
    let kernel = Arc::new(SetupRecordingKernel::default());
    let mut registry = KernelRegistry::<f64>::new();
    registry.register(EquationsClass::ClassicalField, Arc::clone(&kernel) as _);

    let mut region = Region::new(REGION);
    let mut set = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    set.create_finish(&registry).unwrap();
    set.dependent_create_start(None, &registry).unwrap();
    set.dependent_create_finish(&registry).unwrap();
    set.materials_create_start(None, &registry).unwrap();
    set.materials_create_finish(&registry).unwrap();
    set.equations_create_start(
        EquationsLinearity::Linear,
        EquationsTimeDependence::Static,
        &registry,
    )
    .unwrap();
    set.equations_create_finish(hati::distributed::StorageScheme::Dense, &registry)
        .unwrap();

    let phases = kernel.phases.lock().unwrap().clone();
    assert_eq!(
        phases,
        vec![
            (SetupType::Initial, SetupAction::Start),
            (SetupType::Initial, SetupAction::Finish),
            (SetupType::Dependent, SetupAction::Start),
            (SetupType::Dependent, SetupAction::Finish),
            (SetupType::Materials, SetupAction::Start),
            (SetupType::Materials, SetupAction::Finish),
            (SetupType::Equations, SetupAction::Start),
            (SetupType::Equations, SetupAction::Finish),
        ]
    );
}

#[test]
fn assembly_requires_finished_equations() {
    let registry = registry_with_laplace();
    let mut region = Region::new(REGION);
    let mut set = EquationsSet::create_start(
        1,
        &mut region,
        Decomposition::undistributed(DECOMPOSITION, 2, 3),
        chain_geometry(2),
        &[classes::CLASSICAL_FIELD],
        &registry,
    )
    .unwrap();
    set.create_finish(&registry).unwrap();
    set.dependent_create_start(None, &registry).unwrap();
    set.dependent_create_finish(&registry).unwrap();
    set.equations_create_start(
        EquationsLinearity::Linear,
        EquationsTimeDependence::Static,
        &registry,
    )
    .unwrap();
    assert!(matches!(
        set.assemble(&registry),
        Err(EquationsError::NotFinished("equations"))
    ));
}

#[test]
fn analytic_sub_object_records_its_function_type() {
    let (mut set, registry) = ProblemBuilder::linear(2).build(Arc::new(LaplaceKernel));
    set.analytic_create_start(3, None, &registry).unwrap();
    set.analytic_create_finish(&registry).unwrap();
    assert_eq!(set.analytic().unwrap().function_type(), 3);
    // The default kernel has no analytic boundary condition fill.
    assert!(matches!(
        set.boundary_conditions_analytic(&registry),
        Err(EquationsError::NotImplemented(_))
    ));
}
