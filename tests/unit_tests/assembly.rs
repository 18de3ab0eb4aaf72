//! Assembly loop engine: accumulation, idempotence, partition coverage and
//! communication ordering.

use crate::unit_tests::fixtures::{
    DynamicChainKernel, FailingKernel, LaplaceKernel, ProblemBuilder, RecordingKernel,
};
use hati::distributed::{DomainPartition, StorageScheme};
use hati::equations::EquationsTimeDependence;
use hati::error::EquationsError;
use hati::field::{FieldParameterSet, TransferPhase};
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn chain_stiffness(n_elements: usize) -> DMatrix<f64> {
    let n = n_elements + 1;
    let mut expected = DMatrix::zeros(n, n);
    for e in 0..n_elements {
        expected[(e, e)] += 1.0;
        expected[(e, e + 1)] -= 1.0;
        expected[(e + 1, e)] -= 1.0;
        expected[(e + 1, e + 1)] += 1.0;
    }
    expected
}

#[test]
fn static_linear_assembly_produces_the_chain_stiffness() {
    let (mut set, registry) = ProblemBuilder::linear(3).build(Arc::new(LaplaceKernel));
    set.assemble(&registry).unwrap();
    let matrices = set.equations().unwrap().matrices().unwrap();
    let stiffness = matrices.linear().unwrap().matrices[0]
        .global
        .as_dense()
        .unwrap();
    assert_matrix_eq!(stiffness, &chain_stiffness(3), comp = float);
}

#[test]
fn compressed_row_assembly_matches_dense_assembly() {
    let (mut dense_set, registry) = ProblemBuilder::linear(4).build(Arc::new(LaplaceKernel));
    dense_set.assemble(&registry).unwrap();

    let mut builder = ProblemBuilder::linear(4);
    builder.scheme = StorageScheme::CompressedRow;
    let (mut csr_set, csr_registry) = builder.build(Arc::new(LaplaceKernel));
    csr_set.assemble(&csr_registry).unwrap();

    let dense = dense_set
        .equations()
        .unwrap()
        .matrices()
        .unwrap()
        .linear()
        .unwrap()
        .matrices[0]
        .global
        .as_dense()
        .unwrap()
        .clone();
    let csr = csr_set
        .equations()
        .unwrap()
        .matrices()
        .unwrap()
        .linear()
        .unwrap()
        .matrices[0]
        .global
        .as_compressed_row()
        .unwrap();
    assert_matrix_eq!(DMatrix::from(csr), dense, comp = float);
}

#[test]
fn assembly_is_idempotent() {
    let (mut set, registry) = ProblemBuilder::linear(5).build(Arc::new(LaplaceKernel));
    set.assemble(&registry).unwrap();
    let first = set
        .equations()
        .unwrap()
        .matrices()
        .unwrap()
        .linear()
        .unwrap()
        .matrices[0]
        .global
        .as_dense()
        .unwrap()
        .clone();
    set.assemble(&registry).unwrap();
    let second = set
        .equations()
        .unwrap()
        .matrices()
        .unwrap()
        .linear()
        .unwrap()
        .matrices[0]
        .global
        .as_dense()
        .unwrap()
        .clone();
    assert_eq!(first, second);
}

#[test]
fn every_element_is_visited_exactly_once_across_the_two_passes() {
    let kernel = Arc::new(RecordingKernel::default());
    let mut builder = ProblemBuilder::linear(5);
    builder.elements = Some(DomainPartition::new(vec![0, 2, 4], vec![1], vec![3]));
    let (mut set, registry) = builder.build(Arc::clone(&kernel) as _);
    set.assemble(&registry).unwrap();

    let visits = kernel.visits.lock().unwrap().clone();
    let visited: Vec<usize> = visits.iter().map(|&(element, _)| element).collect();
    assert_eq!(visited.len(), 5);
    let unique: HashSet<usize> = visited.iter().copied().collect();
    assert_eq!(unique, (0..5).collect::<HashSet<_>>());
    // Internal elements first, then boundary, then ghost.
    assert_eq!(visited, vec![0, 2, 4, 1, 3]);
}

#[test]
fn boundary_and_ghost_elements_wait_for_the_transfer_finish() {
    let kernel = Arc::new(RecordingKernel::default());
    let mut builder = ProblemBuilder::linear(4);
    builder.elements = Some(DomainPartition::new(vec![0, 1], vec![2], vec![3]));
    let (mut set, registry) = builder.build(Arc::clone(&kernel) as _);
    set.assemble(&registry).unwrap();

    let visits = kernel.visits.lock().unwrap().clone();
    for (element, transfers_seen) in visits {
        if element < 2 {
            // Internal: only the transfer start has happened.
            assert_eq!(transfers_seen, 1, "element {}", element);
        } else {
            // Boundary/ghost: the transfer has completed.
            assert_eq!(transfers_seen, 2, "element {}", element);
        }
    }
    let log = set.dependent_field().unwrap().transfer_log();
    assert_eq!(
        log,
        &[
            (FieldParameterSet::Values, TransferPhase::Start),
            (FieldParameterSet::Values, TransferPhase::Finish)
        ]
    );
}

#[test]
fn dynamic_linear_assembly_fills_stiffness_damping_and_mass() {
    let mut builder = ProblemBuilder::linear(3);
    builder.time_dependence = EquationsTimeDependence::SecondOrderDynamic;
    let (mut set, registry) = builder.build(Arc::new(DynamicChainKernel));
    set.assemble(&registry).unwrap();

    let matrices = set.equations().unwrap().matrices().unwrap();
    let dynamic = matrices.dynamic().unwrap();
    assert_matrix_eq!(
        dynamic.stiffness.global.as_dense().unwrap(),
        &chain_stiffness(3),
        comp = float
    );
    // Interior nodes belong to two elements.
    let damping = dynamic.damping.global.as_dense().unwrap();
    assert_eq!(damping[(0, 0)], 2.0);
    assert_eq!(damping[(1, 1)], 4.0);
    let mass = dynamic.mass.as_ref().unwrap().global.as_dense().unwrap();
    assert_eq!(mass[(2, 2)], 6.0);
    assert_eq!(mass[(3, 3)], 3.0);
}

#[test]
fn source_vector_is_assembled_when_a_source_is_mapped() {
    let mut builder = ProblemBuilder::linear(3);
    builder.with_source = true;
    let (mut set, registry) = builder.build(Arc::new(LaplaceKernel));
    set.assemble(&registry).unwrap();
    let matrices = set.equations().unwrap().matrices().unwrap();
    let source = matrices.source_vector().unwrap();
    // One unit contribution per adjacent element.
    assert_eq!(source.global.values().as_slice(), &[1.0, 2.0, 2.0, 1.0]);
}

#[test]
fn time_stepping_equations_are_not_assembled() {
    let mut builder = ProblemBuilder::linear(2);
    builder.time_dependence = EquationsTimeDependence::TimeStepping;
    let (mut set, registry) = builder.build(Arc::new(LaplaceKernel));
    let err = set.assemble(&registry).unwrap_err();
    match err {
        EquationsError::NotImplemented(message) => {
            assert!(message.contains("not assembled"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn a_kernel_failure_aborts_the_whole_pass() {
    let (mut set, registry) = ProblemBuilder::linear(3).build(Arc::new(FailingKernel));
    let err = set.assemble(&registry).unwrap_err();
    assert!(matches!(err, EquationsError::Kernel(_)));
    assert!(err.to_string().contains("blew up"));
}

#[test]
fn residual_evaluation_on_linear_equations_is_invalid() {
    let (mut set, registry) = ProblemBuilder::linear(2).build(Arc::new(LaplaceKernel));
    assert!(matches!(
        set.residual_evaluate(&registry),
        Err(EquationsError::InvalidValue(_))
    ));
}

proptest! {
    /// Every element lands in exactly one partition range and is assembled
    /// exactly once regardless of how the ranges are drawn.
    #[test]
    fn partition_completeness_holds_for_random_partitions(
        n_elements in 1_usize..12,
        seed in proptest::collection::vec(0_u8..3, 12),
    ) {
        let mut internal = Vec::new();
        let mut boundary = Vec::new();
        let mut ghost = Vec::new();
        for element in 0..n_elements {
            match seed[element] {
                0 => internal.push(element),
                1 => boundary.push(element),
                _ => ghost.push(element),
            }
        }
        let kernel = Arc::new(RecordingKernel::default());
        let mut builder = ProblemBuilder::linear(n_elements);
        builder.elements = Some(DomainPartition::new(internal, boundary, ghost));
        let (mut set, registry) = builder.build(Arc::clone(&kernel) as _);
        set.assemble(&registry).unwrap();

        let visits = kernel.visits.lock().unwrap().clone();
        let visited: HashSet<usize> = visits.iter().map(|&(element, _)| element).collect();
        prop_assert_eq!(visits.len(), n_elements);
        prop_assert_eq!(visited, (0..n_elements).collect::<HashSet<_>>());
    }
}
