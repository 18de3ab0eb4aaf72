//! The assembly loop engine.
//!
//! Drives the element (or node) traversal for one matrix family: zero the
//! family's global storage, initialise the element-local arenas, then
//! evaluate and accumulate every element in two passes. The internal pass
//! runs while the dependent-field parameter transfer started at the top of
//! the loop is in flight; the boundary and ghost passes run only after the
//! transfer has finished, because those elements read dofs owned by
//! neighbouring processes. Assembly is all-or-nothing: a failure at any
//! element aborts the pass.

use crate::assembly::finite_difference;
use crate::distributed::{Decomposition, DomainPartition};
use crate::equations::{
    EquationsLinearity, EquationsMapping, EquationsMatrices, EquationsOutput,
    EquationsTimeDependence, JacobianCalculation, MatrixFamily,
};
use crate::equations_set::EquationsSet;
use crate::error::EquationsError;
use crate::field::{Field, FieldParameterSet};
use crate::kernel::{EvalContext, PhysicsKernel};
use crate::registry::KernelRegistry;
use crate::Real;
use log::debug;
use std::sync::Arc;
use std::time::Instant;

/// Mutable split borrow of everything one assembly pass needs.
pub(crate) struct AssemblyParts<'a, T: Real> {
    pub(crate) kernel: Arc<dyn PhysicsKernel<T>>,
    pub(crate) geometry: &'a Field<T>,
    pub(crate) dependent: &'a mut Field<T>,
    pub(crate) materials: Option<&'a Field<T>>,
    pub(crate) source: Option<&'a Field<T>>,
    pub(crate) independent: Option<&'a Field<T>>,
    pub(crate) mapping: &'a EquationsMapping,
    pub(crate) matrices: &'a mut EquationsMatrices<T>,
    pub(crate) linearity: EquationsLinearity,
    pub(crate) time_dependence: EquationsTimeDependence,
    pub(crate) output: EquationsOutput,
}

macro_rules! eval_context {
    ($parts:expr) => {
        EvalContext {
            geometry: $parts.geometry,
            dependent: &*$parts.dependent,
            materials: $parts.materials,
            source: $parts.source,
            independent: $parts.independent,
            mapping: $parts.mapping,
            linearity: $parts.linearity,
            time_dependence: $parts.time_dependence,
        }
    };
}
pub(crate) use eval_context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementOp {
    Calculate,
    Residual,
    Jacobian,
}

/// Splits an equations set into the borrows an assembly pass needs,
/// validating every association on the way.
pub(crate) fn split_set<'a, T: Real>(
    set: &'a mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(AssemblyParts<'a, T>, &'a Decomposition), EquationsError> {
    if !set.finished {
        return Err(EquationsError::NotFinished("equations set"));
    }
    let specification = set
        .specification
        .as_ref()
        .ok_or(EquationsError::SpecificationNotAllocated)?;
    let kernel = registry.resolve(specification)?;

    let dependent = set
        .dependent
        .as_mut()
        .ok_or(EquationsError::NotAssociated("dependent field"))?;
    if !dependent.finished() {
        return Err(EquationsError::NotFinished("dependent field"));
    }
    let equations = set
        .equations
        .as_mut()
        .ok_or(EquationsError::NotAssociated("equations"))?;
    if !equations.finished() {
        return Err(EquationsError::NotFinished("equations"));
    }
    let linearity = equations.linearity();
    let time_dependence = equations.time_dependence();
    let output = equations.output();
    let mapping = equations
        .mapping
        .as_ref()
        .ok_or(EquationsError::NotAssociated("equations mapping"))?;
    let matrices = equations
        .matrices
        .as_mut()
        .ok_or(EquationsError::NotAssociated("equations matrices"))?;

    if set.decomposition.elements().total_len() != mapping.number_of_elements() {
        return Err(EquationsError::invalid_value(format!(
            "The element partition covers {} elements but the mapping has {} elements.",
            set.decomposition.elements().total_len(),
            mapping.number_of_elements()
        )));
    }

    Ok((
        AssemblyParts {
            kernel,
            geometry: &set.geometry,
            dependent: dependent.field_mut(),
            materials: set.materials.as_ref().map(|m| m.field()),
            source: set.source.as_ref().map(|s| s.field()),
            independent: set.independent.as_ref().map(|i| i.field()),
            mapping,
            matrices,
            linearity,
            time_dependence,
            output,
        },
        &set.decomposition,
    ))
}

fn evaluate_element<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    element: usize,
    family: MatrixFamily,
    op: ElementOp,
) -> Result<(), EquationsError> {
    parts.matrices.element_reset(family);
    match op {
        ElementOp::Calculate => {
            let context = eval_context!(parts);
            parts
                .kernel
                .finite_element_calculate(&context, element, parts.matrices)?;
        }
        ElementOp::Residual => {
            let context = eval_context!(parts);
            parts
                .kernel
                .element_residual(&context, element, parts.matrices)?;
            parts
                .matrices
                .nonlinear_mut()?
                .set_residual_calculated(Some(element));
        }
        ElementOp::Jacobian => {
            let number_of_jacobians = parts.matrices.nonlinear()?.jacobians.len();
            for jacobian_index in 0..number_of_jacobians {
                let calculation = parts.matrices.nonlinear()?.jacobians[jacobian_index].calculation;
                match calculation {
                    JacobianCalculation::Analytic => {
                        let context = eval_context!(parts);
                        parts.kernel.element_jacobian(
                            &context,
                            element,
                            jacobian_index,
                            parts.matrices,
                        )?;
                    }
                    JacobianCalculation::FiniteDifference => {
                        finite_difference::element_jacobian_fd(parts, element, jacobian_index)?;
                    }
                }
            }
        }
    }
    if parts.output >= EquationsOutput::Element {
        debug!("assembled element {}", element);
    }
    parts.matrices.add_element_to_global(family)
}

fn evaluate_node<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    node: usize,
    family: MatrixFamily,
    op: ElementOp,
) -> Result<(), EquationsError> {
    parts.matrices.element_reset(family);
    match op {
        ElementOp::Calculate => {
            return Err(EquationsError::not_implemented(
                "Nodal assembly of linear equations matrices is not implemented.".to_string(),
            ));
        }
        ElementOp::Residual => {
            let context = eval_context!(parts);
            parts
                .kernel
                .nodal_residual(&context, node, parts.matrices)?;
            parts
                .matrices
                .nonlinear_mut()?
                .set_residual_calculated(Some(node));
        }
        ElementOp::Jacobian => {
            let number_of_jacobians = parts.matrices.nonlinear()?.jacobians.len();
            for jacobian_index in 0..number_of_jacobians {
                let calculation = parts.matrices.nonlinear()?.jacobians[jacobian_index].calculation;
                match calculation {
                    JacobianCalculation::Analytic => {
                        let context = eval_context!(parts);
                        parts.kernel.nodal_jacobian(
                            &context,
                            node,
                            jacobian_index,
                            parts.matrices,
                        )?;
                    }
                    JacobianCalculation::FiniteDifference => {
                        finite_difference::nodal_jacobian_fd(parts, node, jacobian_index)?;
                    }
                }
            }
        }
    }
    if parts.output >= EquationsOutput::Element {
        debug!("assembled node {}", node);
    }
    parts.matrices.add_element_to_global(family)
}

/// The shared two-pass element loop.
fn assemble_elements<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    domain: &DomainPartition,
    family: MatrixFamily,
    op: ElementOp,
) -> Result<(), EquationsError> {
    let start = Instant::now();
    parts.matrices.zero_family(family);
    parts.matrices.element_initialise(parts.mapping);

    // The internal pass overlaps with the parameter transfer; boundary and
    // ghost elements may read remote dofs and must wait for the finish.
    parts.dependent.update_start(FieldParameterSet::Values)?;
    for &element in domain.internal() {
        evaluate_element(parts, element, family, op)?;
    }
    parts.dependent.update_finish(FieldParameterSet::Values)?;
    for element in domain.boundary_and_ghost() {
        evaluate_element(parts, element, family, op)?;
    }

    parts.matrices.element_finalise();
    if parts.output >= EquationsOutput::Timing {
        debug!(
            "assembled {} elements ({:?} family) in {:?}",
            domain.total_len(),
            family,
            start.elapsed()
        );
    }
    if parts.output >= EquationsOutput::Matrix {
        log_family(parts.matrices, family);
    }
    Ok(())
}

/// The shared two-pass node loop for the nodal solution method.
fn assemble_nodes<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    domain: &DomainPartition,
    family: MatrixFamily,
    op: ElementOp,
) -> Result<(), EquationsError> {
    if domain.total_len() != parts.mapping.number_of_nodes() {
        return Err(EquationsError::invalid_value(format!(
            "The node partition covers {} nodes but the mapping has {} nodes.",
            domain.total_len(),
            parts.mapping.number_of_nodes()
        )));
    }
    let start = Instant::now();
    parts.matrices.zero_family(family);
    parts.matrices.element_initialise(parts.mapping);

    parts.dependent.update_start(FieldParameterSet::Values)?;
    for &node in domain.internal() {
        evaluate_node(parts, node, family, op)?;
    }
    parts.dependent.update_finish(FieldParameterSet::Values)?;
    for node in domain.boundary_and_ghost() {
        evaluate_node(parts, node, family, op)?;
    }

    parts.matrices.element_finalise();
    if parts.output >= EquationsOutput::Timing {
        debug!(
            "assembled {} nodes ({:?} family) in {:?}",
            domain.total_len(),
            family,
            start.elapsed()
        );
    }
    if parts.output >= EquationsOutput::Matrix {
        log_family(parts.matrices, family);
    }
    Ok(())
}

fn log_family<T: Real>(matrices: &EquationsMatrices<T>, family: MatrixFamily) {
    match family {
        MatrixFamily::Linear => {
            if let Some(linear) = &matrices.linear {
                for (index, matrix) in linear.matrices.iter().enumerate() {
                    debug!("linear matrix {}: {:?}", index, matrix.global);
                }
            }
            if let Some(rhs) = &matrices.rhs {
                debug!("rhs vector: {:?}", rhs.global);
            }
            if let Some(source) = &matrices.source {
                debug!("source vector: {:?}", source.global);
            }
        }
        MatrixFamily::Dynamic => {
            if let Some(dynamic) = &matrices.dynamic {
                debug!("dynamic stiffness matrix: {:?}", dynamic.stiffness.global);
                debug!("dynamic damping matrix: {:?}", dynamic.damping.global);
                if let Some(mass) = &dynamic.mass {
                    debug!("dynamic mass matrix: {:?}", mass.global);
                }
            }
        }
        MatrixFamily::Nonlinear => {
            if let Some(nonlinear) = &matrices.nonlinear {
                debug!("residual vector: {:?}", nonlinear.residual.global);
            }
        }
        MatrixFamily::Jacobian => {
            if let Some(nonlinear) = &matrices.nonlinear {
                for (index, jacobian) in nonlinear.jacobians.iter().enumerate() {
                    debug!("Jacobian matrix {}: {:?}", index, jacobian.global);
                }
            }
        }
    }
}

/// Assembles the linear matrices, rhs and source vectors of a static
/// linear equations set with the finite element method.
pub fn assemble_static_linear_fem<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    let (mut parts, decomposition) = split_set(set, registry)?;
    assemble_elements(
        &mut parts,
        decomposition.elements(),
        MatrixFamily::Linear,
        ElementOp::Calculate,
    )
}

/// Assembles a quasistatic linear equations set. Currently identical to the
/// static path; the quasistatic time variation enters through the fields.
pub fn assemble_quasistatic_linear_fem<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    assemble_static_linear_fem(set, registry)
}

/// Assembles the dynamic (stiffness/damping/mass) matrices of a dynamic
/// linear equations set with the finite element method.
pub fn assemble_dynamic_linear_fem<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    let (mut parts, decomposition) = split_set(set, registry)?;
    assemble_elements(
        &mut parts,
        decomposition.elements(),
        MatrixFamily::Dynamic,
        ElementOp::Calculate,
    )
}

/// Assembles the nonlinear residual of a static nonlinear equations set
/// with the finite element method.
pub fn assemble_static_nonlinear_fem<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    let (mut parts, decomposition) = split_set(set, registry)?;
    assemble_elements(
        &mut parts,
        decomposition.elements(),
        MatrixFamily::Nonlinear,
        ElementOp::Residual,
    )
}

/// Assembles a quasistatic nonlinear equations set. Currently identical to
/// the static nonlinear path.
pub fn assemble_quasistatic_nonlinear_fem<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    assemble_static_nonlinear_fem(set, registry)
}

/// Assembles the nonlinear residual of a dynamic nonlinear equations set
/// with the finite element method. The dynamic terms enter through the
/// kernel's residual; only the nonlinear family is touched.
pub fn assemble_dynamic_nonlinear_fem<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    let (mut parts, decomposition) = split_set(set, registry)?;
    assemble_elements(
        &mut parts,
        decomposition.elements(),
        MatrixFamily::Nonlinear,
        ElementOp::Residual,
    )
}

/// Assembles the nonlinear residual of a static nonlinear equations set
/// with the nodal solution method.
pub fn assemble_static_nonlinear_nodal<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    let (mut parts, decomposition) = split_set(set, registry)?;
    assemble_nodes(
        &mut parts,
        decomposition.nodes(),
        MatrixFamily::Nonlinear,
        ElementOp::Residual,
    )
}

/// Assembles every Jacobian block of a nonlinear equations set with the
/// finite element method, using the analytic kernel or finite differencing
/// per block.
pub fn jacobian_assemble_fem<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    let (mut parts, decomposition) = split_set(set, registry)?;
    assemble_elements(
        &mut parts,
        decomposition.elements(),
        MatrixFamily::Jacobian,
        ElementOp::Jacobian,
    )
}

/// Assembles every Jacobian block of a nonlinear equations set with the
/// nodal solution method.
pub fn jacobian_assemble_nodal<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
) -> Result<(), EquationsError> {
    let (mut parts, decomposition) = split_set(set, registry)?;
    assemble_nodes(
        &mut parts,
        decomposition.nodes(),
        MatrixFamily::Jacobian,
        ElementOp::Jacobian,
    )
}
