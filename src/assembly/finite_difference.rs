//! One-sided finite-difference approximation of Jacobian blocks.
//!
//! Used for Jacobian blocks whose calculation type is
//! [`JacobianCalculation::FiniteDifference`](crate::equations::JacobianCalculation):
//! the unperturbed element (or nodal) residual is evaluated once and cached
//! so that coupled blocks of the same element share it, then every
//! interpolation parameter of the block's column variable is perturbed in
//! turn and the residual re-evaluated. The perturbation mutates the shared
//! field storage, so columns of one Jacobian must be evaluated sequentially
//! unless private field copies are provisioned per worker.

use crate::assembly::global::{eval_context, AssemblyParts};
use crate::error::EquationsError;
use crate::field::{FieldParameterSet, Interpolation};
use crate::kernel::EvalContext;
use crate::Real;
use numeric_literals::replace_float_literals;

/// Perturbation step: relative to the norm of the full perturbable-variable
/// vector, with an absolute floor for near-zero states. Computed once per
/// Jacobian evaluation, not per column.
// TODO: Make the step tunable per dof; a single norm-based delta can under-
// or over-perturb columns whose magnitudes differ wildly from the norm.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub(crate) fn forward_difference_step<T: Real>(variable_norm: T) -> T {
    (1.0 + variable_norm) * 1.0e-7
}

fn evaluate_element_residual<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    element: usize,
) -> Result<(), EquationsError> {
    parts.matrices.nonlinear_mut()?.residual.element.reset();
    let context = eval_context!(parts);
    parts
        .kernel
        .element_residual(&context, element, parts.matrices)?;
    Ok(())
}

fn evaluate_nodal_residual<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    node: usize,
) -> Result<(), EquationsError> {
    parts.matrices.nonlinear_mut()?.residual.element.reset();
    let context = eval_context!(parts);
    parts.kernel.nodal_residual(&context, node, parts.matrices)?;
    Ok(())
}

fn check_jacobian_index<T: Real>(
    parts: &AssemblyParts<'_, T>,
    jacobian_index: usize,
) -> Result<(), EquationsError> {
    let number_of_jacobians = parts.matrices.nonlinear()?.jacobians.len();
    if jacobian_index >= number_of_jacobians {
        return Err(EquationsError::invalid_value(format!(
            "The Jacobian index of {} is invalid; the equations have {} Jacobians.",
            jacobian_index, number_of_jacobians
        )));
    }
    Ok(())
}

/// Fills one Jacobian block's element matrix by forward differencing the
/// element residual.
pub(crate) fn element_jacobian_fd<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    element: usize,
    jacobian_index: usize,
) -> Result<(), EquationsError> {
    check_jacobian_index(parts, jacobian_index)?;

    // The unperturbed residual is shared across the coupled Jacobian blocks
    // of this element.
    if parts.matrices.nonlinear()?.residual_calculated() != Some(element) {
        evaluate_element_residual(parts, element)?;
        parts
            .matrices
            .nonlinear_mut()?
            .set_residual_calculated(Some(element));
    }
    let (unperturbed, row_dofs) = {
        let residual = &parts.matrices.nonlinear()?.residual.element;
        (
            residual.active_values().clone_owned(),
            residual.row_dofs().to_vec(),
        )
    };
    let number_of_rows = unperturbed.len();

    let variable_index = parts.matrices.nonlinear()?.jacobians[jacobian_index].variable;
    let norm = parts
        .dependent
        .variable_norm(FieldParameterSet::Values, variable_index)?;
    let delta = forward_difference_step(norm);

    // Every interpolation parameter of the column variable on this element:
    // (equation column, global field dof) pairs.
    let mut columns = Vec::new();
    {
        let variable = parts.dependent.variable(variable_index)?;
        for component in variable.components() {
            match component.interpolation() {
                Interpolation::NodeBased | Interpolation::ElementBased => {
                    for &local in component.element_parameters(element)? {
                        columns.push((local, variable.global_dof(local)));
                    }
                }
                other => return Err(EquationsError::UnsupportedInterpolation(other)),
            }
        }
    }

    {
        let jacobian = &mut parts.matrices.nonlinear_mut()?.jacobians[jacobian_index];
        jacobian.element.set_extents(number_of_rows, columns.len())?;
        jacobian.element.set_row_dofs(&row_dofs)?;
        let column_dofs: Vec<usize> = columns.iter().map(|&(local, _)| local).collect();
        jacobian.element.set_column_dofs(&column_dofs)?;
    }

    for (column, &(_, dof)) in columns.iter().enumerate() {
        let original = parts.dependent.value(FieldParameterSet::Values, dof)?;
        parts
            .dependent
            .set_value(FieldParameterSet::Values, dof, original + delta)?;
        evaluate_element_residual(parts, element)?;
        for row in 0..number_of_rows {
            let perturbed = parts.matrices.nonlinear()?.residual.element.value(row)?;
            let value = (perturbed - unperturbed[row]) / delta;
            parts.matrices.nonlinear_mut()?.jacobians[jacobian_index]
                .element
                .add(row, column, value)?;
        }
        parts
            .dependent
            .set_value(FieldParameterSet::Values, dof, original)?;
    }

    // Restore the cached unperturbed residual so residual-dependent
    // routines downstream see the correct value.
    let residual = &mut parts.matrices.nonlinear_mut()?.residual.element;
    for row in 0..number_of_rows {
        residual.set(row, unperturbed[row])?;
    }
    Ok(())
}

/// Fills one Jacobian block's nodal matrix by forward differencing the
/// nodal residual.
pub(crate) fn nodal_jacobian_fd<T: Real>(
    parts: &mut AssemblyParts<'_, T>,
    node: usize,
    jacobian_index: usize,
) -> Result<(), EquationsError> {
    check_jacobian_index(parts, jacobian_index)?;

    if parts.matrices.nonlinear()?.residual_calculated() != Some(node) {
        evaluate_nodal_residual(parts, node)?;
        parts
            .matrices
            .nonlinear_mut()?
            .set_residual_calculated(Some(node));
    }
    let (unperturbed, row_dofs) = {
        let residual = &parts.matrices.nonlinear()?.residual.element;
        (
            residual.active_values().clone_owned(),
            residual.row_dofs().to_vec(),
        )
    };
    let number_of_rows = unperturbed.len();

    let variable_index = parts.matrices.nonlinear()?.jacobians[jacobian_index].variable;
    let norm = parts
        .dependent
        .variable_norm(FieldParameterSet::Values, variable_index)?;
    let delta = forward_difference_step(norm);

    let columns: Vec<(usize, usize)> = {
        let variable = parts.dependent.variable(variable_index)?;
        variable
            .node_dofs(node)?
            .iter()
            .map(|&local| (local, variable.global_dof(local)))
            .collect()
    };

    {
        let jacobian = &mut parts.matrices.nonlinear_mut()?.jacobians[jacobian_index];
        jacobian.element.set_extents(number_of_rows, columns.len())?;
        jacobian.element.set_row_dofs(&row_dofs)?;
        let column_dofs: Vec<usize> = columns.iter().map(|&(local, _)| local).collect();
        jacobian.element.set_column_dofs(&column_dofs)?;
    }

    for (column, &(_, dof)) in columns.iter().enumerate() {
        let original = parts.dependent.value(FieldParameterSet::Values, dof)?;
        parts
            .dependent
            .set_value(FieldParameterSet::Values, dof, original + delta)?;
        evaluate_nodal_residual(parts, node)?;
        for row in 0..number_of_rows {
            let perturbed = parts.matrices.nonlinear()?.residual.element.value(row)?;
            let value = (perturbed - unperturbed[row]) / delta;
            parts.matrices.nonlinear_mut()?.jacobians[jacobian_index]
                .element
                .add(row, column, value)?;
        }
        parts
            .dependent
            .set_value(FieldParameterSet::Values, dof, original)?;
    }

    let residual = &mut parts.matrices.nonlinear_mut()?.residual.element;
    for row in 0..number_of_rows {
        residual.set(row, unperturbed[row])?;
    }
    Ok(())
}
