//! The uniform element-kernel interface.
//!
//! Per-physics element kernels are external collaborators: they compute the
//! element-level (or nodal-level) contributions for one equations set and
//! fill the element-local buffers of the equations matrices. The assembly
//! core calls them exclusively through [`PhysicsKernel`], resolved via the
//! dispatch registry.

use crate::equations::{
    EquationsLinearity, EquationsMapping, EquationsMatrices, EquationsTimeDependence,
};
use crate::error::EquationsError;
use crate::field::Field;
use crate::specification::SolutionMethod;
use crate::Real;
use std::fmt;

/// Read-only view of the fields a kernel may interpolate during evaluation.
pub struct EvalContext<'a, T: Real> {
    pub geometry: &'a Field<T>,
    pub dependent: &'a Field<T>,
    pub materials: Option<&'a Field<T>>,
    pub source: Option<&'a Field<T>>,
    pub independent: Option<&'a Field<T>>,
    pub mapping: &'a EquationsMapping,
    pub linearity: EquationsLinearity,
    pub time_dependence: EquationsTimeDependence,
}

/// Lifecycle phases routed through the dispatch table while an equations
/// set and its sub-objects are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupType {
    Initial,
    Dependent,
    Materials,
    Source,
    Independent,
    Analytic,
    Derived,
    Equations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupAction {
    Start,
    Finish,
}

fn unimplemented_operation(operation: &str) -> eyre::Report {
    eyre::Report::new(EquationsError::not_implemented(format!(
        "{} is not implemented for this equations class.",
        operation
    )))
}

/// Uniform capability interface implemented per physics family.
///
/// Element-level methods return `eyre::Result` so kernels can attach
/// arbitrary context to failures; typed [`EquationsError`]s raised through
/// a report are recovered by the engine. Every evaluation method has a
/// default that fails with a not-implemented error naming the operation,
/// so a kernel only implements the operations its physics supports.
pub trait PhysicsKernel<T: Real>: fmt::Debug + Send + Sync {
    /// Lifecycle hook invoked for each sub-object creation phase.
    fn setup(&self, _setup_type: SetupType, _action: SetupAction) -> Result<(), EquationsError> {
        Ok(())
    }

    /// Validates a requested solution method for this physics.
    fn validate_solution_method(&self, method: SolutionMethod) -> Result<(), EquationsError> {
        match method {
            SolutionMethod::FiniteElement => Ok(()),
            other => Err(EquationsError::not_implemented(format!(
                "The solution method {:?} is not implemented for this equations class.",
                other
            ))),
        }
    }

    /// Element stiffness/damping/mass and load contributions for linear
    /// problems. Fills the linear or dynamic element buffers together with
    /// the rhs and source element vectors.
    fn finite_element_calculate(
        &self,
        _context: &EvalContext<'_, T>,
        _element: usize,
        _matrices: &mut EquationsMatrices<T>,
    ) -> eyre::Result<()> {
        Err(unimplemented_operation("Finite element calculation"))
    }

    /// Element residual for nonlinear problems. Fills the nonlinear
    /// residual element vector including its row dofs.
    fn element_residual(
        &self,
        _context: &EvalContext<'_, T>,
        _element: usize,
        _matrices: &mut EquationsMatrices<T>,
    ) -> eyre::Result<()> {
        Err(unimplemented_operation("Element residual evaluation"))
    }

    /// Analytic element Jacobian for one block. Fills the block's element
    /// matrix including its row and column dofs.
    fn element_jacobian(
        &self,
        _context: &EvalContext<'_, T>,
        _element: usize,
        _jacobian_index: usize,
        _matrices: &mut EquationsMatrices<T>,
    ) -> eyre::Result<()> {
        Err(unimplemented_operation("Element Jacobian evaluation"))
    }

    /// Nodal residual for the nodal solution method.
    fn nodal_residual(
        &self,
        _context: &EvalContext<'_, T>,
        _node: usize,
        _matrices: &mut EquationsMatrices<T>,
    ) -> eyre::Result<()> {
        Err(unimplemented_operation("Nodal residual evaluation"))
    }

    /// Analytic nodal Jacobian for one block.
    fn nodal_jacobian(
        &self,
        _context: &EvalContext<'_, T>,
        _node: usize,
        _jacobian_index: usize,
        _matrices: &mut EquationsMatrices<T>,
    ) -> eyre::Result<()> {
        Err(unimplemented_operation("Nodal Jacobian evaluation"))
    }

    /// Fills boundary-condition values from an analytic solution.
    fn analytic_boundary_conditions(
        &self,
        _geometry: &Field<T>,
        _dependent: &mut Field<T>,
        _function_type: i32,
    ) -> Result<(), EquationsError> {
        Err(EquationsError::not_implemented(
            "Analytic boundary conditions are not implemented for this equations class."
                .to_string(),
        ))
    }

    /// Class-specific hook invoked after the generic load-increment
    /// application.
    fn load_increment(
        &self,
        _dependent: &mut Field<T>,
        _iteration: usize,
        _maximum_iterations: usize,
    ) -> Result<(), EquationsError> {
        Ok(())
    }
}
