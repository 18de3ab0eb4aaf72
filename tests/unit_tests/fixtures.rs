//! Shared fixtures: a 1-D chain topology and mock physics kernels.

use eyre::eyre;
use hati::distributed::{Decomposition, DomainPartition, StorageScheme};
use hati::equations::{EquationsLinearity, EquationsTimeDependence};
use hati::equations_set::EquationsSet;
use hati::field::{Field, FieldComponent, FieldParameterSet, Region};
use hati::kernel::{EvalContext, PhysicsKernel, SetupAction, SetupType};
use hati::registry::KernelRegistry;
use hati::specification::{classes, types, EquationsClass, SolutionMethod};
use std::sync::Mutex;

pub const REGION: u32 = 1;
pub const DECOMPOSITION: u32 = 1;

/// A 1-D chain geometry: `n_elements + 1` nodes, element `e` touching
/// nodes `e` and `e + 1`, coordinates `x_i = i`.
pub fn chain_geometry(n_elements: usize) -> Field<f64> {
    let n_nodes = n_elements + 1;
    let element_parameters = (0..n_elements).map(|e| vec![e, e + 1]).collect();
    let node_dofs = (0..n_nodes).map(|n| vec![n]).collect();
    let mut field = Field::new("geometry", REGION, DECOMPOSITION);
    field
        .add_variable(
            "x",
            n_nodes,
            0,
            vec![FieldComponent::node_based(element_parameters)],
            node_dofs,
        )
        .unwrap();
    field.finish().unwrap();
    for node in 0..n_nodes {
        field
            .set_value(FieldParameterSet::Values, node, node as f64)
            .unwrap();
    }
    field
}

pub struct ProblemBuilder {
    pub n_elements: usize,
    pub scheme: StorageScheme,
    pub linearity: EquationsLinearity,
    pub time_dependence: EquationsTimeDependence,
    pub elements: Option<DomainPartition>,
    pub solution_method: Option<SolutionMethod>,
    pub residual_variables: Option<Vec<usize>>,
    pub dependent: Option<Field<f64>>,
    pub with_source: bool,
    pub specification: Vec<i32>,
}

impl ProblemBuilder {
    pub fn linear(n_elements: usize) -> Self {
        ProblemBuilder {
            n_elements,
            scheme: StorageScheme::Dense,
            linearity: EquationsLinearity::Linear,
            time_dependence: EquationsTimeDependence::Static,
            elements: None,
            solution_method: None,
            residual_variables: None,
            dependent: None,
            with_source: false,
            specification: vec![classes::CLASSICAL_FIELD, types::LAPLACE_EQUATION],
        }
    }

    pub fn nonlinear(n_elements: usize) -> Self {
        ProblemBuilder {
            linearity: EquationsLinearity::Nonlinear,
            specification: vec![classes::ELASTICITY, types::FINITE_ELASTICITY],
            ..ProblemBuilder::linear(n_elements)
        }
    }

    /// Builds the equations set, registering `kernel` for the builder's
    /// specification class.
    pub fn build(
        self,
        kernel: std::sync::Arc<dyn PhysicsKernel<f64>>,
    ) -> (EquationsSet<f64>, KernelRegistry<f64>) {
        let mut registry = KernelRegistry::new();
        let class = EquationsClass::from_specification(self.specification[0]).unwrap();
        registry.register(class, kernel);

        let mut region = Region::new(REGION);
        let geometry = chain_geometry(self.n_elements);
        let elements = self
            .elements
            .unwrap_or_else(|| DomainPartition::undistributed(self.n_elements));
        let nodes = DomainPartition::undistributed(self.n_elements + 1);
        let decomposition = Decomposition::new(DECOMPOSITION, elements, nodes);

        let mut set = EquationsSet::create_start(
            1,
            &mut region,
            decomposition,
            geometry,
            &self.specification,
            &registry,
        )
        .unwrap();
        if let Some(method) = self.solution_method {
            set.solution_method_set(method, &registry).unwrap();
        }
        set.create_finish(&registry).unwrap();
        set.dependent_create_start(self.dependent, &registry).unwrap();
        set.dependent_create_finish(&registry).unwrap();
        if self.with_source {
            set.source_create_start(None, &registry).unwrap();
            set.source_create_finish(&registry).unwrap();
        }
        set.equations_create_start(self.linearity, self.time_dependence, &registry)
            .unwrap();
        if let Some(variables) = self.residual_variables {
            set.equations_mut()
                .unwrap()
                .residual_variables_set(variables)
                .unwrap();
        }
        set.equations_create_finish(self.scheme, &registry).unwrap();
        (set, registry)
    }
}

/// Linear two-node "Laplace" kernel: element stiffness [[1, -1], [-1, 1]],
/// zero rhs, unit source contributions when a source vector exists.
#[derive(Debug, Default)]
pub struct LaplaceKernel;

impl PhysicsKernel<f64> for LaplaceKernel {
    fn finite_element_calculate(
        &self,
        context: &EvalContext<'_, f64>,
        element: usize,
        matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        let rows = context.mapping.element_rows(element)?.to_vec();
        let stiffness = &mut matrices.linear.as_mut().unwrap().matrices[0].element;
        stiffness.set_extents(2, 2)?;
        stiffness.set_row_dofs(&rows)?;
        stiffness.set_column_dofs(&rows)?;
        stiffness.add(0, 0, 1.0)?;
        stiffness.add(0, 1, -1.0)?;
        stiffness.add(1, 0, -1.0)?;
        stiffness.add(1, 1, 1.0)?;
        let rhs = matrices.rhs.as_mut().unwrap();
        rhs.element.set_extent(2)?;
        rhs.element.set_row_dofs(&rows)?;
        if let Some(source) = matrices.source.as_mut() {
            source.element.set_extent(2)?;
            source.element.set_row_dofs(&rows)?;
            source.element.add(0, 1.0)?;
            source.element.add(1, 1.0)?;
        }
        Ok(())
    }
}

/// Dynamic two-node kernel: stiffness [[1, -1], [-1, 1]], damping 2 I,
/// mass 3 I when a mass matrix exists.
#[derive(Debug, Default)]
pub struct DynamicChainKernel;

impl PhysicsKernel<f64> for DynamicChainKernel {
    fn finite_element_calculate(
        &self,
        context: &EvalContext<'_, f64>,
        element: usize,
        matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        let rows = context.mapping.element_rows(element)?.to_vec();
        let dynamic = matrices.dynamic.as_mut().unwrap();
        let stiffness = &mut dynamic.stiffness.element;
        stiffness.set_extents(2, 2)?;
        stiffness.set_row_dofs(&rows)?;
        stiffness.set_column_dofs(&rows)?;
        stiffness.add(0, 0, 1.0)?;
        stiffness.add(0, 1, -1.0)?;
        stiffness.add(1, 0, -1.0)?;
        stiffness.add(1, 1, 1.0)?;
        let damping = &mut dynamic.damping.element;
        damping.set_extents(2, 2)?;
        damping.set_row_dofs(&rows)?;
        damping.set_column_dofs(&rows)?;
        damping.add(0, 0, 2.0)?;
        damping.add(1, 1, 2.0)?;
        if let Some(mass) = dynamic.mass.as_mut() {
            mass.element.set_extents(2, 2)?;
            mass.element.set_row_dofs(&rows)?;
            mass.element.set_column_dofs(&rows)?;
            mass.element.add(0, 0, 3.0)?;
            mass.element.add(1, 1, 3.0)?;
        }
        let rhs = matrices.rhs.as_mut().unwrap();
        rhs.element.set_extent(2)?;
        rhs.element.set_row_dofs(&rows)?;
        Ok(())
    }
}

/// Records which elements are visited and how many transfer phases the
/// dependent field had seen at visit time.
#[derive(Debug, Default)]
pub struct RecordingKernel {
    pub visits: Mutex<Vec<(usize, usize)>>,
}

impl PhysicsKernel<f64> for RecordingKernel {
    fn finite_element_calculate(
        &self,
        context: &EvalContext<'_, f64>,
        element: usize,
        matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        self.visits
            .lock()
            .unwrap()
            .push((element, context.dependent.transfer_log().len()));
        LaplaceKernel.finite_element_calculate(context, element, matrices)
    }
}

/// Nonlinear two-node kernel with residual r_e(x) = A_e x_e - b_e for
/// A_e = [[2, 1], [1, 3]] and b_e = [1, 2], and the matching analytic
/// Jacobian. Counts residual evaluations.
#[derive(Debug, Default)]
pub struct LinearResidualKernel {
    pub residual_calls: Mutex<usize>,
}

pub const RESIDUAL_MATRIX: [[f64; 2]; 2] = [[2.0, 1.0], [1.0, 3.0]];
pub const RESIDUAL_OFFSET: [f64; 2] = [1.0, 2.0];

impl PhysicsKernel<f64> for LinearResidualKernel {
    fn element_residual(
        &self,
        context: &EvalContext<'_, f64>,
        element: usize,
        matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        *self.residual_calls.lock().unwrap() += 1;
        let rows = context.mapping.element_rows(element)?.to_vec();
        let variable = context.dependent.variable(0)?;
        let x: Vec<f64> = rows
            .iter()
            .map(|&local| {
                context
                    .dependent
                    .value(FieldParameterSet::Values, variable.global_dof(local))
            })
            .collect::<Result<_, _>>()?;
        let residual = &mut matrices.nonlinear.as_mut().unwrap().residual.element;
        residual.set_extent(2)?;
        residual.set_row_dofs(&rows)?;
        for row in 0..2 {
            let value = RESIDUAL_MATRIX[row][0] * x[0] + RESIDUAL_MATRIX[row][1] * x[1]
                - RESIDUAL_OFFSET[row];
            residual.add(row, value)?;
        }
        Ok(())
    }

    fn element_jacobian(
        &self,
        context: &EvalContext<'_, f64>,
        element: usize,
        jacobian_index: usize,
        matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        let rows = context.mapping.element_rows(element)?.to_vec();
        let jacobian =
            &mut matrices.nonlinear.as_mut().unwrap().jacobians[jacobian_index].element;
        jacobian.set_extents(2, 2)?;
        jacobian.set_row_dofs(&rows)?;
        jacobian.set_column_dofs(&rows)?;
        for row in 0..2 {
            for column in 0..2 {
                jacobian.add(row, column, RESIDUAL_MATRIX[row][column])?;
            }
        }
        Ok(())
    }
}

/// Nodal kernel with residual r(x_n) = x_n^2 - 2 per node and analytic
/// Jacobian 2 x_n. Validates both the finite element and nodal methods.
#[derive(Debug, Default)]
pub struct NodalSquareKernel;

impl PhysicsKernel<f64> for NodalSquareKernel {
    fn validate_solution_method(
        &self,
        method: SolutionMethod,
    ) -> Result<(), hati::error::EquationsError> {
        match method {
            SolutionMethod::FiniteElement | SolutionMethod::Nodal => Ok(()),
            other => Err(hati::error::EquationsError::not_implemented(format!(
                "The solution method {:?} is not implemented for this equations class.",
                other
            ))),
        }
    }

    fn nodal_residual(
        &self,
        context: &EvalContext<'_, f64>,
        node: usize,
        matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        let rows = context.mapping.node_rows(node)?.to_vec();
        let variable = context.dependent.variable(0)?;
        let x = context
            .dependent
            .value(FieldParameterSet::Values, variable.global_dof(rows[0]))?;
        let residual = &mut matrices.nonlinear.as_mut().unwrap().residual.element;
        residual.set_extent(1)?;
        residual.set_row_dofs(&rows)?;
        residual.add(0, x * x - 2.0)?;
        Ok(())
    }

    fn nodal_jacobian(
        &self,
        context: &EvalContext<'_, f64>,
        node: usize,
        jacobian_index: usize,
        matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        let rows = context.mapping.node_rows(node)?.to_vec();
        let variable = context.dependent.variable(0)?;
        let x = context
            .dependent
            .value(FieldParameterSet::Values, variable.global_dof(rows[0]))?;
        let jacobian =
            &mut matrices.nonlinear.as_mut().unwrap().jacobians[jacobian_index].element;
        jacobian.set_extents(1, 1)?;
        jacobian.set_row_dofs(&rows)?;
        jacobian.set_column_dofs(&rows)?;
        jacobian.add(0, 0, 2.0 * x)?;
        Ok(())
    }
}

/// Fails on every element.
#[derive(Debug, Default)]
pub struct FailingKernel;

impl PhysicsKernel<f64> for FailingKernel {
    fn finite_element_calculate(
        &self,
        _context: &EvalContext<'_, f64>,
        element: usize,
        _matrices: &mut hati::equations::EquationsMatrices<f64>,
    ) -> eyre::Result<()> {
        Err(eyre!("element {} blew up", element))
    }
}

/// Records the lifecycle setup phases routed through the dispatch table.
#[derive(Debug, Default)]
pub struct SetupRecordingKernel {
    pub phases: Mutex<Vec<(SetupType, SetupAction)>>,
}

impl PhysicsKernel<f64> for SetupRecordingKernel {
    fn setup(
        &self,
        setup_type: SetupType,
        action: SetupAction,
    ) -> Result<(), hati::error::EquationsError> {
        self.phases.lock().unwrap().push((setup_type, action));
        Ok(())
    }
}
