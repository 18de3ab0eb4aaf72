//! Equations owned by an equations set: the linearity/time-dependence
//! classification, the dof-to-equation mapping and the global/local matrix
//! aggregates.

use crate::assembly::local::{ElementMatrix, ElementVector};
use crate::distributed::{
    pattern_from_element_dofs, GlobalMatrix, GlobalVector, StorageScheme,
};
use crate::error::EquationsError;
use crate::field::Field;
use crate::Real;
use serde::{Deserialize, Serialize};

/// Linearity classification of the equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquationsLinearity {
    Linear,
    Nonlinear,
    NonlinearBoundaryConditions,
}

/// Time-dependence classification of the equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquationsTimeDependence {
    Static,
    Quasistatic,
    FirstOrderDynamic,
    SecondOrderDynamic,
    TimeStepping,
}

/// Diagnostic output verbosity of the assembly engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EquationsOutput {
    None,
    Timing,
    Matrix,
    Element,
}

/// How a Jacobian block is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JacobianCalculation {
    Analytic,
    FiniteDifference,
}

/// Families of global storage that are zeroed and accumulated
/// independently, so that linear and nonlinear terms can be assembled
/// separately in composite formulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFamily {
    Linear,
    Dynamic,
    Nonlinear,
    Jacobian,
}

/// Mapping of one residual (column) variable for a Jacobian block.
#[derive(Debug, Clone)]
pub struct ResidualVariableMap {
    /// Dependent-field variable index.
    pub variable: usize,
    /// Number of equation columns (the variable's dof count).
    pub number_of_columns: usize,
    /// Per-element equation-column lists (variable-local dofs).
    element_columns: Vec<Vec<usize>>,
}

impl ResidualVariableMap {
    pub fn element_columns(&self, element: usize) -> Result<&[usize], EquationsError> {
        self.element_columns
            .get(element)
            .map(|columns| columns.as_slice())
            .ok_or_else(|| {
                EquationsError::invalid_value(format!(
                    "The element index of {} is invalid; the mapping has {} elements.",
                    element,
                    self.element_columns.len()
                ))
            })
    }
}

/// RHS variable mapping: for every equation row, the global dof of the RHS
/// variable that receives back-substituted or residual-transferred values.
#[derive(Debug, Clone)]
pub struct RhsMapping {
    pub variable: usize,
    pub row_dofs: Vec<usize>,
}

/// Translation between dependent-field dofs and equation rows/columns.
#[derive(Debug, Clone)]
pub struct EquationsMapping {
    row_variable: usize,
    row_dofs: Vec<usize>,
    number_of_rows: usize,
    total_number_of_rows: usize,
    column_dofs: Vec<usize>,
    element_rows: Vec<Vec<usize>>,
    node_rows: Vec<Vec<usize>>,
    max_element_dofs: usize,
    max_nodal_dofs: usize,
    rhs: Option<RhsMapping>,
    has_source: bool,
    residual_variables: Vec<ResidualVariableMap>,
}

impl EquationsMapping {
    /// Calculates the mapping from the dependent field layout.
    ///
    /// Equation rows are the variable-local dofs of the row variable, with
    /// owned dofs first and ghost dofs after, so that the owned row count
    /// delimits the ghost range.
    pub(crate) fn calculate<T: Real>(
        dependent: &Field<T>,
        row_variable: usize,
        rhs_variable: Option<usize>,
        residual_variables: &[usize],
        has_source: bool,
    ) -> Result<Self, EquationsError> {
        let row_var = dependent.variable(row_variable)?;
        let total_number_of_rows = row_var.num_dofs();
        let number_of_rows = row_var.num_owned_dofs();
        let row_dofs: Vec<usize> = (0..total_number_of_rows)
            .map(|local| row_var.global_dof(local))
            .collect();
        let column_dofs = row_dofs.clone();

        let num_elements = row_var
            .components()
            .iter()
            .map(|component| component.num_elements())
            .max()
            .unwrap_or(0);
        let mut element_rows = Vec::with_capacity(num_elements);
        for element in 0..num_elements {
            let mut rows = Vec::new();
            for component in row_var.components() {
                rows.extend_from_slice(component.element_parameters(element)?);
            }
            element_rows.push(rows);
        }
        let max_element_dofs = element_rows.iter().map(Vec::len).max().unwrap_or(0);

        let num_nodes = row_var.num_nodes();
        let mut node_rows = Vec::with_capacity(num_nodes);
        for node in 0..num_nodes {
            node_rows.push(row_var.node_dofs(node)?.to_vec());
        }
        let max_nodal_dofs = node_rows.iter().map(Vec::len).max().unwrap_or(0);

        let rhs = match rhs_variable {
            Some(variable) => {
                let rhs_var = dependent.variable(variable)?;
                if rhs_var.num_dofs() != total_number_of_rows {
                    return Err(EquationsError::invalid_value(format!(
                        "The rhs variable has {} dofs but the equations have {} rows.",
                        rhs_var.num_dofs(),
                        total_number_of_rows
                    )));
                }
                Some(RhsMapping {
                    variable,
                    row_dofs: (0..total_number_of_rows)
                        .map(|local| rhs_var.global_dof(local))
                        .collect(),
                })
            }
            None => None,
        };

        let mut residual_maps = Vec::with_capacity(residual_variables.len());
        for &variable in residual_variables {
            let var = dependent.variable(variable)?;
            let mut element_columns = Vec::with_capacity(num_elements);
            for element in 0..num_elements {
                let mut columns = Vec::new();
                for component in var.components() {
                    columns.extend_from_slice(component.element_parameters(element)?);
                }
                element_columns.push(columns);
            }
            residual_maps.push(ResidualVariableMap {
                variable,
                number_of_columns: var.num_dofs(),
                element_columns,
            });
        }

        Ok(EquationsMapping {
            row_variable,
            row_dofs,
            number_of_rows,
            total_number_of_rows,
            column_dofs,
            element_rows,
            node_rows,
            max_element_dofs,
            max_nodal_dofs,
            rhs,
            has_source,
            residual_variables: residual_maps,
        })
    }

    pub fn row_variable(&self) -> usize {
        self.row_variable
    }

    /// Owned equation rows; rows beyond this count are ghost rows.
    pub fn number_of_rows(&self) -> usize {
        self.number_of_rows
    }

    pub fn total_number_of_rows(&self) -> usize {
        self.total_number_of_rows
    }

    pub fn row_dofs(&self) -> &[usize] {
        &self.row_dofs
    }

    pub fn row_dof(&self, row: usize) -> Result<usize, EquationsError> {
        self.row_dofs.get(row).copied().ok_or_else(|| {
            EquationsError::invalid_value(format!(
                "The equation row of {} is invalid; the equations have {} rows.",
                row, self.total_number_of_rows
            ))
        })
    }

    pub fn column_dofs(&self) -> &[usize] {
        &self.column_dofs
    }

    pub fn column_dof(&self, column: usize) -> Result<usize, EquationsError> {
        self.column_dofs.get(column).copied().ok_or_else(|| {
            EquationsError::invalid_value(format!(
                "The equation column of {} is invalid; the equations have {} columns.",
                column,
                self.column_dofs.len()
            ))
        })
    }

    pub fn number_of_elements(&self) -> usize {
        self.element_rows.len()
    }

    /// The equation rows an element contributes to.
    pub fn element_rows(&self, element: usize) -> Result<&[usize], EquationsError> {
        self.element_rows
            .get(element)
            .map(|rows| rows.as_slice())
            .ok_or_else(|| {
                EquationsError::invalid_value(format!(
                    "The element index of {} is invalid; the mapping has {} elements.",
                    element,
                    self.element_rows.len()
                ))
            })
    }

    pub fn number_of_nodes(&self) -> usize {
        self.node_rows.len()
    }

    /// The equation rows a node contributes to.
    pub fn node_rows(&self, node: usize) -> Result<&[usize], EquationsError> {
        self.node_rows
            .get(node)
            .map(|rows| rows.as_slice())
            .ok_or_else(|| {
                EquationsError::invalid_value(format!(
                    "The node index of {} is invalid; the mapping has {} nodes.",
                    node,
                    self.node_rows.len()
                ))
            })
    }

    pub fn max_element_dofs(&self) -> usize {
        self.max_element_dofs
    }

    pub fn max_nodal_dofs(&self) -> usize {
        self.max_nodal_dofs
    }

    pub fn rhs(&self) -> Option<&RhsMapping> {
        self.rhs.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.has_source
    }

    pub fn residual_variables(&self) -> &[ResidualVariableMap] {
        &self.residual_variables
    }

    pub fn number_of_jacobians(&self) -> usize {
        self.residual_variables.len()
    }
}

/// A global matrix paired with its element-local accumulation buffer.
#[derive(Debug)]
pub struct EquationsMatrix<T: Real> {
    pub global: GlobalMatrix<T>,
    pub element: ElementMatrix<T>,
}

/// A global vector paired with its element-local accumulation buffer.
#[derive(Debug)]
pub struct EquationsVector<T: Real> {
    pub global: GlobalVector<T>,
    pub element: ElementVector<T>,
}

/// Jacobian block descriptor for one coupled nonlinear variable.
#[derive(Debug)]
pub struct JacobianMatrix<T: Real> {
    /// Column (perturbed) variable of the block.
    pub variable: usize,
    pub calculation: JacobianCalculation,
    pub global: GlobalMatrix<T>,
    pub element: ElementMatrix<T>,
}

#[derive(Debug)]
pub struct LinearMatrices<T: Real> {
    pub matrices: Vec<EquationsMatrix<T>>,
}

#[derive(Debug)]
pub struct DynamicMatrices<T: Real> {
    pub stiffness: EquationsMatrix<T>,
    pub damping: EquationsMatrix<T>,
    pub mass: Option<EquationsMatrix<T>>,
}

#[derive(Debug)]
pub struct NonlinearMatrices<T: Real> {
    pub residual: EquationsVector<T>,
    pub jacobians: Vec<JacobianMatrix<T>>,
    /// Element (or node) id for which the residual buffer currently holds
    /// the unperturbed residual; lets coupled finite-difference Jacobian
    /// blocks share one residual evaluation.
    residual_calculated: Option<usize>,
}

impl<T: Real> NonlinearMatrices<T> {
    pub fn residual_calculated(&self) -> Option<usize> {
        self.residual_calculated
    }

    pub fn set_residual_calculated(&mut self, id: Option<usize>) {
        self.residual_calculated = id;
    }
}

/// The global matrices and vectors of the equations together with their
/// element-local buffers, grouped by family.
#[derive(Debug)]
pub struct EquationsMatrices<T: Real> {
    pub linear: Option<LinearMatrices<T>>,
    pub dynamic: Option<DynamicMatrices<T>>,
    pub nonlinear: Option<NonlinearMatrices<T>>,
    pub rhs: Option<EquationsVector<T>>,
    pub source: Option<EquationsVector<T>>,
}

impl<T: Real> EquationsMatrices<T> {
    /// Creates the matrix families implied by the equations classification.
    pub(crate) fn create(
        mapping: &EquationsMapping,
        linearity: EquationsLinearity,
        time_dependence: EquationsTimeDependence,
        scheme: StorageScheme,
    ) -> Result<Self, EquationsError> {
        let rows = mapping.total_number_of_rows();
        let columns = mapping.column_dofs().len();
        let max_dofs = mapping.max_element_dofs().max(mapping.max_nodal_dofs());

        let square_matrix = |element_columns: Option<&ResidualVariableMap>| -> Result<GlobalMatrix<T>, EquationsError> {
            match scheme {
                StorageScheme::Dense => Ok(GlobalMatrix::dense(
                    rows,
                    element_columns.map_or(columns, |map| map.number_of_columns),
                )),
                StorageScheme::CompressedRow => {
                    let (ncols, columns_per_element) = match element_columns {
                        Some(map) => (map.number_of_columns, &map.element_columns),
                        None => (columns, &mapping.element_rows),
                    };
                    let pattern = pattern_from_element_dofs(
                        rows,
                        ncols,
                        &mapping.element_rows,
                        columns_per_element,
                    )?;
                    GlobalMatrix::compressed_row(pattern)
                }
                StorageScheme::Diagonal => Ok(GlobalMatrix::diagonal(rows)),
            }
        };

        let matrix_slot = |element_columns: Option<&ResidualVariableMap>| -> Result<EquationsMatrix<T>, EquationsError> {
            Ok(EquationsMatrix {
                global: square_matrix(element_columns)?,
                element: ElementMatrix::with_capacity(max_dofs, max_dofs),
            })
        };
        let vector_slot = || EquationsVector {
            global: GlobalVector::zeros(rows),
            element: ElementVector::with_capacity(max_dofs),
        };

        let mut linear = None;
        let mut dynamic = None;
        let mut nonlinear = None;
        match linearity {
            EquationsLinearity::Linear => match time_dependence {
                EquationsTimeDependence::Static
                | EquationsTimeDependence::Quasistatic
                | EquationsTimeDependence::TimeStepping => {
                    linear = Some(LinearMatrices {
                        matrices: vec![matrix_slot(None)?],
                    });
                }
                EquationsTimeDependence::FirstOrderDynamic => {
                    dynamic = Some(DynamicMatrices {
                        stiffness: matrix_slot(None)?,
                        damping: matrix_slot(None)?,
                        mass: None,
                    });
                }
                EquationsTimeDependence::SecondOrderDynamic => {
                    dynamic = Some(DynamicMatrices {
                        stiffness: matrix_slot(None)?,
                        damping: matrix_slot(None)?,
                        mass: Some(matrix_slot(None)?),
                    });
                }
            },
            EquationsLinearity::Nonlinear | EquationsLinearity::NonlinearBoundaryConditions => {
                let mut jacobians = Vec::with_capacity(mapping.number_of_jacobians());
                for map in mapping.residual_variables() {
                    jacobians.push(JacobianMatrix {
                        variable: map.variable,
                        calculation: JacobianCalculation::Analytic,
                        global: square_matrix(Some(map))?,
                        element: ElementMatrix::with_capacity(max_dofs, max_dofs),
                    });
                }
                nonlinear = Some(NonlinearMatrices {
                    residual: vector_slot(),
                    jacobians,
                    residual_calculated: None,
                });
            }
        }

        let source = mapping.has_source().then(vector_slot);

        Ok(EquationsMatrices {
            linear,
            dynamic,
            nonlinear,
            rhs: Some(vector_slot()),
            source,
        })
    }

    pub fn linear(&self) -> Result<&LinearMatrices<T>, EquationsError> {
        self.linear
            .as_ref()
            .ok_or(EquationsError::NotAssociated("linear equations matrices"))
    }

    pub fn dynamic(&self) -> Result<&DynamicMatrices<T>, EquationsError> {
        self.dynamic
            .as_ref()
            .ok_or(EquationsError::NotAssociated("dynamic equations matrices"))
    }

    pub fn nonlinear(&self) -> Result<&NonlinearMatrices<T>, EquationsError> {
        self.nonlinear
            .as_ref()
            .ok_or(EquationsError::NotAssociated("nonlinear equations matrices"))
    }

    pub fn nonlinear_mut(&mut self) -> Result<&mut NonlinearMatrices<T>, EquationsError> {
        self.nonlinear
            .as_mut()
            .ok_or(EquationsError::NotAssociated("nonlinear equations matrices"))
    }

    pub fn rhs_vector(&self) -> Result<&EquationsVector<T>, EquationsError> {
        self.rhs
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations rhs vector"))
    }

    pub fn source_vector(&self) -> Result<&EquationsVector<T>, EquationsError> {
        self.source
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations source vector"))
    }

    /// Zeros exactly one family of global storage, leaving the other
    /// families untouched.
    pub fn zero_family(&mut self, family: MatrixFamily) {
        match family {
            MatrixFamily::Linear => {
                if let Some(linear) = &mut self.linear {
                    for matrix in &mut linear.matrices {
                        matrix.global.zero_all();
                    }
                }
                if let Some(rhs) = &mut self.rhs {
                    rhs.global.zero_all();
                }
                if let Some(source) = &mut self.source {
                    source.global.zero_all();
                }
            }
            MatrixFamily::Dynamic => {
                if let Some(dynamic) = &mut self.dynamic {
                    dynamic.stiffness.global.zero_all();
                    dynamic.damping.global.zero_all();
                    if let Some(mass) = &mut dynamic.mass {
                        mass.global.zero_all();
                    }
                }
                if let Some(rhs) = &mut self.rhs {
                    rhs.global.zero_all();
                }
                if let Some(source) = &mut self.source {
                    source.global.zero_all();
                }
            }
            MatrixFamily::Nonlinear => {
                if let Some(nonlinear) = &mut self.nonlinear {
                    nonlinear.residual.global.zero_all();
                }
            }
            MatrixFamily::Jacobian => {
                if let Some(nonlinear) = &mut self.nonlinear {
                    for jacobian in &mut nonlinear.jacobians {
                        jacobian.global.zero_all();
                    }
                }
            }
        }
    }

    /// Grows and clears every element-local arena for an assembly pass.
    pub(crate) fn element_initialise(&mut self, mapping: &EquationsMapping) {
        let max_dofs = mapping.max_element_dofs().max(mapping.max_nodal_dofs());
        if let Some(linear) = &mut self.linear {
            for matrix in &mut linear.matrices {
                matrix.element.initialise(max_dofs, max_dofs);
            }
        }
        if let Some(dynamic) = &mut self.dynamic {
            dynamic.stiffness.element.initialise(max_dofs, max_dofs);
            dynamic.damping.element.initialise(max_dofs, max_dofs);
            if let Some(mass) = &mut dynamic.mass {
                mass.element.initialise(max_dofs, max_dofs);
            }
        }
        if let Some(nonlinear) = &mut self.nonlinear {
            nonlinear.residual.element.initialise(max_dofs);
            for jacobian in &mut nonlinear.jacobians {
                jacobian.element.initialise(max_dofs, max_dofs);
            }
            nonlinear.residual_calculated = None;
        }
        if let Some(rhs) = &mut self.rhs {
            rhs.element.initialise(max_dofs);
        }
        if let Some(source) = &mut self.source {
            source.element.initialise(max_dofs);
        }
    }

    /// Releases the element-local arenas at the end of a pass.
    pub(crate) fn element_finalise(&mut self) {
        if let Some(linear) = &mut self.linear {
            for matrix in &mut linear.matrices {
                matrix.element.finalise();
            }
        }
        if let Some(dynamic) = &mut self.dynamic {
            dynamic.stiffness.element.finalise();
            dynamic.damping.element.finalise();
            if let Some(mass) = &mut dynamic.mass {
                mass.element.finalise();
            }
        }
        if let Some(nonlinear) = &mut self.nonlinear {
            nonlinear.residual.element.finalise();
            for jacobian in &mut nonlinear.jacobians {
                jacobian.element.finalise();
            }
        }
        if let Some(rhs) = &mut self.rhs {
            rhs.element.finalise();
        }
        if let Some(source) = &mut self.source {
            source.element.finalise();
        }
    }

    /// Clears the element-local buffers of one family before a kernel call.
    ///
    /// The nonlinear residual buffer is left untouched by the Jacobian
    /// family so the cached unperturbed residual survives across coupled
    /// finite-difference blocks.
    pub(crate) fn element_reset(&mut self, family: MatrixFamily) {
        match family {
            MatrixFamily::Linear => {
                if let Some(linear) = &mut self.linear {
                    for matrix in &mut linear.matrices {
                        matrix.element.reset();
                    }
                }
                if let Some(rhs) = &mut self.rhs {
                    rhs.element.reset();
                }
                if let Some(source) = &mut self.source {
                    source.element.reset();
                }
            }
            MatrixFamily::Dynamic => {
                if let Some(dynamic) = &mut self.dynamic {
                    dynamic.stiffness.element.reset();
                    dynamic.damping.element.reset();
                    if let Some(mass) = &mut dynamic.mass {
                        mass.element.reset();
                    }
                }
                if let Some(rhs) = &mut self.rhs {
                    rhs.element.reset();
                }
                if let Some(source) = &mut self.source {
                    source.element.reset();
                }
            }
            MatrixFamily::Nonlinear => {
                if let Some(nonlinear) = &mut self.nonlinear {
                    nonlinear.residual.element.reset();
                }
            }
            MatrixFamily::Jacobian => {
                if let Some(nonlinear) = &mut self.nonlinear {
                    for jacobian in &mut nonlinear.jacobians {
                        jacobian.element.reset();
                    }
                }
            }
        }
    }

    /// Accumulates the element-local buffers of one family into global
    /// storage at the kernel-filled dof indices.
    pub(crate) fn add_element_to_global(
        &mut self,
        family: MatrixFamily,
    ) -> Result<(), EquationsError> {
        match family {
            MatrixFamily::Linear => {
                if let Some(linear) = &mut self.linear {
                    for matrix in &mut linear.matrices {
                        add_matrix(&mut matrix.global, &matrix.element)?;
                    }
                }
                if let Some(rhs) = &mut self.rhs {
                    add_vector(&mut rhs.global, &rhs.element)?;
                }
                if let Some(source) = &mut self.source {
                    add_vector(&mut source.global, &source.element)?;
                }
            }
            MatrixFamily::Dynamic => {
                if let Some(dynamic) = &mut self.dynamic {
                    add_matrix(&mut dynamic.stiffness.global, &dynamic.stiffness.element)?;
                    add_matrix(&mut dynamic.damping.global, &dynamic.damping.element)?;
                    if let Some(mass) = &mut dynamic.mass {
                        add_matrix(&mut mass.global, &mass.element)?;
                    }
                }
                if let Some(rhs) = &mut self.rhs {
                    add_vector(&mut rhs.global, &rhs.element)?;
                }
                if let Some(source) = &mut self.source {
                    add_vector(&mut source.global, &source.element)?;
                }
            }
            MatrixFamily::Nonlinear => {
                if let Some(nonlinear) = &mut self.nonlinear {
                    add_vector(&mut nonlinear.residual.global, &nonlinear.residual.element)?;
                }
            }
            MatrixFamily::Jacobian => {
                if let Some(nonlinear) = &mut self.nonlinear {
                    for jacobian in &mut nonlinear.jacobians {
                        add_matrix(&mut jacobian.global, &jacobian.element)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn add_matrix<T: Real>(
    global: &mut GlobalMatrix<T>,
    element: &ElementMatrix<T>,
) -> Result<(), EquationsError> {
    let row_dofs = element.row_dofs();
    let column_dofs = element.column_dofs();
    for (local_row, &global_row) in row_dofs.iter().enumerate() {
        for (local_column, &global_column) in column_dofs.iter().enumerate() {
            global.add(
                global_row,
                global_column,
                element.value(local_row, local_column)?,
            )?;
        }
    }
    Ok(())
}

fn add_vector<T: Real>(
    global: &mut GlobalVector<T>,
    element: &ElementVector<T>,
) -> Result<(), EquationsError> {
    for (local_row, &global_row) in element.row_dofs().iter().enumerate() {
        global.add(global_row, element.value(local_row)?)?;
    }
    Ok(())
}

/// Equations of an equations set.
#[derive(Debug)]
pub struct Equations<T: Real> {
    linearity: EquationsLinearity,
    time_dependence: EquationsTimeDependence,
    output: EquationsOutput,
    finished: bool,
    residual_variables: Vec<usize>,
    pub(crate) mapping: Option<EquationsMapping>,
    pub(crate) matrices: Option<EquationsMatrices<T>>,
}

impl<T: Real> Equations<T> {
    pub(crate) fn new(
        linearity: EquationsLinearity,
        time_dependence: EquationsTimeDependence,
    ) -> Self {
        Equations {
            linearity,
            time_dependence,
            output: EquationsOutput::None,
            finished: false,
            residual_variables: vec![0],
            mapping: None,
            matrices: None,
        }
    }

    pub fn linearity(&self) -> EquationsLinearity {
        self.linearity
    }

    pub fn time_dependence(&self) -> EquationsTimeDependence {
        self.time_dependence
    }

    pub fn output(&self) -> EquationsOutput {
        self.output
    }

    pub fn output_set(&mut self, output: EquationsOutput) {
        self.output = output;
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Configures which dependent variables carry Jacobian blocks. Must be
    /// called before the equations are finished.
    pub fn residual_variables_set(&mut self, variables: Vec<usize>) -> Result<(), EquationsError> {
        if self.finished {
            return Err(EquationsError::AlreadyFinished("equations"));
        }
        if variables.is_empty() {
            return Err(EquationsError::invalid_value(
                "The residual variable list cannot be empty.".to_string(),
            ));
        }
        self.residual_variables = variables;
        Ok(())
    }

    pub(crate) fn residual_variables(&self) -> &[usize] {
        &self.residual_variables
    }

    /// Selects analytic or finite-difference calculation for one Jacobian
    /// block.
    pub fn jacobian_calculation_set(
        &mut self,
        jacobian_index: usize,
        calculation: JacobianCalculation,
    ) -> Result<(), EquationsError> {
        let nonlinear = self
            .matrices
            .as_mut()
            .ok_or(EquationsError::NotAssociated("equations matrices"))?
            .nonlinear_mut()?;
        let number_of_jacobians = nonlinear.jacobians.len();
        let jacobian = nonlinear.jacobians.get_mut(jacobian_index).ok_or_else(|| {
            EquationsError::invalid_value(format!(
                "The Jacobian index of {} is invalid; the equations have {} Jacobians.",
                jacobian_index, number_of_jacobians
            ))
        })?;
        jacobian.calculation = calculation;
        Ok(())
    }

    pub fn mapping(&self) -> Result<&EquationsMapping, EquationsError> {
        self.mapping
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations mapping"))
    }

    pub fn matrices(&self) -> Result<&EquationsMatrices<T>, EquationsError> {
        self.matrices
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations matrices"))
    }

    pub fn matrices_mut(&mut self) -> Result<&mut EquationsMatrices<T>, EquationsError> {
        self.matrices
            .as_mut()
            .ok_or(EquationsError::NotAssociated("equations matrices"))
    }

    pub(crate) fn finish(&mut self, mapping: EquationsMapping, matrices: EquationsMatrices<T>) {
        self.mapping = Some(mapping);
        self.matrices = Some(matrices);
        self.finished = true;
    }
}
