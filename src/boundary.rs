//! Boundary-condition algebra.
//!
//! Consumes the per-dof condition classification owned by the (external)
//! boundary-conditions collaborator to close the assembled system:
//! back-substitution of fixed dofs into the right-hand side, transfer of
//! the nonlinear residual into the right-hand side, and incremental load
//! stepping between nonlinear iterations. Ramp state lives in explicit
//! [`LoadRamp`] value objects owned by the boundary conditions rather than
//! in field parameter-set slots.

use crate::distributed::StorageScheme;
use crate::equations_set::EquationsSet;
use crate::error::EquationsError;
use crate::field::FieldParameterSet;
use crate::registry::KernelRegistry;
use crate::Real;
use itertools::izip;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Per-dof boundary condition classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    Free,
    Fixed,
    FixedIncremented,
    Mixed,
    MovedWallIncremented,
    PressureIncremented,
    NeumannPoint,
    NeumannPointIncremented,
}

/// Ramp state for one incremented dof: the full target load, the previous
/// and the current applied value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadRamp<T> {
    pub target: T,
    pub previous: T,
    pub current: T,
}

impl<T: Real> LoadRamp<T> {
    pub fn new(target: T) -> Self {
        LoadRamp {
            target,
            previous: T::zero(),
            current: T::zero(),
        }
    }

    fn convert(count: usize) -> Result<T, EquationsError> {
        T::from_usize(count).ok_or_else(|| {
            EquationsError::invalid_value(format!(
                "The iteration count of {} cannot be represented in the scalar type.",
                count
            ))
        })
    }

    /// Iteration-count-aware Dirichlet ramp.
    ///
    /// The final iteration snaps directly to the full target so repeated
    /// ramping cannot drift; earlier iterations advance by the remaining
    /// distance divided by the remaining iterations, which stays exact even
    /// if the iteration count changes between calls.
    pub fn dirichlet_step(
        &mut self,
        iteration: usize,
        maximum_iterations: usize,
    ) -> Result<T, EquationsError> {
        if iteration >= maximum_iterations {
            self.current = self.target;
        } else {
            let remaining = Self::convert(maximum_iterations - iteration + 1)?;
            self.current += (self.target - self.current) / remaining;
        }
        Ok(self.current)
    }

    /// Pressure ramp: the first iteration applies `target / N` and resets
    /// the history; later iterations extrapolate the previous increment.
    pub fn pressure_step(
        &mut self,
        iteration: usize,
        maximum_iterations: usize,
    ) -> Result<T, EquationsError> {
        if iteration <= 1 {
            self.previous = T::zero();
            self.current = self.target / Self::convert(maximum_iterations)?;
        } else {
            let next = self.current + (self.current - self.previous);
            self.previous = self.current;
            self.current = next;
        }
        Ok(self.current)
    }

    /// Fractional ramp for incremented point loads: `target * i / N`.
    pub fn point_step(
        &mut self,
        iteration: usize,
        maximum_iterations: usize,
    ) -> Result<T, EquationsError> {
        self.current =
            self.target * Self::convert(iteration)? / Self::convert(maximum_iterations)?;
        Ok(self.current)
    }
}

/// Boundary conditions for the dofs of one dependent field (the shape the
/// algebra consumes from the external boundary-conditions collaborator).
#[derive(Debug, Clone)]
pub struct BoundaryConditions<T: Real> {
    conditions: Vec<ConditionType>,
    ramps: FxHashMap<usize, LoadRamp<T>>,
}

impl<T: Real> BoundaryConditions<T> {
    /// Boundary conditions over `num_dofs` dofs, all initially free.
    pub fn new(num_dofs: usize) -> Self {
        BoundaryConditions {
            conditions: vec![ConditionType::Free; num_dofs],
            ramps: FxHashMap::default(),
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.conditions.len()
    }

    fn check_dof(&self, dof: usize) -> Result<(), EquationsError> {
        if dof >= self.conditions.len() {
            return Err(EquationsError::invalid_value(format!(
                "The dof index of {} is invalid; the boundary conditions cover {} dofs.",
                dof,
                self.conditions.len()
            )));
        }
        Ok(())
    }

    pub fn set_condition(
        &mut self,
        dof: usize,
        condition: ConditionType,
    ) -> Result<(), EquationsError> {
        self.check_dof(dof)?;
        self.conditions[dof] = condition;
        Ok(())
    }

    /// Classifies a dof as incremented with the given full target load.
    pub fn set_incremented(
        &mut self,
        dof: usize,
        condition: ConditionType,
        target: T,
    ) -> Result<(), EquationsError> {
        match condition {
            ConditionType::FixedIncremented
            | ConditionType::MovedWallIncremented
            | ConditionType::PressureIncremented
            | ConditionType::NeumannPointIncremented => {}
            other => {
                return Err(EquationsError::invalid_value(format!(
                    "The boundary condition type {:?} is not an incremented condition.",
                    other
                )))
            }
        }
        self.check_dof(dof)?;
        self.conditions[dof] = condition;
        self.ramps.insert(dof, LoadRamp::new(target));
        Ok(())
    }

    pub fn condition(&self, dof: usize) -> Result<ConditionType, EquationsError> {
        self.check_dof(dof)?;
        Ok(self.conditions[dof])
    }

    pub fn ramp(&self, dof: usize) -> Option<&LoadRamp<T>> {
        self.ramps.get(&dof)
    }

    /// Incremented dofs in ascending order.
    pub fn ramp_dofs(&self) -> Vec<usize> {
        let mut dofs: Vec<usize> = self.ramps.keys().copied().collect();
        dofs.sort_unstable();
        dofs
    }
}

/// Back-substitutes fixed dof values into the right-hand side of a linear
/// equations set.
///
/// For every owned (non-ghost) equation row whose RHS dof is free, computes
/// the matrix-vector product of the row with the dependent values, subtracts
/// the source contribution if a source is mapped, and writes the result into
/// the RHS variable's values parameter set.
pub fn backsubstitute<T: Real>(
    set: &mut EquationsSet<T>,
    boundary_conditions: &BoundaryConditions<T>,
) -> Result<(), EquationsError> {
    if !set.finished {
        return Err(EquationsError::NotFinished("equations set"));
    }
    let equations = set
        .equations
        .as_ref()
        .ok_or(EquationsError::NotAssociated("equations"))?;
    if !equations.finished() {
        return Err(EquationsError::NotFinished("equations"));
    }
    let mapping = equations.mapping()?;
    let matrices = equations.matrices()?;
    let rhs_mapping = mapping
        .rhs()
        .ok_or(EquationsError::NotAssociated("equations rhs mapping"))?;
    let linear = matrices.linear()?;
    let source = if mapping.has_source() {
        Some(matrices.source_vector()?)
    } else {
        None
    };
    let dependent = set
        .dependent
        .as_mut()
        .ok_or(EquationsError::NotAssociated("dependent field"))?
        .field_mut();

    for row in 0..mapping.number_of_rows() {
        let rhs_dof = rhs_mapping.row_dofs[row];
        match boundary_conditions.condition(rhs_dof)? {
            ConditionType::Free => {
                let mut rhs_value = T::zero();
                for matrix in &linear.matrices {
                    match matrix.global.scheme() {
                        StorageScheme::Dense => {
                            let dense = matrix
                                .global
                                .as_dense()
                                .ok_or(EquationsError::NotAssociated("dense matrix storage"))?;
                            for (column, &dof) in mapping.column_dofs().iter().enumerate() {
                                rhs_value += dense[(row, column)]
                                    * dependent.value(FieldParameterSet::Values, dof)?;
                            }
                        }
                        StorageScheme::CompressedRow => {
                            let csr = matrix.global.as_compressed_row().ok_or(
                                EquationsError::NotAssociated("compressed row matrix storage"),
                            )?;
                            let matrix_row = csr.get_row(row).ok_or_else(|| {
                                EquationsError::invalid_value(format!(
                                    "The equation row of {} is invalid; the matrix has {} rows.",
                                    row,
                                    csr.nrows()
                                ))
                            })?;
                            for (&column, &entry) in
                                izip!(matrix_row.col_indices(), matrix_row.values())
                            {
                                rhs_value += entry
                                    * dependent
                                        .value(FieldParameterSet::Values, mapping.column_dof(column)?)?;
                            }
                        }
                        other => {
                            return Err(EquationsError::not_implemented(format!(
                                "The matrix storage scheme {:?} is not implemented for back-substitution.",
                                other
                            )))
                        }
                    }
                }
                if let Some(source) = source {
                    rhs_value -= source.global.get(row)?;
                }
                dependent.set_value(FieldParameterSet::Values, rhs_dof, rhs_value)?;
            }
            ConditionType::Fixed => {}
            ConditionType::Mixed => {
                return Err(EquationsError::not_implemented(format!(
                    "Mixed boundary conditions are not implemented for back-substitution (dof {}).",
                    rhs_dof
                )))
            }
            other => {
                return Err(EquationsError::invalid_value(format!(
                    "The boundary condition type {:?} for dof {} is invalid for back-substitution.",
                    other, rhs_dof
                )))
            }
        }
    }
    Ok(())
}

/// Transfers the assembled nonlinear residual into the right-hand side.
///
/// For every equation row whose RHS dof is free, adds the residual value at
/// that row into the RHS variable's values parameter set; the residual
/// already encodes the nonlinear form, so no matrix multiply is involved.
pub fn nonlinear_rhs_update<T: Real>(
    set: &mut EquationsSet<T>,
    boundary_conditions: &BoundaryConditions<T>,
) -> Result<(), EquationsError> {
    if !set.finished {
        return Err(EquationsError::NotFinished("equations set"));
    }
    let equations = set
        .equations
        .as_ref()
        .ok_or(EquationsError::NotAssociated("equations"))?;
    if !equations.finished() {
        return Err(EquationsError::NotFinished("equations"));
    }
    let mapping = equations.mapping()?;
    let matrices = equations.matrices()?;
    let rhs_mapping = mapping
        .rhs()
        .ok_or(EquationsError::NotAssociated("equations rhs mapping"))?;
    let residual = &matrices.nonlinear()?.residual;
    let dependent = set
        .dependent
        .as_mut()
        .ok_or(EquationsError::NotAssociated("dependent field"))?
        .field_mut();

    for row in 0..mapping.total_number_of_rows() {
        let rhs_dof = rhs_mapping.row_dofs[row];
        match boundary_conditions.condition(rhs_dof)? {
            ConditionType::Free => {
                let residual_value = residual.global.get(row)?;
                dependent.add_value(FieldParameterSet::Values, rhs_dof, residual_value)?;
            }
            ConditionType::Fixed => {}
            ConditionType::Mixed => {
                return Err(EquationsError::not_implemented(format!(
                    "Mixed boundary conditions are not implemented for the nonlinear rhs update (dof {}).",
                    rhs_dof
                )))
            }
            other => {
                return Err(EquationsError::invalid_value(format!(
                    "The boundary condition type {:?} for dof {} is invalid for the nonlinear rhs update.",
                    other, rhs_dof
                )))
            }
        }
    }
    Ok(())
}

/// Advances every incremented boundary condition for iteration `iteration`
/// of `maximum_iterations`, writes the ramped values into the dependent
/// field, communicates every modified parameter set and finally invokes the
/// class-specific increment hook.
pub fn load_increment_apply<T: Real>(
    set: &mut EquationsSet<T>,
    registry: &KernelRegistry<T>,
    boundary_conditions: &mut BoundaryConditions<T>,
    iteration: usize,
    maximum_iterations: usize,
) -> Result<(), EquationsError> {
    if maximum_iterations == 0 {
        return Err(EquationsError::invalid_value(
            "The maximum number of load increments must be at least 1.".to_string(),
        ));
    }
    if iteration == 0 {
        return Err(EquationsError::invalid_value(
            "The load increment iteration must be at least 1.".to_string(),
        ));
    }
    let specification = set
        .specification
        .as_ref()
        .ok_or(EquationsError::SpecificationNotAllocated)?;
    let kernel = registry.resolve(specification)?;
    let dependent = set
        .dependent
        .as_mut()
        .ok_or(EquationsError::NotAssociated("dependent field"))?
        .field_mut();

    let mut touched: Vec<FieldParameterSet> = Vec::new();
    let touch = |touched: &mut Vec<FieldParameterSet>, set_type: FieldParameterSet| {
        if !touched.contains(&set_type) {
            touched.push(set_type);
        }
    };

    for dof in boundary_conditions.ramp_dofs() {
        let condition = boundary_conditions.condition(dof)?;
        let ramp = boundary_conditions
            .ramps
            .get_mut(&dof)
            .ok_or(EquationsError::NotAssociated("boundary condition load ramp"))?;
        match condition {
            ConditionType::FixedIncremented | ConditionType::MovedWallIncremented => {
                let value = ramp.dirichlet_step(iteration, maximum_iterations)?;
                dependent.set_value(FieldParameterSet::Values, dof, value)?;
                touch(&mut touched, FieldParameterSet::Values);
            }
            ConditionType::PressureIncremented => {
                let value = ramp.pressure_step(iteration, maximum_iterations)?;
                dependent.create_parameter_set(FieldParameterSet::Pressure);
                dependent.set_value(FieldParameterSet::Pressure, dof, value)?;
                touch(&mut touched, FieldParameterSet::Pressure);
            }
            ConditionType::NeumannPointIncremented => {
                let value = ramp.point_step(iteration, maximum_iterations)?;
                dependent.create_parameter_set(FieldParameterSet::PointLoad);
                dependent.set_value(FieldParameterSet::PointLoad, dof, value)?;
                touch(&mut touched, FieldParameterSet::PointLoad);
            }
            other => {
                return Err(EquationsError::invalid_value(format!(
                    "The boundary condition type {:?} for incremented dof {} is invalid.",
                    other, dof
                )))
            }
        }
    }

    for set_type in touched {
        dependent.update_start(set_type)?;
        dependent.update_finish(set_type)?;
    }

    kernel.load_increment(dependent, iteration, maximum_iterations)?;
    Ok(())
}
