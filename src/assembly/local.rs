//! Element-local dense buffers.
//!
//! Each global matrix/vector has a companion local arena that is allocated
//! once per assembly pass, filled per element by the physics kernel and
//! accumulated into global storage using the kernel-filled dof index
//! arrays. The arenas are sized to the maximum dof count per element across
//! the mesh and reset, not reallocated, between elements.

use crate::error::EquationsError;
use crate::Real;
use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView};

/// Dense element-local matrix arena with explicit extents.
#[derive(Debug, Clone)]
pub struct ElementMatrix<T: Real> {
    number_of_rows: usize,
    number_of_columns: usize,
    max_rows: usize,
    max_columns: usize,
    row_dofs: Vec<usize>,
    column_dofs: Vec<usize>,
    values: DMatrix<T>,
}

/// Nodal-local matrix: the nodal solution method fills the same arena shape.
pub type NodalMatrix<T> = ElementMatrix<T>;

impl<T: Real> ElementMatrix<T> {
    pub fn with_capacity(max_rows: usize, max_columns: usize) -> Self {
        ElementMatrix {
            number_of_rows: 0,
            number_of_columns: 0,
            max_rows,
            max_columns,
            row_dofs: Vec::with_capacity(max_rows),
            column_dofs: Vec::with_capacity(max_columns),
            values: DMatrix::zeros(max_rows, max_columns),
        }
    }

    /// Grows the arena to at least the given capacity and clears extents.
    /// Called once at the start of an assembly pass.
    pub(crate) fn initialise(&mut self, max_rows: usize, max_columns: usize) {
        if max_rows > self.max_rows || max_columns > self.max_columns {
            self.max_rows = self.max_rows.max(max_rows);
            self.max_columns = self.max_columns.max(max_columns);
            self.values
                .resize_mut(self.max_rows, self.max_columns, T::zero());
        }
        self.reset();
    }

    /// Clears the active block and extents so a kernel can refill the arena.
    pub fn reset(&mut self) {
        self.values
            .view_mut((0, 0), (self.number_of_rows, self.number_of_columns))
            .fill(T::zero());
        self.number_of_rows = 0;
        self.number_of_columns = 0;
        self.row_dofs.clear();
        self.column_dofs.clear();
    }

    /// Releases the arena at the end of an assembly pass.
    pub(crate) fn finalise(&mut self) {
        self.reset();
    }

    /// Sets the extents for the current element; the active block is zeroed.
    ///
    /// The extents can never exceed the arena maximum.
    pub fn set_extents(&mut self, rows: usize, columns: usize) -> Result<(), EquationsError> {
        if rows > self.max_rows || columns > self.max_columns {
            return Err(EquationsError::invalid_value(format!(
                "The element matrix extents ({}, {}) exceed the maximum of ({}, {}).",
                rows, columns, self.max_rows, self.max_columns
            )));
        }
        self.reset();
        self.number_of_rows = rows;
        self.number_of_columns = columns;
        Ok(())
    }

    /// Sets the global row dof indices for the current element.
    pub fn set_row_dofs(&mut self, dofs: &[usize]) -> Result<(), EquationsError> {
        if dofs.len() != self.number_of_rows {
            return Err(EquationsError::invalid_value(format!(
                "The number of row dofs of {} does not match the extent of {}.",
                dofs.len(),
                self.number_of_rows
            )));
        }
        self.row_dofs.clear();
        self.row_dofs.extend_from_slice(dofs);
        Ok(())
    }

    /// Sets the global column dof indices for the current element.
    pub fn set_column_dofs(&mut self, dofs: &[usize]) -> Result<(), EquationsError> {
        if dofs.len() != self.number_of_columns {
            return Err(EquationsError::invalid_value(format!(
                "The number of column dofs of {} does not match the extent of {}.",
                dofs.len(),
                self.number_of_columns
            )));
        }
        self.column_dofs.clear();
        self.column_dofs.extend_from_slice(dofs);
        Ok(())
    }

    fn check_indices(&self, row: usize, column: usize) -> Result<(), EquationsError> {
        if row >= self.number_of_rows || column >= self.number_of_columns {
            return Err(EquationsError::invalid_value(format!(
                "The element matrix indices ({}, {}) are outside the extents ({}, {}).",
                row, column, self.number_of_rows, self.number_of_columns
            )));
        }
        Ok(())
    }

    pub fn add(&mut self, row: usize, column: usize, value: T) -> Result<(), EquationsError> {
        self.check_indices(row, column)?;
        self.values[(row, column)] += value;
        Ok(())
    }

    pub fn value(&self, row: usize, column: usize) -> Result<T, EquationsError> {
        self.check_indices(row, column)?;
        Ok(self.values[(row, column)])
    }

    pub fn number_of_rows(&self) -> usize {
        self.number_of_rows
    }

    pub fn number_of_columns(&self) -> usize {
        self.number_of_columns
    }

    pub fn row_dofs(&self) -> &[usize] {
        &self.row_dofs
    }

    pub fn column_dofs(&self) -> &[usize] {
        &self.column_dofs
    }

    /// The active block of the arena.
    pub fn active_values(&self) -> DMatrixView<'_, T> {
        self.values
            .view((0, 0), (self.number_of_rows, self.number_of_columns))
    }
}

/// Dense element-local vector arena with an explicit extent.
#[derive(Debug, Clone)]
pub struct ElementVector<T: Real> {
    number_of_rows: usize,
    max_rows: usize,
    row_dofs: Vec<usize>,
    values: DVector<T>,
}

/// Nodal-local vector: the nodal solution method fills the same arena shape.
pub type NodalVector<T> = ElementVector<T>;

impl<T: Real> ElementVector<T> {
    pub fn with_capacity(max_rows: usize) -> Self {
        ElementVector {
            number_of_rows: 0,
            max_rows,
            row_dofs: Vec::with_capacity(max_rows),
            values: DVector::zeros(max_rows),
        }
    }

    pub(crate) fn initialise(&mut self, max_rows: usize) {
        if max_rows > self.max_rows {
            self.max_rows = max_rows;
            self.values.resize_vertically_mut(max_rows, T::zero());
        }
        self.reset();
    }

    pub fn reset(&mut self) {
        self.values.rows_mut(0, self.number_of_rows).fill(T::zero());
        self.number_of_rows = 0;
        self.row_dofs.clear();
    }

    pub(crate) fn finalise(&mut self) {
        self.reset();
    }

    pub fn set_extent(&mut self, rows: usize) -> Result<(), EquationsError> {
        if rows > self.max_rows {
            return Err(EquationsError::invalid_value(format!(
                "The element vector extent of {} exceeds the maximum of {}.",
                rows, self.max_rows
            )));
        }
        self.reset();
        self.number_of_rows = rows;
        Ok(())
    }

    pub fn set_row_dofs(&mut self, dofs: &[usize]) -> Result<(), EquationsError> {
        if dofs.len() != self.number_of_rows {
            return Err(EquationsError::invalid_value(format!(
                "The number of row dofs of {} does not match the extent of {}.",
                dofs.len(),
                self.number_of_rows
            )));
        }
        self.row_dofs.clear();
        self.row_dofs.extend_from_slice(dofs);
        Ok(())
    }

    fn check_index(&self, row: usize) -> Result<(), EquationsError> {
        if row >= self.number_of_rows {
            return Err(EquationsError::invalid_value(format!(
                "The element vector index of {} is outside the extent of {}.",
                row, self.number_of_rows
            )));
        }
        Ok(())
    }

    pub fn add(&mut self, row: usize, value: T) -> Result<(), EquationsError> {
        self.check_index(row)?;
        self.values[row] += value;
        Ok(())
    }

    pub fn set(&mut self, row: usize, value: T) -> Result<(), EquationsError> {
        self.check_index(row)?;
        self.values[row] = value;
        Ok(())
    }

    pub fn value(&self, row: usize) -> Result<T, EquationsError> {
        self.check_index(row)?;
        Ok(self.values[row])
    }

    pub fn number_of_rows(&self) -> usize {
        self.number_of_rows
    }

    pub fn row_dofs(&self) -> &[usize] {
        &self.row_dofs
    }

    /// The active rows of the arena.
    pub fn active_values(&self) -> DVectorView<'_, T> {
        self.values.rows(0, self.number_of_rows)
    }
}
