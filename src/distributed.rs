//! Distributed linear-algebra collaborators.
//!
//! The distributed vector/matrix storage and the mesh decomposition are
//! external collaborators of the assembly core. This module provides the
//! shapes the core consumes — internal/boundary/ghost partitions, global
//! vectors and matrices with a queryable storage scheme — backed by
//! single-process reference implementations. The accumulate-add entry
//! points are the only way assembly mutates global storage.

use crate::error::EquationsError;
use crate::Real;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CsrMatrix, SparseEntryMut};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Partition of element or node indices into internal, boundary and ghost
/// ranges.
///
/// The assembly loop visits the internal range first and the boundary and
/// ghost ranges only after the parameter transfers started during the
/// internal pass have completed.
#[derive(Debug, Clone, Default)]
pub struct DomainPartition {
    internal: Vec<usize>,
    boundary: Vec<usize>,
    ghost: Vec<usize>,
}

impl DomainPartition {
    pub fn new(internal: Vec<usize>, boundary: Vec<usize>, ghost: Vec<usize>) -> Self {
        DomainPartition {
            internal,
            boundary,
            ghost,
        }
    }

    /// A partition for an undistributed problem: every index is internal.
    pub fn undistributed(len: usize) -> Self {
        DomainPartition {
            internal: (0..len).collect(),
            boundary: Vec::new(),
            ghost: Vec::new(),
        }
    }

    pub fn internal(&self) -> &[usize] {
        &self.internal
    }

    pub fn boundary(&self) -> &[usize] {
        &self.boundary
    }

    pub fn ghost(&self) -> &[usize] {
        &self.ghost
    }

    /// Boundary and ghost indices in assembly order.
    pub fn boundary_and_ghost(&self) -> impl Iterator<Item = usize> + '_ {
        self.boundary.iter().chain(self.ghost.iter()).copied()
    }

    /// Every index of the partition in assembly order.
    pub fn all(&self) -> impl Iterator<Item = usize> + '_ {
        self.internal.iter().copied().chain(self.boundary_and_ghost())
    }

    pub fn total_len(&self) -> usize {
        self.internal.len() + self.boundary.len() + self.ghost.len()
    }
}

/// Decomposition handle: the element and node partitions of one mesh
/// partition, plus an identifier used for cross-referencing checks.
#[derive(Debug, Clone)]
pub struct Decomposition {
    number: u32,
    elements: DomainPartition,
    nodes: DomainPartition,
}

impl Decomposition {
    pub fn new(number: u32, elements: DomainPartition, nodes: DomainPartition) -> Self {
        Decomposition {
            number,
            elements,
            nodes,
        }
    }

    /// An undistributed decomposition over the given element and node counts.
    pub fn undistributed(number: u32, num_elements: usize, num_nodes: usize) -> Self {
        Decomposition {
            number,
            elements: DomainPartition::undistributed(num_elements),
            nodes: DomainPartition::undistributed(num_nodes),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn elements(&self) -> &DomainPartition {
        &self.elements
    }

    pub fn nodes(&self) -> &DomainPartition {
        &self.nodes
    }
}

/// Storage scheme of a global matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageScheme {
    Dense,
    CompressedRow,
    Diagonal,
}

/// Global distributed vector (single-process reference implementation).
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVector<T: Real> {
    values: DVector<T>,
}

impl<T: Real> GlobalVector<T> {
    pub fn zeros(len: usize) -> Self {
        GlobalVector {
            values: DVector::zeros(len),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn zero_all(&mut self) {
        self.values.fill(T::zero());
    }

    fn check_index(&self, index: usize) -> Result<(), EquationsError> {
        if index >= self.values.len() {
            return Err(EquationsError::invalid_value(format!(
                "The vector index of {} is invalid; the vector has {} entries.",
                index,
                self.values.len()
            )));
        }
        Ok(())
    }

    /// Accumulate-add a value at a global index.
    pub fn add(&mut self, index: usize, value: T) -> Result<(), EquationsError> {
        self.check_index(index)?;
        self.values[index] += value;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<T, EquationsError> {
        self.check_index(index)?;
        Ok(self.values[index])
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<(), EquationsError> {
        self.check_index(index)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn values(&self) -> &DVector<T> {
        &self.values
    }
}

#[derive(Debug, Clone)]
enum Storage<T: Real> {
    Dense(DMatrix<T>),
    CompressedRow(Box<CsrMatrix<T>>),
    Diagonal(DVector<T>),
}

/// Global distributed matrix with a queryable storage scheme
/// (single-process reference implementation).
#[derive(Debug, Clone)]
pub struct GlobalMatrix<T: Real> {
    storage: Storage<T>,
}

impl<T: Real> GlobalMatrix<T> {
    pub fn dense(nrows: usize, ncols: usize) -> Self {
        GlobalMatrix {
            storage: Storage::Dense(DMatrix::zeros(nrows, ncols)),
        }
    }

    /// A compressed-row matrix with the given sparsity pattern and zero
    /// values.
    pub fn compressed_row(pattern: SparsityPattern) -> Result<Self, EquationsError> {
        let values = vec![T::zero(); pattern.nnz()];
        let matrix = CsrMatrix::try_from_pattern_and_values(pattern, values).map_err(|err| {
            EquationsError::invalid_value(format!(
                "The compressed row pattern is inconsistent: {}",
                err
            ))
        })?;
        Ok(GlobalMatrix {
            storage: Storage::CompressedRow(Box::new(matrix)),
        })
    }

    /// A diagonal-storage matrix of dimension `n`.
    pub fn diagonal(n: usize) -> Self {
        GlobalMatrix {
            storage: Storage::Diagonal(DVector::zeros(n)),
        }
    }

    pub fn scheme(&self) -> StorageScheme {
        match &self.storage {
            Storage::Dense(_) => StorageScheme::Dense,
            Storage::CompressedRow(_) => StorageScheme::CompressedRow,
            Storage::Diagonal(_) => StorageScheme::Diagonal,
        }
    }

    pub fn nrows(&self) -> usize {
        match &self.storage {
            Storage::Dense(matrix) => matrix.nrows(),
            Storage::CompressedRow(matrix) => matrix.nrows(),
            Storage::Diagonal(diagonal) => diagonal.len(),
        }
    }

    pub fn ncols(&self) -> usize {
        match &self.storage {
            Storage::Dense(matrix) => matrix.ncols(),
            Storage::CompressedRow(matrix) => matrix.ncols(),
            Storage::Diagonal(diagonal) => diagonal.len(),
        }
    }

    /// Zeros every stored value, keeping the sparsity structure.
    pub fn zero_all(&mut self) {
        match &mut self.storage {
            Storage::Dense(matrix) => matrix.fill(T::zero()),
            Storage::CompressedRow(matrix) => matrix.values_mut().fill(T::zero()),
            Storage::Diagonal(diagonal) => diagonal.fill(T::zero()),
        }
    }

    fn check_indices(&self, row: usize, column: usize) -> Result<(), EquationsError> {
        if row >= self.nrows() || column >= self.ncols() {
            return Err(EquationsError::invalid_value(format!(
                "The matrix indices ({}, {}) are invalid; the matrix is {} by {}.",
                row,
                column,
                self.nrows(),
                self.ncols()
            )));
        }
        Ok(())
    }

    /// Accumulate-add a value at global indices.
    ///
    /// For compressed-row storage the entry must be present in the sparsity
    /// pattern; for diagonal storage only diagonal entries are addressable.
    pub fn add(&mut self, row: usize, column: usize, value: T) -> Result<(), EquationsError> {
        self.check_indices(row, column)?;
        match &mut self.storage {
            Storage::Dense(matrix) => {
                matrix[(row, column)] += value;
                Ok(())
            }
            Storage::CompressedRow(matrix) => match matrix.get_entry_mut(row, column) {
                Some(SparseEntryMut::NonZero(entry)) => {
                    *entry += value;
                    Ok(())
                }
                _ => Err(EquationsError::invalid_value(format!(
                    "The matrix entry ({}, {}) is not present in the sparsity pattern.",
                    row, column
                ))),
            },
            Storage::Diagonal(diagonal) => {
                if row != column {
                    return Err(EquationsError::invalid_value(format!(
                        "The off-diagonal entry ({}, {}) cannot be stored in a diagonal matrix.",
                        row, column
                    )));
                }
                diagonal[row] += value;
                Ok(())
            }
        }
    }

    pub fn get(&self, row: usize, column: usize) -> Result<T, EquationsError> {
        self.check_indices(row, column)?;
        match &self.storage {
            Storage::Dense(matrix) => Ok(matrix[(row, column)]),
            Storage::CompressedRow(matrix) => Ok(matrix
                .get_entry(row, column)
                .map(|entry| entry.into_value())
                .unwrap_or_else(T::zero)),
            Storage::Diagonal(diagonal) => {
                if row == column {
                    Ok(diagonal[row])
                } else {
                    Ok(T::zero())
                }
            }
        }
    }

    pub fn as_dense(&self) -> Option<&DMatrix<T>> {
        match &self.storage {
            Storage::Dense(matrix) => Some(matrix),
            _ => None,
        }
    }

    pub fn as_compressed_row(&self) -> Option<&CsrMatrix<T>> {
        match &self.storage {
            Storage::CompressedRow(matrix) => Some(matrix),
            _ => None,
        }
    }
}

/// Builds the sparsity pattern induced by per-element row and column dof
/// lists.
///
/// Collecting into a `BTreeSet` stores each matrix entry exactly once; this
/// optimizes for memory usage, since meshes can produce a large number of
/// duplicate entries that would otherwise need to be combined.
pub fn pattern_from_element_dofs(
    num_rows: usize,
    num_columns: usize,
    element_rows: &[Vec<usize>],
    element_columns: &[Vec<usize>],
) -> Result<SparsityPattern, EquationsError> {
    let mut entries = BTreeSet::new();
    for (rows, columns) in element_rows.iter().zip(element_columns) {
        for &row in rows {
            for &column in columns {
                entries.insert((row, column));
            }
        }
    }

    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(entries.len());
    offsets.push(0);
    for (row, column) in entries {
        // A new row has been reached; looping handles consecutive empty rows
        while row + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(column);
    }
    while offsets.len() < num_rows + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_columns, offsets, column_indices)
        .map_err(|err| {
            EquationsError::invalid_value(format!(
                "The element dof connectivity produced an invalid sparsity pattern: {:?}",
                err
            ))
        })
}

/// Parallel variant of [`pattern_from_element_dofs`]: collects every
/// (row, column) coordinate, sorts them in parallel and deduplicates while
/// building the offset array.
pub fn par_pattern_from_element_dofs(
    num_rows: usize,
    num_columns: usize,
    element_rows: &[Vec<usize>],
    element_columns: &[Vec<usize>],
) -> Result<SparsityPattern, EquationsError> {
    let num_total_entries: usize = element_rows
        .par_iter()
        .zip(element_columns)
        .with_min_len(50)
        .map(|(rows, columns)| rows.len() * columns.len())
        .sum();

    let mut coordinates = Vec::with_capacity(num_total_entries);
    for (rows, columns) in element_rows.iter().zip(element_columns) {
        for &row in rows {
            for &column in columns {
                coordinates.push((row, column));
            }
        }
    }
    coordinates.par_sort_unstable();

    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::new();
    offsets.push(0);

    let mut current_row = 0;
    let mut previous_column = None;
    for (row, column) in coordinates {
        if row >= num_rows {
            return Err(EquationsError::invalid_value(format!(
                "The element row dof of {} is invalid; the matrix has {} rows.",
                row, num_rows
            )));
        }
        while row > current_row {
            offsets.push(column_indices.len());
            current_row += 1;
            previous_column = None;
        }
        if Some(column) != previous_column {
            column_indices.push(column);
            previous_column = Some(column);
        }
    }
    for _ in current_row..num_rows {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_columns, offsets, column_indices)
        .map_err(|err| {
            EquationsError::invalid_value(format!(
                "The element dof connectivity produced an invalid sparsity pattern: {:?}",
                err
            ))
        })
}
