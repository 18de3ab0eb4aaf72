//! Field and region collaborators.
//!
//! The field data structure proper (parameter-set storage, versioning,
//! interpolation) is an external collaborator of the assembly core. This
//! module provides the interface the core consumes together with a
//! single-process reference implementation: dof-indexed parameter sets,
//! per-element interpolation-parameter lists, per-node dof lists and a
//! recorded start/finish parameter-transfer protocol. In a distributed
//! build the transfer calls map onto nonblocking inter-process exchange;
//! here they record their ordering so it can be asserted.

use crate::error::EquationsError;
use crate::Real;
use nalgebra::DVector;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Identifies a named parameter set on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldParameterSet {
    /// The current dof values.
    Values,
    /// A snapshot of the assembled nonlinear residual.
    Residual,
    /// Surface pressure loads.
    Pressure,
    /// Point (Neumann) loads.
    PointLoad,
}

/// Interpolation scheme of a field component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Constant,
    ElementBased,
    NodeBased,
    GridPointBased,
    GaussPointBased,
}

/// Phase of a parameter-set transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Start,
    Finish,
}

/// One component of a field variable together with its element topology.
#[derive(Debug, Clone)]
pub struct FieldComponent {
    interpolation: Interpolation,
    /// For each element, the variable-local dof indices of the component's
    /// interpolation parameters (node x derivative x version flattened for
    /// node-based interpolation, a single entry for element-based).
    element_parameters: Vec<Vec<usize>>,
}

impl FieldComponent {
    /// A node-based component with the given per-element parameter dofs.
    pub fn node_based(element_parameters: Vec<Vec<usize>>) -> Self {
        FieldComponent {
            interpolation: Interpolation::NodeBased,
            element_parameters,
        }
    }

    /// An element-based component with one parameter dof per element.
    pub fn element_based(element_dofs: Vec<usize>) -> Self {
        FieldComponent {
            interpolation: Interpolation::ElementBased,
            element_parameters: element_dofs.into_iter().map(|dof| vec![dof]).collect(),
        }
    }

    /// A component with an explicit interpolation type.
    pub fn with_interpolation(
        interpolation: Interpolation,
        element_parameters: Vec<Vec<usize>>,
    ) -> Self {
        FieldComponent {
            interpolation,
            element_parameters,
        }
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn num_elements(&self) -> usize {
        self.element_parameters.len()
    }

    /// The variable-local parameter dofs of this component on an element.
    pub fn element_parameters(&self, element: usize) -> Result<&[usize], EquationsError> {
        self.element_parameters
            .get(element)
            .map(|dofs| dofs.as_slice())
            .ok_or_else(|| {
                EquationsError::invalid_value(format!(
                    "The element index of {} is invalid; the component has {} elements.",
                    element,
                    self.element_parameters.len()
                ))
            })
    }
}

/// A variable of a field, for example u or del u/del n.
#[derive(Debug, Clone)]
pub struct FieldVariable {
    label: String,
    dof_offset: usize,
    num_dofs: usize,
    num_owned_dofs: usize,
    components: Vec<FieldComponent>,
    /// For each node, the variable-local dofs attached to it.
    node_dofs: Vec<Vec<usize>>,
}

impl FieldVariable {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Total dofs of the variable, owned dofs first, ghosts after.
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_owned_dofs(&self) -> usize {
        self.num_owned_dofs
    }

    pub fn components(&self) -> &[FieldComponent] {
        &self.components
    }

    pub fn num_nodes(&self) -> usize {
        self.node_dofs.len()
    }

    /// The variable-local dofs attached to a node.
    pub fn node_dofs(&self, node: usize) -> Result<&[usize], EquationsError> {
        self.node_dofs
            .get(node)
            .map(|dofs| dofs.as_slice())
            .ok_or_else(|| {
                EquationsError::invalid_value(format!(
                    "The node index of {} is invalid; the variable has {} nodes.",
                    node,
                    self.node_dofs.len()
                ))
            })
    }

    /// Maps a variable-local dof index to the field-global dof index.
    pub fn global_dof(&self, local_dof: usize) -> usize {
        self.dof_offset + local_dof
    }
}

/// Field reference implementation.
#[derive(Debug, Clone)]
pub struct Field<T: Real> {
    label: String,
    region: u32,
    decomposition: u32,
    finished: bool,
    variables: Vec<FieldVariable>,
    num_dofs: usize,
    sets: FxHashMap<FieldParameterSet, DVector<T>>,
    transfers: Vec<(FieldParameterSet, TransferPhase)>,
    open_transfers: FxHashMap<FieldParameterSet, usize>,
}

impl<T: Real> Field<T> {
    /// A new, unfinished field on the given region and decomposition.
    pub fn new(label: impl Into<String>, region: u32, decomposition: u32) -> Self {
        Field {
            label: label.into(),
            region,
            decomposition,
            finished: false,
            variables: Vec::new(),
            num_dofs: 0,
            sets: FxHashMap::default(),
            transfers: Vec::new(),
            open_transfers: FxHashMap::default(),
        }
    }

    /// Adds a variable with `num_owned_dofs + num_ghost_dofs` dofs and the
    /// given component topology. Returns the variable index.
    pub fn add_variable(
        &mut self,
        label: impl Into<String>,
        num_owned_dofs: usize,
        num_ghost_dofs: usize,
        components: Vec<FieldComponent>,
        node_dofs: Vec<Vec<usize>>,
    ) -> Result<usize, EquationsError> {
        if self.finished {
            return Err(EquationsError::AlreadyFinished("field"));
        }
        let num_dofs = num_owned_dofs + num_ghost_dofs;
        for component in &components {
            for element_dofs in &component.element_parameters {
                if let Some(&dof) = element_dofs.iter().find(|&&dof| dof >= num_dofs) {
                    return Err(EquationsError::invalid_value(format!(
                        "The component parameter dof of {} is invalid; the variable has {} dofs.",
                        dof, num_dofs
                    )));
                }
            }
        }
        let variable = FieldVariable {
            label: label.into(),
            dof_offset: self.num_dofs,
            num_dofs,
            num_owned_dofs,
            components,
            node_dofs,
        };
        self.num_dofs += num_dofs;
        self.variables.push(variable);
        Ok(self.variables.len() - 1)
    }

    /// Finishes the field, allocating its values parameter set.
    pub fn finish(&mut self) -> Result<(), EquationsError> {
        if self.finished {
            return Err(EquationsError::AlreadyFinished("field"));
        }
        self.sets
            .insert(FieldParameterSet::Values, DVector::zeros(self.num_dofs));
        self.finished = true;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn region(&self) -> u32 {
        self.region
    }

    pub fn decomposition(&self) -> u32 {
        self.decomposition
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn variable(&self, index: usize) -> Result<&FieldVariable, EquationsError> {
        self.variables.get(index).ok_or_else(|| {
            EquationsError::invalid_value(format!(
                "The variable index of {} is invalid; the field has {} variables.",
                index,
                self.variables.len()
            ))
        })
    }

    /// Creates a parameter set filled with zeros. Idempotent.
    pub fn create_parameter_set(&mut self, set: FieldParameterSet) {
        let num_dofs = self.num_dofs;
        self.sets
            .entry(set)
            .or_insert_with(|| DVector::zeros(num_dofs));
    }

    pub fn has_parameter_set(&self, set: FieldParameterSet) -> bool {
        self.sets.contains_key(&set)
    }

    pub fn parameter_set(&self, set: FieldParameterSet) -> Result<&DVector<T>, EquationsError> {
        self.sets
            .get(&set)
            .ok_or(EquationsError::NotAssociated("field parameter set"))
    }

    fn parameter_set_mut(
        &mut self,
        set: FieldParameterSet,
    ) -> Result<&mut DVector<T>, EquationsError> {
        self.sets
            .get_mut(&set)
            .ok_or(EquationsError::NotAssociated("field parameter set"))
    }

    fn check_dof(&self, dof: usize) -> Result<(), EquationsError> {
        if dof >= self.num_dofs {
            return Err(EquationsError::invalid_value(format!(
                "The dof index of {} is invalid; the field has {} dofs.",
                dof, self.num_dofs
            )));
        }
        Ok(())
    }

    pub fn value(&self, set: FieldParameterSet, dof: usize) -> Result<T, EquationsError> {
        self.check_dof(dof)?;
        Ok(self.parameter_set(set)?[dof])
    }

    pub fn set_value(
        &mut self,
        set: FieldParameterSet,
        dof: usize,
        value: T,
    ) -> Result<(), EquationsError> {
        self.check_dof(dof)?;
        self.parameter_set_mut(set)?[dof] = value;
        Ok(())
    }

    pub fn add_value(
        &mut self,
        set: FieldParameterSet,
        dof: usize,
        value: T,
    ) -> Result<(), EquationsError> {
        self.check_dof(dof)?;
        self.parameter_set_mut(set)?[dof] += value;
        Ok(())
    }

    /// Euclidean norm of one variable's slice of a parameter set.
    pub fn variable_norm(
        &self,
        set: FieldParameterSet,
        variable: usize,
    ) -> Result<T, EquationsError> {
        let var = self.variable(variable)?;
        let values = self.parameter_set(set)?;
        Ok(values.rows(var.dof_offset, var.num_dofs).norm())
    }

    /// Starts a (nonblocking) inter-process transfer of a parameter set.
    pub fn update_start(&mut self, set: FieldParameterSet) -> Result<(), EquationsError> {
        self.parameter_set(set)?;
        *self.open_transfers.entry(set).or_insert(0) += 1;
        self.transfers.push((set, TransferPhase::Start));
        Ok(())
    }

    /// Completes a previously started transfer of a parameter set.
    pub fn update_finish(&mut self, set: FieldParameterSet) -> Result<(), EquationsError> {
        let open = self.open_transfers.entry(set).or_insert(0);
        if *open == 0 {
            return Err(EquationsError::invalid_value(format!(
                "A parameter set update finish for {:?} has no matching update start.",
                set
            )));
        }
        *open -= 1;
        self.transfers.push((set, TransferPhase::Finish));
        Ok(())
    }

    /// The recorded transfer phases, in call order.
    pub fn transfer_log(&self) -> &[(FieldParameterSet, TransferPhase)] {
        &self.transfers
    }

    pub fn clear_transfer_log(&mut self) {
        self.transfers.clear();
    }

    /// Builds a finished companion field sharing this field's variable-0
    /// topology, with the given number of variables. Used for auto-created
    /// sub-object fields: the dependent field gets two variables (u and
    /// del u/del n), the remaining sub-objects one.
    pub fn companion(
        &self,
        label: impl Into<String>,
        num_variables: usize,
    ) -> Result<Field<T>, EquationsError> {
        let template = self.variable(0)?;
        let label = label.into();
        let mut field = Field::new(label.clone(), self.region, self.decomposition);
        for index in 0..num_variables {
            field.add_variable(
                format!("{} variable {}", label, index + 1),
                template.num_owned_dofs,
                template.num_dofs - template.num_owned_dofs,
                template.components.clone(),
                template.node_dofs.clone(),
            )?;
        }
        field.finish()?;
        Ok(field)
    }
}

/// Lightweight stand-in for the region collaborator: tracks which
/// equations-set user numbers are already taken.
#[derive(Debug, Clone)]
pub struct Region {
    number: u32,
    equations_sets: FxHashSet<u32>,
}

impl Region {
    pub fn new(number: u32) -> Self {
        Region {
            number,
            equations_sets: FxHashSet::default(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Claims an equations-set user number, failing on duplicates.
    pub fn claim_equations_set(&mut self, user_number: u32) -> Result<(), EquationsError> {
        if !self.equations_sets.insert(user_number) {
            return Err(EquationsError::invalid_value(format!(
                "The equations set user number of {} is already in use on region {}.",
                user_number, self.number
            )));
        }
        Ok(())
    }
}
