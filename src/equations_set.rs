//! The equations set: the central aggregate binding geometry, dependent,
//! material and source fields with a physics specification, and the
//! operation dispatch consumed by an outer solver.
//!
//! Creation follows a two-phase start/finish protocol per sub-object, with
//! every transition validated: `Uninitialized -> Started -> Finished`.
//! Destruction is ownership; dropping the set releases everything it owns.

use crate::assembly::global;
use crate::boundary::{self, BoundaryConditions};
use crate::distributed::{Decomposition, StorageScheme};
use crate::equations::{
    Equations, EquationsLinearity, EquationsMapping, EquationsMatrices, EquationsTimeDependence,
};
use crate::error::EquationsError;
use crate::field::{Field, FieldParameterSet, Region};
use crate::kernel::{PhysicsKernel, SetupAction, SetupType};
use crate::registry::KernelRegistry;
use crate::specification::{SolutionMethod, Specification};
use crate::Real;
use std::sync::Arc;

/// A sub-object of an equations set created through the two-phase
/// start/finish protocol.
#[derive(Debug)]
pub struct EquationsSetField<T: Real> {
    field: Field<T>,
    finished: bool,
}

impl<T: Real> EquationsSetField<T> {
    pub fn field(&self) -> &Field<T> {
        &self.field
    }

    pub(crate) fn field_mut(&mut self) -> &mut Field<T> {
        &mut self.field
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

/// The analytic sub-object: an analytic function selector plus an optional
/// field holding the analytic values.
#[derive(Debug)]
pub struct AnalyticInfo<T: Real> {
    field: Option<Field<T>>,
    function_type: i32,
    finished: bool,
}

impl<T: Real> AnalyticInfo<T> {
    pub fn field(&self) -> Option<&Field<T>> {
        self.field.as_ref()
    }

    pub fn function_type(&self) -> i32 {
        self.function_type
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

fn start_sub_object<T: Real>(
    geometry: &Field<T>,
    slot: &mut Option<EquationsSetField<T>>,
    name: &'static str,
    supplied: Option<Field<T>>,
    auto_label: &str,
    auto_variables: usize,
) -> Result<(), EquationsError> {
    if slot.is_some() {
        return Err(EquationsError::AlreadyFinished(name));
    }
    let field = match supplied {
        Some(field) => {
            validate_companion(geometry, &field, name)?;
            field
        }
        None => geometry.companion(auto_label, auto_variables)?,
    };
    *slot = Some(EquationsSetField {
        field,
        finished: false,
    });
    Ok(())
}

fn finish_sub_object<T: Real>(
    slot: &mut Option<EquationsSetField<T>>,
    name: &'static str,
) -> Result<(), EquationsError> {
    let sub_object = slot.as_mut().ok_or(EquationsError::NotAssociated(name))?;
    if sub_object.finished {
        return Err(EquationsError::AlreadyFinished(name));
    }
    sub_object.finished = true;
    Ok(())
}

fn validate_companion<T: Real>(
    geometry: &Field<T>,
    field: &Field<T>,
    name: &'static str,
) -> Result<(), EquationsError> {
    if !field.finished() {
        return Err(EquationsError::NotFinished(name));
    }
    if field.region() != geometry.region() {
        return Err(EquationsError::RegionMismatch {
            expected: geometry.region(),
            found: field.region(),
        });
    }
    if field.decomposition() != geometry.decomposition() {
        return Err(EquationsError::DecompositionMismatch {
            expected: geometry.decomposition(),
            found: field.decomposition(),
        });
    }
    Ok(())
}

/// The central aggregate of one PDE instance.
#[derive(Debug)]
pub struct EquationsSet<T: Real> {
    pub(crate) user_number: u32,
    pub(crate) region: u32,
    pub(crate) specification: Option<Specification>,
    pub(crate) solution_method: SolutionMethod,
    pub(crate) finished: bool,
    pub(crate) decomposition: Decomposition,
    pub(crate) geometry: Field<T>,
    pub(crate) dependent: Option<EquationsSetField<T>>,
    pub(crate) materials: Option<EquationsSetField<T>>,
    pub(crate) source: Option<EquationsSetField<T>>,
    pub(crate) independent: Option<EquationsSetField<T>>,
    pub(crate) analytic: Option<AnalyticInfo<T>>,
    pub(crate) derived: Option<EquationsSetField<T>>,
    pub(crate) equations: Option<Equations<T>>,
}

impl<T: Real> EquationsSet<T> {
    /// Starts creating an equations set on a region.
    ///
    /// The geometry field must be finished and live on the given region and
    /// decomposition; the user number must be unused on the region; the
    /// specification must parse to a registered equations class.
    pub fn create_start(
        user_number: u32,
        region: &mut Region,
        decomposition: Decomposition,
        geometry: Field<T>,
        specification: &[i32],
        registry: &KernelRegistry<T>,
    ) -> Result<Self, EquationsError> {
        if !geometry.finished() {
            return Err(EquationsError::NotFinished("geometry field"));
        }
        if geometry.region() != region.number() {
            return Err(EquationsError::RegionMismatch {
                expected: region.number(),
                found: geometry.region(),
            });
        }
        if geometry.decomposition() != decomposition.number() {
            return Err(EquationsError::DecompositionMismatch {
                expected: decomposition.number(),
                found: geometry.decomposition(),
            });
        }
        region.claim_equations_set(user_number)?;
        let specification = Specification::new(specification)?;
        let kernel = registry.resolve(&specification)?;
        kernel.setup(SetupType::Initial, SetupAction::Start)?;
        Ok(EquationsSet {
            user_number,
            region: region.number(),
            specification: Some(specification),
            solution_method: SolutionMethod::FiniteElement,
            finished: false,
            decomposition,
            geometry,
            dependent: None,
            materials: None,
            source: None,
            independent: None,
            analytic: None,
            derived: None,
            equations: None,
        })
    }

    /// Finishes creating the equations set.
    pub fn create_finish(&mut self, registry: &KernelRegistry<T>) -> Result<(), EquationsError> {
        if self.finished {
            return Err(EquationsError::AlreadyFinished("equations set"));
        }
        let kernel = self.resolve_kernel(registry)?;
        kernel.setup(SetupType::Initial, SetupAction::Finish)?;
        self.finished = true;
        Ok(())
    }

    fn resolve_kernel(
        &self,
        registry: &KernelRegistry<T>,
    ) -> Result<Arc<dyn PhysicsKernel<T>>, EquationsError> {
        let specification = self
            .specification
            .as_ref()
            .ok_or(EquationsError::SpecificationNotAllocated)?;
        registry.resolve(specification)
    }

    pub fn user_number(&self) -> u32 {
        self.user_number
    }

    pub fn region(&self) -> u32 {
        self.region
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    /// Replaces the specification. Only valid before the set is finished.
    pub fn specification_set(&mut self, entries: &[i32]) -> Result<(), EquationsError> {
        if self.finished {
            return Err(EquationsError::AlreadyFinished("equations set"));
        }
        self.specification = Some(Specification::new(entries)?);
        Ok(())
    }

    /// The number of specification entries.
    pub fn specification_size(&self) -> Result<usize, EquationsError> {
        Ok(self
            .specification
            .as_ref()
            .ok_or(EquationsError::SpecificationNotAllocated)?
            .len())
    }

    /// Copies the specification into a caller-supplied buffer. Only valid
    /// once the set is finished.
    pub fn specification_get(&self, buffer: &mut [i32]) -> Result<(), EquationsError> {
        if !self.finished {
            return Err(EquationsError::NotFinished("equations set"));
        }
        self.specification
            .as_ref()
            .ok_or(EquationsError::SpecificationNotAllocated)?
            .copy_to(buffer)
    }

    pub fn solution_method(&self) -> SolutionMethod {
        self.solution_method
    }

    /// Sets the solution method, validated by the physics kernel.
    pub fn solution_method_set(
        &mut self,
        method: SolutionMethod,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        if self.finished {
            return Err(EquationsError::AlreadyFinished("equations set"));
        }
        let kernel = self.resolve_kernel(registry)?;
        kernel.validate_solution_method(method)?;
        self.solution_method = method;
        Ok(())
    }

    pub fn geometry_field(&self) -> &Field<T> {
        &self.geometry
    }

    pub fn dependent_field(&self) -> Result<&Field<T>, EquationsError> {
        self.dependent
            .as_ref()
            .map(EquationsSetField::field)
            .ok_or(EquationsError::NotAssociated("dependent field"))
    }

    pub fn dependent_field_mut(&mut self) -> Result<&mut Field<T>, EquationsError> {
        self.dependent
            .as_mut()
            .map(EquationsSetField::field_mut)
            .ok_or(EquationsError::NotAssociated("dependent field"))
    }

    pub fn materials_field(&self) -> Option<&Field<T>> {
        self.materials.as_ref().map(EquationsSetField::field)
    }

    pub fn source_field(&self) -> Option<&Field<T>> {
        self.source.as_ref().map(EquationsSetField::field)
    }

    pub fn independent_field(&self) -> Option<&Field<T>> {
        self.independent.as_ref().map(EquationsSetField::field)
    }

    pub fn derived_field(&self) -> Option<&Field<T>> {
        self.derived.as_ref().map(EquationsSetField::field)
    }

    pub fn analytic(&self) -> Option<&AnalyticInfo<T>> {
        self.analytic.as_ref()
    }

    /// Starts creating the dependent field. With `None`, a companion field
    /// with two variables (u and del u/del n) sharing the geometric
    /// topology is auto-created. Returns the dependent field.
    pub fn dependent_create_start(
        &mut self,
        field: Option<Field<T>>,
        registry: &KernelRegistry<T>,
    ) -> Result<&Field<T>, EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        start_sub_object(
            &self.geometry,
            &mut self.dependent,
            "dependent field",
            field,
            "dependent",
            2,
        )?;
        kernel.setup(SetupType::Dependent, SetupAction::Start)?;
        self.dependent_field()
    }

    pub fn dependent_create_finish(
        &mut self,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        finish_sub_object(&mut self.dependent, "dependent field")?;
        kernel.setup(SetupType::Dependent, SetupAction::Finish)
    }

    pub fn materials_create_start(
        &mut self,
        field: Option<Field<T>>,
        registry: &KernelRegistry<T>,
    ) -> Result<&Field<T>, EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        start_sub_object(
            &self.geometry,
            &mut self.materials,
            "materials field",
            field,
            "materials",
            1,
        )?;
        kernel.setup(SetupType::Materials, SetupAction::Start)?;
        self.materials_field()
            .ok_or(EquationsError::NotAssociated("materials field"))
    }

    pub fn materials_create_finish(
        &mut self,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        finish_sub_object(&mut self.materials, "materials field")?;
        kernel.setup(SetupType::Materials, SetupAction::Finish)
    }

    pub fn source_create_start(
        &mut self,
        field: Option<Field<T>>,
        registry: &KernelRegistry<T>,
    ) -> Result<&Field<T>, EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        start_sub_object(
            &self.geometry,
            &mut self.source,
            "source field",
            field,
            "source",
            1,
        )?;
        kernel.setup(SetupType::Source, SetupAction::Start)?;
        self.source_field()
            .ok_or(EquationsError::NotAssociated("source field"))
    }

    pub fn source_create_finish(
        &mut self,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        finish_sub_object(&mut self.source, "source field")?;
        kernel.setup(SetupType::Source, SetupAction::Finish)
    }

    pub fn independent_create_start(
        &mut self,
        field: Option<Field<T>>,
        registry: &KernelRegistry<T>,
    ) -> Result<&Field<T>, EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        start_sub_object(
            &self.geometry,
            &mut self.independent,
            "independent field",
            field,
            "independent",
            1,
        )?;
        kernel.setup(SetupType::Independent, SetupAction::Start)?;
        self.independent_field()
            .ok_or(EquationsError::NotAssociated("independent field"))
    }

    pub fn independent_create_finish(
        &mut self,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        finish_sub_object(&mut self.independent, "independent field")?;
        kernel.setup(SetupType::Independent, SetupAction::Finish)
    }

    pub fn derived_create_start(
        &mut self,
        field: Option<Field<T>>,
        registry: &KernelRegistry<T>,
    ) -> Result<&Field<T>, EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        start_sub_object(
            &self.geometry,
            &mut self.derived,
            "derived field",
            field,
            "derived",
            1,
        )?;
        kernel.setup(SetupType::Derived, SetupAction::Start)?;
        self.derived_field()
            .ok_or(EquationsError::NotAssociated("derived field"))
    }

    pub fn derived_create_finish(
        &mut self,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        finish_sub_object(&mut self.derived, "derived field")?;
        kernel.setup(SetupType::Derived, SetupAction::Finish)
    }

    /// Starts creating the analytic sub-object for the given analytic
    /// function type.
    pub fn analytic_create_start(
        &mut self,
        function_type: i32,
        field: Option<Field<T>>,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        if self.analytic.is_some() {
            return Err(EquationsError::AlreadyFinished("analytic"));
        }
        let kernel = self.resolve_kernel(registry)?;
        if let Some(field) = &field {
            validate_companion(&self.geometry, field, "analytic field")?;
        }
        self.analytic = Some(AnalyticInfo {
            field,
            function_type,
            finished: false,
        });
        kernel.setup(SetupType::Analytic, SetupAction::Start)?;
        Ok(())
    }

    pub fn analytic_create_finish(
        &mut self,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        let analytic = self
            .analytic
            .as_mut()
            .ok_or(EquationsError::NotAssociated("analytic"))?;
        if analytic.finished {
            return Err(EquationsError::AlreadyFinished("analytic"));
        }
        analytic.finished = true;
        kernel.setup(SetupType::Analytic, SetupAction::Finish)?;
        Ok(())
    }

    /// Starts creating the equations with the given classification.
    pub fn equations_create_start(
        &mut self,
        linearity: EquationsLinearity,
        time_dependence: EquationsTimeDependence,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let dependent = self
            .dependent
            .as_ref()
            .ok_or(EquationsError::NotAssociated("dependent field"))?;
        if !dependent.finished {
            return Err(EquationsError::NotFinished("dependent field"));
        }
        if self.equations.is_some() {
            return Err(EquationsError::AlreadyFinished("equations"));
        }
        let kernel = self.resolve_kernel(registry)?;
        self.equations = Some(Equations::new(linearity, time_dependence));
        kernel.setup(SetupType::Equations, SetupAction::Start)?;
        Ok(())
    }

    pub fn equations(&self) -> Result<&Equations<T>, EquationsError> {
        self.equations
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations"))
    }

    pub fn equations_mut(&mut self) -> Result<&mut Equations<T>, EquationsError> {
        self.equations
            .as_mut()
            .ok_or(EquationsError::NotAssociated("equations"))
    }

    /// Finishes the equations: calculates the dof mapping and creates the
    /// global matrices with the given storage scheme.
    pub fn equations_create_finish(
        &mut self,
        scheme: StorageScheme,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        let dependent = self
            .dependent
            .as_ref()
            .ok_or(EquationsError::NotAssociated("dependent field"))?;
        let has_source = self.source.as_ref().map(|s| s.finished).unwrap_or(false);
        let equations = self
            .equations
            .as_mut()
            .ok_or(EquationsError::NotAssociated("equations"))?;
        if equations.finished() {
            return Err(EquationsError::AlreadyFinished("equations"));
        }
        let rhs_variable = (dependent.field.num_variables() > 1).then_some(1);
        let residual_variables = match equations.linearity() {
            EquationsLinearity::Linear => Vec::new(),
            EquationsLinearity::Nonlinear | EquationsLinearity::NonlinearBoundaryConditions => {
                equations.residual_variables().to_vec()
            }
        };
        let mapping = EquationsMapping::calculate(
            &dependent.field,
            0,
            rhs_variable,
            &residual_variables,
            has_source,
        )?;
        let matrices = EquationsMatrices::create(
            &mapping,
            equations.linearity(),
            equations.time_dependence(),
            scheme,
        )?;
        equations.finish(mapping, matrices);
        kernel.setup(SetupType::Equations, SetupAction::Finish)?;
        Ok(())
    }

    /// Assembles the equations matrices for the current linearity,
    /// time dependence and solution method.
    pub fn assemble(&mut self, registry: &KernelRegistry<T>) -> Result<(), EquationsError> {
        let equations = self
            .equations
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations"))?;
        let linearity = equations.linearity();
        let time_dependence = equations.time_dependence();
        match (linearity, time_dependence) {
            (_, EquationsTimeDependence::TimeStepping) => Err(EquationsError::not_implemented(
                "Time stepping equations are not assembled.".to_string(),
            )),
            (EquationsLinearity::Linear, EquationsTimeDependence::Static) => {
                match self.solution_method {
                    SolutionMethod::FiniteElement => {
                        global::assemble_static_linear_fem(self, registry)
                    }
                    other => Err(EquationsError::not_implemented(format!(
                        "The solution method {:?} is not implemented for static linear assembly.",
                        other
                    ))),
                }
            }
            (EquationsLinearity::Linear, EquationsTimeDependence::Quasistatic) => {
                match self.solution_method {
                    SolutionMethod::FiniteElement => {
                        global::assemble_quasistatic_linear_fem(self, registry)
                    }
                    other => Err(EquationsError::not_implemented(format!(
                        "The solution method {:?} is not implemented for quasistatic linear assembly.",
                        other
                    ))),
                }
            }
            (
                EquationsLinearity::Linear,
                EquationsTimeDependence::FirstOrderDynamic
                | EquationsTimeDependence::SecondOrderDynamic,
            ) => match self.solution_method {
                SolutionMethod::FiniteElement => global::assemble_dynamic_linear_fem(self, registry),
                other => Err(EquationsError::not_implemented(format!(
                    "The solution method {:?} is not implemented for dynamic linear assembly.",
                    other
                ))),
            },
            (
                EquationsLinearity::Nonlinear,
                EquationsTimeDependence::Static | EquationsTimeDependence::Quasistatic,
            ) => match self.solution_method {
                SolutionMethod::FiniteElement => {
                    if time_dependence == EquationsTimeDependence::Static {
                        global::assemble_static_nonlinear_fem(self, registry)
                    } else {
                        global::assemble_quasistatic_nonlinear_fem(self, registry)
                    }
                }
                SolutionMethod::Nodal => global::assemble_static_nonlinear_nodal(self, registry),
                other => Err(EquationsError::not_implemented(format!(
                    "The solution method {:?} is not implemented for static nonlinear assembly.",
                    other
                ))),
            },
            (
                EquationsLinearity::Nonlinear,
                EquationsTimeDependence::FirstOrderDynamic
                | EquationsTimeDependence::SecondOrderDynamic,
            ) => Err(EquationsError::not_implemented(
                "The assembly of dynamic nonlinear equations is not implemented.".to_string(),
            )),
            (EquationsLinearity::NonlinearBoundaryConditions, _) => {
                Err(EquationsError::not_implemented(
                    "Nonlinear equations with nonlinear boundary conditions are not implemented."
                        .to_string(),
                ))
            }
        }
    }

    /// Evaluates the nonlinear residual and updates the dependent field's
    /// residual parameter-set snapshot if one exists.
    pub fn residual_evaluate(&mut self, registry: &KernelRegistry<T>) -> Result<(), EquationsError> {
        let equations = self
            .equations
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations"))?;
        let linearity = equations.linearity();
        let time_dependence = equations.time_dependence();
        match linearity {
            EquationsLinearity::Linear => {
                return Err(EquationsError::invalid_value(format!(
                    "The equations linearity of {:?} is invalid for residual evaluation.",
                    linearity
                )))
            }
            EquationsLinearity::NonlinearBoundaryConditions => {
                return Err(EquationsError::not_implemented(
                    "Nonlinear equations with nonlinear boundary conditions are not implemented."
                        .to_string(),
                ))
            }
            EquationsLinearity::Nonlinear => match time_dependence {
                EquationsTimeDependence::Static | EquationsTimeDependence::Quasistatic => {
                    match self.solution_method {
                        SolutionMethod::FiniteElement => {
                            if time_dependence == EquationsTimeDependence::Static {
                                global::assemble_static_nonlinear_fem(self, registry)?
                            } else {
                                global::assemble_quasistatic_nonlinear_fem(self, registry)?
                            }
                        }
                        SolutionMethod::Nodal => {
                            global::assemble_static_nonlinear_nodal(self, registry)?
                        }
                        other => {
                            return Err(EquationsError::not_implemented(format!(
                                "The solution method {:?} is not implemented for residual evaluation.",
                                other
                            )))
                        }
                    }
                }
                EquationsTimeDependence::FirstOrderDynamic
                | EquationsTimeDependence::SecondOrderDynamic => match self.solution_method {
                    SolutionMethod::FiniteElement => {
                        global::assemble_dynamic_nonlinear_fem(self, registry)?
                    }
                    other => {
                        return Err(EquationsError::not_implemented(format!(
                            "The solution method {:?} is not implemented for dynamic residual evaluation.",
                            other
                        )))
                    }
                },
                EquationsTimeDependence::TimeStepping => {
                    return Err(EquationsError::not_implemented(
                        "Time stepping equations are not assembled.".to_string(),
                    ))
                }
            },
        }
        self.update_residual_snapshot()
    }

    /// Evaluates every Jacobian block, analytically or by finite
    /// differencing per block.
    pub fn jacobian_evaluate(&mut self, registry: &KernelRegistry<T>) -> Result<(), EquationsError> {
        let equations = self
            .equations
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations"))?;
        let linearity = equations.linearity();
        let time_dependence = equations.time_dependence();
        match linearity {
            EquationsLinearity::Linear => Err(EquationsError::invalid_value(format!(
                "The equations linearity of {:?} is invalid for Jacobian evaluation.",
                linearity
            ))),
            EquationsLinearity::NonlinearBoundaryConditions => {
                Err(EquationsError::not_implemented(
                    "Nonlinear equations with nonlinear boundary conditions are not implemented."
                        .to_string(),
                ))
            }
            EquationsLinearity::Nonlinear => match time_dependence {
                EquationsTimeDependence::Static | EquationsTimeDependence::Quasistatic => {
                    match self.solution_method {
                        SolutionMethod::FiniteElement => global::jacobian_assemble_fem(self, registry),
                        SolutionMethod::Nodal => global::jacobian_assemble_nodal(self, registry),
                        other => Err(EquationsError::not_implemented(format!(
                            "The solution method {:?} is not implemented for Jacobian evaluation.",
                            other
                        ))),
                    }
                }
                EquationsTimeDependence::FirstOrderDynamic
                | EquationsTimeDependence::SecondOrderDynamic => match self.solution_method {
                    SolutionMethod::FiniteElement => global::jacobian_assemble_fem(self, registry),
                    other => Err(EquationsError::not_implemented(format!(
                        "The solution method {:?} is not implemented for dynamic Jacobian evaluation.",
                        other
                    ))),
                },
                EquationsTimeDependence::TimeStepping => Err(EquationsError::not_implemented(
                    "Time stepping equations are not assembled.".to_string(),
                )),
            },
        }
    }

    /// Copies the assembled residual into the dependent field's residual
    /// parameter set (direct copy), used by the outer solver for
    /// convergence diagnostics. Skipped silently if the set does not exist.
    fn update_residual_snapshot(&mut self) -> Result<(), EquationsError> {
        let equations = self
            .equations
            .as_ref()
            .ok_or(EquationsError::NotAssociated("equations"))?;
        let mapping = equations.mapping()?;
        let residual = &equations.matrices()?.nonlinear()?.residual;
        let dependent = self
            .dependent
            .as_mut()
            .ok_or(EquationsError::NotAssociated("dependent field"))?
            .field_mut();
        if !dependent.has_parameter_set(FieldParameterSet::Residual) {
            return Ok(());
        }
        for row in 0..mapping.total_number_of_rows() {
            let dof = mapping.row_dof(row)?;
            let value = residual.global.get(row)?;
            dependent.set_value(FieldParameterSet::Residual, dof, value)?;
        }
        Ok(())
    }

    /// Back-substitutes fixed dof values into the right-hand side.
    pub fn backsubstitute(
        &mut self,
        boundary_conditions: &BoundaryConditions<T>,
    ) -> Result<(), EquationsError> {
        boundary::backsubstitute(self, boundary_conditions)
    }

    /// Transfers the assembled residual into the right-hand side.
    pub fn nonlinear_rhs_update(
        &mut self,
        boundary_conditions: &BoundaryConditions<T>,
    ) -> Result<(), EquationsError> {
        boundary::nonlinear_rhs_update(self, boundary_conditions)
    }

    /// Advances incremented boundary conditions for one load-stepping
    /// iteration.
    pub fn load_increment_apply(
        &mut self,
        registry: &KernelRegistry<T>,
        boundary_conditions: &mut BoundaryConditions<T>,
        iteration: usize,
        maximum_iterations: usize,
    ) -> Result<(), EquationsError> {
        boundary::load_increment_apply(
            self,
            registry,
            boundary_conditions,
            iteration,
            maximum_iterations,
        )
    }

    /// Fills boundary-condition values from the analytic solution selected
    /// at analytic creation.
    pub fn boundary_conditions_analytic(
        &mut self,
        registry: &KernelRegistry<T>,
    ) -> Result<(), EquationsError> {
        let kernel = self.resolve_kernel(registry)?;
        let analytic = self
            .analytic
            .as_ref()
            .ok_or(EquationsError::NotAssociated("analytic"))?;
        let function_type = analytic.function_type;
        let geometry = &self.geometry;
        let dependent = self
            .dependent
            .as_mut()
            .map(EquationsSetField::field_mut)
            .ok_or(EquationsError::NotAssociated("dependent field"))?;
        kernel.analytic_boundary_conditions(geometry, dependent, function_type)
    }
}
