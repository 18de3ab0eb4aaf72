//! Equations-set specifications: the ordered integer tuple that selects the
//! physics of an equations set, and the solution methods it may request.

use crate::error::EquationsError;
use serde::{Deserialize, Serialize};

/// Equation classes addressable by the first specification entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquationsClass {
    Elasticity,
    FluidMechanics,
    Electromagnetics,
    ClassicalField,
    Bioelectrics,
    Modal,
    Fitting,
    MultiPhysics,
    Optimisation,
}

impl EquationsClass {
    /// Parses the first specification entry into an equations class.
    pub fn from_specification(value: i32) -> Result<Self, EquationsError> {
        match value {
            classes::ELASTICITY => Ok(EquationsClass::Elasticity),
            classes::FLUID_MECHANICS => Ok(EquationsClass::FluidMechanics),
            classes::ELECTROMAGNETICS => Ok(EquationsClass::Electromagnetics),
            classes::CLASSICAL_FIELD => Ok(EquationsClass::ClassicalField),
            classes::BIOELECTRICS => Ok(EquationsClass::Bioelectrics),
            classes::MODAL => Ok(EquationsClass::Modal),
            classes::FITTING => Ok(EquationsClass::Fitting),
            classes::MULTI_PHYSICS => Ok(EquationsClass::MultiPhysics),
            classes::OPTIMISATION => Ok(EquationsClass::Optimisation),
            other => Err(EquationsError::InvalidSpecification(format!(
                "The equations set class of {} is invalid.",
                other
            ))),
        }
    }

    /// The numeric code of this class as it appears in specifications.
    pub fn code(&self) -> i32 {
        match self {
            EquationsClass::Elasticity => classes::ELASTICITY,
            EquationsClass::FluidMechanics => classes::FLUID_MECHANICS,
            EquationsClass::Electromagnetics => classes::ELECTROMAGNETICS,
            EquationsClass::ClassicalField => classes::CLASSICAL_FIELD,
            EquationsClass::Bioelectrics => classes::BIOELECTRICS,
            EquationsClass::Modal => classes::MODAL,
            EquationsClass::Fitting => classes::FITTING,
            EquationsClass::MultiPhysics => classes::MULTI_PHYSICS,
            EquationsClass::Optimisation => classes::OPTIMISATION,
        }
    }
}

/// Numeric class codes used in the first specification entry.
pub mod classes {
    pub const ELASTICITY: i32 = 1;
    pub const FLUID_MECHANICS: i32 = 2;
    pub const ELECTROMAGNETICS: i32 = 3;
    pub const CLASSICAL_FIELD: i32 = 4;
    pub const BIOELECTRICS: i32 = 5;
    pub const MODAL: i32 = 6;
    pub const FITTING: i32 = 7;
    pub const MULTI_PHYSICS: i32 = 8;
    pub const OPTIMISATION: i32 = 9;
}

/// Class-specific equation-type codes used in the second specification
/// entry. These are dispatch keys; the physics behind them lives in the
/// registered kernels.
pub mod types {
    /// Elasticity class.
    pub const LINEAR_ELASTICITY: i32 = 1;
    pub const FINITE_ELASTICITY: i32 = 2;

    /// Classical field class.
    pub const LAPLACE_EQUATION: i32 = 1;
    pub const POISSON_EQUATION: i32 = 2;
    pub const DIFFUSION_EQUATION: i32 = 3;

    /// Bioelectrics class.
    pub const MONODOMAIN_EQUATION: i32 = 1;
    pub const MONODOMAIN_STRANG_SPLITTING: i32 = 2;

    /// Fluid mechanics class.
    pub const STOKES_EQUATION: i32 = 1;
    pub const NAVIER_STOKES_EQUATION: i32 = 2;
}

/// Solution methods an equations set may request.
///
/// Only the finite element method is generally implemented; the nodal
/// method is implemented for static nonlinear evaluation. The remaining
/// methods exist so that specifications naming them fail with a
/// not-implemented error rather than an invalid-value error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionMethod {
    FiniteElement,
    Nodal,
    BoundaryElement,
    FiniteDifference,
    FiniteVolume,
    GeneralisedFiniteElement,
    GeneralisedFiniteVolume,
}

/// A validated equations-set specification tuple.
///
/// The tuple is ordered (class, type, subtype, ...) with at least one entry;
/// the class entry is validated at construction so that dispatch never sees
/// an unparseable specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    entries: Vec<i32>,
}

impl Specification {
    /// Validates and wraps a raw specification.
    ///
    /// An empty slice is the "specification not allocated" hard error; a
    /// first entry that is not a known class code is an invalid
    /// specification.
    pub fn new(entries: &[i32]) -> Result<Self, EquationsError> {
        if entries.is_empty() {
            return Err(EquationsError::SpecificationNotAllocated);
        }
        EquationsClass::from_specification(entries[0])?;
        Ok(Specification {
            entries: entries.to_vec(),
        })
    }

    /// The equations class selected by the first entry.
    pub fn class(&self) -> Result<EquationsClass, EquationsError> {
        EquationsClass::from_specification(self.entries[0])
    }

    /// The class-specific equation type, if the specification has one.
    pub fn equation_type(&self) -> Option<i32> {
        self.entries.get(1).copied()
    }

    /// The type-specific subtype, if the specification has one.
    pub fn subtype(&self) -> Option<i32> {
        self.entries.get(2).copied()
    }

    pub fn entries(&self) -> &[i32] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the specification into a caller-supplied buffer.
    ///
    /// Fails with a buffer-too-small error naming the required size if the
    /// buffer cannot hold every entry.
    pub fn copy_to(&self, buffer: &mut [i32]) -> Result<(), EquationsError> {
        if buffer.len() < self.entries.len() {
            return Err(EquationsError::BufferTooSmall {
                required: self.entries.len(),
                actual: buffer.len(),
            });
        }
        buffer[..self.entries.len()].copy_from_slice(&self.entries);
        Ok(())
    }
}
