//! Error taxonomy for equations-set operations.

use crate::field::Interpolation;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Errors raised by equations-set operations.
///
/// Every operation is a single synchronous call that either completes fully
/// or fails with one of these kinds; there is no partial success and no
/// automatic retry. Messages name the failing entity and echo offending
/// numeric values where applicable.
#[derive(Debug)]
pub enum EquationsError {
    /// A required reference is not set.
    NotAssociated(&'static str),
    /// A lifecycle object was mutated after it had been finished.
    AlreadyFinished(&'static str),
    /// An operation required a finished object that has not been finished.
    NotFinished(&'static str),
    /// A valid but unsupported combination of class/type/linearity/
    /// time-dependence/solution-method/storage/interpolation was requested.
    NotImplemented(String),
    /// The equations-set specification has not been allocated.
    SpecificationNotAllocated,
    /// A specification entry is out of range.
    InvalidSpecification(String),
    /// An out-of-range value or index.
    InvalidValue(String),
    /// Cross-referenced objects were created on incompatible regions.
    RegionMismatch { expected: u32, found: u32 },
    /// Cross-referenced objects were created on incompatible decompositions.
    DecompositionMismatch { expected: u32, found: u32 },
    /// An interpolation type the finite-difference engine cannot perturb.
    UnsupportedInterpolation(Interpolation),
    /// A caller-supplied buffer was too small.
    BufferTooSmall { required: usize, actual: usize },
    /// An element kernel failed.
    Kernel(eyre::Report),
}

impl EquationsError {
    /// Convenience constructor for [`EquationsError::NotImplemented`].
    pub fn not_implemented(message: impl Into<String>) -> Self {
        EquationsError::NotImplemented(message.into())
    }

    /// Convenience constructor for [`EquationsError::InvalidValue`].
    pub fn invalid_value(message: impl Into<String>) -> Self {
        EquationsError::InvalidValue(message.into())
    }
}

impl Display for EquationsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            EquationsError::NotAssociated(entity) => {
                write!(f, "The {} is not associated.", entity)
            }
            EquationsError::AlreadyFinished(entity) => {
                write!(f, "The {} has already been finished.", entity)
            }
            EquationsError::NotFinished(entity) => {
                write!(f, "The {} has not been finished.", entity)
            }
            EquationsError::NotImplemented(message) => write!(f, "{}", message),
            EquationsError::SpecificationNotAllocated => {
                write!(f, "The equations set specification is not allocated.")
            }
            EquationsError::InvalidSpecification(message) => write!(f, "{}", message),
            EquationsError::InvalidValue(message) => write!(f, "{}", message),
            EquationsError::RegionMismatch { expected, found } => {
                write!(
                    f,
                    "The object belongs to region {} but region {} was expected.",
                    found, expected
                )
            }
            EquationsError::DecompositionMismatch { expected, found } => {
                write!(
                    f,
                    "The object belongs to decomposition {} but decomposition {} was expected.",
                    found, expected
                )
            }
            EquationsError::UnsupportedInterpolation(interpolation) => {
                write!(
                    f,
                    "The interpolation type {:?} cannot be perturbed for finite differencing.",
                    interpolation
                )
            }
            EquationsError::BufferTooSmall { required, actual } => {
                write!(
                    f,
                    "The supplied buffer of size {} is too small; {} entries are required.",
                    actual, required
                )
            }
            EquationsError::Kernel(report) => {
                write!(f, "Element kernel failure: {}", report)
            }
        }
    }
}

impl Error for EquationsError {}

impl From<eyre::Report> for EquationsError {
    fn from(report: eyre::Report) -> Self {
        // Kernels raise typed errors (for example NotImplemented for an
        // unsupported operation) through eyre reports; recover them so the
        // taxonomy survives the kernel seam.
        match report.downcast::<EquationsError>() {
            Ok(error) => error,
            Err(report) => EquationsError::Kernel(report),
        }
    }
}
