//! The physics dispatch table.
//!
//! Maps an equations-set specification to the kernel implementing its
//! physics. The registry is stateless pure routing: which class/type pairs
//! are wired to which kernel is exactly what `register`/`register_type`
//! were called with.

use crate::error::EquationsError;
use crate::kernel::PhysicsKernel;
use crate::specification::{EquationsClass, Specification};
use crate::Real;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DispatchKey {
    class: EquationsClass,
    equation_type: Option<i32>,
}

/// Registry mapping (class, type) dispatch keys to physics kernels.
#[derive(Debug)]
pub struct KernelRegistry<T: Real> {
    kernels: FxHashMap<DispatchKey, Arc<dyn PhysicsKernel<T>>>,
}

impl<T: Real> Default for KernelRegistry<T> {
    fn default() -> Self {
        KernelRegistry {
            kernels: FxHashMap::default(),
        }
    }
}

impl<T: Real> KernelRegistry<T> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a kernel for every equation type of a class that has no
    /// more specific entry.
    pub fn register(&mut self, class: EquationsClass, kernel: Arc<dyn PhysicsKernel<T>>) {
        self.kernels.insert(
            DispatchKey {
                class,
                equation_type: None,
            },
            kernel,
        );
    }

    /// Registers a kernel for one (class, equation type) pair. Type-level
    /// entries take precedence over class-level entries.
    pub fn register_type(
        &mut self,
        class: EquationsClass,
        equation_type: i32,
        kernel: Arc<dyn PhysicsKernel<T>>,
    ) {
        self.kernels.insert(
            DispatchKey {
                class,
                equation_type: Some(equation_type),
            },
            kernel,
        );
    }

    pub fn is_registered(&self, class: EquationsClass, equation_type: Option<i32>) -> bool {
        self.kernels.contains_key(&DispatchKey {
            class,
            equation_type,
        })
    }

    /// Resolves a specification to exactly one kernel.
    ///
    /// The class entry is parsed first (unknown classes fail with an
    /// invalid-specification error echoing the integer); a type-refined
    /// registration wins over the class-level registration; an unregistered
    /// combination fails with a not-implemented error naming it.
    pub fn resolve(
        &self,
        specification: &Specification,
    ) -> Result<Arc<dyn PhysicsKernel<T>>, EquationsError> {
        let class = specification.class()?;
        if let Some(equation_type) = specification.equation_type() {
            if let Some(kernel) = self.kernels.get(&DispatchKey {
                class,
                equation_type: Some(equation_type),
            }) {
                return Ok(Arc::clone(kernel));
            }
        }
        self.kernels
            .get(&DispatchKey {
                class,
                equation_type: None,
            })
            .map(Arc::clone)
            .ok_or_else(|| match specification.equation_type() {
                Some(equation_type) => EquationsError::not_implemented(format!(
                    "Equations of class {:?} with equation type {} are not implemented.",
                    class, equation_type
                )),
                None => EquationsError::not_implemented(format!(
                    "Equations of class {:?} are not implemented.",
                    class
                )),
            })
    }
}
