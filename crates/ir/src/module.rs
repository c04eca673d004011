//! Kernel IR modules.

use super::{Function, FunctionId};
use smempack_data_structures::index::IndexVec;

/// A compilation unit holding a set of kernels.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Module name.
    pub name: String,
    /// All kernel functions.
    pub functions: IndexVec<FunctionId, Function>,
}

impl Module {
    /// Creates a new empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), functions: IndexVec::new() }
    }

    /// Adds a function to the module.
    pub fn add_function(&mut self, func: Function) -> FunctionId {
        self.functions.push(func)
    }

    /// Returns the function for the given ID.
    #[must_use]
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id]
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
