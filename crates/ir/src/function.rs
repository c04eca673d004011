//! Kernel IR functions.

use super::{InstId, Instruction, Layout, Region, RegionId, Type, Value, ValueId};
use smempack_data_structures::index::IndexVec;
use std::borrow::Cow;

/// A kernel function.
#[derive(Clone, Debug)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Parameter types.
    pub params: Vec<Type>,
    /// All values in this function.
    pub values: IndexVec<ValueId, Value>,
    /// All instructions in this function, including detached ones.
    pub instructions: IndexVec<InstId, Instruction>,
    /// All regions in this function.
    pub regions: IndexVec<RegionId, Region>,
    /// The top-level region.
    pub body: RegionId,
}

impl Function {
    /// Creates a new function with an empty body.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut regions = IndexVec::new();
        let body = regions.push(Region::new());
        Self {
            name: name.into(),
            params: Vec::new(),
            values: IndexVec::new(),
            instructions: IndexVec::new(),
            regions,
            body,
        }
    }

    /// Returns the value for the given ID.
    #[must_use]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    /// Returns the instruction for the given ID.
    #[must_use]
    pub fn instruction(&self, id: InstId) -> &Instruction {
        &self.instructions[id]
    }

    /// Returns a mutable reference to the instruction.
    pub fn instruction_mut(&mut self, id: InstId) -> &mut Instruction {
        &mut self.instructions[id]
    }

    /// Returns the region for the given ID.
    #[must_use]
    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id]
    }

    /// Returns a mutable reference to the region.
    pub fn region_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id]
    }

    /// Returns the top-level region.
    #[must_use]
    pub fn body(&self) -> &Region {
        &self.regions[self.body]
    }

    /// Allocates a new value.
    pub fn alloc_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    /// Allocates a new instruction, binding a result value if it has a result type.
    ///
    /// The instruction is not placed in any region.
    pub fn alloc_inst(&mut self, inst: Instruction) -> InstId {
        let has_result = inst.result_ty.is_some();
        let id = self.instructions.push(inst);
        if has_result {
            let value = self.values.push(Value::Inst(id));
            self.instructions[id].result = Some(value);
        }
        id
    }

    /// Allocates a new empty region.
    pub fn alloc_region(&mut self) -> RegionId {
        self.regions.push(Region::new())
    }

    /// Returns the type of a value.
    #[must_use]
    pub fn value_type(&self, id: ValueId) -> Option<Cow<'_, Type>> {
        match &self.values[id] {
            Value::Inst(inst) => self.instructions[*inst].result_ty.as_ref().map(Cow::Borrowed),
            Value::Arg { ty, .. } => Some(Cow::Borrowed(ty)),
            Value::InductionVar(_) => Some(Cow::Owned(Type::index())),
            Value::Immediate(imm) => Some(Cow::Owned(Type::Scalar(imm.ty()))),
        }
    }

    /// Returns the value defined by an instruction.
    #[must_use]
    pub fn result(&self, inst: InstId) -> Option<ValueId> {
        self.instructions[inst].result
    }

    /// Computes the program-point layout of this function.
    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout::compute(self)
    }
}
