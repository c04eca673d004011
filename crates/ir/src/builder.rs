//! Kernel function builder.

use super::{
    BinOp, Function, Immediate, InstId, InstKind, Instruction, MemRefType, RegionId, ScalarType,
    Type, Value, ValueId,
};

/// A builder for constructing kernel functions.
///
/// Instructions are appended to the current region, which starts as the function body.
pub struct FunctionBuilder<'a> {
    /// The function being built.
    func: &'a mut Function,
    /// The region new instructions are appended to.
    current_region: RegionId,
}

impl<'a> FunctionBuilder<'a> {
    /// Creates a new function builder positioned at the end of the function body.
    pub fn new(func: &'a mut Function) -> Self {
        let body = func.body;
        Self { func, current_region: body }
    }

    /// Returns the function being built.
    #[must_use]
    pub fn func(&self) -> &Function {
        self.func
    }

    /// Returns the current region.
    #[must_use]
    pub const fn current_region(&self) -> RegionId {
        self.current_region
    }

    /// Switches to a different region.
    pub fn switch_to_region(&mut self, region: RegionId) {
        self.current_region = region;
    }

    /// Switches back to the function body.
    pub fn switch_to_body(&mut self) {
        self.current_region = self.func.body;
    }

    /// Creates a new empty region.
    pub fn create_region(&mut self) -> RegionId {
        self.func.alloc_region()
    }

    /// Adds a parameter to the function.
    pub fn add_param(&mut self, ty: Type) -> ValueId {
        let index = self.func.params.len() as u32;
        self.func.params.push(ty.clone());
        self.func.alloc_value(Value::Arg { index, ty })
    }

    /// Creates an index immediate.
    pub fn imm_index(&mut self, value: u64) -> ValueId {
        self.func.alloc_value(Value::Immediate(Immediate::Index(value)))
    }

    /// Creates an integer immediate of the given type.
    pub fn imm_int(&mut self, value: i64, ty: ScalarType) -> ValueId {
        self.func.alloc_value(Value::Immediate(Immediate::Int(value, ty)))
    }

    /// Creates a boolean immediate.
    pub fn imm_bool(&mut self, value: bool) -> ValueId {
        self.func.alloc_value(Value::Immediate(Immediate::Bool(value)))
    }

    fn emit(&mut self, kind: InstKind, result_ty: Option<Type>) -> InstId {
        let inst = self.func.alloc_inst(Instruction::new(kind, result_ty));
        self.func.regions[self.current_region].insts.push(inst);
        inst
    }

    fn emit_value(&mut self, kind: InstKind, result_ty: Type) -> ValueId {
        let inst = self.emit(kind, None);
        let value = self.func.alloc_value(Value::Inst(inst));
        let inst = &mut self.func.instructions[inst];
        inst.result_ty = Some(result_ty);
        inst.result = Some(value);
        value
    }

    fn elem_type(&self, memref: ValueId) -> ScalarType {
        self.func
            .value_type(memref)
            .and_then(|ty| ty.as_memref().map(|m| m.elem))
            .unwrap_or(ScalarType::I8)
    }

    /// Emits a buffer declaration.
    pub fn alloc(&mut self, ty: MemRefType) -> ValueId {
        self.emit_value(InstKind::Alloc(ty.clone()), Type::MemRef(ty))
    }

    /// Emits a byte-offset view of a flat byte buffer.
    pub fn view(&mut self, source: ValueId, byte_offset: u64, ty: MemRefType) -> ValueId {
        self.emit_value(InstKind::View { source, byte_offset, ty: ty.clone() }, Type::MemRef(ty))
    }

    /// Emits a sub-block view of a buffer.
    pub fn subview(&mut self, source: ValueId, offsets: &[ValueId], ty: MemRefType) -> ValueId {
        let kind = InstKind::SubView { source, offsets: offsets.into(), ty: ty.clone() };
        self.emit_value(kind, Type::MemRef(ty))
    }

    /// Emits a reinterpretation of a buffer.
    pub fn reinterpret(&mut self, source: ValueId, ty: MemRefType) -> ValueId {
        self.emit_value(InstKind::Reinterpret { source, ty: ty.clone() }, Type::MemRef(ty))
    }

    /// Emits a buffer release.
    pub fn dealloc(&mut self, memref: ValueId) -> InstId {
        self.emit(InstKind::Dealloc(memref), None)
    }

    /// Emits an element load.
    pub fn load(&mut self, memref: ValueId, indices: &[ValueId]) -> ValueId {
        let elem = self.elem_type(memref);
        self.emit_value(InstKind::Load { memref, indices: indices.into() }, Type::Scalar(elem))
    }

    /// Emits an element store.
    pub fn store(&mut self, value: ValueId, memref: ValueId, indices: &[ValueId]) -> InstId {
        self.emit(InstKind::Store { value, memref, indices: indices.into() }, None)
    }

    /// Emits an asynchronous copy and returns its token.
    pub fn async_copy(
        &mut self,
        dst: ValueId,
        dst_indices: &[ValueId],
        src: ValueId,
        src_indices: &[ValueId],
        elements: u32,
    ) -> ValueId {
        let kind = InstKind::AsyncCopy {
            dst,
            dst_indices: dst_indices.into(),
            src,
            src_indices: src_indices.into(),
            elements,
        };
        self.emit_value(kind, Type::Token)
    }

    /// Emits an async group commit and returns the group token.
    pub fn async_commit(&mut self, tokens: &[ValueId]) -> ValueId {
        self.emit_value(InstKind::AsyncCommit(tokens.into()), Type::Token)
    }

    /// Emits a wait on an async token.
    pub fn async_wait(&mut self, token: ValueId) -> InstId {
        self.emit(InstKind::AsyncWait(token), None)
    }

    /// Emits a workgroup barrier.
    pub fn barrier(&mut self) -> InstId {
        self.emit(InstKind::Barrier, None)
    }

    /// Emits a thread index query.
    pub fn thread_id(&mut self, axis: u8) -> ValueId {
        self.emit_value(InstKind::ThreadId(axis), Type::index())
    }

    /// Emits a binary scalar operation.
    pub fn binary(&mut self, op: BinOp, a: ValueId, b: ValueId) -> ValueId {
        let ty = match op {
            BinOp::Lt | BinOp::Eq => Type::Scalar(ScalarType::I1),
            _ => self.func.value_type(a).map_or_else(Type::index, |ty| ty.into_owned()),
        };
        self.emit_value(InstKind::Binary(op, a, b), ty)
    }

    /// Emits an add instruction.
    pub fn add(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(BinOp::Add, a, b)
    }

    /// Emits a mul instruction.
    pub fn mul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(BinOp::Mul, a, b)
    }

    /// Emits a less-than comparison.
    pub fn lt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(BinOp::Lt, a, b)
    }

    /// Emits a call to an external function.
    pub fn call(&mut self, callee: impl Into<String>, args: &[ValueId]) -> InstId {
        self.emit(InstKind::Call { callee: callee.into(), args: args.into() }, None)
    }

    /// Emits an operation with unknown semantics.
    pub fn opaque(
        &mut self,
        name: impl Into<String>,
        operands: &[ValueId],
        result_ty: Option<Type>,
    ) -> InstId {
        self.emit(InstKind::Opaque { name: name.into(), operands: operands.into() }, result_ty)
    }

    /// Emits a conditional over two existing regions.
    pub fn if_(&mut self, cond: ValueId, then_region: RegionId, else_region: RegionId) -> InstId {
        self.emit(InstKind::If { cond, then_region, else_region }, None)
    }

    /// Emits a counted loop over an existing body region.
    ///
    /// Returns the loop instruction and its induction variable.
    pub fn for_(
        &mut self,
        lower: ValueId,
        upper: ValueId,
        step: ValueId,
        body: RegionId,
    ) -> (InstId, ValueId) {
        let inst = InstId::from_usize(self.func.instructions.len());
        let iv = self.func.alloc_value(Value::InductionVar(inst));
        let emitted = self.emit(InstKind::For { iv, lower, upper, step, body }, None);
        debug_assert_eq!(inst, emitted);
        (emitted, iv)
    }

    /// Emits a return.
    pub fn ret(&mut self, values: &[ValueId]) -> InstId {
        self.emit(InstKind::Return(values.into()), None)
    }
}
