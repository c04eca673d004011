//! Kernel IR instructions.

use super::{MemRefType, RegionId, Type, ValueId};
use smallvec::SmallVec;

/// An instruction in the kernel IR.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// The kind of instruction.
    pub kind: InstKind,
    /// The result type (if any).
    pub result_ty: Option<Type>,
    /// The value defined by this instruction (if any).
    pub result: Option<ValueId>,
}

impl Instruction {
    /// Creates a new instruction without a bound result value.
    #[must_use]
    pub const fn new(kind: InstKind, result_ty: Option<Type>) -> Self {
        Self { kind, result_ty, result: None }
    }

    /// Returns the operands of this instruction.
    #[must_use]
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        let mut out = SmallVec::new();
        self.kind.collect_operands(&mut out);
        out
    }
}

/// Binary scalar operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Eq,
}

impl BinOp {
    /// Returns the mnemonic for this operator.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::Lt => "lt",
            Self::Eq => "eq",
        }
    }
}

/// The kind of an instruction.
#[derive(Clone, Debug)]
pub enum InstKind {
    // Buffers
    /// Declares a new buffer: `alloc : memref<...>`
    Alloc(MemRefType),
    /// Reinterprets bytes of a flat byte buffer: `view %src[offset] : memref<...>`
    View {
        source: ValueId,
        byte_offset: u64,
        ty: MemRefType,
    },
    /// Selects a sub-block of a buffer: `subview %src[i, j] : memref<...>`
    SubView {
        source: ValueId,
        offsets: SmallVec<[ValueId; 4]>,
        ty: MemRefType,
    },
    /// Reinterprets a buffer with a new shape or element type.
    Reinterpret { source: ValueId, ty: MemRefType },
    /// Releases a buffer.
    Dealloc(ValueId),

    // Memory access
    /// Element load: `load %m[i, j]`
    Load {
        memref: ValueId,
        indices: SmallVec<[ValueId; 4]>,
    },
    /// Element store: `store %v, %m[i, j]`
    Store {
        value: ValueId,
        memref: ValueId,
        indices: SmallVec<[ValueId; 4]>,
    },

    // Asynchronous copies
    /// Issues a copy of `elements` elements from `src` to `dst` and yields a token.
    AsyncCopy {
        dst: ValueId,
        dst_indices: SmallVec<[ValueId; 4]>,
        src: ValueId,
        src_indices: SmallVec<[ValueId; 4]>,
        elements: u32,
    },
    /// Groups outstanding copy tokens into a single group token.
    AsyncCommit(SmallVec<[ValueId; 4]>),
    /// Blocks until the copies behind a token have landed.
    AsyncWait(ValueId),

    // Synchronization
    /// Workgroup-wide execution and memory barrier.
    Barrier,

    // Scalars
    /// Thread index along an axis of the workgroup.
    ThreadId(u8),
    /// Binary scalar operation.
    Binary(BinOp, ValueId, ValueId),

    // Calls
    /// Call to a function whose body is not visible.
    Call {
        callee: String,
        args: SmallVec<[ValueId; 4]>,
    },
    /// An operation with unknown semantics.
    Opaque {
        name: String,
        operands: SmallVec<[ValueId; 4]>,
    },

    // Structured control flow
    /// Conditional execution of one of two regions.
    If {
        cond: ValueId,
        then_region: RegionId,
        else_region: RegionId,
    },
    /// Counted loop: the body region runs for `lower..upper` by `step`, binding `iv`.
    For {
        iv: ValueId,
        lower: ValueId,
        upper: ValueId,
        step: ValueId,
        body: RegionId,
    },
    /// Returns from the kernel.
    Return(SmallVec<[ValueId; 2]>),
}

impl InstKind {
    /// Collects all operands of this instruction into the provided vector, in order.
    pub fn collect_operands(&self, out: &mut SmallVec<[ValueId; 4]>) {
        match self {
            Self::Alloc(_) | Self::Barrier | Self::ThreadId(_) => {}
            Self::View { source, .. } | Self::Reinterpret { source, .. } => out.push(*source),
            Self::SubView { source, offsets, .. } => {
                out.push(*source);
                out.extend_from_slice(offsets);
            }
            Self::Dealloc(v) | Self::AsyncWait(v) => out.push(*v),
            Self::Load { memref, indices } => {
                out.push(*memref);
                out.extend_from_slice(indices);
            }
            Self::Store { value, memref, indices } => {
                out.push(*value);
                out.push(*memref);
                out.extend_from_slice(indices);
            }
            Self::AsyncCopy { dst, dst_indices, src, src_indices, .. } => {
                out.push(*dst);
                out.extend_from_slice(dst_indices);
                out.push(*src);
                out.extend_from_slice(src_indices);
            }
            Self::AsyncCommit(tokens) => out.extend_from_slice(tokens),
            Self::Binary(_, a, b) => {
                out.push(*a);
                out.push(*b);
            }
            Self::Call { args: operands, .. } | Self::Opaque { operands, .. } => {
                out.extend_from_slice(operands);
            }
            Self::If { cond, .. } => out.push(*cond),
            Self::For { lower, upper, step, .. } => {
                out.push(*lower);
                out.push(*upper);
                out.push(*step);
            }
            Self::Return(values) => out.extend_from_slice(values),
        }
    }

    /// Returns the regions owned by this instruction.
    #[must_use]
    pub fn regions(&self) -> SmallVec<[RegionId; 2]> {
        match self {
            Self::If { then_region, else_region, .. } => {
                smallvec::smallvec![*then_region, *else_region]
            }
            Self::For { body, .. } => smallvec::smallvec![*body],
            _ => SmallVec::new(),
        }
    }

    /// Returns the buffer operand this instruction derives a new buffer reference from.
    #[must_use]
    pub const fn view_source(&self) -> Option<ValueId> {
        match self {
            Self::View { source, .. }
            | Self::SubView { source, .. }
            | Self::Reinterpret { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// Returns the mnemonic for this instruction.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Alloc(_) => "alloc",
            Self::View { .. } => "view",
            Self::SubView { .. } => "subview",
            Self::Reinterpret { .. } => "reinterpret",
            Self::Dealloc(_) => "dealloc",
            Self::Load { .. } => "load",
            Self::Store { .. } => "store",
            Self::AsyncCopy { .. } => "async_copy",
            Self::AsyncCommit(_) => "async_commit",
            Self::AsyncWait(_) => "async_wait",
            Self::Barrier => "barrier",
            Self::ThreadId(_) => "thread_id",
            Self::Binary(op, ..) => op.mnemonic(),
            Self::Call { .. } => "call",
            Self::Opaque { .. } => "opaque",
            Self::If { .. } => "if",
            Self::For { .. } => "for",
            Self::Return(_) => "return",
        }
    }
}
