//! Structured kernel intermediate representation.
//!
//! Kernels are SSA functions whose body is a single region of instructions. Control flow is
//! structured: `if` and `for` instructions own nested regions instead of branching between
//! basic blocks, so every region-holding instruction bounds a contiguous span of program
//! points.

#![cfg_attr(docsrs, feature(doc_cfg))]

use smempack_data_structures::newtype_index;

mod types;
pub use types::{Dim, MemRefType, MemorySpace, ScalarType, Type};

mod value;
pub use value::{Immediate, Value};

mod inst;
pub use inst::{BinOp, InstKind, Instruction};

mod region;
pub use region::Region;

mod function;
pub use function::Function;

mod module;
pub use module::Module;

mod layout;
pub use layout::{Layout, ProgramPoint};

mod builder;
pub use builder::FunctionBuilder;

mod display;

newtype_index! {
    /// A unique identifier for a value in a function.
    pub struct ValueId;
}

newtype_index! {
    /// A unique identifier for an instruction in a function.
    pub struct InstId;
}

newtype_index! {
    /// A unique identifier for a region in a function.
    pub struct RegionId;
}

newtype_index! {
    /// A unique identifier for a function in a module.
    pub struct FunctionId;
}
