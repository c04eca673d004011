//! Kernel IR values.

use super::{InstId, ScalarType, Type};
use std::fmt;

/// An SSA value.
#[derive(Clone, Debug)]
pub enum Value {
    /// Result of an instruction.
    Inst(InstId),
    /// Function argument.
    Arg {
        /// Argument index.
        index: u32,
        /// Argument type.
        ty: Type,
    },
    /// Induction variable of a `for` instruction.
    InductionVar(InstId),
    /// Immediate constant.
    Immediate(Immediate),
}

impl Value {
    /// Returns true if this is an immediate value.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate(_))
    }

    /// Returns this value as an immediate, if it is one.
    #[must_use]
    pub const fn as_immediate(&self) -> Option<&Immediate> {
        match self {
            Self::Immediate(imm) => Some(imm),
            _ => None,
        }
    }

    /// Returns the instruction defining this value, if any.
    #[must_use]
    pub const fn defining_inst(&self) -> Option<InstId> {
        match self {
            Self::Inst(id) => Some(*id),
            _ => None,
        }
    }
}

/// An immediate constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Immediate {
    Bool(bool),
    Int(i64, ScalarType),
    Index(u64),
}

impl Immediate {
    /// Returns the type of this immediate.
    #[must_use]
    pub const fn ty(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::I1,
            Self::Int(_, ty) => *ty,
            Self::Index(_) => ScalarType::Index,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v, _) => write!(f, "{v}"),
            Self::Index(v) => write!(f, "{v}"),
        }
    }
}
