//! Kernel IR type system.

use smallvec::SmallVec;
use std::fmt;

/// Scalar element types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 1-bit boolean, stored as a byte.
    I1,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
    /// Target-sized index integer.
    Index,
}

impl ScalarType {
    /// Returns the storage size in bytes of one element.
    #[must_use]
    pub const fn byte_width(self) -> u64 {
        match self {
            Self::I1 | Self::I8 => 1,
            Self::I16 | Self::F16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 | Self::Index => 8,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I1 => "i1",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Index => "index",
        })
    }
}

/// A memory buffer dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Statically known extent.
    Fixed(u64),
    /// Extent only known at runtime.
    Dynamic,
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Dynamic => f.write_str("?"),
        }
    }
}

/// The address space a buffer lives in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    /// Device memory visible to every workgroup.
    #[default]
    Global,
    /// On-chip memory shared by the threads of one workgroup.
    Workgroup,
    /// Per-thread memory.
    Private,
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "global",
            Self::Workgroup => "workgroup",
            Self::Private => "private",
        })
    }
}

/// A shaped, typed memory buffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemRefType {
    /// Element type.
    pub elem: ScalarType,
    /// Dimensions, outermost first.
    pub shape: SmallVec<[Dim; 4]>,
    /// Address space.
    pub space: MemorySpace,
    /// Explicit alignment in bytes. Defaults to the element width.
    pub alignment: Option<u64>,
}

impl MemRefType {
    /// Creates a statically shaped buffer type.
    #[must_use]
    pub fn new(elem: ScalarType, shape: &[u64], space: MemorySpace) -> Self {
        Self { elem, shape: shape.iter().map(|&n| Dim::Fixed(n)).collect(), space, alignment: None }
    }

    /// Creates a flat byte buffer of `size` bytes.
    #[must_use]
    pub fn bytes(size: u64, space: MemorySpace, alignment: u64) -> Self {
        Self { alignment: Some(alignment), ..Self::new(ScalarType::I8, &[size], space) }
    }

    /// Sets an explicit alignment.
    #[must_use]
    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Returns true if every dimension is statically known.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.shape.iter().all(|d| matches!(d, Dim::Fixed(_)))
    }

    /// Returns the number of elements, if statically known.
    #[must_use]
    pub fn num_elements(&self) -> Option<u64> {
        self.shape.iter().try_fold(1u64, |acc, d| match d {
            Dim::Fixed(n) => acc.checked_mul(*n),
            Dim::Dynamic => None,
        })
    }

    /// Returns the size in bytes, if statically known.
    #[must_use]
    pub fn byte_size(&self) -> Option<u64> {
        self.num_elements()?.checked_mul(self.elem.byte_width())
    }

    /// Returns the required alignment in bytes.
    #[must_use]
    pub fn alignment(&self) -> u64 {
        self.alignment.unwrap_or_else(|| self.elem.byte_width())
    }
}

impl fmt::Display for MemRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memref<")?;
        for dim in &self.shape {
            write!(f, "{dim}x")?;
        }
        write!(f, "{}, {}", self.elem, self.space)?;
        if let Some(align) = self.alignment {
            write!(f, ", align {align}")?;
        }
        f.write_str(">")
    }
}

/// Types used in the kernel IR.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// A scalar value.
    Scalar(ScalarType),
    /// A memory buffer reference.
    MemRef(MemRefType),
    /// Completion token of an asynchronous operation.
    Token,
}

impl Type {
    /// Returns the index type.
    #[must_use]
    pub const fn index() -> Self {
        Self::Scalar(ScalarType::Index)
    }

    /// Returns the buffer type, if this is one.
    #[must_use]
    pub const fn as_memref(&self) -> Option<&MemRefType> {
        match self {
            Self::MemRef(ty) => Some(ty),
            _ => None,
        }
    }

    /// Returns true if values of this type reference memory.
    #[must_use]
    pub const fn is_memref(&self) -> bool {
        matches!(self, Self::MemRef(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(ty) => write!(f, "{ty}"),
            Self::MemRef(ty) => write!(f, "{ty}"),
            Self::Token => f.write_str("token"),
        }
    }
}
