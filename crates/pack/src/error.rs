use smempack_ir::ValueId;

/// Why an allocation cannot take part in packing.
///
/// These are local outcomes: the allocation keeps its own storage and the stage proceeds.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Unanalyzable {
    #[error("size is not statically known")]
    DynamicSize,
    #[error("declared inside a nested region")]
    NestedDeclaration,
    #[error("passed to opaque call @{callee}")]
    PassedToCall { callee: String },
    #[error("escapes the kernel")]
    Escapes,
    #[error("aliased by the result of {op:?}")]
    UntrackedAlias { op: String },
    #[error("used by an instruction outside the function body")]
    UnplacedUse,
    #[error("{size} bytes do not fit in the packed buffer")]
    SizeOverflow { size: u64 },
}

/// Errors that abort packing of one function. The function is left unmodified.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Two conflicting allocations were assigned overlapping bytes. This is a bug.
    #[error(
        "conflicting allocations %{first} (offset {first_offset}, {first_size} bytes) and \
         %{second} (offset {second_offset}, {second_size} bytes) overlap"
    )]
    ConflictAssignmentViolation {
        first: ValueId,
        first_offset: u64,
        first_size: u64,
        second: ValueId,
        second_offset: u64,
        second_size: u64,
    },
    /// An allocation was assigned an offset violating its alignment. This is a bug.
    #[error("allocation %{value} at offset {offset} violates its {alignment}-byte alignment")]
    MisalignedOffset { value: ValueId, offset: u64, alignment: u64 },
    /// A packable allocation was not assigned an offset. This is a bug.
    #[error("allocation %{value} was not assigned an offset")]
    MissingOffset { value: ValueId },
    /// The packed buffer size or alignment does not fit in 64 bits.
    #[error("placing allocation %{value} overflows the packed buffer size")]
    SizeOverflow { value: ValueId },
    /// The function no longer matches the analysis it was packed with.
    #[error("cannot rewrite allocation %{value}: {reason}")]
    Rewrite { value: ValueId, reason: &'static str },
}
