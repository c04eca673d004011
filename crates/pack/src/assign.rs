//! Greedy first-fit byte offset assignment.

use crate::{AllocId, Candidates, ConflictGraph, PackError};
use smempack_data_structures::index::IndexVec;
use std::cmp::Reverse;

/// Byte offsets of every packable allocation within the packed buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OffsetAssignment {
    offsets: IndexVec<AllocId, Option<u64>>,
    /// Total size of the packed buffer, a multiple of `alignment`.
    pub size: u64,
    /// Alignment of the packed buffer, a multiple of every packed allocation's alignment.
    pub alignment: u64,
}

impl OffsetAssignment {
    /// Returns the offset of an allocation, if it was packed.
    pub fn offset(&self, id: AllocId) -> Option<u64> {
        self.offsets.get(id).copied().flatten()
    }

    /// Iterates over packed allocations and their offsets, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (AllocId, u64)> + '_ {
        self.offsets.iter_enumerated().filter_map(|(id, offset)| Some((id, (*offset)?)))
    }

    /// Checks that conflicting allocations occupy disjoint bytes and every offset is aligned.
    pub fn verify(&self, candidates: &Candidates, graph: &ConflictGraph) -> Result<(), PackError> {
        for &a in graph.nodes() {
            let alloc = &candidates.allocs[a];
            let offset = self.offset(a).ok_or(PackError::MissingOffset { value: alloc.value })?;
            if offset % alloc.alignment != 0 {
                return Err(PackError::MisalignedOffset {
                    value: alloc.value,
                    offset,
                    alignment: alloc.alignment,
                });
            }
            for b in graph.neighbors(a).filter(|&b| b > a) {
                let other = &candidates.allocs[b];
                let other_offset =
                    self.offset(b).ok_or(PackError::MissingOffset { value: other.value })?;
                let disjoint = offset.saturating_add(alloc.size) <= other_offset
                    || other_offset.saturating_add(other.size) <= offset;
                if !disjoint {
                    return Err(PackError::ConflictAssignmentViolation {
                        first: alloc.value,
                        first_offset: offset,
                        first_size: alloc.size,
                        second: other.value,
                        second_offset: other_offset,
                        second_size: other.size,
                    });
                }
            }
        }
        Ok(())
    }
}

#[inline]
fn align_up(offset: u64, alignment: u64) -> Option<u64> {
    offset.div_ceil(alignment).checked_mul(alignment)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Assigns byte offsets to the nodes of `graph`.
///
/// Allocations are placed largest first, ties broken by earlier declaration. Each one takes the
/// lowest aligned offset that does not overlap an already placed neighbor. The result depends
/// only on the graph and the allocation sizes, never on hashing or iteration order.
#[instrument(level = "debug", skip_all)]
pub fn assign_offsets(
    candidates: &Candidates,
    graph: &ConflictGraph,
) -> Result<OffsetAssignment, PackError> {
    let mut order = graph.nodes().to_vec();
    order.sort_by_key(|&id| {
        let alloc = &candidates.allocs[id];
        (Reverse(alloc.size), alloc.decl, id)
    });

    let mut offsets: IndexVec<AllocId, Option<u64>> =
        IndexVec::from_vec(vec![None; candidates.allocs.len()]);
    let mut spans: IndexVec<AllocId, Option<(u64, u64)>> =
        IndexVec::from_vec(vec![None; candidates.allocs.len()]);
    let mut end = 0;
    let mut alignment = 1;
    let mut size = 0;
    let mut taken: Vec<(u64, u64)> = Vec::new();
    for id in order {
        let alloc = &candidates.allocs[id];
        let overflow = || PackError::SizeOverflow { value: alloc.value };

        taken.clear();
        taken.extend(graph.neighbors(id).filter_map(|n| spans[n]));
        taken.sort_unstable();

        let mut offset = 0u64;
        for &(start, stop) in &taken {
            if offset.checked_add(alloc.size).ok_or_else(overflow)? <= start {
                break;
            }
            if stop > offset {
                offset = align_up(stop, alloc.alignment).ok_or_else(overflow)?;
            }
        }
        let stop = offset.checked_add(alloc.size).ok_or_else(overflow)?;

        trace!(alloc = %alloc.value, size = alloc.size, offset, "placed");
        offsets[id] = Some(offset);
        spans[id] = Some((offset, stop));
        end = end.max(stop);
        alignment = (alignment / gcd(alignment, alloc.alignment))
            .checked_mul(alloc.alignment)
            .ok_or_else(overflow)?;
        size = align_up(end, alignment).ok_or_else(overflow)?;
    }

    Ok(OffsetAssignment { offsets, size, alignment })
}
