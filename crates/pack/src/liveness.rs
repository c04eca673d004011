//! Conservative live ranges of workgroup allocations.
//!
//! An allocation is live from its first use to its last use, both in program order. A use is any
//! placed instruction with an operand derived from the allocation; the declaration itself is not a
//! use. Uses nested inside `if` or `for` regions are widened to the whole span of their top-level
//! ancestor, which covers every loop iteration and both branches.

use crate::{AllocId, Candidates, Unanalyzable};
use smempack_data_structures::{index::IndexVec, map::FxHashSet};
use smempack_ir::{Function, InstKind, Layout, ProgramPoint, ValueId};
use std::fmt;

/// An inclusive interval of program points.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveRange {
    pub first: ProgramPoint,
    pub last: ProgramPoint,
}

impl fmt::Debug for LiveRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first, self.last)
    }
}

impl LiveRange {
    /// Creates a new range.
    #[inline]
    pub fn new(first: ProgramPoint, last: ProgramPoint) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    /// A range covering a single point.
    #[inline]
    pub fn point(point: ProgramPoint) -> Self {
        Self { first: point, last: point }
    }

    /// Returns true if the two ranges share a program point.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    /// Returns true if `point` is inside the range.
    #[inline]
    pub fn contains(&self, point: ProgramPoint) -> bool {
        self.first <= point && point <= self.last
    }

    fn extend(&mut self, first: ProgramPoint, last: ProgramPoint) {
        self.first = self.first.min(first);
        self.last = self.last.max(last);
    }
}

/// Liveness of a single allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocLiveness {
    /// The allocation may be packed.
    Live {
        range: LiveRange,
        /// A reference reached an operation whose memory effects are unknown. The allocation
        /// keeps its range but must not share bytes with any other allocation.
        unbounded: bool,
    },
    /// The allocation must keep its own storage.
    Excluded(Unanalyzable),
}

/// Liveness of every collected allocation.
#[derive(Clone, Debug, Default)]
pub struct Liveness {
    entries: IndexVec<AllocId, AllocLiveness>,
}

impl Liveness {
    /// Computes the live ranges of all allocations in `candidates`.
    ///
    /// Allocations excluded during collection stay excluded. Uses that cannot be bounded in
    /// program order exclude further allocations: a use outside the function body, or an
    /// operation producing a buffer from an allocation without being a known view.
    #[instrument(level = "debug", skip_all)]
    pub fn compute(func: &Function, layout: &Layout, candidates: &Candidates) -> Self {
        let n = candidates.allocs.len();
        let mut ranges: IndexVec<AllocId, Option<LiveRange>> = IndexVec::from_vec(vec![None; n]);
        let mut unbounded: IndexVec<AllocId, bool> = IndexVec::from_vec(vec![false; n]);
        let mut excluded: IndexVec<AllocId, Option<Unanalyzable>> =
            candidates.allocs.iter().map(|a| a.excluded.clone()).collect();
        let mut exclude = |id: AllocId, reason: Unanalyzable| {
            if excluded[id].is_none() {
                excluded[id] = Some(reason);
            }
        };

        let waited = waited_tokens(func, layout);
        let end = layout.len().checked_sub(1).map(ProgramPoint::from_usize);

        for (inst_id, inst) in func.instructions.iter_enumerated() {
            let touched = candidates.aliases.roots_of(&inst.operands());
            if touched.is_empty() {
                continue;
            }

            let Some(point) = layout.point(inst_id) else {
                for &id in &touched {
                    exclude(id, Unanalyzable::UnplacedUse);
                }
                continue;
            };
            let (first, mut last) = layout.span(layout.top_level(point));

            match &inst.kind {
                InstKind::Opaque { name, .. } => {
                    let yields_buffer = inst.result_ty.as_ref().is_some_and(|ty| ty.is_memref());
                    for &id in &touched {
                        if yields_buffer {
                            exclude(id, Unanalyzable::UntrackedAlias { op: name.clone() });
                        } else {
                            unbounded[id] = true;
                        }
                    }
                }
                // A copy that is never waited on may land at any later point.
                InstKind::AsyncCopy { .. } | InstKind::AsyncCommit(_)
                    if inst.result.is_none_or(|token| !waited.contains(&token)) =>
                {
                    if let Some(end) = end {
                        last = end;
                    }
                }
                _ => {}
            }

            for &id in &touched {
                match &mut ranges[id] {
                    Some(range) => range.extend(first, last),
                    slot @ None => *slot = Some(LiveRange::new(first, last)),
                }
            }
        }

        let entries: IndexVec<AllocId, AllocLiveness> = candidates
            .allocs
            .iter()
            .map(|alloc| match excluded[alloc.id].take() {
                Some(reason) => AllocLiveness::Excluded(reason),
                None => AllocLiveness::Live {
                    range: ranges[alloc.id].unwrap_or(LiveRange::point(alloc.decl)),
                    unbounded: unbounded[alloc.id],
                },
            })
            .collect();

        for (id, entry) in entries.iter_enumerated() {
            trace!(alloc = id.index(), ?entry, "liveness");
        }
        Self { entries }
    }

    /// Returns the liveness of an allocation.
    pub fn get(&self, id: AllocId) -> &AllocLiveness {
        &self.entries[id]
    }

    /// Returns the live range of a packable allocation.
    pub fn range(&self, id: AllocId) -> Option<LiveRange> {
        match self.entries[id] {
            AllocLiveness::Live { range, .. } => Some(range),
            AllocLiveness::Excluded(_) => None,
        }
    }

    /// Returns true if a packable allocation must not share bytes with anything.
    pub fn is_unbounded(&self, id: AllocId) -> bool {
        matches!(self.entries[id], AllocLiveness::Live { unbounded: true, .. })
    }

    /// Returns the reason an allocation was excluded, if it was.
    pub fn exclusion(&self, id: AllocId) -> Option<&Unanalyzable> {
        match &self.entries[id] {
            AllocLiveness::Excluded(reason) => Some(reason),
            AllocLiveness::Live { .. } => None,
        }
    }

    /// Iterates over packable allocations and their ranges, in declaration order.
    pub fn packable(&self) -> impl Iterator<Item = (AllocId, LiveRange)> + '_ {
        self.entries.iter_enumerated().filter_map(|(id, entry)| match entry {
            AllocLiveness::Live { range, .. } => Some((id, *range)),
            AllocLiveness::Excluded(_) => None,
        })
    }
}

/// Returns the async tokens that are transitively consumed by a placed wait.
fn waited_tokens(func: &Function, layout: &Layout) -> FxHashSet<ValueId> {
    let mut waited = FxHashSet::default();
    for (_, inst) in layout.iter() {
        if let InstKind::AsyncWait(token) = func.instruction(inst).kind {
            waited.insert(token);
        }
    }
    // Waiting on a group waits on every token committed into it.
    loop {
        let mut changed = false;
        for inst in func.instructions.iter() {
            let (InstKind::AsyncCommit(tokens), Some(group)) = (&inst.kind, inst.result) else {
                continue;
            };
            if waited.contains(&group) {
                for &token in tokens {
                    changed |= waited.insert(token);
                }
            }
        }
        if !changed {
            break;
        }
    }
    waited
}
