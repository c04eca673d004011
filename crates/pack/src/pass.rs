//! The shared-memory packing stage.

use crate::{
    ConflictGraph, Liveness, PackError, assign_offsets, collect, plan_barriers, rewrite,
    top_level_barriers,
};
use smempack_config::{PackOptions, SyncPolicy};
use smempack_ir::{Function, ValueId};
use std::fmt;

/// Statistics of a successful packing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackStats {
    /// Number of workgroup allocations found.
    pub candidates: usize,
    /// Number of allocations left with their own storage.
    pub excluded: usize,
    /// Number of conflicting pairs.
    pub conflicts: usize,
    /// Total size of the packed allocations before packing.
    pub unpacked_size: u64,
    /// Size of the packed buffer.
    pub packed_size: u64,
    /// Largest total size of packed allocations live at once.
    pub max_live_weight: u64,
    /// Offset of each packed allocation, in declaration order.
    pub offsets: Vec<(ValueId, u64)>,
    /// Number of barriers inserted.
    pub barriers_inserted: usize,
}

impl PackStats {
    /// Returns the number of bytes saved.
    pub fn saved(&self) -> u64 {
        self.unpacked_size - self.packed_size
    }
}

/// Why a function was left unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer than two allocations can be packed.
    TooFewCandidates { packable: usize },
    /// Packing would not shrink the footprint.
    NoSavings { packed: u64, unpacked: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewCandidates { packable } => {
                write!(f, "{packable} packable allocation(s), nothing to share")
            }
            Self::NoSavings { packed, unpacked } => {
                write!(f, "packing needs {packed} bytes, no less than the {unpacked} bytes unpacked")
            }
        }
    }
}

/// Result of running the stage on one function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackOutcome {
    /// The function was rewritten.
    Packed(PackStats),
    /// The function was left unchanged.
    Unchanged(SkipReason),
}

impl PackOutcome {
    /// Returns true if the function was rewritten.
    pub const fn is_packed(&self) -> bool {
        matches!(self, Self::Packed(_))
    }

    /// Returns the statistics, if the function was rewritten.
    pub const fn stats(&self) -> Option<&PackStats> {
        match self {
            Self::Packed(stats) => Some(stats),
            Self::Unchanged(_) => None,
        }
    }
}

/// Packs the workgroup allocations of `func` into a single buffer.
///
/// Lifetime-disjoint allocations share bytes; allocations that are live at the same time, or that
/// might be accessed concurrently by different threads, never do. Allocations that cannot be
/// analyzed keep their own storage. The function is only modified on [`PackOutcome::Packed`].
///
/// The result is deterministic and idempotent: packing an already packed function leaves it
/// unchanged.
#[instrument(name = "pack_shared_memory", level = "debug", skip_all, fields(func = %func.name))]
pub fn pack_shared_memory(
    func: &mut Function,
    opts: &PackOptions,
) -> Result<PackOutcome, PackError> {
    let layout = func.layout();
    let candidates = collect(func, &layout);
    let liveness = Liveness::compute(func, &layout, &candidates);

    let packable = liveness.packable().count();
    if packable < 2 {
        let reason = SkipReason::TooFewCandidates { packable };
        debug!(%reason, "skipping");
        return Ok(PackOutcome::Unchanged(reason));
    }

    let barriers = top_level_barriers(func, &layout);
    let graph = ConflictGraph::build(&candidates, &liveness, &barriers, opts.sync_policy);
    let assignment = assign_offsets(&candidates, &graph)?;
    if opts.verify() {
        assignment.verify(&candidates, &graph)?;
    }

    let unpacked_size = graph
        .nodes()
        .iter()
        .fold(0u64, |total, &id| total.saturating_add(candidates.allocs[id].size));
    if assignment.size >= unpacked_size {
        let reason = SkipReason::NoSavings { packed: assignment.size, unpacked: unpacked_size };
        debug!(%reason, "skipping");
        return Ok(PackOutcome::Unchanged(reason));
    }

    let inserted = match opts.sync_policy {
        SyncPolicy::Conservative => Vec::new(),
        SyncPolicy::InsertBarriers => {
            plan_barriers(&candidates, &liveness, &assignment, &layout, &barriers)
        }
    };
    rewrite(func, &candidates, &assignment, &inserted)?;

    let stats = PackStats {
        candidates: candidates.allocs.len(),
        excluded: candidates.allocs.len() - packable,
        conflicts: graph.edge_count(),
        unpacked_size,
        packed_size: assignment.size,
        max_live_weight: graph.max_live_weight(),
        offsets: assignment
            .iter()
            .map(|(id, offset)| (candidates.allocs[id].value, offset))
            .collect(),
        barriers_inserted: inserted.len(),
    };
    if let Some(limit) = opts.shared_memory_limit.filter(|&limit| stats.packed_size > limit) {
        warn!(packed = stats.packed_size, limit, "packed shared memory exceeds the workgroup limit");
    }
    debug!(
        packed = stats.packed_size,
        unpacked = stats.unpacked_size,
        barriers = stats.barriers_inserted,
        "packed shared memory"
    );
    Ok(PackOutcome::Packed(stats))
}
