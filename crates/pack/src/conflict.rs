//! The interference graph between packable allocations.

use crate::{AllocId, Candidates, LiveRange, Liveness};
use smempack_config::SyncPolicy;
use smempack_data_structures::{bit_set::BitSet, index::IndexVec};
use smempack_ir::{Function, InstKind, Layout, ProgramPoint};

/// Returns the program points of barriers placed directly in the function body, in order.
pub fn top_level_barriers(func: &Function, layout: &Layout) -> Vec<ProgramPoint> {
    layout
        .iter()
        .filter(|&(point, inst)| {
            layout.is_top_level(point) && matches!(func.instruction(inst).kind, InstKind::Barrier)
        })
        .map(|(point, _)| point)
        .collect()
}

/// Returns true if some barrier lies strictly between `earlier.last` and `later.first`.
pub(crate) fn separated(barriers: &[ProgramPoint], earlier: LiveRange, later: LiveRange) -> bool {
    let next = barriers.partition_point(|&b| b <= earlier.last);
    barriers.get(next).is_some_and(|&b| b < later.first)
}

/// Pairs of allocations that must not share bytes.
///
/// Two allocations conflict when their live ranges overlap, when either reaches an operation with
/// unknown memory effects, or, under [`SyncPolicy::Conservative`], when nothing orders the last
/// access of one before the first access of the other across threads.
#[derive(Clone, Debug, Default)]
pub struct ConflictGraph {
    /// Packable allocations, in declaration order.
    nodes: Vec<AllocId>,
    adjacency: IndexVec<AllocId, BitSet<AllocId>>,
    edges: usize,
    max_live_weight: u64,
}

impl ConflictGraph {
    /// Builds the conflict graph of the packable allocations in `liveness`.
    #[instrument(level = "debug", skip_all)]
    pub fn build(
        candidates: &Candidates,
        liveness: &Liveness,
        barriers: &[ProgramPoint],
        policy: SyncPolicy,
    ) -> Self {
        let n = candidates.allocs.len();
        let nodes: Vec<(AllocId, LiveRange)> = liveness.packable().collect();
        let mut adjacency = IndexVec::from_vec(vec![BitSet::with_capacity(n); n]);
        let mut edges = 0;

        for (i, &(a, ra)) in nodes.iter().enumerate() {
            for &(b, rb) in &nodes[i + 1..] {
                let conflict = liveness.is_unbounded(a)
                    || liveness.is_unbounded(b)
                    || ra.overlaps(&rb)
                    || match policy {
                        SyncPolicy::Conservative => {
                            let (earlier, later) =
                                if ra.last < rb.first { (ra, rb) } else { (rb, ra) };
                            !separated(barriers, earlier, later)
                        }
                        SyncPolicy::InsertBarriers => false,
                    };
                if conflict {
                    adjacency[a].insert(b);
                    adjacency[b].insert(a);
                    edges += 1;
                }
            }
        }

        let max_live_weight = nodes
            .iter()
            .map(|&(_, at)| {
                nodes
                    .iter()
                    .filter(|(_, r)| r.contains(at.first))
                    .fold(0u64, |total, &(id, _)| total.saturating_add(candidates.allocs[id].size))
            })
            .max()
            .unwrap_or(0);

        debug!(nodes = nodes.len(), edges, max_live_weight, "built conflict graph");
        let nodes = nodes.into_iter().map(|(id, _)| id).collect();
        Self { nodes, adjacency, edges, max_live_weight }
    }

    /// Returns the packable allocations, in declaration order.
    pub fn nodes(&self) -> &[AllocId] {
        &self.nodes
    }

    /// Returns true if `a` and `b` must not share bytes.
    pub fn conflicts(&self, a: AllocId, b: AllocId) -> bool {
        self.adjacency.get(a).is_some_and(|row| row.contains(b))
    }

    /// Iterates over the allocations conflicting with `a`.
    pub fn neighbors(&self, a: AllocId) -> impl Iterator<Item = AllocId> + '_ {
        self.adjacency.get(a).into_iter().flat_map(|row| row.iter())
    }

    /// Returns the number of conflicting pairs.
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Returns the largest total size of allocations live at a single program point.
    ///
    /// No assignment can pack the allocations into fewer bytes.
    pub fn max_live_weight(&self) -> u64 {
        self.max_live_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collect,
        testing::{f32_buffer, read, touch, two_phase_kernel},
    };
    use smempack_ir::FunctionBuilder;

    fn id(n: usize) -> AllocId {
        AllocId::from_usize(n)
    }

    fn graph(func: &Function, policy: SyncPolicy) -> ConflictGraph {
        let layout = func.layout();
        let candidates = collect(func, &layout);
        let liveness = Liveness::compute(func, &layout, &candidates);
        let barriers = top_level_barriers(func, &layout);
        ConflictGraph::build(&candidates, &liveness, &barriers, policy)
    }

    #[test]
    fn barrier_separates_phases() {
        let (func, _) = two_phase_kernel();
        let g = graph(&func, SyncPolicy::Conservative);
        assert!(g.conflicts(id(0), id(1)));
        assert!(g.conflicts(id(1), id(0)));
        assert!(!g.conflicts(id(0), id(2)));
        assert!(!g.conflicts(id(1), id(2)));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.neighbors(id(0)).collect::<Vec<_>>(), [id(1)]);
        assert_eq!(g.max_live_weight(), 768);
    }

    #[test]
    fn missing_barrier_conflicts_unless_inserting() {
        let mut func = Function::new("unsynchronized");
        let mut b = FunctionBuilder::new(&mut func);
        let a = b.alloc(f32_buffer(32));
        let c = b.alloc(f32_buffer(32));
        touch(&mut b, a);
        read(&mut b, a);
        touch(&mut b, c);
        read(&mut b, c);
        b.ret(&[]);

        let conservative = graph(&func, SyncPolicy::Conservative);
        assert!(conservative.conflicts(id(0), id(1)));
        let inserting = graph(&func, SyncPolicy::InsertBarriers);
        assert!(!inserting.conflicts(id(0), id(1)));
        assert_eq!(inserting.max_live_weight(), 128);
    }

    #[test]
    fn nested_barriers_do_not_separate() {
        let mut func = Function::new("nested_barrier");
        let mut b = FunctionBuilder::new(&mut func);
        let a = b.alloc(f32_buffer(32));
        let c = b.alloc(f32_buffer(32));
        touch(&mut b, a);
        let cond = b.imm_bool(true);
        let then_region = b.create_region();
        let else_region = b.create_region();
        b.if_(cond, then_region, else_region);
        b.switch_to_region(then_region);
        b.barrier();
        b.switch_to_body();
        touch(&mut b, c);
        b.ret(&[]);

        let g = graph(&func, SyncPolicy::Conservative);
        assert!(g.conflicts(id(0), id(1)));
    }

    #[test]
    fn unknown_effects_conflict_with_everything() {
        let mut func = Function::new("unknown");
        let mut b = FunctionBuilder::new(&mut func);
        let a = b.alloc(f32_buffer(32));
        let c = b.alloc(f32_buffer(32));
        b.opaque("fence_and_poke", &[a], None);
        b.barrier();
        b.barrier();
        touch(&mut b, c);
        b.ret(&[]);

        let g = graph(&func, SyncPolicy::InsertBarriers);
        assert!(g.conflicts(id(0), id(1)));
    }

    #[test]
    fn separation_is_strict() {
        let pp = ProgramPoint::from_usize;
        let barriers = [pp(3), pp(7)];
        let r = |a, b| LiveRange::new(pp(a), pp(b));
        assert!(separated(&barriers, r(0, 2), r(4, 5)));
        assert!(separated(&barriers, r(4, 5), r(8, 9)));
        assert!(!separated(&barriers, r(4, 5), r(6, 7)));
        assert!(!separated(&barriers, r(0, 3), r(4, 5)));
        assert!(!separated(&[], r(0, 1), r(2, 3)));
    }
}
