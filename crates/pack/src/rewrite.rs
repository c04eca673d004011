//! Rewriting packed allocations into views of a single buffer.

use crate::{
    AllocId, Candidates, LiveRange, Liveness, OffsetAssignment, PackError, conflict::separated,
};
use smempack_data_structures::map::FxHashSet;
use smempack_ir::{
    Function, InstId, InstKind, Instruction, Layout, MemRefType, MemorySpace, ProgramPoint, Type,
    Value,
};

/// Plans the barriers needed for lifetime-disjoint allocations to share bytes safely.
///
/// For every pair of allocations whose bytes overlap and whose live ranges follow one another,
/// some barrier must separate the last access of the earlier allocation from the first access of
/// the later one. When no existing or already planned barrier does, one is planned right before
/// the top-level instruction holding the later allocation's first access.
///
/// Returns the instructions to insert a barrier before, in program order.
#[instrument(level = "debug", skip_all)]
pub fn plan_barriers(
    candidates: &Candidates,
    liveness: &Liveness,
    assignment: &OffsetAssignment,
    layout: &Layout,
    barriers: &[ProgramPoint],
) -> Vec<InstId> {
    let mut placed: Vec<(AllocId, LiveRange, u64, u64)> = assignment
        .iter()
        .filter_map(|(id, offset)| {
            let alloc = &candidates.allocs[id];
            let range = liveness.range(id)?;
            // Never accessed: nothing to order.
            if range == LiveRange::point(alloc.decl) {
                return None;
            }
            Some((id, range, offset, offset.saturating_add(alloc.size)))
        })
        .collect();
    placed.sort_by_key(|&(id, range, ..)| (range.first, id));

    let mut planned: Vec<ProgramPoint> = Vec::new();
    for (i, &(_, later, start, end)) in placed.iter().enumerate() {
        let needs_barrier = placed[..i].iter().any(|&(_, earlier, other_start, other_end)| {
            let shares_bytes = start < other_end && other_start < end;
            shares_bytes
                && earlier.last < later.first
                && !separated(barriers, earlier, later)
                && !planned.iter().any(|&q| earlier.last < q && q <= later.first)
        });
        if needs_barrier {
            let at = layout.top_level(later.first);
            if planned.last() != Some(&at) {
                planned.push(at);
            }
        }
    }

    debug!(count = planned.len(), "planned barriers");
    planned.into_iter().map(|point| layout.inst_at(point)).collect()
}

/// Rewrites `func` so that every packed allocation becomes a view into one packed buffer.
///
/// The packed buffer is declared at the start of the body. Each packed allocation keeps its value
/// but is redefined as a view at its assigned offset, so every existing use now addresses the
/// packed buffer. Releases of packed allocations are dropped, and a barrier is inserted before
/// each instruction in `barriers_before`.
///
/// The rewrite is all or nothing: on error `func` is left untouched.
#[instrument(level = "debug", skip_all)]
pub fn rewrite(
    func: &mut Function,
    candidates: &Candidates,
    assignment: &OffsetAssignment,
    barriers_before: &[InstId],
) -> Result<(), PackError> {
    let mut packed = func.clone();

    let buffer_ty = MemRefType::bytes(assignment.size, MemorySpace::Workgroup, assignment.alignment);
    let buffer_inst = packed.alloc_inst(Instruction::new(InstKind::Alloc(buffer_ty.clone()), None));
    let buffer = packed.alloc_value(Value::Inst(buffer_inst));
    let inst = packed.instruction_mut(buffer_inst);
    inst.result_ty = Some(Type::MemRef(buffer_ty));
    inst.result = Some(buffer);
    let body = packed.body;
    packed.region_mut(body).insts.insert(0, buffer_inst);

    let mut released = FxHashSet::default();
    for (id, offset) in assignment.iter() {
        let alloc = &candidates.allocs[id];
        let inst = packed.instruction_mut(alloc.inst);
        match &inst.kind {
            InstKind::Alloc(ty) if *ty == alloc.ty && inst.result == Some(alloc.value) => {}
            InstKind::Alloc(_) => {
                return Err(PackError::Rewrite { value: alloc.value, reason: "allocation changed" });
            }
            _ => {
                return Err(PackError::Rewrite { value: alloc.value, reason: "not an allocation" });
            }
        }
        if offset.checked_add(alloc.size).is_none_or(|end| end > assignment.size) {
            let reason = "view exceeds the packed buffer";
            return Err(PackError::Rewrite { value: alloc.value, reason });
        }
        inst.kind = InstKind::View { source: buffer, byte_offset: offset, ty: alloc.ty.clone() };
        released.insert(id);
    }

    // The packed buffer lives for the whole kernel.
    let aliases = &candidates.aliases;
    let instructions = &packed.instructions;
    for region in packed.regions.iter_mut() {
        region.insts.retain(|&inst| match instructions[inst].kind {
            InstKind::Dealloc(v) => !aliases.roots(v).iter().any(|id| released.contains(id)),
            _ => true,
        });
    }

    if !barriers_before.is_empty() {
        let targets: FxHashSet<InstId> = barriers_before.iter().copied().collect();
        let old = std::mem::take(&mut packed.region_mut(body).insts);
        let mut insts = Vec::with_capacity(old.len() + targets.len());
        for inst in old {
            if targets.contains(&inst) {
                insts.push(packed.alloc_inst(Instruction::new(InstKind::Barrier, None)));
            }
            insts.push(inst);
        }
        packed.region_mut(body).insts = insts;
    }

    *func = packed;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ConflictGraph, SyncPolicy, assign_offsets, collect, top_level_barriers,
        testing::{f32_buffer, read, touch, two_phase_kernel},
    };
    use smempack_ir::{FunctionBuilder, ValueId};

    struct Analysis {
        layout: Layout,
        candidates: Candidates,
        liveness: Liveness,
        barriers: Vec<ProgramPoint>,
        assignment: OffsetAssignment,
    }

    fn analyze(func: &Function, policy: SyncPolicy) -> Analysis {
        let layout = func.layout();
        let candidates = collect(func, &layout);
        let liveness = Liveness::compute(func, &layout, &candidates);
        let barriers = top_level_barriers(func, &layout);
        let graph = ConflictGraph::build(&candidates, &liveness, &barriers, policy);
        let assignment = assign_offsets(&candidates, &graph).unwrap();
        Analysis { layout, candidates, liveness, barriers, assignment }
    }

    fn view_offset(func: &Function, value: ValueId) -> Option<u64> {
        let inst = func.value(value).defining_inst()?;
        match func.instruction(inst).kind {
            InstKind::View { byte_offset, .. } => Some(byte_offset),
            _ => None,
        }
    }

    #[test]
    fn allocations_become_views() {
        let (mut func, [a, b, c]) = two_phase_kernel();
        let analysis = analyze(&func, SyncPolicy::Conservative);
        rewrite(&mut func, &analysis.candidates, &analysis.assignment, &[]).unwrap();

        assert_eq!(view_offset(&func, a), Some(0));
        assert_eq!(view_offset(&func, b), Some(512));
        assert_eq!(view_offset(&func, c), Some(0));

        let first = func.body().insts[0];
        let InstKind::Alloc(ty) = &func.instruction(first).kind else {
            panic!("expected the packed buffer first, got {:?}", func.instruction(first).kind);
        };
        assert_eq!(ty, &MemRefType::bytes(768, MemorySpace::Workgroup, 4));
        assert_eq!(ty.to_string(), "memref<768xi8, workgroup, align 4>");
        let allocs = func
            .body()
            .insts
            .iter()
            .filter(|&&inst| matches!(func.instruction(inst).kind, InstKind::Alloc(_)))
            .count();
        assert_eq!(allocs, 1);
    }

    #[test]
    fn releases_are_dropped() {
        let mut func = Function::new("released");
        let mut b = FunctionBuilder::new(&mut func);
        let x = b.alloc(f32_buffer(8));
        let y = b.alloc(f32_buffer(8));
        touch(&mut b, x);
        b.dealloc(x);
        b.barrier();
        touch(&mut b, y);
        b.dealloc(y);
        b.ret(&[]);

        let analysis = analyze(&func, SyncPolicy::Conservative);
        rewrite(&mut func, &analysis.candidates, &analysis.assignment, &[]).unwrap();
        assert_eq!(analysis.assignment.size, 32);
        let placed: Vec<_> =
            func.layout().iter().map(|(_, inst)| func.instruction(inst).kind.mnemonic()).collect();
        assert_eq!(placed, ["alloc", "view", "view", "store", "barrier", "store", "return"]);
    }

    #[test]
    fn rejects_stale_analysis() {
        let (mut func, [a, ..]) = two_phase_kernel();
        let analysis = analyze(&func, SyncPolicy::Conservative);
        let inst = func.value(a).defining_inst().unwrap();
        func.instruction_mut(inst).kind = InstKind::Barrier;
        let before = func.to_string();

        let err = rewrite(&mut func, &analysis.candidates, &analysis.assignment, &[]).unwrap_err();
        assert!(matches!(err, PackError::Rewrite { value, .. } if value == a), "{err}");
        assert_eq!(func.to_string(), before);
    }

    #[test]
    fn inserts_barriers_between_reused_bytes() {
        let mut func = Function::new("reuse");
        let mut b = FunctionBuilder::new(&mut func);
        let x = b.alloc(f32_buffer(32)); // 0
        let y = b.alloc(f32_buffer(32)); // 1
        touch(&mut b, x); // 2
        read(&mut b, x); // 3
        touch(&mut b, y); // 4
        read(&mut b, y); // 5
        b.ret(&[]); // 6

        let analysis = analyze(&func, SyncPolicy::InsertBarriers);
        assert_eq!(analysis.assignment.iter().map(|(_, o)| o).collect::<Vec<_>>(), [0, 0]);
        let planned = plan_barriers(
            &analysis.candidates,
            &analysis.liveness,
            &analysis.assignment,
            &analysis.layout,
            &analysis.barriers,
        );
        assert_eq!(planned, [analysis.layout.inst_at(ProgramPoint::from_usize(4))]);

        rewrite(&mut func, &analysis.candidates, &analysis.assignment, &planned).unwrap();
        let kinds: Vec<_> =
            func.body().insts.iter().map(|&inst| func.instruction(inst).kind.mnemonic()).collect();
        assert_eq!(
            kinds,
            ["alloc", "view", "view", "store", "load", "barrier", "store", "load", "return"]
        );
    }

    #[test]
    fn unused_allocations_need_no_barrier() {
        let mut func = Function::new("unused");
        let mut b = FunctionBuilder::new(&mut func);
        let x = b.alloc(f32_buffer(32)); // 0
        touch(&mut b, x); // 1
        read(&mut b, x); // 2
        b.alloc(f32_buffer(32)); // 3
        b.ret(&[]); // 4

        let analysis = analyze(&func, SyncPolicy::InsertBarriers);
        assert_eq!(analysis.assignment.iter().map(|(_, o)| o).collect::<Vec<_>>(), [0, 0]);
        let planned = plan_barriers(
            &analysis.candidates,
            &analysis.liveness,
            &analysis.assignment,
            &analysis.layout,
            &analysis.barriers,
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn existing_barriers_are_reused() {
        let (func, _) = two_phase_kernel();
        let analysis = analyze(&func, SyncPolicy::InsertBarriers);
        let planned = plan_barriers(
            &analysis.candidates,
            &analysis.liveness,
            &analysis.assignment,
            &analysis.layout,
            &analysis.barriers,
        );
        assert!(planned.is_empty());
    }
}
