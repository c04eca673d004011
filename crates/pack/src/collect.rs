//! Discovery of workgroup allocations and the references derived from them.

use crate::Unanalyzable;
use smallvec::{SmallVec, smallvec};
use smempack_data_structures::{
    index::IndexVec,
    map::{FxHashMap, FxIndexSet},
    newtype_index,
};
use smempack_ir::{Function, InstId, InstKind, Layout, MemRefType, MemorySpace, ProgramPoint, ValueId};

/// Budget for the sizes and alignments of all packable allocations of a function.
const MAX_PACKED_BYTES: u64 = u64::MAX / 2;

newtype_index! {
    /// Index of a workgroup allocation, in declaration order.
    pub struct AllocId;
}

/// A workgroup buffer declaration.
#[derive(Clone, Debug)]
pub struct Allocation {
    pub id: AllocId,
    /// The declaring instruction.
    pub inst: InstId,
    /// The buffer reference it defines.
    pub value: ValueId,
    pub ty: MemRefType,
    /// Size in bytes. Zero when the size is not statically known.
    pub size: u64,
    /// Required alignment in bytes, at least 1.
    pub alignment: u64,
    /// Program point of the declaration.
    pub decl: ProgramPoint,
    /// Why the allocation cannot be packed, if it cannot.
    pub excluded: Option<Unanalyzable>,
}

impl Allocation {
    /// Returns true if the allocation survived collection.
    #[inline]
    pub const fn is_packable(&self) -> bool {
        self.excluded.is_none()
    }
}

/// Maps every value that refers to workgroup storage to the allocations it may reference.
///
/// Views, sub-views and reinterpretations inherit the allocations of their source. Async copy
/// tokens inherit the allocations of both copy ends, and committed groups those of their tokens.
#[derive(Clone, Debug, Default)]
pub struct AliasMap {
    roots: FxHashMap<ValueId, SmallVec<[AllocId; 2]>>,
}

impl AliasMap {
    fn compute(func: &Function, allocs: &IndexVec<AllocId, Allocation>) -> Self {
        let mut roots: FxHashMap<ValueId, SmallVec<[AllocId; 2]>> =
            allocs.iter().map(|a| (a.value, smallvec![a.id])).collect();

        // Values are not necessarily defined in index order, so iterate to a fixpoint.
        loop {
            let mut changed = false;
            for inst in func.instructions.iter() {
                let Some(result) = inst.result else { continue };
                let sources: SmallVec<[ValueId; 4]> = match &inst.kind {
                    InstKind::AsyncCopy { dst, src, .. } => smallvec![*dst, *src],
                    InstKind::AsyncCommit(tokens) => tokens.clone(),
                    kind => match kind.view_source() {
                        Some(source) => smallvec![source],
                        None => continue,
                    },
                };

                let mut derived = roots.get(&result).cloned().unwrap_or_default();
                let before = derived.len();
                for source in sources {
                    for &id in roots.get(&source).into_iter().flatten() {
                        if !derived.contains(&id) {
                            derived.push(id);
                        }
                    }
                }
                if derived.len() != before {
                    roots.insert(result, derived);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Self { roots }
    }

    /// Returns the allocations `value` may refer to.
    pub fn roots(&self, value: ValueId) -> &[AllocId] {
        self.roots.get(&value).map_or(&[], |r| r.as_slice())
    }

    /// Returns true if `value` refers to some allocation.
    pub fn is_derived(&self, value: ValueId) -> bool {
        self.roots.contains_key(&value)
    }

    /// Returns the deduplicated allocations referenced by any of `values`.
    pub fn roots_of(&self, values: &[ValueId]) -> FxIndexSet<AllocId> {
        values.iter().flat_map(|&v| self.roots(v).iter().copied()).collect()
    }
}

/// Every workgroup allocation of a function together with its alias map.
#[derive(Clone, Debug, Default)]
pub struct Candidates {
    pub allocs: IndexVec<AllocId, Allocation>,
    pub aliases: AliasMap,
}

impl Candidates {
    /// Iterates over packable allocations in declaration order.
    pub fn packable(&self) -> impl Iterator<Item = &Allocation> + '_ {
        self.allocs.iter().filter(|a| a.is_packable())
    }

    /// Returns the number of allocations excluded from packing.
    pub fn excluded_count(&self) -> usize {
        self.allocs.iter().filter(|a| !a.is_packable()).count()
    }

    /// Marks an allocation unpackable. The first recorded reason wins.
    pub(crate) fn exclude(&mut self, id: AllocId, reason: Unanalyzable) {
        let alloc = &mut self.allocs[id];
        if alloc.excluded.is_none() {
            debug!(value = %alloc.value, %reason, "excluding allocation");
            alloc.excluded = Some(reason);
        }
    }
}

/// Collects the workgroup allocations of `func` and excludes those that cannot be packed.
///
/// An allocation is packable when it is declared directly in the function body, has a static
/// size, and no reference to it reaches a call, a return, or memory.
#[instrument(level = "debug", skip_all)]
pub fn collect(func: &Function, layout: &Layout) -> Candidates {
    let mut allocs = IndexVec::<AllocId, Allocation>::new();
    for (point, inst_id) in layout.iter() {
        let inst = func.instruction(inst_id);
        let InstKind::Alloc(ty) = &inst.kind else { continue };
        if ty.space != MemorySpace::Workgroup {
            continue;
        }
        let Some(value) = inst.result else { continue };

        let size = ty.byte_size();
        let excluded = if !layout.is_top_level(point) {
            Some(Unanalyzable::NestedDeclaration)
        } else if size.is_none() {
            Some(Unanalyzable::DynamicSize)
        } else {
            None
        };
        let id = AllocId::from_usize(allocs.len());
        allocs.push(Allocation {
            id,
            inst: inst_id,
            value,
            ty: ty.clone(),
            size: size.unwrap_or(0),
            alignment: ty.alignment().max(1),
            decl: point,
            excluded,
        });
    }

    let aliases = AliasMap::compute(func, &allocs);
    let mut candidates = Candidates { allocs, aliases };

    for (_, inst_id) in layout.iter() {
        let mut escapes: SmallVec<[(AllocId, Unanalyzable); 2]> = SmallVec::new();
        match &func.instruction(inst_id).kind {
            InstKind::Call { callee, args } => {
                for id in candidates.aliases.roots_of(args) {
                    escapes.push((id, Unanalyzable::PassedToCall { callee: callee.clone() }));
                }
            }
            InstKind::Return(values) => {
                for id in candidates.aliases.roots_of(values) {
                    escapes.push((id, Unanalyzable::Escapes));
                }
            }
            // Storing a reference into memory loses track of it.
            InstKind::Store { value, .. } => {
                for &id in candidates.aliases.roots(*value) {
                    escapes.push((id, Unanalyzable::Escapes));
                }
            }
            _ => {}
        }
        for (id, reason) in escapes {
            candidates.exclude(id, reason);
        }
    }

    // Offsets are bounded by the sum of sizes and alignments of the packed allocations, and the
    // final rounding at most doubles that. Anything past the budget keeps its own storage.
    let mut total = 0u64;
    for id in candidates.allocs.indices() {
        let alloc = &candidates.allocs[id];
        if !alloc.is_packable() {
            continue;
        }
        match total.checked_add(alloc.size).and_then(|t| t.checked_add(alloc.alignment)) {
            Some(next) if next <= MAX_PACKED_BYTES => total = next,
            _ => {
                let size = alloc.size;
                candidates.exclude(id, Unanalyzable::SizeOverflow { size });
            }
        }
    }

    debug!(
        total = candidates.allocs.len(),
        excluded = candidates.excluded_count(),
        "collected workgroup allocations"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{f32_buffer, touch};
    use smempack_ir::{Dim, FunctionBuilder, ScalarType};

    #[test]
    fn ignores_non_workgroup_buffers() {
        let mut func = Function::new("spaces");
        let mut b = FunctionBuilder::new(&mut func);
        let global = b.alloc(MemRefType::new(ScalarType::F32, &[8], MemorySpace::Global));
        let private = b.alloc(MemRefType::new(ScalarType::F32, &[8], MemorySpace::Private));
        let shared = b.alloc(f32_buffer(8));
        touch(&mut b, global);
        touch(&mut b, private);
        touch(&mut b, shared);
        b.ret(&[]);

        let candidates = collect(&func, &func.layout());
        assert_eq!(candidates.allocs.len(), 1);
        let alloc = &candidates.allocs[AllocId::from_usize(0)];
        assert_eq!(alloc.value, shared);
        assert_eq!(alloc.size, 32);
        assert_eq!(alloc.alignment, 4);
        assert!(alloc.is_packable());
    }

    #[test]
    fn excludes_dynamic_and_nested() {
        let mut func = Function::new("excluded");
        let mut b = FunctionBuilder::new(&mut func);
        let mut dynamic = f32_buffer(8);
        dynamic.shape.push(Dim::Dynamic);
        b.alloc(dynamic);
        let cond = b.imm_bool(true);
        let then_region = b.create_region();
        let else_region = b.create_region();
        b.if_(cond, then_region, else_region);
        b.switch_to_region(then_region);
        let nested = b.alloc(f32_buffer(4));
        touch(&mut b, nested);
        b.switch_to_body();
        b.ret(&[]);

        let candidates = collect(&func, &func.layout());
        let reasons: Vec<_> = candidates.allocs.iter().map(|a| a.excluded.clone()).collect();
        assert_eq!(
            reasons,
            [Some(Unanalyzable::DynamicSize), Some(Unanalyzable::NestedDeclaration)]
        );
        assert_eq!(candidates.packable().count(), 0);
        assert_eq!(candidates.excluded_count(), 2);
    }

    #[test]
    fn oversized_allocations_are_excluded() {
        let mut func = Function::new("huge");
        let mut b = FunctionBuilder::new(&mut func);
        let i8_buffer = |len| MemRefType::new(ScalarType::I8, &[len], MemorySpace::Workgroup);
        let small = b.alloc(f32_buffer(64));
        let first = b.alloc(i8_buffer(1 << 62));
        let second = b.alloc(i8_buffer(1 << 62));
        let whole = b.alloc(i8_buffer(1 << 63));
        for buf in [small, first, second, whole] {
            touch(&mut b, buf);
        }
        b.ret(&[]);

        let candidates = collect(&func, &func.layout());
        let reasons: Vec<_> = candidates.allocs.iter().map(|a| a.excluded.clone()).collect();
        assert_eq!(
            reasons,
            [
                None,
                None,
                Some(Unanalyzable::SizeOverflow { size: 1 << 62 }),
                Some(Unanalyzable::SizeOverflow { size: 1 << 63 }),
            ]
        );
    }

    #[test]
    fn escaping_references_are_excluded() {
        let mut func = Function::new("escapes");
        let mut b = FunctionBuilder::new(&mut func);
        let called = b.alloc(f32_buffer(16));
        let returned = b.alloc(f32_buffer(16));
        let stored = b.alloc(f32_buffer(16));
        let kept = b.alloc(f32_buffer(16));
        let view = b.reinterpret(called, MemRefType::new(ScalarType::I32, &[16], MemorySpace::Workgroup));
        b.call("external", &[view]);
        let slot = b.alloc(MemRefType::new(ScalarType::I64, &[1], MemorySpace::Private));
        let zero = b.imm_index(0);
        b.store(stored, slot, &[zero]);
        touch(&mut b, kept);
        b.ret(&[returned]);

        let candidates = collect(&func, &func.layout());
        let reason = |v: ValueId| {
            candidates.allocs.iter().find(|a| a.value == v).and_then(|a| a.excluded.clone())
        };
        assert_eq!(
            reason(called),
            Some(Unanalyzable::PassedToCall { callee: "external".to_string() })
        );
        assert_eq!(reason(returned), Some(Unanalyzable::Escapes));
        assert_eq!(reason(stored), Some(Unanalyzable::Escapes));
        assert_eq!(reason(kept), None);
    }

    #[test]
    fn tokens_and_views_alias_their_buffers() {
        let mut func = Function::new("aliases");
        let mut b = FunctionBuilder::new(&mut func);
        let src = b.add_param(smempack_ir::Type::MemRef(MemRefType::new(
            ScalarType::F32,
            &[64],
            MemorySpace::Global,
        )));
        let a = b.alloc(f32_buffer(64));
        let c = b.alloc(f32_buffer(64));
        let zero = b.imm_index(0);
        let sub = b.subview(a, &[zero], f32_buffer(32));
        let t0 = b.async_copy(sub, &[zero], src, &[zero], 4);
        let t1 = b.async_copy(c, &[zero], src, &[zero], 4);
        let group = b.async_commit(&[t0, t1]);
        b.async_wait(group);
        b.ret(&[]);

        let candidates = collect(&func, &func.layout());
        let ids = |v| candidates.aliases.roots(v).to_vec();
        let (ia, ic) = (AllocId::from_usize(0), AllocId::from_usize(1));
        assert_eq!(ids(sub), [ia]);
        assert_eq!(ids(t0), [ia]);
        assert_eq!(ids(t1), [ic]);
        assert_eq!(ids(group), [ia, ic]);
        assert!(!candidates.aliases.is_derived(src));
    }
}
