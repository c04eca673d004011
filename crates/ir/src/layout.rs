//! Linear program-point numbering of a structured function.
//!
//! Instructions are numbered in pre-order: a region-holding instruction receives its point
//! before the instructions of its regions, and its span ends at the last nested point. Every
//! nested point is therefore contained in the span of each of its ancestors.

use super::{Function, InstId, RegionId};
use smempack_data_structures::{index::IndexVec, map::FxHashMap, newtype_index};

newtype_index! {
    /// A position in the pre-order numbering of a function's instructions.
    pub struct ProgramPoint;
}

/// Program points of every instruction reachable from a function's body.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    points: FxHashMap<InstId, ProgramPoint>,
    /// Instructions in program order.
    order: IndexVec<ProgramPoint, InstId>,
    /// Last point covered by each instruction (itself for instructions without regions).
    span_end: IndexVec<ProgramPoint, ProgramPoint>,
    /// Top-level instruction enclosing each point.
    top_level: IndexVec<ProgramPoint, ProgramPoint>,
}

impl Layout {
    /// Computes the layout of a function.
    #[must_use]
    pub fn compute(func: &Function) -> Self {
        let mut layout = Self::default();
        layout.visit_region(func, func.body, None);
        layout
    }

    fn visit_region(&mut self, func: &Function, region: RegionId, top: Option<ProgramPoint>) {
        for &inst in &func.region(region).insts {
            // A malformed function may place an instruction twice; keep the first placement.
            if self.points.contains_key(&inst) {
                continue;
            }
            let point = self.order.push(inst);
            self.points.insert(inst, point);
            self.span_end.push(point);
            self.top_level.push(top.unwrap_or(point));

            for nested in func.instruction(inst).kind.regions() {
                self.visit_region(func, nested, Some(top.unwrap_or(point)));
            }
            let last = ProgramPoint::from_usize(self.order.len() - 1);
            self.span_end[point] = last;
        }
    }

    /// Returns the number of placed instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no instruction is placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the program point of an instruction, or `None` if it is not placed in the body.
    #[must_use]
    pub fn point(&self, inst: InstId) -> Option<ProgramPoint> {
        self.points.get(&inst).copied()
    }

    /// Returns the instruction at a program point.
    #[must_use]
    pub fn inst_at(&self, point: ProgramPoint) -> InstId {
        self.order[point]
    }

    /// Returns the inclusive range of points covered by the instruction at `point`.
    #[must_use]
    pub fn span(&self, point: ProgramPoint) -> (ProgramPoint, ProgramPoint) {
        (point, self.span_end[point])
    }

    /// Returns the top-level instruction point enclosing `point`.
    #[must_use]
    pub fn top_level(&self, point: ProgramPoint) -> ProgramPoint {
        self.top_level[point]
    }

    /// Returns true if the instruction at `point` sits directly in the function body.
    #[must_use]
    pub fn is_top_level(&self, point: ProgramPoint) -> bool {
        self.top_level[point] == point
    }

    /// Iterates over placed instructions in program order.
    pub fn iter(&self) -> impl Iterator<Item = (ProgramPoint, InstId)> + '_ {
        self.order.iter_enumerated().map(|(point, &inst)| (point, inst))
    }
}
