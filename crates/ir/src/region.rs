//! Kernel IR regions.

use super::InstId;

/// An ordered list of instructions executed in sequence.
#[derive(Clone, Debug, Default)]
pub struct Region {
    /// The instructions in this region, in program order.
    pub insts: Vec<InstId>,
}

impl Region {
    /// Creates a new empty region.
    #[must_use]
    pub const fn new() -> Self {
        Self { insts: Vec::new() }
    }

    /// Returns the position of `inst` in this region.
    #[must_use]
    pub fn position(&self, inst: InstId) -> Option<usize> {
        self.insts.iter().position(|&id| id == inst)
    }
}
