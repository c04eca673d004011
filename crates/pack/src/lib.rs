//! Packing of workgroup shared-memory allocations.
//!
//! A kernel often declares several scratch buffers in workgroup memory whose lifetimes never
//! overlap. This crate folds them into a single byte buffer, letting lifetime-disjoint buffers
//! share bytes. Each kernel goes through five stages, each producing an immutable artifact:
//!
//! 1. [`collect`]: find workgroup allocations and decide which are packable.
//! 2. [`Liveness`]: compute a conservative live range for every packable allocation.
//! 3. [`ConflictGraph`]: derive which allocations may not share bytes.
//! 4. [`assign_offsets`]: greedy first-fit byte offsets.
//! 5. [`rewrite`]: declare the packed buffer and turn every allocation into a view of it.
//!
//! [`pack_shared_memory`] drives the stages for one function.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::{PackError, Unanalyzable};

mod collect;
pub use collect::{AliasMap, AllocId, Allocation, Candidates, collect};

mod liveness;
pub use liveness::{AllocLiveness, LiveRange, Liveness};

mod conflict;
pub use conflict::{ConflictGraph, top_level_barriers};

mod assign;
pub use assign::{OffsetAssignment, assign_offsets};

mod rewrite;
pub use rewrite::{plan_barriers, rewrite};

mod pass;
pub use pass::{PackOutcome, PackStats, SkipReason, pack_shared_memory};

pub use smempack_config::{PackOptions, SyncPolicy};

#[cfg(test)]
mod testing;
