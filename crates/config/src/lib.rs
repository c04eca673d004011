//! Configuration for the shared-memory packing stage.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[macro_use]
mod macros;

str_enum! {
    /// How reuse of bytes between lifetime-disjoint allocations is kept race free.
    ///
    /// Threads of a workgroup do not progress in lockstep: a thread may still be reading a
    /// buffer after another thread has moved on and started writing a later buffer placed
    /// at the same bytes.
    #[derive(Default)]
    #[strum(serialize_all = "kebab-case")]
    pub enum SyncPolicy {
        /// Only share bytes when a workgroup barrier already separates the two lifetimes.
        Conservative,
        /// Share bytes freely and insert barriers where the rewritten kernel needs them.
        #[default]
        InsertBarriers,
    }
}

str_enum! {
    /// An IR vocabulary a host pipeline may provide to its stages.
    #[strum(serialize_all = "kebab-case")]
    pub enum Capability {
        /// Byte-offset views of memory buffers.
        MemrefView,
        /// Workgroup barriers.
        GpuBarrier,
    }
}

/// Options for the shared-memory packing stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "kebab-case"))]
pub struct PackOptions {
    /// Synchronization policy for reused bytes.
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub sync_policy: SyncPolicy,
    /// Skip the post-assignment overlap check.
    #[cfg_attr(feature = "clap", arg(long))]
    pub skip_verify: bool,
    /// Shared-memory budget in bytes. Packed kernels above it are reported, not rejected.
    #[cfg_attr(feature = "clap", arg(long, value_name = "BYTES"))]
    pub shared_memory_limit: Option<u64>,
}

impl PackOptions {
    /// Returns true if offset assignments must be re-checked after packing.
    pub fn verify(&self) -> bool {
        !self.skip_verify
    }
}
