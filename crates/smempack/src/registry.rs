//! The process-wide table of available stages.

use smempack_config::{Capability, PackOptions};
use smempack_data_structures::map::FxIndexMap;
use smempack_ir::Function;
use smempack_pack::{PackError, PackOutcome, pack_shared_memory};
use std::{fmt, sync::OnceLock};

/// A transformation that can be scheduled in a [`Pipeline`](crate::Pipeline).
///
/// Stages are stateless: all per-function state lives inside [`Stage::run`].
pub trait Stage: fmt::Debug + Send + Sync {
    /// The name the stage is registered under.
    fn name(&self) -> &'static str;

    /// IR capabilities the host pipeline must provide.
    fn required_capabilities(&self) -> &'static [Capability];

    /// Runs the stage on a single function.
    fn run(&self, func: &mut Function, opts: &PackOptions) -> Result<PackOutcome, PackError>;
}

/// The shared-memory packing stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct PackSharedMemory;

impl PackSharedMemory {
    /// The registered name of this stage.
    pub const NAME: &'static str = "pack-shared-memory";
}

impl Stage for PackSharedMemory {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn required_capabilities(&self) -> &'static [Capability] {
        &[Capability::MemrefView, Capability::GpuBarrier]
    }

    fn run(&self, func: &mut Function, opts: &PackOptions) -> Result<PackOutcome, PackError> {
        pack_shared_memory(func, opts)
    }
}

/// Errors raised while scheduling stages.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no stage named `{0}` is registered")]
    UnknownStage(String),
    #[error("stage `{stage}` requires the `{capability}` capability, which the pipeline lacks")]
    UnsupportedViewCapability { stage: &'static str, capability: Capability },
}

/// Registered stages by name, in registration order.
#[derive(Debug)]
pub struct StageRegistry {
    stages: FxIndexMap<&'static str, &'static dyn Stage>,
}

static BUILTIN: PackSharedMemory = PackSharedMemory;

impl StageRegistry {
    /// Returns the global registry, initializing it on first use.
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<StageRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let mut registry = Self { stages: FxIndexMap::default() };
            registry.register(&BUILTIN);
            debug!(stages = registry.stages.len(), "initialized stage registry");
            registry
        })
    }

    fn register(&mut self, stage: &'static dyn Stage) {
        self.stages.insert(stage.name(), stage);
    }

    /// Looks up a stage by name.
    pub fn get(&self, name: &str) -> Result<&'static dyn Stage, RegistryError> {
        self.stages.get(name).copied().ok_or_else(|| RegistryError::UnknownStage(name.to_string()))
    }

    /// Iterates over the names of all registered stages.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_stage_is_registered() {
        let registry = StageRegistry::global();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["pack-shared-memory"]);
        let stage = registry.get("pack-shared-memory").unwrap();
        assert_eq!(stage.name(), PackSharedMemory::NAME);
        assert_eq!(
            stage.required_capabilities(),
            [Capability::MemrefView, Capability::GpuBarrier]
        );
        assert!(std::ptr::eq(registry, StageRegistry::global()));
    }

    #[test]
    fn unknown_stage() {
        let err = StageRegistry::global().get("vectorize").unwrap_err();
        assert_eq!(err, RegistryError::UnknownStage("vectorize".to_string()));
        assert_eq!(err.to_string(), "no stage named `vectorize` is registered");
    }
}
