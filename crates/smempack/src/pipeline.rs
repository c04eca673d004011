//! Scheduling stages over every function of a module.

use crate::{RegistryError, Stage, StageRegistry};
use rayon::prelude::*;
use smempack_config::{Capability, PackOptions};
use smempack_data_structures::map::FxIndexSet;
use smempack_ir::{FunctionId, Module};
use smempack_pack::{PackError, PackOutcome};

/// The result of one stage on one function.
#[derive(Debug)]
pub struct StageReport {
    pub stage: &'static str,
    pub result: Result<PackOutcome, PackError>,
}

/// The results of all stages that ran on one function.
#[derive(Debug)]
pub struct FunctionReport {
    pub function: FunctionId,
    pub name: String,
    /// One entry per stage, in order. A failed stage is the last entry.
    pub stages: Vec<StageReport>,
}

impl FunctionReport {
    /// Returns true if every stage succeeded.
    pub fn is_ok(&self) -> bool {
        self.stages.iter().all(|report| report.result.is_ok())
    }
}

/// An ordered list of stages run over a module.
#[derive(Debug, Default)]
pub struct Pipeline {
    capabilities: FxIndexSet<Capability>,
    stages: Vec<&'static dyn Stage>,
    options: PackOptions,
}

impl Pipeline {
    /// Creates an empty pipeline over a host that provides `capabilities`.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self { capabilities: capabilities.into_iter().collect(), ..Default::default() }
    }

    /// Sets the options passed to every stage.
    pub fn with_options(mut self, options: PackOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends the registered stage `name`.
    ///
    /// Fails if the stage is unknown or needs a capability this pipeline does not provide.
    pub fn add_stage(&mut self, name: &str) -> Result<&mut Self, RegistryError> {
        let stage = StageRegistry::global().get(name)?;
        if let Some(&capability) =
            stage.required_capabilities().iter().find(|c| !self.capabilities.contains(*c))
        {
            return Err(RegistryError::UnsupportedViewCapability { stage: stage.name(), capability });
        }
        self.stages.push(stage);
        Ok(self)
    }

    /// Returns the names of the scheduled stages.
    pub fn stage_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|stage| stage.name())
    }

    /// Runs every stage over every function of `module`, functions in parallel.
    ///
    /// A failing stage leaves its function unchanged and skips the remaining stages for that
    /// function only. Reports are returned in function order.
    #[instrument(level = "debug", skip_all, fields(module = %module.name))]
    pub fn run(&self, module: &mut Module) -> Vec<FunctionReport> {
        let reports: Vec<FunctionReport> = module
            .functions
            .raw
            .par_iter_mut()
            .enumerate()
            .map(|(i, func)| {
                let mut stages = Vec::with_capacity(self.stages.len());
                for stage in &self.stages {
                    let result = stage.run(func, &self.options);
                    let failed = result.is_err();
                    if let Err(err) = &result {
                        error!(func = %func.name, stage = stage.name(), %err, "stage failed");
                    }
                    stages.push(StageReport { stage: stage.name(), result });
                    if failed {
                        break;
                    }
                }
                FunctionReport { function: FunctionId::from_usize(i), name: func.name.clone(), stages }
            })
            .collect();

        let failed = reports.iter().filter(|report| !report.is_ok()).count();
        debug!(functions = reports.len(), failed, "pipeline finished");
        reports
    }
}
