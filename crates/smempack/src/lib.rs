//! Packing of GPU workgroup shared-memory allocations.
//!
//! Kernels declare scratch buffers in workgroup memory, which is small and limits occupancy.
//! The `pack-shared-memory` stage folds a kernel's buffers into a single buffer, letting buffers
//! whose lifetimes never overlap share bytes.
//!
//! ```
//! use smempack::{
//!     Pipeline,
//!     config::Capability,
//!     ir::{Function, FunctionBuilder, MemRefType, MemorySpace, Module, ScalarType},
//! };
//!
//! let mut func = Function::new("phases");
//! let mut b = FunctionBuilder::new(&mut func);
//! let zero = b.imm_index(0);
//! let ty = MemRefType::new(ScalarType::F32, &[128], MemorySpace::Workgroup);
//! let first = b.alloc(ty.clone());
//! let second = b.alloc(ty);
//! let v = b.load(first, &[zero]);
//! b.store(v, first, &[zero]);
//! b.barrier();
//! let v = b.load(second, &[zero]);
//! b.store(v, second, &[zero]);
//! b.ret(&[]);
//!
//! let mut module = Module::new("kernels");
//! module.add_function(func);
//!
//! let mut pipeline = Pipeline::new([Capability::MemrefView, Capability::GpuBarrier]);
//! pipeline.add_stage("pack-shared-memory")?;
//! let reports = pipeline.run(&mut module);
//! let stats = reports[0].stages[0].result.as_ref().unwrap().stats().unwrap();
//! assert_eq!(stats.packed_size, 512);
//! # Ok::<_, smempack::RegistryError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

#[doc(inline)]
pub use smempack_config as config;
#[doc(inline)]
pub use smempack_data_structures as data_structures;
#[doc(inline)]
pub use smempack_ir as ir;
#[doc(inline)]
pub use smempack_pack as pack;

mod registry;
pub use registry::{PackSharedMemory, RegistryError, Stage, StageRegistry};

mod pipeline;
pub use pipeline::{FunctionReport, Pipeline, StageReport};
