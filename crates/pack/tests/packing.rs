//! End-to-end packing of hand-written kernels.

#![allow(unused_crate_dependencies)]

use smempack_config::{PackOptions, SyncPolicy};
use smempack_ir::{Function, FunctionBuilder, MemRefType, MemorySpace, ScalarType, Type, ValueId};
use smempack_pack::{PackOutcome, SkipReason, pack_shared_memory};
use std::{
    fmt::{self, Write as _},
    sync::{Arc, Mutex},
};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    EnvFilter,
    layer::{Context, Layer, SubscriberExt},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn shared(elem: ScalarType, len: u64) -> MemRefType {
    MemRefType::new(elem, &[len], MemorySpace::Workgroup)
}

/// Records the fields of every `WARN` event.
#[derive(Clone, Default)]
struct Warnings(Arc<Mutex<Vec<String>>>);

impl Warnings {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl<S: Subscriber> Layer<S> for Warnings {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut fields = FieldsToString::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(fields.0);
    }
}

#[derive(Default)]
struct FieldsToString(String);

impl Visit for FieldsToString {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if !self.0.is_empty() {
            self.0.push(' ');
        }
        write!(self.0, "{}={value:?}", field.name()).unwrap();
    }
}

/// Packs `func`, returning the outcome and the warnings logged meanwhile.
fn pack_capturing_warnings(func: &mut Function, opts: &PackOptions) -> (PackOutcome, Vec<String>) {
    let warnings = Warnings::default();
    let subscriber = tracing_subscriber::registry().with(warnings.clone());
    let outcome = tracing::subscriber::with_default(subscriber, || pack_shared_memory(func, opts));
    (outcome.unwrap(), warnings.take())
}

/// Two producer/consumer phases: A and B are live together, C only after the barrier.
fn two_phase() -> (Function, [ValueId; 3]) {
    phases("two_phase", true)
}

/// Like [`two_phase`], optionally without the barrier between the phases.
fn phases(name: &str, barrier: bool) -> (Function, [ValueId; 3]) {
    let mut func = Function::new(name);
    let mut b = FunctionBuilder::new(&mut func);
    let zero = b.imm_index(0);
    let one = b.imm_int(1, ScalarType::F32);
    let x = b.alloc(shared(ScalarType::F32, 128));
    let y = b.alloc(shared(ScalarType::F32, 64));
    let z = b.alloc(shared(ScalarType::F32, 128));
    b.store(one, x, &[zero]);
    b.store(one, y, &[zero]);
    b.load(x, &[zero]);
    b.load(y, &[zero]);
    if barrier {
        b.barrier();
    }
    b.store(one, z, &[zero]);
    b.load(z, &[zero]);
    b.ret(&[]);
    (func, [x, y, z])
}

#[test]
fn packs_producer_consumer_phases() {
    init_tracing();
    let (mut func, [x, y, z]) = two_phase();

    let outcome = pack_shared_memory(&mut func, &PackOptions::default()).unwrap();
    let stats = outcome.stats().expect("kernel should be packed");
    assert_eq!(stats.offsets, [(x, 0), (y, 512), (z, 0)]);
    assert_eq!(stats.packed_size, 768);
    assert_eq!(stats.unpacked_size, 1280);

    let expected = "\
kernel @two_phase() {
  %8 = alloc : memref<768xi8, workgroup, align 4>
  %2 = view %8[0] : memref<128xf32, workgroup>
  %3 = view %8[512] : memref<64xf32, workgroup>
  %4 = view %8[0] : memref<128xf32, workgroup>
  store 1, %2[0]
  store 1, %3[0]
  %5 = load %2[0] : f32
  %6 = load %3[0] : f32
  barrier
  store 1, %4[0]
  %7 = load %4[0] : f32
  return
}
";
    assert_eq!(func.to_string(), expected);
}

#[test]
fn inserts_the_barrier_phases_need() {
    init_tracing();
    let (mut func, [x, y, z]) = phases("phases", false);

    let outcome = pack_shared_memory(&mut func, &PackOptions::default()).unwrap();
    let stats = outcome.stats().expect("kernel should be packed");
    assert_eq!(stats.offsets, [(x, 0), (y, 512), (z, 0)]);
    assert_eq!(stats.packed_size, 768);
    assert_eq!(stats.barriers_inserted, 1);

    let expected = "\
kernel @phases() {
  %8 = alloc : memref<768xi8, workgroup, align 4>
  %2 = view %8[0] : memref<128xf32, workgroup>
  %3 = view %8[512] : memref<64xf32, workgroup>
  %4 = view %8[0] : memref<128xf32, workgroup>
  store 1, %2[0]
  store 1, %3[0]
  %5 = load %2[0] : f32
  %6 = load %3[0] : f32
  barrier
  store 1, %4[0]
  %7 = load %4[0] : f32
  return
}
";
    assert_eq!(func.to_string(), expected);
}

#[test]
fn packing_is_idempotent_and_deterministic() {
    init_tracing();
    let (func, _) = two_phase();

    let mut first = func.clone();
    let mut second = func;
    let a = pack_shared_memory(&mut first, &PackOptions::default()).unwrap();
    let b = pack_shared_memory(&mut second, &PackOptions::default()).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.to_string(), second.to_string());

    let packed = first.to_string();
    let again = pack_shared_memory(&mut first, &PackOptions::default()).unwrap();
    assert_eq!(again, PackOutcome::Unchanged(SkipReason::TooFewCandidates { packable: 1 }));
    assert_eq!(first.to_string(), packed);
}

#[test]
fn unanalyzable_allocations_keep_their_storage() {
    init_tracing();
    let mut func = Function::new("mixed");
    let mut b = FunctionBuilder::new(&mut func);
    let zero = b.imm_index(0);
    let scratch = b.alloc(shared(ScalarType::F16, 256));
    let first = b.alloc(shared(ScalarType::F32, 64));
    let second = b.alloc(shared(ScalarType::F32, 64));
    b.call("reduce_external", &[scratch]);
    let v = b.load(first, &[zero]);
    b.store(v, first, &[zero]);
    b.barrier();
    let v = b.load(second, &[zero]);
    b.store(v, second, &[zero]);
    b.ret(&[]);

    let outcome = pack_shared_memory(&mut func, &PackOptions::default()).unwrap();
    let stats = outcome.stats().expect("kernel should be packed");
    assert_eq!(stats.candidates, 3);
    assert_eq!(stats.excluded, 1);
    assert_eq!(stats.offsets, [(first, 0), (second, 0)]);
    assert_eq!(stats.packed_size, 256);

    let text = func.to_string();
    assert!(text.contains(&format!("%{scratch} = alloc : memref<256xf16, workgroup>")), "{text}");
    assert!(text.contains("alloc : memref<256xi8, workgroup, align 4>"), "{text}");
}

#[test]
fn pipelined_async_copies() {
    init_tracing();
    let mut func = Function::new("pipelined");
    let mut b = FunctionBuilder::new(&mut func);
    let global = Type::MemRef(MemRefType::new(ScalarType::F32, &[4096], MemorySpace::Global));
    let src = b.add_param(global);
    let zero = b.imm_index(0);
    let tid = b.thread_id(0);
    let ping = b.alloc(shared(ScalarType::F32, 256));
    let pong = b.alloc(shared(ScalarType::F32, 256));
    let epilogue = b.alloc(shared(ScalarType::F32, 512));

    let lo = b.imm_index(0);
    let hi = b.imm_index(16);
    let step = b.imm_index(1);
    let body = b.create_region();
    b.for_(lo, hi, step, body);
    b.switch_to_region(body);
    let t0 = b.async_copy(ping, &[tid], src, &[tid], 4);
    let t1 = b.async_copy(pong, &[tid], src, &[tid], 4);
    let group = b.async_commit(&[t0, t1]);
    b.async_wait(group);
    b.barrier();
    let v = b.load(ping, &[tid]);
    b.store(v, pong, &[tid]);
    b.barrier();
    b.switch_to_body();

    let one = b.imm_int(1, ScalarType::F32);
    b.store(one, epilogue, &[zero]);
    b.load(epilogue, &[tid]);
    b.ret(&[]);

    let opts = PackOptions { sync_policy: SyncPolicy::InsertBarriers, ..Default::default() };
    let outcome = pack_shared_memory(&mut func, &opts).unwrap();
    let stats = outcome.stats().expect("kernel should be packed");
    // Both tiles are live across the whole loop; the epilogue reuses their bytes.
    assert_eq!(stats.offsets, [(ping, 0), (pong, 1024), (epilogue, 0)]);
    assert_eq!(stats.packed_size, 2048);
    assert_eq!(stats.unpacked_size, 4096);
    assert_eq!(stats.barriers_inserted, 1);
}

#[test]
fn over_budget_is_reported_not_rejected() {
    let (func, _) = two_phase();

    let mut within = func.clone();
    let opts = PackOptions { shared_memory_limit: Some(768), ..Default::default() };
    let (outcome, warnings) = pack_capturing_warnings(&mut within, &opts);
    assert!(outcome.is_packed());
    assert_eq!(warnings, Vec::<String>::new());

    let mut over = func;
    let opts = PackOptions { shared_memory_limit: Some(256), ..Default::default() };
    let (outcome, warnings) = pack_capturing_warnings(&mut over, &opts);
    assert_eq!(outcome.stats().map(|stats| stats.packed_size), Some(768));
    let [warning] = warnings.as_slice() else { panic!("expected one warning, got {warnings:?}") };
    assert!(warning.contains("exceeds the workgroup limit"), "{warning}");
    assert!(warning.contains("packed=768") && warning.contains("limit=256"), "{warning}");
}
