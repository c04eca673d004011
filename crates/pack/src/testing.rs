//! Kernel fixtures shared by the unit tests.

use smempack_ir::{Function, FunctionBuilder, MemRefType, MemorySpace, ScalarType, ValueId};

/// A workgroup buffer of `len` f32 elements.
pub(crate) fn f32_buffer(len: u64) -> MemRefType {
    MemRefType::new(ScalarType::F32, &[len], MemorySpace::Workgroup)
}

/// Stores a constant into the first element of `buf`.
pub(crate) fn touch(b: &mut FunctionBuilder<'_>, buf: ValueId) {
    let zero = b.imm_index(0);
    let value = b.imm_int(0, ScalarType::F32);
    b.store(value, buf, &[zero]);
}

/// Reads the first element of `buf`.
pub(crate) fn read(b: &mut FunctionBuilder<'_>, buf: ValueId) {
    let zero = b.imm_index(0);
    b.load(buf, &[zero]);
}

/// Two producer/consumer phases separated by a barrier:
///
/// ```text
/// 0 alloc A : f32[128]
/// 1 alloc B : f32[64]
/// 2 alloc C : f32[128]
/// 3 store A     4 store B
/// 5 load A      6 load B
/// 7 barrier
/// 8 store C     9 load C
/// 10 return
/// ```
pub(crate) fn two_phase_kernel() -> (Function, [ValueId; 3]) {
    let mut func = Function::new("two_phase");
    let mut b = FunctionBuilder::new(&mut func);
    let a = b.alloc(f32_buffer(128));
    let bb = b.alloc(f32_buffer(64));
    let c = b.alloc(f32_buffer(128));
    touch(&mut b, a);
    touch(&mut b, bb);
    read(&mut b, a);
    read(&mut b, bb);
    b.barrier();
    touch(&mut b, c);
    read(&mut b, c);
    b.ret(&[]);
    (func, [a, bb, c])
}
