//! Textual rendering of kernel IR.

use super::{Function, InstKind, Module, RegionId, Value, ValueId};
use std::fmt::{self, Write};

/// Formats an operand: immediates inline, everything else as `%N`.
struct Operand<'a>(&'a Function, ValueId);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.value(self.1) {
            Value::Immediate(imm) => write!(f, "{imm}"),
            _ => write!(f, "%{}", self.1),
        }
    }
}

fn write_list(f: &mut impl Write, func: &Function, values: &[ValueId]) -> fmt::Result {
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", Operand(func, v))?;
    }
    Ok(())
}

fn write_region(
    f: &mut fmt::Formatter<'_>,
    func: &Function,
    region: RegionId,
    depth: usize,
) -> fmt::Result {
    let indent = "  ".repeat(depth);
    for &inst_id in &func.region(region).insts {
        let inst = func.instruction(inst_id);
        f.write_str(&indent)?;
        if let Some(result) = inst.result {
            write!(f, "%{result} = ")?;
        }
        f.write_str(inst.kind.mnemonic())?;
        match &inst.kind {
            InstKind::Alloc(_) | InstKind::Barrier => {}
            InstKind::View { source, byte_offset, .. } => {
                write!(f, " {}[{byte_offset}]", Operand(func, *source))?;
            }
            InstKind::SubView { source, offsets, .. } => {
                write!(f, " {}[", Operand(func, *source))?;
                write_list(f, func, offsets)?;
                f.write_str("]")?;
            }
            InstKind::Reinterpret { source, .. } => write!(f, " {}", Operand(func, *source))?,
            InstKind::Dealloc(v) | InstKind::AsyncWait(v) => write!(f, " {}", Operand(func, *v))?,
            InstKind::Load { memref, indices } => {
                write!(f, " {}[", Operand(func, *memref))?;
                write_list(f, func, indices)?;
                f.write_str("]")?;
            }
            InstKind::Store { value, memref, indices } => {
                write!(f, " {}, {}[", Operand(func, *value), Operand(func, *memref))?;
                write_list(f, func, indices)?;
                f.write_str("]")?;
            }
            InstKind::AsyncCopy { dst, dst_indices, src, src_indices, elements } => {
                write!(f, " {}[", Operand(func, *dst))?;
                write_list(f, func, dst_indices)?;
                write!(f, "], {}[", Operand(func, *src))?;
                write_list(f, func, src_indices)?;
                write!(f, "], {elements}")?;
            }
            InstKind::AsyncCommit(tokens) => {
                f.write_str(" ")?;
                write_list(f, func, tokens)?;
            }
            InstKind::ThreadId(axis) => write!(f, " {axis}")?,
            InstKind::Binary(_, a, b) => {
                write!(f, " {}, {}", Operand(func, *a), Operand(func, *b))?;
            }
            InstKind::Call { callee, args } => {
                write!(f, " @{callee}(")?;
                write_list(f, func, args)?;
                f.write_str(")")?;
            }
            InstKind::Opaque { name, operands } => {
                write!(f, " {name:?}(")?;
                write_list(f, func, operands)?;
                f.write_str(")")?;
            }
            InstKind::If { cond, then_region, else_region } => {
                writeln!(f, " {} {{", Operand(func, *cond))?;
                write_region(f, func, *then_region, depth + 1)?;
                if !func.region(*else_region).insts.is_empty() {
                    writeln!(f, "{indent}}} else {{")?;
                    write_region(f, func, *else_region, depth + 1)?;
                }
                writeln!(f, "{indent}}}")?;
                continue;
            }
            InstKind::For { iv, lower, upper, step, body } => {
                writeln!(
                    f,
                    " %{iv} = {} to {} step {} {{",
                    Operand(func, *lower),
                    Operand(func, *upper),
                    Operand(func, *step)
                )?;
                write_region(f, func, *body, depth + 1)?;
                writeln!(f, "{indent}}}")?;
                continue;
            }
            InstKind::Return(values) => {
                if !values.is_empty() {
                    f.write_str(" ")?;
                    write_list(f, func, values)?;
                }
            }
        }
        if let Some(ty) = &inst.result_ty {
            write!(f, " : {ty}")?;
        }
        f.write_str("\n")?;
    }
    Ok(())
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel @{}(", self.name)?;
        let params = self
            .values
            .iter_enumerated()
            .filter(|(_, v)| matches!(v, Value::Arg { .. }));
        for (i, (id, value)) in params.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if let Value::Arg { ty, .. } = value {
                write!(f, "%{id}: {ty}")?;
            }
        }
        f.write_str(") {\n")?;
        write_region(f, self, self.body, 1)?;
        f.write_str("}\n")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module @{}", self.name)?;
        for func in self.functions.iter() {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
