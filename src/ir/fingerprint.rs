//! Program fingerprints.
//!
//! The fingerprint is an xxh3-128 digest over a canonical text dump of the
//! program IR: flags, includes, uniforms in sorted order, entry parameters and
//! atoms in stage-then-insertion order. Two programs with equal dumps emit
//! byte-identical source under any writer, so the digest doubles as the
//! program cache key.

use std::fmt::{self, Write};

use xxhash_rust::xxh3::Xxh3;

use super::atom::Atom;
use super::operand::Operand;
use super::parameter::Parameter;
use super::program::Program;
use crate::utils::interner;

/// Streams formatted text straight into the hasher.
struct HashWriter(Xxh3);

impl Write for HashWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.update(s.as_bytes());
        Ok(())
    }
}

/// Computes the cache fingerprint of `program`.
#[must_use]
pub fn fingerprint(program: &Program) -> u128 {
    let mut w = HashWriter(Xxh3::new());
    // Writing into the hasher cannot fail.
    let _ = write_canonical(&mut w, program);
    w.0.digest128()
}

/// Writes the canonical dump the fingerprint is computed over.
pub fn write_canonical(w: &mut impl Write, program: &Program) -> fmt::Result {
    writeln!(
        w,
        "program {:?} skel={} colmajor={} defines={}",
        program.program_type(),
        program.skeletal_animation_included(),
        program.column_major_matrices(),
        program.preprocessor_defines()
    )?;

    for dep in program.dependencies() {
        writeln!(w, "include {dep}")?;
    }

    for uniform in program.sorted_uniforms() {
        w.write_str("uniform ")?;
        write_parameter(w, &uniform)?;
    }

    let entry = program.entry();
    for (tag, params) in [
        ("in", entry.inputs()),
        ("out", entry.outputs()),
        ("local", entry.locals()),
    ] {
        for p in params {
            write!(w, "{tag} ")?;
            write_parameter(w, p)?;
        }
    }

    for (stage, atom) in entry.atoms() {
        write!(w, "@{stage} ")?;
        write_atom(w, atom)?;
    }
    Ok(())
}

fn write_parameter(w: &mut impl Write, p: &Parameter) -> fmt::Result {
    writeln!(
        w,
        "{} {:?}[{}] {:?}{} {:?} {:?}",
        p.name(),
        p.ty(),
        p.array_size(),
        p.semantic(),
        p.index(),
        p.content(),
        p.kind()
    )
}

fn write_operand(w: &mut impl Write, op: &Operand) -> fmt::Result {
    let p = op.parameter();
    match p.const_value() {
        Some(value) => write!(w, "{value:?}")?,
        None => w.write_str(p.name())?,
    }
    if let Some(index) = op.index() {
        w.write_char('[')?;
        write_operand(w, index)?;
        w.write_char(']')?;
    }
    write!(w, ":{:?}{}", op.semantic(), op.mask().swizzle())
}

fn write_operands<'a>(
    w: &mut impl Write,
    ops: impl IntoIterator<Item = &'a Operand>,
) -> fmt::Result {
    for op in ops {
        w.write_char(' ')?;
        write_operand(w, op)?;
    }
    Ok(())
}

fn write_atom(w: &mut impl Write, atom: &Atom) -> fmt::Result {
    match atom {
        Atom::Assign { src, dst } => {
            w.write_str("assign")?;
            write_operands(w, [dst, src])?;
        }
        Atom::Invoke { function, operands } => {
            write!(w, "call {}", interner::resolve(*function))?;
            write_operands(w, operands)?;
        }
        Atom::Builtin {
            function,
            args,
            dst,
        } => {
            write!(w, "builtin {function:?}")?;
            write_operands(w, std::iter::once(dst).chain(args))?;
        }
        Atom::Sample {
            sampler,
            coords,
            dst,
        } => {
            w.write_str("sample")?;
            write_operands(w, [dst, sampler, coords])?;
        }
        Atom::Arith { op, lhs, rhs, dst } => {
            write!(w, "arith {}", op.symbol())?;
            write_operands(w, [dst, lhs, rhs])?;
        }
    }
    w.write_char('\n')
}
