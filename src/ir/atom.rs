//! Function atoms.
//!
//! An [`Atom`] is one straight-line statement of a generated `main`. Every
//! variant emits exactly one complete statement terminated by `;` and a
//! newline; the language-specific spelling is delegated to the
//! [`Emitter`] of the program being written.

use std::fmt::{self, Write};

use smallvec::SmallVec;

use super::operand::Operand;
use super::types::GpuConstantType;
use crate::utils::interner::{self, Symbol};
use crate::writer::Emitter;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

/// Language intrinsic with a return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Normalize,
    Dot,
    Cross,
    Length,
    Saturate,
    Min,
    Max,
    Mix,
    Abs,
    Negate,
    /// Vector / matrix constructor of the given type.
    Construct(GpuConstantType),
}

/// One IR statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// `dst = src;`
    Assign { src: Operand, dst: Operand },
    /// `Library_Function(a, b, out c);`
    Invoke {
        function: Symbol,
        operands: SmallVec<[Operand; 6]>,
    },
    /// `dst = builtin(args);`
    Builtin {
        function: Builtin,
        args: SmallVec<[Operand; 3]>,
        dst: Operand,
    },
    /// `dst = texture(sampler, coords);`
    Sample {
        sampler: Operand,
        coords: Operand,
        dst: Operand,
    },
    /// `dst = lhs op rhs;`
    Arith {
        op: ArithOp,
        lhs: Operand,
        rhs: Operand,
        dst: Operand,
    },
}

impl Atom {
    // ── Constructors ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn assign(src: Operand, dst: Operand) -> Self {
        Self::Assign { src, dst }
    }

    #[must_use]
    pub fn invoke(function: &str, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self::Invoke {
            function: interner::intern(function),
            operands: operands.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn builtin(
        function: Builtin,
        args: impl IntoIterator<Item = Operand>,
        dst: Operand,
    ) -> Self {
        Self::Builtin {
            function,
            args: args.into_iter().collect(),
            dst,
        }
    }

    #[must_use]
    pub fn sample(sampler: Operand, coords: Operand, dst: Operand) -> Self {
        Self::Sample {
            sampler,
            coords,
            dst,
        }
    }

    #[must_use]
    pub fn arith(op: ArithOp, lhs: Operand, rhs: Operand, dst: Operand) -> Self {
        Self::Arith { op, lhs, rhs, dst }
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    /// Library function name of an `Invoke` atom.
    #[must_use]
    pub fn function_name(&self) -> Option<&'static str> {
        match self {
            Self::Invoke { function, .. } => Some(interner::resolve(*function)),
            _ => None,
        }
    }

    /// Visits every operand, including subscripts, in emission order.
    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        match self {
            Self::Assign { src, dst } => {
                dst.visit(&mut f);
                src.visit(&mut f);
            }
            Self::Invoke { operands, .. } => {
                for op in operands {
                    op.visit(&mut f);
                }
            }
            Self::Builtin { args, dst, .. } => {
                dst.visit(&mut f);
                for op in args {
                    op.visit(&mut f);
                }
            }
            Self::Sample {
                sampler,
                coords,
                dst,
            } => {
                dst.visit(&mut f);
                sampler.visit(&mut f);
                coords.visit(&mut f);
            }
            Self::Arith { lhs, rhs, dst, .. } => {
                dst.visit(&mut f);
                lhs.visit(&mut f);
                rhs.visit(&mut f);
            }
        }
    }

    /// Mutable variant of [`Atom::for_each_operand`].
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Self::Assign { src, dst } => {
                dst.visit_mut(&mut f);
                src.visit_mut(&mut f);
            }
            Self::Invoke { operands, .. } => {
                for op in operands {
                    op.visit_mut(&mut f);
                }
            }
            Self::Builtin { args, dst, .. } => {
                dst.visit_mut(&mut f);
                for op in args {
                    op.visit_mut(&mut f);
                }
            }
            Self::Sample {
                sampler,
                coords,
                dst,
            } => {
                dst.visit_mut(&mut f);
                sampler.visit_mut(&mut f);
                coords.visit_mut(&mut f);
            }
            Self::Arith { lhs, rhs, dst, .. } => {
                dst.visit_mut(&mut f);
                lhs.visit_mut(&mut f);
                rhs.visit_mut(&mut f);
            }
        }
    }

    // ── Emission ─────────────────────────────────────────────────────────────

    /// Emits this atom as one indented statement.
    pub fn emit(&self, out: &mut String, emitter: &Emitter) -> fmt::Result {
        out.push('\t');
        match self {
            Self::Assign { src, dst } => {
                writeln!(
                    out,
                    "{} = {};",
                    emitter.operand_expr(dst),
                    emitter.operand_expr(src)
                )
            }
            Self::Invoke { function, operands } => {
                let args: Vec<String> = operands.iter().map(|op| emitter.operand_expr(op)).collect();
                writeln!(out, "{}({});", interner::resolve(*function), args.join(", "))
            }
            Self::Builtin {
                function,
                args,
                dst,
            } => {
                let args: Vec<String> = args.iter().map(|op| emitter.operand_expr(op)).collect();
                writeln!(
                    out,
                    "{} = {};",
                    emitter.operand_expr(dst),
                    emitter.builtin_call(*function, &args)
                )
            }
            Self::Sample {
                sampler,
                coords,
                dst,
            } => {
                writeln!(
                    out,
                    "{} = {}({}, {});",
                    emitter.operand_expr(dst),
                    emitter.sample_function(sampler.parameter().ty()),
                    emitter.operand_expr(sampler),
                    emitter.operand_expr(coords)
                )
            }
            Self::Arith { op, lhs, rhs, dst } => {
                let l = emitter.operand_expr(lhs);
                let r = emitter.operand_expr(rhs);
                let expr = if *op == ArithOp::Mul
                    && (lhs.parameter().ty().is_matrix() || rhs.parameter().ty().is_matrix())
                {
                    emitter.matrix_multiply(&l, &r)
                } else {
                    format!("{l} {} {r}", op.symbol())
                };
                writeln!(out, "{} = {expr};", emitter.operand_expr(dst))
            }
        }
    }
}
