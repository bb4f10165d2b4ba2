//! Shader intermediate representation.
//!
//! | Layer        | Type                         | Role                                  |
//! |--------------|------------------------------|---------------------------------------|
//! | leaf tags    | [`GpuConstantType`], [`Content`], [`Semantic`] | typing and linking   |
//! | variables    | [`Parameter`]                | inputs, outputs, locals, uniforms     |
//! | statements   | [`Atom`] over [`Operand`]s   | straight-line code                    |
//! | entry point  | [`Function`]                 | parameters + staged atoms             |
//! | stage        | [`Program`]                  | entry + uniforms + includes + flags   |
//! | pipeline     | [`ProgramSet`]               | vertex + fragment pair                |

pub mod atom;
pub mod fingerprint;
pub mod function;
pub mod operand;
pub mod parameter;
pub mod program;
pub mod types;

pub use atom::{ArithOp, Atom, Builtin};
pub use fingerprint::fingerprint;
pub use function::{Function, stages};
pub use operand::{Operand, OperandMask, OperandSemantic};
pub use parameter::{
    AutoConstant, AutoConstantData, AutoConstantType, ConstValue, Direction, Parameter,
    ParameterKind, ParameterPtr, same_parameter,
};
pub use program::{Program, ProgramSet};
pub use types::{Content, GpuConstantType, GpuProgramType, Semantic, Variability, VertexElements};
