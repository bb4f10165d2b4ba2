//! # Myth RTSS
//!
//! Runtime shader generation for the Myth engine. Fixed-function material
//! state goes in; deduplicated GLSL, GLSL ES, HLSL or Cg programs come out.
//!
//! ```rust,ignore
//! use myth_rtss::{AssumeAllPresent, ShaderGenerator, DEFAULT_SCHEME_NAME, RTSS_DEFAULT_SCHEME_NAME};
//!
//! let mut generator = ShaderGenerator::new(settings, Box::new(backend), Box::new(AssumeAllPresent));
//! generator.create_shader_based_technique(&materials, "Rock", DEFAULT_SCHEME_NAME, RTSS_DEFAULT_SCHEME_NAME, false);
//! if generator.validate_material(&mut materials, RTSS_DEFAULT_SCHEME_NAME, "Rock") {
//!     // render with the generated technique
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod external;
pub mod generator;
pub mod ir;
pub mod material;
pub mod processor;
pub mod program_manager;
pub mod render_state;
pub mod script;
pub mod settings;
pub mod srs;
pub mod utils;
pub mod writer;

pub use errors::{Result, RtssError};
pub use ir::{GpuProgramType, VertexElements};
pub use external::{AssumeAllPresent, ExternalProgramId, GpuProgramManager, ResourceLocator};
pub use generator::{DrainReport, ShaderGenerator, ValidationQueue, ValidationRequest};
pub use material::{Material, MaterialLibrary, Pass, Technique};
pub use processor::ProgramProcessor;
pub use program_manager::{ProgramHandle, ProgramManager};
pub use render_state::{RenderState, SrsRegistry, SubRenderState, SubRenderStateFactory};
pub use settings::{
    CompactPolicy, DEFAULT_SCHEME_NAME, RTSS_DEFAULT_SCHEME_NAME, ShaderGeneratorSettings,
};
pub use utils::interner;
pub use writer::ProgramWriter;

