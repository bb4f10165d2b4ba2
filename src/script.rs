//! Material Script Surface
//!
//! The shader generator does not parse material scripts. An external parser
//! hands it one [`PropertyNode`] per property found inside an
//! `rtshader_system { ... }` block; [`ScriptTranslator`] dispatches the node
//! to the factories and collects script errors with file and line. The
//! reverse direction goes through [`ScriptSerializer`].
//!
//! ```text
//! rtshader_system
//! {
//!     light_count 1 0 0
//!     lighting_stage metal_roughness texture rock_orm.png
//!     weighted_blended_oit true
//! }
//! ```

use std::fmt::Write as _;

use crate::errors::RtssError;
use crate::material::Pass;
use crate::render_state::{SrsRegistry, SubRenderState};

/// Name of the block the generator's properties live in.
pub const RTSHADER_SYSTEM_BLOCK: &str = "rtshader_system";

/// `light_count <directional> <point> <spot>`, handled by the generator
/// rather than a factory.
pub const LIGHT_COUNT_PROPERTY: &str = "light_count";

// ─── PropertyNode ────────────────────────────────────────────────────────────

/// One `name value value ...` property line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyNode {
    pub name: String,
    pub values: Vec<String>,
    pub file: String,
    pub line: u32,
}

impl PropertyNode {
    #[must_use]
    pub fn new<I, S>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            file: String::new(),
            line: 0,
        }
    }

    /// Records where the property came from.
    #[must_use]
    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.file = file.to_string();
        self.line = line;
        self
    }

    /// Splits one property line into name and values.
    ///
    /// Blank lines, `//` comments and braces yield `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.split("//").next().unwrap_or_default().trim();
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?;
        if name == "{" || name == "}" {
            return None;
        }
        Some(Self::new(name, tokens))
    }

    /// Properties of an `rtshader_system` block, with line numbers.
    ///
    /// The block header and braces are skipped; nested sections are not
    /// supported.
    #[must_use]
    pub fn parse_block(text: &str, file: &str) -> Vec<Self> {
        text.lines()
            .enumerate()
            .filter_map(|(i, line)| {
                Self::parse(line).map(|node| node.at(file, i as u32 + 1))
            })
            .filter(|node| node.name != RTSHADER_SYSTEM_BLOCK)
            .collect()
    }

    #[must_use]
    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }
}

// ─── ScriptTranslator ────────────────────────────────────────────────────────

/// Dispatches properties to factories and records script errors.
#[derive(Debug, Default)]
pub struct ScriptTranslator {
    errors: Vec<RtssError>,
}

impl ScriptTranslator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error against `node`.
    pub fn error(&mut self, node: &PropertyNode, message: impl Into<String>) {
        let err = RtssError::Script {
            file: node.file.clone(),
            line: node.line,
            message: message.into(),
        };
        log::warn!("{err}");
        self.errors.push(err);
    }

    #[must_use]
    pub fn errors(&self) -> &[RtssError] {
        &self.errors
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<RtssError> {
        std::mem::take(&mut self.errors)
    }

    /// Creates the sub render state `node` describes.
    ///
    /// Factories are asked in type-name order; the first one that recognises
    /// the property wins. A property nobody recognises is an
    /// [`RtssError::UnknownType`] script error.
    pub fn translate(
        &mut self,
        registry: &SrsRegistry,
        node: &PropertyNode,
        pass: &Pass,
    ) -> Option<Box<dyn SubRenderState>> {
        let errors_before = self.errors.len();
        for factory in registry.factories() {
            if let Some(srs) = factory.create_from_script(node, pass, self) {
                return Some(srs);
            }
            if self.errors.len() > errors_before {
                return None;
            }
        }
        let unknown = RtssError::UnknownType(format!("{} {}", node.name, node.values.join(" ")));
        self.error(node, unknown.to_string());
        None
    }

    // ── Value parsing ────────────────────────────────────────────────────────

    /// Parses value `index` as an integer, recording an error on failure.
    pub fn parse_u32(&mut self, node: &PropertyNode, index: usize) -> Option<u32> {
        let parsed = node.value(index).and_then(|v| v.parse().ok());
        if parsed.is_none() {
            self.error(node, format!("'{}' expects an integer at position {}", node.name, index + 1));
        }
        parsed
    }

    /// Parses value `index` as a real number, recording an error on failure.
    pub fn parse_f32(&mut self, node: &PropertyNode, index: usize) -> Option<f32> {
        let parsed = node.value(index).and_then(|v| v.parse().ok());
        if parsed.is_none() {
            self.error(node, format!("'{}' expects a number at position {}", node.name, index + 1));
        }
        parsed
    }

    /// Parses value `index` as `true`/`false` (`on`/`off` accepted).
    pub fn parse_bool(&mut self, node: &PropertyNode, index: usize) -> Option<bool> {
        let parsed = match node.value(index) {
            Some("true" | "on") => Some(true),
            Some("false" | "off") => Some(false),
            _ => None,
        };
        if parsed.is_none() {
            self.error(node, format!("'{}' expects true or false at position {}", node.name, index + 1));
        }
        parsed
    }
}

// ─── ScriptSerializer ────────────────────────────────────────────────────────

/// Writes material-script sections and properties with tab indentation.
#[derive(Debug, Default)]
pub struct ScriptSerializer {
    out: String,
    depth: usize,
}

impl ScriptSerializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts serializing nested inside an enclosing section at `depth`.
    #[must_use]
    pub fn with_depth(depth: usize) -> Self {
        Self {
            out: String::new(),
            depth,
        }
    }

    pub fn begin_section(&mut self, name: &str) {
        self.indent();
        self.out.push_str(name);
        self.out.push('\n');
        self.indent();
        self.out.push_str("{\n");
        self.depth += 1;
    }

    pub fn end_section(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str("}\n");
    }

    pub fn write_attribute(&mut self, name: &str, values: &[&str]) {
        self.indent();
        self.out.push_str(name);
        for value in values {
            let _ = write!(self.out, " {value}");
        }
        self.out.push('\n');
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.out
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.out
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
    }
}
