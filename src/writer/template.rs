//! Translation-unit templates.
//!
//! The layout of a generated file (header, includes, declarations, `main`) is
//! a minijinja template per language family, embedded with rust-embed. The
//! syntax is configured with `{$ $}` blocks and `$$` line statements so the
//! templates stay readable next to C-like shader code.

use std::borrow::Cow;
use std::sync::LazyLock;

use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;

use crate::errors::{Result, RtssError};

#[derive(RustEmbed)]
#[folder = "src/writer/templates"]
struct TemplateAssets;

static TEMPLATE_ENV: LazyLock<std::result::Result<Environment<'static>, String>> =
    LazyLock::new(|| build_env().map_err(|e| e.to_string()));

fn build_env() -> std::result::Result<Environment<'static>, Error> {
    let mut env = Environment::new();

    let syntax = SyntaxConfig::builder()
        .block_delimiters("{$", "$}")
        .variable_delimiters("{{", "}}")
        .line_statement_prefix("$$")
        .build()?;

    env.set_syntax(syntax);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);

    env.set_loader(load_template);

    env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

    Ok(env)
}

/// Shared template environment.
pub fn get_env() -> Result<&'static Environment<'static>> {
    TEMPLATE_ENV.as_ref().map_err(|message| {
        RtssError::Template(Error::new(ErrorKind::InvalidOperation, message.clone()))
    })
}

/// Embedded unit templates (`glsl_unit`) and chunks (`chunks/banner`). The
/// `.jinja` extension is optional.
fn load_template(name: &str) -> std::result::Result<Option<String>, Error> {
    let path: Cow<'_, str> = if name.ends_with(".jinja") {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.jinja"))
    };
    let Some(file) = TemplateAssets::get(&path) else {
        return Ok(None);
    };
    String::from_utf8(file.data.into_owned())
        .map(Some)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("{path}: {e}")))
}
