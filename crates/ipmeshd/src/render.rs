//! Rendering configuration trees into daemon artifacts.
//!
//! Rendering is a pure function of the template id and the tree: the same
//! input always yields byte-identical output.

use crate::error::RenderError;
use ipmesh_lib::{ConfigTree, NodeId, Value};
use std::path::{Path, PathBuf};

/// Flagfile template: one `--key=value` line per option.
pub const GFLAGS_TEMPLATE: &str = "gflags";
/// Pretty-printed JSON of the whole tree.
pub const JSON_TEMPLATE: &str = "json";

const HEADER: &str = "# Generated by ipmeshd. Edits are overwritten on the next build.\n";

/// Turns a configuration tree into artifact text.
pub trait Renderer: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownTemplate`] for unsupported template ids
    /// and [`RenderError::Value`] for values the template cannot express.
    fn render(&self, template_id: &str, tree: &ConfigTree) -> Result<String, RenderError>;
}

/// Renderer for the built-in `gflags` and `json` templates.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRenderer;

impl Renderer for BuiltinRenderer {
    fn render(&self, template_id: &str, tree: &ConfigTree) -> Result<String, RenderError> {
        match template_id {
            GFLAGS_TEMPLATE => render_gflags(tree),
            JSON_TEMPLATE => render_json(tree),
            other => Err(RenderError::UnknownTemplate(other.to_owned())),
        }
    }
}

/// Artifact location of daemon `kind` on `node`.
#[must_use]
pub fn artifact_path(artifact_dir: &Path, node: &NodeId, kind: &str) -> PathBuf {
    artifact_dir.join(node.as_str()).join(format!("{kind}.cfg"))
}

fn scalar(key: &str, value: &Value) -> Result<String, RenderError> {
    let text = value.to_string();
    if text.contains('\n') {
        return Err(RenderError::Value {
            key: key.to_owned(),
            reason: "flag values cannot span lines".to_owned(),
        });
    }
    Ok(text)
}

/// Render a flagfile.
///
/// Scalars become `--key=value`, lists of scalars are comma-joined and
/// empty lists are left out. Trees and lists of trees are passed as one
/// flag holding compact JSON, keeping every nested override in a value the
/// daemon reads.
///
/// # Errors
///
/// Fails when a value contains a newline or a list mixes scalars and trees.
pub fn render_gflags(tree: &ConfigTree) -> Result<String, RenderError> {
    let mut out = String::from(HEADER);
    for (key, value) in tree.iter() {
        let text = match value {
            Value::List(items) if items.is_empty() => continue,
            Value::List(items) if items.iter().all(Value::is_scalar) => scalar(key, value)?,
            Value::List(items) if items.iter().any(Value::is_scalar) => {
                return Err(RenderError::Value {
                    key: key.to_owned(),
                    reason: "list mixes scalars and trees".to_owned(),
                });
            }
            Value::List(_) | Value::Tree(_) => {
                serde_json::to_string(value).map_err(|e| RenderError::Json(e.to_string()))?
            }
            _ => scalar(key, value)?,
        };
        push_flag(&mut out, key, &text);
    }
    Ok(out)
}

fn push_flag(out: &mut String, key: &str, text: &str) {
    out.push_str("--");
    out.push_str(key);
    out.push('=');
    out.push_str(text);
    out.push('\n');
}

/// Render the tree as pretty JSON with a trailing newline.
///
/// # Errors
///
/// Returns [`RenderError::Json`] when a float is not finite.
pub fn render_json(tree: &ConfigTree) -> Result<String, RenderError> {
    let mut text =
        serde_json::to_string_pretty(tree).map_err(|e| RenderError::Json(e.to_string()))?;
    text.push('\n');
    Ok(text)
}
