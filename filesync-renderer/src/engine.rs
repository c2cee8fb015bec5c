//! Tera rendering engine for pull-request title and body.
//!
//! | Template       | Produces          |
//! |----------------|-------------------|
//! | `title.tera`   | PR title (trimmed)|
//! | `body.md.tera` | PR body (markdown)|
//!
//! A user template directory may override either file by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use crate::context::PullRequestContext;
use crate::error::RenderError;

pub const TITLE_TEMPLATE: &str = "title.tera";
pub const BODY_TEMPLATE: &str = "body.md.tera";

// Defaults; a user template directory may replace either by file name.
const TPLS: &[(&str, &str)] = &[
    (TITLE_TEMPLATE, include_str!("templates/title.tera")),
    (BODY_TEMPLATE, include_str!("templates/body.md.tera")),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut templates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert((*name).to_string(), (*content).to_string());
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders pull-request text. Create once and reuse.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Construct a [`Renderer`] with the embedded templates only.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_template_dir(None)
    }

    /// Construct a [`Renderer`], letting `.tera` files in `dir` override the
    /// embedded defaults by name.
    pub fn with_template_dir(dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Renderer { tera: build_tera(dir)? })
    }

    pub fn render_title(&self, ctx: &PullRequestContext) -> Result<String, RenderError> {
        let rendered = self.tera.render(TITLE_TEMPLATE, &ctx.to_tera_context()?)?;
        Ok(rendered.trim().to_string())
    }

    pub fn render_body(&self, ctx: &PullRequestContext) -> Result<String, RenderError> {
        Ok(self.tera.render(BODY_TEMPLATE, &ctx.to_tera_context()?)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
