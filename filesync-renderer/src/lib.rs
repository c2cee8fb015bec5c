//! # filesync-renderer
//!
//! Tera-based rendering of the pull-request title and body that accompany a
//! sync commit.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use filesync_renderer::{PullRequestContext, Renderer};
//!
//! fn render(ctx: &PullRequestContext) {
//!     if let Ok(renderer) = Renderer::new() {
//!         if let (Ok(title), Ok(body)) = (renderer.render_title(ctx), renderer.render_body(ctx)) {
//!             println!("{title}\n\n{body}");
//!         }
//!     }
//! }
//! # let _ = PullRequestContext::new("o/r", "sync/repo-files", "main", Utc::now());
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{PullRequestContext, DEFAULT_INTRO};
pub use engine::Renderer;
pub use error::RenderError;
