//! filesync core library - domain types, config resolution, errors.
//!
//! Public API surface:
//! - [`types`] - newtypes and domain structs
//! - [`error`] - [`ConfigError`]
//! - [`config`] - load / resolve the sync configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::ResolvedConfig;
pub use error::ConfigError;
pub use types::{FileMapping, RelatedPullReference, RepoName, SourceRepo, SubstitutionRule};
