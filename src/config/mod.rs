//! Configuration schema, parsing, and resolution for `pt.toml` (C1-C4).
pub mod env_file;
pub mod inline_metadata;
pub mod loader;
pub mod schema;

pub use loader::{EffectiveConfig, EffectiveTask, TaskKind, discover, load, load_file};
pub use schema::{Condition, Hooks, OnFailure, OutputMode, PipelineConfig, StageConfig};
