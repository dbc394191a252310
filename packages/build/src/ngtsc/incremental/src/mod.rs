// Incremental Source Module

pub mod api;
pub mod history;
pub mod state;

pub use api::{compute_fingerprint, IncrementalBuild};
pub use history::{CacheError, EmitHistory, EmitRecord, EMIT_HISTORY_FILE};
pub use state::IncrementalState;
