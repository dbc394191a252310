#![deny(clippy::all)]

/**
 * Angular Build - Rust Implementation
 *
 * Incremental compilation sessions, resource loading and watch-mode
 * rebuilds for Angular applications
 */
pub mod bundler;
pub mod compile;
pub mod ngtsc;
pub mod perform_compile;
pub mod perform_watch;
pub mod transformers;
