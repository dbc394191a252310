//! Transformers
//!
//! The compiler host and the contracts it implements.

pub mod api;
pub mod compiler_host;

pub use api::*;
pub use compiler_host::*;
