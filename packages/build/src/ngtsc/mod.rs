//! Angular TypeScript Compiler (ngtsc)
//!
//! The framework layer on top of the `ts` program: component analysis,
//! type-check shims, resource loading and incremental bookkeeping.

pub mod core;
pub mod diagnostics;
pub mod file_system;
pub mod incremental;
pub mod resource;
pub mod shims;
