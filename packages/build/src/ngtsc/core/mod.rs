//! Core
//!
//! Component analysis for a program: `@Component` metadata, resource loading,
//! template scanning, type-check shim generation and the resource rewrites
//! applied at emit.

pub mod src;

#[cfg(test)]
mod test;

pub use src::*;
