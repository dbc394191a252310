//! Incremental Compilation
//!
//! Framework-level bookkeeping that survives between passes: which emitted
//! outputs are still valid, and the emit history used to decide whether a
//! downstream consumer must be rebuilt.

pub mod src;


pub use src::*;
