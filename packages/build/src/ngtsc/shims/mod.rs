//! Shims
//!
//! Type-check shims: generated companion files that check template-bound
//! expressions against a component class. Each shim correlates 1:1 with a user
//! file through a fixed suffix.

pub mod src;

#[cfg(test)]
mod test;

pub use src::*;
