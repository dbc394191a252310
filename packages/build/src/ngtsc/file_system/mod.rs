//! File System Abstraction
//!
//! The file system seen by the compiler: the machine's real file system or an
//! in-memory one for tests.

pub mod src;
pub mod testing;

#[cfg(test)]
mod test;

pub use src::*;
