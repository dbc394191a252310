//! Resource Loading
//!
//! Compiles component resources (templates and stylesheets) through isolated
//! sub-builds and tracks which files each compiled resource was built from.

pub mod src;


pub use src::*;
