pub mod bundler;
pub mod jit;
pub mod loader;
pub mod sandbox;

pub use bundler::*;
pub use jit::*;
pub use loader::*;
pub use sandbox::*;
