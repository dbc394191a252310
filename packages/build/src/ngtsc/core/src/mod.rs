pub mod compiler;
pub mod component;
pub mod options;
pub mod template;
pub mod transform;

pub use compiler::*;
pub use component::*;
pub use options::*;
pub use template::*;
pub use transform::*;
