pub mod local;
pub mod types;
pub mod util;

pub use local::*;
pub use types::*;
pub use util::*;
