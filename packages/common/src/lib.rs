pub mod error;
pub mod section;

pub use error::*;
pub use section::*;
