pub mod label;
pub mod prediction;

pub use label::*;
pub use prediction::*;
