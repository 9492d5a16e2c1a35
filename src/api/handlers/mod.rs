pub mod history;
pub mod predict;
pub mod system;

pub use history::*;
pub use predict::*;
pub use system::*;
