pub mod names;
pub mod pattern;

pub use names::*;
pub use pattern::*;
