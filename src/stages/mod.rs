pub mod stage0_normalize;
pub mod stage1_summaries;
pub mod stage2_boundaries;
pub mod stage3_assemble;

pub use stage0_normalize::*;
pub use stage1_summaries::*;
pub use stage2_boundaries::*;
pub use stage3_assemble::*;
