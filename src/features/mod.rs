pub mod engineer;
pub mod tape_index;

pub use engineer::engineer_features;
pub use tape_index::TapeIndex;
