pub mod confidence;
pub mod resolver;

pub use confidence::{compute_confidence, merge_validation, Confidence};
pub use resolver::{apply_fallback, FallbackSource};
