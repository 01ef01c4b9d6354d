pub mod scorer;

pub use scorer::{validate, MarketValidation, ValidationReport};
