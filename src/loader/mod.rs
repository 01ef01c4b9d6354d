pub mod notes;
pub mod tape;

pub use tape::{audit, load_all_csvs};
