pub mod models;
pub mod writer;

pub use writer::{write_diff_reports, HistoryStore};
