pub mod console;
pub mod writer;

pub use console::log_summary;
pub use writer::OutputWriter;
