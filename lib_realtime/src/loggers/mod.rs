/// fern dispatch setup and log file rotation.
pub mod logger;

pub use logger::{parse_level, setup_logging};
