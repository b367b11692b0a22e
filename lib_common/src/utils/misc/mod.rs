/// Timestamp and process helpers.
pub mod utils;
