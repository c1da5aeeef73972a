/// Chunked concurrent calls with retries
pub mod batch;
/// Network addresses and presets
pub mod constants;
/// Logger setup
pub mod logger;
