//! Test utilities shared across crate-level unit tests.

pub mod logging;

pub use logging::{capturing_logger, LogCapture};
