//! Error types for testreporter

use std::io;
use thiserror::Error;

/// Result type alias for testreporter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for testreporter
///
/// None of these errors ever cross the host callback boundary: the observer
/// facade logs them and returns normally so a reporting malfunction can never
/// fail or block the test run itself.
#[derive(Error, Debug)]
pub enum Error {
    /// No test run is currently active.
    #[error("No active test run")]
    NoActiveRun,

    /// No test case is currently active.
    #[error("No active test case")]
    NoActiveCase,

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The reporting sink rejected or failed an operation.
    #[error("Reporting sink error: {0}")]
    Sink(String),

    /// A sink response could not be decoded into an identifier.
    #[error("Failed to decode sink response: {0}")]
    Decode(String),

    /// Installing the stream redirection failed (descriptor duplication
    /// or pipe creation was denied by the OS).
    #[error("Stream redirection setup failed: {0}")]
    Redirection(String),

    /// The capture worker thread is no longer running.
    #[error("Capture worker unavailable: {0}")]
    WorkerGone(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Other error with custom message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
