//! Error handling for the iqfm library
//!
//! This module provides a unified error type for every pipeline stage and for
//! the capture readers and writers around it. Configuration problems are
//! reported as [`Error::InvalidArgument`] naming the stage that rejected the
//! value.

use std::io;

use thiserror::Error;

/// A specialized Result type for iqfm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for iqfm operations
#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration: non-positive sample rate, cutoff at or above
    /// Nyquist, zero decimation factor, ...
    #[error("{stage}: {message}")]
    InvalidArgument {
        stage: &'static str,
        message: String,
    },

    /// The sample source has no more samples to offer
    #[error("end of stream")]
    EndOfStream,

    /// Capture data that does not match its declared layout
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// I/O error (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Sidecar metadata could not be parsed or serialized
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Timestamp not in ISO-8601 / RFC 3339 form
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),
}

impl Error {
    /// Create an invalid argument error for the given pipeline stage
    pub fn invalid_argument<S: Into<String>>(stage: &'static str, msg: S) -> Self {
        Error::InvalidArgument {
            stage,
            message: msg.into(),
        }
    }

    /// Create a malformed record error with a custom message
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::MalformedRecord(msg.into())
    }

    /// Returns true if this error marks an exhausted source
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_argument_names_stage() {
        let err = Error::invalid_argument("decimate", "decimation factor must be ≥ 1, got 0");
        assert!(matches!(
            err,
            Error::InvalidArgument {
                stage: "decimate",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "decimate: decimation factor must be ≥ 1, got 0"
        );
    }

    #[test]
    fn test_malformed_constructor() {
        let err = Error::malformed("header larger than file");
        assert!(matches!(err, Error::MalformedRecord(_)));
        assert!(err.to_string().contains("header larger than file"));
    }

    #[test]
    fn test_end_of_stream() {
        assert!(Error::EndOfStream.is_end_of_stream());
        assert!(!Error::malformed("x").is_end_of_stream());
    }

    #[test]
    fn test_metadata_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Metadata(_)));
    }
}
