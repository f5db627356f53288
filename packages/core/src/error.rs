//! Error types shared by every backend.

use crate::stream::{StreamMode, StreamOp};

/// Errors surfaced by resource operations.
///
/// All errors are returned synchronously; nothing in the core retries.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown scheme: {scheme}")]
    UnknownScheme { scheme: String },

    #[error("scheme already registered: {scheme}")]
    DuplicateScheme { scheme: String },

    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("'{name}' already exists in {parent}")]
    AlreadyExists { name: String, parent: String },

    /// A stream operation conflicts with the buffer currently open on a file.
    #[error("cannot {requested} {url}: {active} is pending, flush or reset first")]
    InvalidStreamState {
        url: String,
        requested: StreamOp,
        active: StreamMode,
    },

    /// A path that walks through a file, or a file addressed as a directory.
    #[error("invalid path shape on '{location}': {path}: {message}")]
    InvalidPathShape {
        location: String,
        path: String,
        message: String,
    },

    /// An external command or request returned a failure.
    #[error("{command} failed (status {status:?}): {message}")]
    BackendCommandFailure {
        command: String,
        status: Option<i32>,
        message: String,
    },

    /// The location was closed; its resources can no longer be used.
    #[error("location '{location}' is closed")]
    NotActive { location: String },

    #[error("{operation} is not supported for {url}")]
    Unsupported {
        url: String,
        operation: &'static str,
    },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(url: impl ToString) -> Self {
        Error::NotFound {
            url: url.to_string(),
        }
    }

    pub fn already_exists(name: impl Into<String>, parent: impl ToString) -> Self {
        Error::AlreadyExists {
            name: name.into(),
            parent: parent.to_string(),
        }
    }

    /// Map an I/O error on `url`, turning `ErrorKind::NotFound` into [`Error::NotFound`].
    pub fn from_io(err: std::io::Error, url: impl ToString) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(url)
        } else {
            Error::Io(err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn stream_state_names_conflicting_mode() {
        let e = Error::InvalidStreamState {
            url: "mem://loc/a".to_string(),
            requested: StreamOp::Append,
            active: StreamMode::Writing,
        };
        let display = format!("{}", e);
        assert!(display.contains("append"));
        assert!(display.contains("writing"));
        assert!(display.contains("mem://loc/a"));
    }

    #[test]
    fn backend_failure_display() {
        let e = Error::BackendCommandFailure {
            command: "swift list".to_string(),
            status: Some(1),
            message: "Container not found".to_string(),
        };
        let display = format!("{}", e);
        assert!(display.contains("swift list"));
        assert!(display.contains("Some(1)"));
        assert!(display.contains("Container not found"));
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = Error::from_io(io_err, "file:///tmp/gone");
        assert!(matches!(e, Error::NotFound { ref url } if url == "file:///tmp/gone"));
    }

    #[test]
    fn other_io_errors_keep_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = Error::from_io(io_err, "file:///root");
        assert!(matches!(e, Error::Io(_)));
        assert!(StdError::source(&e).is_some());
    }

    #[test]
    fn io_conversion() {
        let io_err = std::io::Error::other("boom");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(!e.is_not_found());
    }
}
