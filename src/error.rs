// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Parlance
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for Parlance operations
#[derive(Error, Debug)]
pub enum ParlanceError {
    /// No live session with this id
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// No registered provider with this id
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A provider with this id is already registered
    #[error("Provider {0} already registered")]
    DuplicateProvider(String),

    /// Session initialization failed
    #[error("Session initialization failed: {0}")]
    SessionInitialization(String),

    /// The session was disposed before the operation could run
    #[error("Session disposed: {0}")]
    SessionDisposed(String),

    /// A provider call failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ParlanceError {
    /// Build a provider error from anything displayable
    pub fn provider(err: impl std::fmt::Display) -> Self {
        ParlanceError::Provider(err.to_string())
    }
}

/// Result type alias for Parlance operations
pub type Result<T> = std::result::Result<T, ParlanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_session_display() {
        let err = ParlanceError::UnknownSession("abc".to_string());
        assert_eq!(err.to_string(), "Unknown session: abc");
    }

    #[test]
    fn test_duplicate_provider_display() {
        let err = ParlanceError::DuplicateProvider("p1".to_string());
        assert_eq!(err.to_string(), "Provider p1 already registered");
    }

    #[test]
    fn test_provider_helper() {
        let err = ParlanceError::provider("boom");
        assert!(matches!(err, ParlanceError::Provider(ref m) if m == "boom"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ParlanceError = json_err.into();
        assert!(matches!(err, ParlanceError::Json(_)));
        assert!(err.to_string().starts_with("JSON error:"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ParlanceError = io_err.into();
        assert!(matches!(err, ParlanceError::Io(_)));
    }
}
