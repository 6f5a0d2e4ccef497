// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io;

use parlance::error::ParlanceError;
use parlance::utils::format_error;

#[test]
fn test_io_error_conversion() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
    let error: ParlanceError = io_error.into();

    match error {
        ParlanceError::Io(_) => {}
        _ => panic!("Expected Io error, got different error type"),
    }
}

#[test]
fn test_unknown_provider_display() {
    let error = ParlanceError::UnknownProvider("copilot".to_string());
    assert_eq!(error.to_string(), "Unknown provider: copilot");
}

#[test]
fn test_config_error_display() {
    let error = ParlanceError::Config("bad value".to_string());
    assert_eq!(error.to_string(), "Configuration error: bad value");
}

#[test]
fn test_format_error_for_unknown_session() {
    let error = ParlanceError::UnknownSession("abc".to_string());
    assert!(format_error(&error).contains("parlance history"));
}

#[test]
fn test_format_error_fallback() {
    let error = ParlanceError::Storage("disk full".to_string());
    assert_eq!(format_error(&error), "Error: Storage error: disk full");
}
