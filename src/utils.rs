// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Utility functions for Parlance
//!
//! Small pure helpers shared by the service, the built-in provider and the CLI.

use std::sync::{Mutex, MutexGuard};

use crate::error::ParlanceError;

/// Number of characters of a message kept in log previews
pub const PREVIEW_CHARS: usize = 20;

/// Lock a mutex, recovering the data if a previous holder panicked
pub fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(target: "parlance", lock = what, "lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Shorten text for log lines, marking the cut with `[...]`
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}[...]", head)
    } else {
        head
    }
}

/// Format an error for display to the user
pub fn format_error(error: &ParlanceError) -> String {
    match error {
        ParlanceError::UnknownSession(id) => format!(
            "No session '{}' is open. Use `parlance history` to list saved sessions.",
            id
        ),
        ParlanceError::UnknownProvider(id) => format!("No provider '{}' is registered.", id),
        _ => format!("Error: {}", error),
    }
}

/// Validate a session id given on the command line
///
/// Returns the normalized session ID string or an error if invalid.
pub fn parse_session_id(session_id: &str) -> Result<String, ParlanceError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(ParlanceError::InvalidInput(
            "Session ID cannot be empty".to_string(),
        ));
    }

    uuid::Uuid::parse_str(trimmed)
        .map(|u| u.to_string())
        .map_err(|_| ParlanceError::InvalidInput("Invalid session ID format".to_string()))
}

/// Check if a line is an exit command
pub fn is_exit_command(input: &str) -> bool {
    let trimmed = input.trim().to_lowercase();
    matches!(trimmed.as_str(), "exit" | "quit" | ":exit" | ":quit")
}

/// Parse a slash command into (command_name, arguments)
///
/// Returns None if the input is not a slash command.
pub fn parse_slash_command(input: &str) -> Option<(&str, &str)> {
    let trimmed = input.trim();
    let without_slash = trimmed.strip_prefix('/')?;
    match without_slash.find(char::is_whitespace) {
        Some(idx) => Some((&without_slash[..idx], without_slash[idx..].trim())),
        None => Some((without_slash, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_text_unchanged() {
        assert_eq!(preview("hello"), "hello");
        assert_eq!(preview(""), "");
    }

    #[test]
    fn test_preview_truncates() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(preview(text), "abcdefghijklmnopqrst[...]");
    }

    #[test]
    fn test_preview_exactly_limit() {
        let text = "a".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&text), text);
    }

    #[test]
    fn test_preview_multibyte() {
        let text = "é".repeat(30);
        assert_eq!(preview(&text), format!("{}[...]", "é".repeat(20)));
    }

    #[test]
    fn test_lock_or_recover_poisoned() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let clone = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        let guard = lock_or_recover(&mutex, "test");
        assert_eq!(*guard, 1);
    }

    #[test]
    fn test_parse_session_id() {
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(parse_session_id(&format!(" {} ", id)).unwrap(), id);
        assert!(parse_session_id("").is_err());
        assert!(parse_session_id("not-a-uuid").is_err());
    }

    #[test]
    fn test_is_exit_command() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command(" QUIT "));
        assert!(is_exit_command(":quit"));
        assert!(!is_exit_command("/exit please"));
    }

    #[test]
    fn test_parse_slash_command() {
        assert_eq!(parse_slash_command("/upper hi there"), Some(("upper", "hi there")));
        assert_eq!(parse_slash_command("/reverse"), Some(("reverse", "")));
        assert_eq!(parse_slash_command("hello"), None);
    }

    #[test]
    fn test_format_error() {
        let msg = format_error(&ParlanceError::UnknownSession("abc".into()));
        assert!(msg.contains("abc"));
        let msg = format_error(&ParlanceError::Config("bad".into()));
        assert_eq!(msg, "Error: Configuration error: bad");
    }
}
