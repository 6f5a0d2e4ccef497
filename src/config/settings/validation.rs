// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{ParlanceError, Result};

use super::Settings;

impl Settings {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.history.max_persisted_sessions == 0 {
            return Err(ParlanceError::Config(
                "history.max_persisted_sessions must be at least 1".to_string(),
            ));
        }
        if self.history.storage_key.trim().is_empty() {
            return Err(ParlanceError::Config(
                "history.storage_key must not be empty".to_string(),
            ));
        }
        if self.storage.file_name.trim().is_empty() {
            return Err(ParlanceError::Config(
                "storage.file_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_max_sessions_rejected() {
        let mut settings = Settings::default();
        settings.history.max_persisted_sessions = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_persisted_sessions"));
    }

    #[test]
    fn test_blank_storage_key_rejected() {
        let mut settings = Settings::default();
        settings.history.storage_key = "  ".to_string();
        assert!(matches!(settings.validate(), Err(ParlanceError::Config(_))));
    }
}
