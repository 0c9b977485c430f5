use chrono::{DateTime, Utc};

use crate::error::{LifecycleError, Result};
use crate::models::{Classification, EventContent, NewChannel, ReminderContent};

const MAX_TITLE_LEN: usize = 500;
const MAX_DISPLAY_NAME_LEN: usize = 200;
const MAX_IDENTIFIER_LEN: usize = 320;
const MAX_FLAG_LEN: usize = 64;
const MAX_FLAGS: usize = 32;

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate an item title
    pub fn validate_title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(invalid("Title cannot be empty"));
        }

        if title.chars().count() > MAX_TITLE_LEN {
            return Err(invalid(format!("Title too long (max {MAX_TITLE_LEN} characters)")));
        }

        if title.contains('\0') {
            return Err(invalid("Title contains invalid characters"));
        }

        Ok(())
    }

    /// Validate a classifier confidence score
    pub fn validate_confidence(confidence: f64) -> Result<()> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(invalid(format!("Confidence must be between 0.0 and 1.0, got {confidence}")));
        }
        Ok(())
    }

    /// Validate quality flags: short, non-empty tags
    pub fn validate_quality_flags(flags: &[String]) -> Result<()> {
        if flags.len() > MAX_FLAGS {
            return Err(invalid(format!("Too many quality flags (max {MAX_FLAGS})")));
        }

        for flag in flags {
            if flag.trim().is_empty() {
                return Err(invalid("Quality flag cannot be empty"));
            }
            if flag.len() > MAX_FLAG_LEN {
                return Err(invalid(format!("Quality flag too long (max {MAX_FLAG_LEN} bytes): {flag}")));
            }
        }

        Ok(())
    }

    /// Validate an external channel identifier (phone number, chat id, email)
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(invalid("Channel identifier cannot be empty"));
        }

        if identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid(format!(
                "Channel identifier too long (max {MAX_IDENTIFIER_LEN} bytes)"
            )));
        }

        // Check for potentially dangerous characters
        if identifier.chars().any(char::is_control) {
            return Err(invalid("Channel identifier contains invalid characters"));
        }

        Ok(())
    }

    /// Validate an optional display name
    pub fn validate_display_name(name: Option<&str>) -> Result<()> {
        let Some(name) = name else {
            return Ok(());
        };

        if name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(invalid(format!(
                "Display name too long (max {MAX_DISPLAY_NAME_LEN} characters)"
            )));
        }

        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(invalid("Display name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate that an event does not end before it starts
    pub fn validate_time_range(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(invalid(format!("End time {end} is before start time {start}")));
            }
        }
        Ok(())
    }

    /// Validate classifier output
    pub fn validate_classification(classification: &Classification) -> Result<()> {
        if let Some(confidence) = classification.confidence {
            Self::validate_confidence(confidence)?;
        }
        Self::validate_quality_flags(&classification.quality_flags)
    }

    /// Validate reminder content
    pub fn validate_reminder(content: &ReminderContent) -> Result<()> {
        Self::validate_title(&content.title)
    }

    /// Validate event content
    pub fn validate_event(content: &EventContent) -> Result<()> {
        Self::validate_title(&content.title)?;
        Self::validate_time_range(content.start_time, content.end_time)
    }

    /// Validate a channel before creation
    pub fn validate_channel(channel: &NewChannel) -> Result<()> {
        Self::validate_identifier(&channel.identifier)?;
        Self::validate_display_name(channel.display_name.as_deref())
    }
}

fn invalid(message: impl Into<String>) -> LifecycleError {
    LifecycleError::InvalidInput(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_title_rules() {
        assert!(InputValidator::validate_title("Dentist at 3").is_ok());
        assert!(InputValidator::validate_title("   ").is_err());
        assert!(InputValidator::validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(InputValidator::validate_confidence(0.0).is_ok());
        assert!(InputValidator::validate_confidence(1.0).is_ok());
        assert!(InputValidator::validate_confidence(1.01).is_err());
        assert!(InputValidator::validate_confidence(f64::NAN).is_err());
    }

    #[test]
    fn test_time_range() {
        let now = Utc::now();
        assert!(InputValidator::validate_time_range(Some(now), Some(now)).is_ok());
        assert!(InputValidator::validate_time_range(Some(now), None).is_ok());
        assert!(
            InputValidator::validate_time_range(Some(now), Some(now - Duration::minutes(1))).is_err()
        );
    }
}
