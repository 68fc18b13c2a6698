//! Configuration validation for RyuBot.
//!
//! Missing credentials and out-of-range values are caught here, before the
//! bot starts polling, so the process can exit with a clear message.

use thiserror::Error;

use crate::config::{
    CompletionConfig, Config, ExportConfig, ModePreset, ModesConfig, ObservabilityConfig,
    SessionConfig, TelegramConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Collapse a list of errors into a single result.
fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 6] = [
            &self.telegram,
            &self.completion,
            &self.modes,
            &self.session,
            &self.export,
            &self.observability,
        ];

        let errors = sections
            .iter()
            .filter_map(|s| s.validate().err())
            .flat_map(|e| match e {
                ValidationError::Multiple(inner) => inner,
                other => vec![other],
            })
            .collect();

        collect(errors)
    }
}

impl Validate for TelegramConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.bot_token.trim().is_empty() {
            errors.push(missing("telegram.bot_token (TELEGRAM_TOKEN)"));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            errors.push(invalid("telegram.api_base", "must be an http(s) URL"));
        }
        if self.poll_timeout_secs == 0 {
            errors.push(invalid("telegram.poll_timeout_secs", "must be at least 1"));
        }
        collect(errors)
    }
}

impl Validate for CompletionConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.api_key.trim().is_empty() {
            errors.push(missing("completion.api_key (DEEPSEEK_API_KEY)"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            errors.push(invalid("completion.endpoint", "must be an http(s) URL"));
        }
        if self.timeout_secs == 0 {
            errors.push(invalid("completion.timeout_secs", "must be at least 1"));
        }
        collect(errors)
    }
}

fn validate_preset(field: &str, preset: &ModePreset) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if preset.model.trim().is_empty() {
        errors.push(missing(&format!("{field}.model")));
    }
    if !(0.0..=2.0).contains(&preset.temperature) {
        errors.push(invalid(
            &format!("{field}.temperature"),
            format!("{} is outside 0.0..=2.0", preset.temperature),
        ));
    }
    errors
}

impl Validate for ModesConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = validate_preset("modes.primary", &self.primary);
        errors.extend(validate_preset("modes.alternate", &self.alternate));
        if self.primary == self.alternate {
            errors.push(invalid("modes", "primary and alternate presets are identical"));
        }
        collect(errors)
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_turns == 0 {
            return Err(invalid("session.max_turns", "must be at least 1"));
        }
        Ok(())
    }
}

impl Validate for ExportConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.dir.trim().is_empty() {
            errors.push(missing("export.dir"));
        }
        if self.name_max_len == 0 {
            errors.push(invalid("export.name_max_len", "must be at least 1"));
        }
        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.log_format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(invalid(
                "observability.log_format",
                format!("'{other}' is not one of json, pretty"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".into();
        config.completion.api_key = "sk-test".into();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_reported_together() {
        let err = Config::default().validate().unwrap_err();
        match err {
            ValidationError::Multiple(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors
                    .iter()
                    .all(|e| matches!(e, ValidationError::MissingField { .. })));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_max_turns_rejected() {
        let mut config = valid_config();
        config.session.max_turns = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_temperature_out_of_range() {
        let mut config = valid_config();
        config.modes.alternate.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identical_presets_rejected() {
        let mut config = valid_config();
        config.modes.alternate = config.modes.primary.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_format() {
        let mut config = valid_config();
        config.observability.log_format = "xml".into();
        assert!(config.validate().is_err());
    }
}
