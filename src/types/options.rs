//! Per-call generation options.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Explicit per-call overrides. Validated once at the pipeline boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, t: f64) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Temperature used for fingerprinting and batch priority; unset means 0.
    pub fn effective_temperature(&self) -> f64 {
        self.temperature.unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !t.is_finite() || !(0.0..=2.0).contains(&t) {
                return Err(Error::validation_with_context(
                    "temperature must be within [0, 2]",
                    ErrorContext::new()
                        .with_field_path("options.temperature")
                        .with_details(format!("got {}", t)),
                ));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(Error::validation_with_context(
                "max_tokens must be positive",
                ErrorContext::new().with_field_path("options.max_tokens"),
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::validation_with_context(
                "timeout must be positive",
                ErrorContext::new().with_field_path("options.timeout"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_defaults() {
        let opts = RequestOptions::new("m1").with_max_tokens(256);
        assert_eq!(opts.model, "m1");
        assert_eq!(opts.effective_temperature(), 0.0);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RequestOptions::new("m").with_temperature(2.5).validate().is_err());
        assert!(RequestOptions::new("m").with_temperature(f64::NAN).validate().is_err());
        assert!(RequestOptions::new("m").with_max_tokens(0).validate().is_err());
        assert!(RequestOptions::new("m")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
