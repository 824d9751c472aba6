// Copyright 2025 Cowboy AI, LLC.

//! Weaving configuration supplied by the caller

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::WeaveResult;

/// Options for a weaving pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Escalate every warning to an error before commit
    pub treat_warnings_as_errors: bool,
    /// Run the verifier after a successful rewrite
    pub run_verification: bool,
    /// How long the verifier may run
    #[serde(with = "duration_ms")]
    pub verification_timeout: Duration,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            treat_warnings_as_errors: false,
            run_verification: false,
            verification_timeout: Duration::from_secs(30),
        }
    }
}

impl WeaveConfig {
    /// Set warnings-as-errors
    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.treat_warnings_as_errors = enabled;
        self
    }

    /// Enable or disable verification
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.run_verification = enabled;
        self
    }

    /// Set the verifier timeout
    pub fn with_verification_timeout(mut self, timeout: Duration) -> Self {
        self.verification_timeout = timeout;
        self
    }

    /// Parse from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> WeaveResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WeaveConfig::default();
        assert!(!config.treat_warnings_as_errors);
        assert!(!config.run_verification);
        assert_eq!(config.verification_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_serialized_as_milliseconds() {
        let config = WeaveConfig::default().with_verification_timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["verification_timeout"], 1500);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WeaveConfig::from_json(r#"{"run_verification": true}"#).unwrap();
        assert!(config.run_verification);
        assert!(!config.treat_warnings_as_errors);
        assert_eq!(config.verification_timeout, Duration::from_secs(30));
    }
}
