//! Engine configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_IDLE_DELAY_MS: u64 = 100;
const DEFAULT_RATING_PREFIX: &str = "rating:";

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bounded idle delay between drain-loop passes, in milliseconds.
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    /// Prefix applied to rating labels when merging result bags.
    #[serde(default = "default_rating_prefix")]
    pub rating_prefix: String,
}

fn default_idle_delay_ms() -> u64 {
    DEFAULT_IDLE_DELAY_MS
}

fn default_rating_prefix() -> String {
    DEFAULT_RATING_PREFIX.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_delay_ms: DEFAULT_IDLE_DELAY_MS,
            rating_prefix: DEFAULT_RATING_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.idle_delay_ms == 0 {
            return Err("idle_delay_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: EngineConfig =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment, reading `.env` first.
    ///
    /// Recognized variables: `TAGBATCH_IDLE_DELAY_MS`, `TAGBATCH_RATING_PREFIX`.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var("TAGBATCH_IDLE_DELAY_MS") {
            cfg.idle_delay_ms = raw
                .parse()
                .map_err(|e| format!("TAGBATCH_IDLE_DELAY_MS invalid: {e}"))?;
        }
        if let Ok(prefix) = std::env::var("TAGBATCH_RATING_PREFIX") {
            cfg.rating_prefix = prefix;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Idle delay as a `Duration`.
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.idle_delay_ms, 100);
        assert_eq!(cfg.rating_prefix, "rating:");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.idle_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_idle_delay_rejected() {
        let cfg = EngineConfig {
            idle_delay_ms: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_json_str() {
        let cfg = EngineConfig::from_json_str(r#"{"idle_delay_ms": 25}"#).unwrap();
        assert_eq!(cfg.idle_delay_ms, 25);
        assert_eq!(cfg.rating_prefix, "rating:");

        assert!(EngineConfig::from_json_str(r#"{"idle_delay_ms": 0}"#).is_err());
        assert!(EngineConfig::from_json_str("not json").is_err());
    }
}
