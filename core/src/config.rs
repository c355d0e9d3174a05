//! Engine configuration, built once at process start.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bounded wait for an impersonated child: 30 seconds.
const DEFAULT_RUN_AS_TIMEOUT_SECS: u64 = 30;

/// Settings handed to [`ActionDispatcher::new`](crate::ActionDispatcher::new).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Run operations under the caller's OS identity. When `false`, every
    /// call runs as the service process.
    #[serde(default = "default_impersonate")]
    pub impersonate: bool,
    /// How long to wait for an impersonated operation before killing it.
    #[serde(default = "default_run_as_timeout", with = "duration_secs")]
    pub run_as_timeout: Duration,
    /// Upper bound for the `name (n).ext` counter; `None` is unbounded.
    #[serde(default)]
    pub max_duplicates: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            impersonate: default_impersonate(),
            run_as_timeout: default_run_as_timeout(),
            max_duplicates: None,
        }
    }
}

impl EngineConfig {
    /// Read configuration from environment variables.
    ///
    /// Absent or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let impersonate = lookup("FILEWARD_IMPERSONATE")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.impersonate);

        let run_as_timeout = lookup("FILEWARD_RUN_AS_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.run_as_timeout);

        let max_duplicates = lookup("FILEWARD_MAX_DUPLICATES").and_then(|s| s.trim().parse().ok());

        Self {
            impersonate,
            run_as_timeout,
            max_duplicates,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_impersonate() -> bool {
    true
}

fn default_run_as_timeout() -> Duration {
    Duration::from_secs(DEFAULT_RUN_AS_TIMEOUT_SECS)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(config.impersonate);
        assert_eq!(config.run_as_timeout, Duration::from_secs(30));
        assert_eq!(config.max_duplicates, None);
    }

    #[test]
    fn from_lookup_reads_values() {
        let env: HashMap<&str, &str> = [
            ("FILEWARD_IMPERSONATE", "off"),
            ("FILEWARD_RUN_AS_TIMEOUT_SECS", "5"),
            ("FILEWARD_MAX_DUPLICATES", "100"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert!(!config.impersonate);
        assert_eq!(config.run_as_timeout, Duration::from_secs(5));
        assert_eq!(config.max_duplicates, Some(100));
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = EngineConfig::from_lookup(|k| match k {
            "FILEWARD_IMPERSONATE" => Some("maybe".to_string()),
            "FILEWARD_RUN_AS_TIMEOUT_SECS" => Some("soon".to_string()),
            _ => None,
        });
        assert!(config.impersonate);
        assert_eq!(config.run_as_timeout, Duration::from_secs(30));
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"runAsTimeout": 12}"#).unwrap();
        assert!(config.impersonate);
        assert_eq!(config.run_as_timeout, Duration::from_secs(12));
    }
}
