//! cairn.toml configuration parser.
//!
//! All keys are optional in the file; missing keys fall back to the
//! documented defaults. Validation happens once at load time and
//! failures are fatal at startup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Placement strategy for choosing among candidate nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Prefer the emptiest candidate (max free-resource score).
    #[default]
    Spread,
    /// Prefer the fullest candidate (min free-resource score).
    Pack,
    /// Pick a candidate uniformly at random.
    Random,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CairnConfig {
    pub scheduler_strategy: Strategy,
    /// Wall-clock fact refresh interval (seconds).
    pub time_tick_interval_s: u64,
    /// Full store-vs-facts reconciliation interval (seconds).
    pub reconcile_interval_s: u64,
    /// Agent heartbeat interval (seconds).
    pub heartbeat_interval_s: u64,
    /// Heartbeat age after which a node counts as stale (seconds).
    pub node_stale_threshold_s: i64,
    /// Resource usage percentage above which a node is overloaded.
    pub overload_threshold_pct: i64,
    /// Minimum gap between repeated reactor actions on one entity (seconds).
    pub reactor_debounce_s: u64,
}

impl Default for CairnConfig {
    fn default() -> Self {
        Self {
            scheduler_strategy: Strategy::Spread,
            time_tick_interval_s: 5,
            reconcile_interval_s: 30,
            heartbeat_interval_s: 5,
            node_stale_threshold_s: 30,
            overload_threshold_pct: 90,
            reactor_debounce_s: 30,
        }
    }
}

/// On-disk shape of cairn.toml — every key optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    scheduler_strategy: Option<Strategy>,
    time_tick_interval_s: Option<u64>,
    reconcile_interval_s: Option<u64>,
    heartbeat_interval_s: Option<u64>,
    node_stale_threshold_s: Option<i64>,
    overload_threshold_pct: Option<i64>,
    reactor_debounce_s: Option<u64>,
}

impl CairnConfig {
    /// Load configuration from a toml file, filling defaults and validating.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a toml string, filling defaults and validating.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let defaults = Self::default();

        let config = Self {
            scheduler_strategy: file
                .scheduler_strategy
                .unwrap_or(defaults.scheduler_strategy),
            time_tick_interval_s: file
                .time_tick_interval_s
                .unwrap_or(defaults.time_tick_interval_s),
            reconcile_interval_s: file
                .reconcile_interval_s
                .unwrap_or(defaults.reconcile_interval_s),
            heartbeat_interval_s: file
                .heartbeat_interval_s
                .unwrap_or(defaults.heartbeat_interval_s),
            node_stale_threshold_s: file
                .node_stale_threshold_s
                .unwrap_or(defaults.node_stale_threshold_s),
            overload_threshold_pct: file
                .overload_threshold_pct
                .unwrap_or(defaults.overload_threshold_pct),
            reactor_debounce_s: file
                .reactor_debounce_s
                .unwrap_or(defaults.reactor_debounce_s),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the documented bounds on every tunable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_tick_interval_s < 1 {
            return Err(ConfigError::Invalid(
                "time_tick_interval_s must be >= 1".to_string(),
            ));
        }
        if self.reconcile_interval_s < self.time_tick_interval_s {
            return Err(ConfigError::Invalid(format!(
                "reconcile_interval_s ({}) must be >= time_tick_interval_s ({})",
                self.reconcile_interval_s, self.time_tick_interval_s
            )));
        }
        if self.heartbeat_interval_s < 1 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_s must be >= 1".to_string(),
            ));
        }
        if self.node_stale_threshold_s < 1 {
            return Err(ConfigError::Invalid(
                "node_stale_threshold_s must be >= 1".to_string(),
            ));
        }
        if !(0..=100).contains(&self.overload_threshold_pct) {
            return Err(ConfigError::Invalid(format!(
                "overload_threshold_pct must be in 0..=100, got {}",
                self.overload_threshold_pct
            )));
        }
        if self.reactor_debounce_s < 1 {
            return Err(ConfigError::Invalid(
                "reactor_debounce_s must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn time_tick_interval(&self) -> Duration {
        Duration::from_secs(self.time_tick_interval_s)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_s)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_s)
    }

    pub fn reactor_debounce(&self) -> Duration {
        Duration::from_secs(self.reactor_debounce_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CairnConfig::default();
        assert_eq!(config.scheduler_strategy, Strategy::Spread);
        assert_eq!(config.time_tick_interval_s, 5);
        assert_eq!(config.reconcile_interval_s, 30);
        assert_eq!(config.heartbeat_interval_s, 5);
        assert_eq!(config.node_stale_threshold_s, 30);
        assert_eq!(config.overload_threshold_pct, 90);
        assert_eq!(config.reactor_debounce_s, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = CairnConfig::from_toml_str("").unwrap();
        assert_eq!(config, CairnConfig::default());
    }

    #[test]
    fn partial_file_overrides_some_keys() {
        let config = CairnConfig::from_toml_str(
            r#"
scheduler_strategy = "pack"
time_tick_interval_s = 2
"#,
        )
        .unwrap();

        assert_eq!(config.scheduler_strategy, Strategy::Pack);
        assert_eq!(config.time_tick_interval_s, 2);
        // Untouched keys keep defaults.
        assert_eq!(config.reconcile_interval_s, 30);
    }

    #[test]
    fn rejects_zero_tick_interval() {
        let result = CairnConfig::from_toml_str("time_tick_interval_s = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_reconcile_faster_than_tick() {
        let result = CairnConfig::from_toml_str(
            r#"
time_tick_interval_s = 10
reconcile_interval_s = 5
"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_overload_threshold_above_100() {
        let result = CairnConfig::from_toml_str("overload_threshold_pct = 101");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_strategy() {
        let result = CairnConfig::from_toml_str(r#"scheduler_strategy = "chaos""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn duration_helpers() {
        let config = CairnConfig::default();
        assert_eq!(config.time_tick_interval(), Duration::from_secs(5));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(30));
        assert_eq!(config.reactor_debounce(), Duration::from_secs(30));
    }
}
