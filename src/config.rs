//! @dose
//! purpose: Configuration file parsing for tokenmeter.toml. Handles the encoding choice, engine
//!     and debounce tuning, heavy-line thresholds, and per-pattern indicator threshold overrides.
//!
//! when-editing:
//!     - !Config is loaded once at startup and passed through the call chain
//!     - !Indicator overrides use glob patterns matched against relative paths
//!     - false in TOML means "disable this threshold level"
//!
//! invariants:
//!     - Config::load returns default config if tokenmeter.toml doesn't exist
//!     - Every section is optional; missing keys fall back to their defaults
//!
//! gotchas:
//!     - Patterns are matched against paths relative to project root
//!     - First matching override wins (order matters in TOML array)
//!     - A heavy warning threshold of 0 is raised to 1 so blank-token lines are never flagged

use crate::engine::{
    EngineOptions, EncodingName, WorkerOptions, DEFAULT_CHUNK_LINES,
    DEFAULT_FULL_ENCODE_THRESHOLD, DEFAULT_HEAVY_CRITICAL_TOKENS, DEFAULT_HEAVY_WARNING_TOKENS,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::scheduler::{ScheduleTimings, DEFAULT_APPROXIMATE_DELAY, DEFAULT_RECONCILE_DELAY};
use crate::sink::{IndicatorThresholds, DEFAULT_CRITICAL_THRESHOLD, DEFAULT_WARNING_THRESHOLD};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "tokenmeter.toml";

/// Main configuration structure matching tokenmeter.toml
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// BPE vocabulary used by the worker
    pub encoding: EncodingName,

    pub engine: EngineConfig,

    pub schedule: ScheduleConfig,

    /// Per-line heavy thresholds
    pub heavy: HeavyConfig,

    /// Status indicator thresholds
    pub indicator: IndicatorConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub request_timeout_ms: u64,
    /// Documents shorter than this (in chars) are always encoded whole
    pub full_encode_threshold: usize,
    pub chunk_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            full_encode_threshold: DEFAULT_FULL_ENCODE_THRESHOLD,
            chunk_lines: DEFAULT_CHUNK_LINES,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub approximate_delay_ms: u64,
    pub reconcile_delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            approximate_delay_ms: DEFAULT_APPROXIMATE_DELAY.as_millis() as u64,
            reconcile_delay_ms: DEFAULT_RECONCILE_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HeavyConfig {
    pub warning: usize,
    pub critical: usize,
}

impl Default for HeavyConfig {
    fn default() -> Self {
        Self {
            warning: DEFAULT_HEAVY_WARNING_TOKENS,
            critical: DEFAULT_HEAVY_CRITICAL_TOKENS,
        }
    }
}

/// Indicator threshold configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Default warning threshold
    pub warning: usize,

    /// Default critical threshold
    pub critical: usize,

    /// Per-pattern overrides
    #[serde(rename = "override")]
    pub overrides: Vec<ThresholdOverride>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            warning: DEFAULT_WARNING_THRESHOLD,
            critical: DEFAULT_CRITICAL_THRESHOLD,
            overrides: Vec::new(),
        }
    }
}

/// A threshold override for specific file patterns
#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdOverride {
    /// Glob pattern to match (relative to root)
    pub pattern: String,

    /// Warning threshold (None = disabled)
    #[serde(default, deserialize_with = "deserialize_threshold")]
    pub warning: Option<usize>,

    /// Critical threshold (None = disabled)
    #[serde(default, deserialize_with = "deserialize_threshold")]
    pub critical: Option<usize>,
}

/// Deserialize threshold that can be a number or false (disabled)
fn deserialize_threshold<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ThresholdValue {
        Number(usize),
        Bool(bool),
    }

    match ThresholdValue::deserialize(deserializer)? {
        ThresholdValue::Number(n) => Ok(Some(n)),
        ThresholdValue::Bool(_) => Ok(None),
    }
}

/// Compiled threshold overrides for efficient matching
pub struct ThresholdMatcher {
    overrides: Vec<(GlobSet, IndicatorThresholds)>,
    defaults: IndicatorThresholds,
}

impl ThresholdMatcher {
    /// Create a new matcher from config
    pub fn new(config: &IndicatorConfig) -> Self {
        let mut overrides = Vec::new();

        for ov in &config.overrides {
            let mut builder = GlobSetBuilder::new();
            match Glob::new(&ov.pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    warn!(pattern = %ov.pattern, "ignoring invalid threshold pattern: {}", e);
                    continue;
                }
            }
            if let Ok(globset) = builder.build() {
                overrides.push((
                    globset,
                    IndicatorThresholds {
                        warning: ov.warning,
                        critical: ov.critical,
                    },
                ));
            }
        }

        Self {
            overrides,
            defaults: IndicatorThresholds {
                warning: Some(config.warning),
                critical: Some(config.critical),
            },
        }
    }

    /// Get thresholds for a file path (relative to root)
    pub fn get_thresholds(&self, relative_path: &Path) -> IndicatorThresholds {
        // Check overrides in order (first match wins)
        self.overrides
            .iter()
            .find(|(globset, _)| globset.is_match(relative_path))
            .map(|(_, thresholds)| *thresholds)
            .unwrap_or(self.defaults)
    }
}

impl Config {
    /// Load configuration from tokenmeter.toml in the given root directory
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&config_path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse {}: {}", CONFIG_FILE_NAME, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}", CONFIG_FILE_NAME, e);
                Self::default()
            }
        }
    }

    pub fn worker_options(&self) -> WorkerOptions {
        let warning = self.heavy.warning.max(1);
        WorkerOptions {
            full_encode_threshold: self.engine.full_encode_threshold,
            chunk_lines: self.engine.chunk_lines.max(1),
            heavy_warning_tokens: warning,
            heavy_critical_tokens: self.heavy.critical.max(warning),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            request_timeout: Duration::from_millis(self.engine.request_timeout_ms),
            worker: self.worker_options(),
        }
    }

    pub fn schedule_timings(&self) -> ScheduleTimings {
        ScheduleTimings {
            approximate_delay: Duration::from_millis(self.schedule.approximate_delay_ms),
            reconcile_delay: Duration::from_millis(self.schedule.reconcile_delay_ms),
        }
    }

    /// Create a ThresholdMatcher from this config
    pub fn threshold_matcher(&self) -> ThresholdMatcher {
        ThresholdMatcher::new(&self.indicator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.encoding, EncodingName::Cl100kBase);
        assert_eq!(config.engine.request_timeout_ms, 30_000);
        assert_eq!(config.engine.full_encode_threshold, 50_000);
        assert_eq!(config.engine.chunk_lines, 500);
        assert_eq!(config.schedule.approximate_delay_ms, 300);
        assert_eq!(config.schedule.reconcile_delay_ms, 2_000);
        assert_eq!(config.heavy.warning, 150);
        assert_eq!(config.heavy.critical, 400);
        assert_eq!(config.indicator.warning, 4_000);
        assert_eq!(config.indicator.critical, 8_000);
        assert!(config.indicator.overrides.is_empty());
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path());
        assert_eq!(config.engine_options(), EngineOptions::default());
        assert_eq!(config.schedule_timings(), ScheduleTimings::default());
    }

    #[test]
    fn test_load_basic_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_content = r#"
encoding = "o200k_base"

[engine]
request_timeout_ms = 5000
chunk_lines = 200

[schedule]
approximate_delay_ms = 150

[heavy]
critical = 600
"#;
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), config_content).unwrap();

        let config = Config::load(temp_dir.path());
        assert_eq!(config.encoding, EncodingName::O200kBase);

        let options = config.engine_options();
        assert_eq!(options.request_timeout, Duration::from_secs(5));
        assert_eq!(options.worker.chunk_lines, 200);
        assert_eq!(options.worker.full_encode_threshold, 50_000);
        assert_eq!(options.worker.heavy_warning_tokens, 150);
        assert_eq!(options.worker.heavy_critical_tokens, 600);

        let timings = config.schedule_timings();
        assert_eq!(timings.approximate_delay, Duration::from_millis(150));
        assert_eq!(timings.reconcile_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "encoding = \"gpt9_base\"\n",
        )
        .unwrap();

        let config = Config::load(temp_dir.path());
        assert_eq!(config.encoding, EncodingName::Cl100kBase);
    }

    #[test]
    fn test_degenerate_values_are_normalized() {
        let config: Config = toml::from_str(
            r#"
[engine]
chunk_lines = 0

[heavy]
warning = 0
critical = 0
"#,
        )
        .unwrap();
        let options = config.worker_options();
        assert_eq!(options.chunk_lines, 1);
        assert_eq!(options.heavy_warning_tokens, 1);
        assert_eq!(options.heavy_critical_tokens, 1);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let config_content = r#"
[indicator]
warning = 3000
critical = 6000

[[indicator.override]]
pattern = "docs/**"
warning = 20000
critical = 40000

[[indicator.override]]
pattern = "**/*.min.js"
warning = false
critical = false
"#;
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), config_content).unwrap();

        let config = Config::load(temp_dir.path());
        assert_eq!(config.indicator.overrides.len(), 2);
        assert_eq!(config.indicator.overrides[0].pattern, "docs/**");
        assert_eq!(config.indicator.overrides[0].warning, Some(20000));
        assert_eq!(config.indicator.overrides[0].critical, Some(40000));
        assert_eq!(config.indicator.overrides[1].warning, None);
        assert_eq!(config.indicator.overrides[1].critical, None);
    }

    #[test]
    fn test_threshold_matcher_defaults() {
        let matcher = ThresholdMatcher::new(&IndicatorConfig::default());

        let thresholds = matcher.get_thresholds(Path::new("src/main.rs"));
        assert_eq!(thresholds, IndicatorThresholds::default());
    }

    #[test]
    fn test_threshold_matcher_override() {
        let config = IndicatorConfig {
            warning: 4000,
            critical: 8000,
            overrides: vec![ThresholdOverride {
                pattern: "docs/**".to_string(),
                warning: Some(20000),
                critical: None,
            }],
        };
        let matcher = ThresholdMatcher::new(&config);

        // Matching file
        let thresholds = matcher.get_thresholds(Path::new("docs/guide.md"));
        assert_eq!(thresholds.warning, Some(20000));
        assert_eq!(thresholds.critical, None);

        // Non-matching file
        let thresholds = matcher.get_thresholds(Path::new("src/main.rs"));
        assert_eq!(thresholds.warning, Some(4000));
        assert_eq!(thresholds.critical, Some(8000));
    }

    #[test]
    fn test_threshold_matcher_first_match_wins() {
        let config = IndicatorConfig {
            warning: 4000,
            critical: 8000,
            overrides: vec![
                ThresholdOverride {
                    pattern: "docs/**".to_string(),
                    warning: Some(1000),
                    critical: Some(2000),
                },
                ThresholdOverride {
                    pattern: "docs/api/**".to_string(),
                    warning: Some(5000),
                    critical: Some(10000),
                },
            ],
        };
        let matcher = ThresholdMatcher::new(&config);

        let thresholds = matcher.get_thresholds(Path::new("docs/api/index.md"));
        assert_eq!(thresholds.warning, Some(1000));
        assert_eq!(thresholds.critical, Some(2000));
    }

    #[test]
    fn test_threshold_matcher_skips_invalid_pattern() {
        let config = IndicatorConfig {
            warning: 4000,
            critical: 8000,
            overrides: vec![ThresholdOverride {
                pattern: "docs/[".to_string(),
                warning: Some(1),
                critical: Some(2),
            }],
        };
        let matcher = ThresholdMatcher::new(&config);
        let thresholds = matcher.get_thresholds(Path::new("docs/["));
        assert_eq!(thresholds, IndicatorThresholds::default());
    }
}
