//! Configuration management for wordwatch.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::decision::DecisionSettings;
use crate::engines::EngineSettings;
use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::live::LiveSettings;
use crate::matcher::EvasionSettings;
use crate::monitoring::MonitoringSettings;
use crate::patterns::PatternSet;
use crate::text::NormalizerConfig;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "wordwatch";

/// Environment variable prefix.
const ENV_PREFIX: &str = "WORDWATCH_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `WORDWATCH_`, `__` between
///    section and key, e.g. `WORDWATCH_LIVE__DEBOUNCE_MS`)
/// 2. TOML config file at `~/.config/wordwatch/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Normalizer configuration.
    pub normalizer: NormalizerConfig,
    /// Evasion matcher configuration.
    pub evasion: EvasionSettings,
    /// Decision rule configuration.
    pub decision: DecisionSettings,
    /// Snapshot aggregation configuration.
    pub monitoring: MonitoringSettings,
    /// Live typing configuration.
    pub live: LiveSettings,
    /// Lexicon configuration.
    pub lexicon: LexiconConfig,
    /// Pattern source configuration.
    pub patterns: PatternsConfig,
}

/// Lexicon-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconConfig {
    /// Locale of the built-in word list.
    pub locale: String,
    /// Newline-delimited word list replacing the built-in one.
    pub words_path: Option<PathBuf>,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            words_path: None,
        }
    }
}

/// Pattern source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// JSON pattern payload. Without one no patterns are active.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.evasion.separator_regex()?;
        self.decision.validate()?;
        self.monitoring.validate()?;
        self.live.validate()?;

        if self.lexicon.locale.trim().is_empty() && self.lexicon.words_path.is_none() {
            return Err(Error::validation(
                "lexicon.locale must be set when lexicon.words_path is not",
            ));
        }

        Ok(())
    }

    /// Settings that shape engine compilation.
    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            normalizer: self.normalizer.clone(),
            evasion: self.evasion.clone(),
            decision: self.decision.clone(),
        }
    }

    /// Load the configured lexicon.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured word list cannot be read.
    pub fn load_lexicon(&self) -> Result<Lexicon> {
        match &self.lexicon.words_path {
            Some(path) => Lexicon::load_file(path),
            None => Ok(Lexicon::builtin(&self.lexicon.locale)),
        }
    }

    /// Load the configured pattern payload, or an empty set when none is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read or is invalid.
    pub fn load_patterns(&self) -> Result<PatternSet> {
        match &self.patterns.path {
            Some(path) => PatternSet::from_file(path),
            None => Ok(PatternSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::CountMode;
    use crate::text::MarkStripping;
    use std::io::Write;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wordwatch-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.normalizer.leet_substitutions);
        assert!(config.evasion.remove_separators);
        assert_eq!(config.decision.min_host_long, 6);
        assert_eq!(config.monitoring.min_occurrences, 3);
        assert_eq!(config.monitoring.window_seconds, 300);
        assert_eq!(config.monitoring.cooldown_ms, 10_000);
        assert_eq!(config.live.debounce_ms, 500);
        assert!(config.live.block_high_severity_only);
        assert_eq!(config.lexicon.locale, "en");
        assert!(config.patterns.path.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_separator_class() {
        let mut config = Config::default();
        config.evasion.separator_class = "[unclosed".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("separator class"));
    }

    #[test]
    fn test_validate_zero_debounce() {
        let mut config = Config::default();
        config.live.debounce_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("debounce_ms"));
    }

    #[test]
    fn test_validate_zero_min_occurrences() {
        let mut config = Config::default();
        config.monitoring.min_occurrences = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_occurrences"));
    }

    #[test]
    fn test_validate_empty_locale() {
        let mut config = Config::default();
        config.lexicon.locale = String::new();
        assert!(config.validate().is_err());

        config.lexicon.words_path = Some(PathBuf::from("/words.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("wordwatch"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_toml_file() {
        let dir = temp_dir("config");
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[normalizer]
marks = "hebrew_niqqud"

[monitoring]
min_occurrences = 5
count_mode = "all_matches"

[lexicon]
locale = "fr"
"#
        )
        .unwrap();
        drop(file);

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.normalizer.marks, MarkStripping::HebrewNiqqud);
        assert_eq!(config.monitoring.min_occurrences, 5);
        assert_eq!(config.monitoring.count_mode, CountMode::AllMatches);
        assert_eq!(config.monitoring.window_seconds, 300);
        assert_eq!(config.lexicon.locale, "fr");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = temp_dir("config-invalid");
        let path = dir.join("config.toml");
        std::fs::write(&path, "[live]\ndebounce_ms = 0\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(err.is_config_error());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_engine_settings_mirror_config() {
        let mut config = Config::default();
        config.decision.segmentation_max_cost = 2;
        let settings = config.engine_settings();
        assert_eq!(settings.decision.segmentation_max_cost, 2);
        assert_eq!(settings.normalizer, config.normalizer);
    }

    #[test]
    fn test_load_lexicon_builtin() {
        let mut config = Config::default();
        config.lexicon.locale = "he".to_string();
        assert!(config.load_lexicon().unwrap().contains("שלום"));
    }

    #[test]
    fn test_load_patterns_default_empty() {
        assert!(Config::default().load_patterns().unwrap().is_empty());
    }

    #[test]
    fn test_load_patterns_from_file() {
        let dir = temp_dir("patterns");
        let path = dir.join("patterns.json");
        std::fs::write(
            &path,
            r#"{"patterns": [{"id": "p1", "severity": "high", "items": ["ass"]}]}"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.patterns.path = Some(path);
        assert_eq!(config.load_patterns().unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_config_serialize_field_names() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("separator_class"));
        assert!(json.contains("block_high_severity_only"));
        assert!(json.contains("unique_per_snapshot"));
    }
}
