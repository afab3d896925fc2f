//! Occurrence aggregation over passive snapshots.
//!
//! Screen content is observed repeatedly, so a single phrase hit says little.
//! The aggregator counts hits per `(pattern, source)` in a sliding window and
//! only reports a [`Detection`] once the count reaches a threshold. After a
//! detection the key enters a cooldown during which hits are not counted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::engines::EngineSet;
use crate::error::{Error, Result};
use crate::matcher::PhraseMatch;
use crate::patterns::Severity;
use crate::text::{normalize, token_texts};

/// How hits within one snapshot are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    /// A snapshot counts once per pattern however often it matches.
    #[default]
    UniquePerSnapshot,
    /// Every match counts.
    AllMatches,
}

/// Aggregation thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Occurrences within the window needed for a detection.
    pub min_occurrences: usize,
    /// Sliding window length in seconds.
    pub window_seconds: u64,
    /// Quiet period after a detection, in milliseconds.
    pub cooldown_ms: u64,
    /// Counting mode.
    pub count_mode: CountMode,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            window_seconds: 300,
            cooldown_ms: 10_000,
            count_mode: CountMode::UniquePerSnapshot,
        }
    }
}

impl MonitoringSettings {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.min_occurrences == 0 {
            return Err(Error::validation(
                "monitoring.min_occurrences must be at least 1",
            ));
        }
        if self.window_seconds == 0 {
            return Err(Error::validation(
                "monitoring.window_seconds must be at least 1",
            ));
        }
        Ok(())
    }

    fn window_ms(&self) -> u64 {
        self.window_seconds.saturating_mul(1000)
    }
}

/// A threshold crossing for one pattern on one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    /// Pattern that crossed the threshold.
    pub pattern_id: String,
    /// Pattern category.
    pub category: String,
    /// Pattern severity.
    pub severity: Severity,
    /// Where the snapshots came from.
    pub source_id: String,
    /// Time of the snapshot that triggered the detection.
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    pattern_id: String,
    source_id: String,
}

#[derive(Debug, Default)]
struct KeyState {
    occurrences: VecDeque<u64>,
    last_action_ms: Option<u64>,
}

impl KeyState {
    fn in_cooldown(&self, now_ms: u64, cooldown_ms: u64) -> bool {
        self.last_action_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < cooldown_ms)
    }
}

/// Sliding-window occurrence counter over phrase hits.
///
/// Not internally synchronized; callers share it behind their own lock.
#[derive(Debug)]
pub struct MonitoringAggregator {
    engines: Arc<EngineSet>,
    settings: MonitoringSettings,
    state: HashMap<Key, KeyState>,
}

impl MonitoringAggregator {
    /// Create an aggregator.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    pub fn new(engines: Arc<EngineSet>, settings: MonitoringSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            engines,
            settings,
            state: HashMap::new(),
        })
    }

    /// The active settings.
    #[must_use]
    pub fn settings(&self) -> &MonitoringSettings {
        &self.settings
    }

    /// Replace the settings. Invalid settings are rejected and the current
    /// ones stay active. Counters already collected are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the new settings are invalid.
    pub fn update_settings(&mut self, settings: MonitoringSettings) -> Result<()> {
        settings.validate()?;
        debug!(?settings, "Monitoring settings updated");
        self.settings = settings;
        Ok(())
    }

    /// Swap in a new compiled engine set.
    pub fn replace_engines(&mut self, engines: Arc<EngineSet>) {
        debug!(signature = engines.signature(), "Monitoring engines replaced");
        self.engines = engines;
    }

    /// Occurrences currently counted for a key.
    #[must_use]
    pub fn pending_count(&self, pattern_id: &str, source_id: &str) -> usize {
        self.state
            .get(&Key {
                pattern_id: pattern_id.to_string(),
                source_id: source_id.to_string(),
            })
            .map_or(0, |s| s.occurrences.len())
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.state.len()
    }

    /// Drop keys with no counted occurrences and no active cooldown.
    pub fn prune_idle(&mut self, now_ms: u64) {
        let window_start = now_ms.saturating_sub(self.settings.window_ms());
        let cooldown_ms = self.settings.cooldown_ms;
        self.state.retain(|_, s| {
            while s.occurrences.front().is_some_and(|&t| t < window_start) {
                s.occurrences.pop_front();
            }
            !s.occurrences.is_empty() || s.in_cooldown(now_ms, cooldown_ms)
        });
    }

    /// Count the phrase hits of one snapshot and report threshold crossings.
    ///
    /// At most one detection per pattern is returned per call.
    pub fn process_snapshot(
        &mut self,
        source_id: &str,
        raw_text: &str,
        now_ms: u64,
    ) -> Vec<Detection> {
        let normalized = normalize(raw_text, &self.engines.normalizer);
        if normalized.is_empty() {
            return Vec::new();
        }
        let tokens = token_texts(&normalized);
        let matches = self.engines.phrase.find(&tokens);
        if matches.is_empty() {
            return Vec::new();
        }

        // Group in a BTreeMap so detections come out in a stable order
        let mut by_pattern: BTreeMap<&str, Vec<&PhraseMatch>> = BTreeMap::new();
        for m in &matches {
            by_pattern.entry(m.pattern_id.as_str()).or_default().push(m);
        }

        let window_start = now_ms.saturating_sub(self.settings.window_ms());
        let mut detections = Vec::new();

        for (pattern_id, hits) in by_pattern {
            let key = Key {
                pattern_id: pattern_id.to_string(),
                source_id: source_id.to_string(),
            };
            let state = self.state.entry(key).or_default();

            while state.occurrences.front().is_some_and(|&t| t < window_start) {
                state.occurrences.pop_front();
            }

            if state.in_cooldown(now_ms, self.settings.cooldown_ms) {
                trace!(
                    pattern_id,
                    source_id,
                    count = state.occurrences.len(),
                    "In cooldown, hit ignored"
                );
                continue;
            }

            let increments = match self.settings.count_mode {
                CountMode::UniquePerSnapshot => 1,
                CountMode::AllMatches => hits.len(),
            };
            state
                .occurrences
                .extend(std::iter::repeat(now_ms).take(increments));

            let count = state.occurrences.len();
            let triggered = count >= self.settings.min_occurrences;
            trace!(pattern_id, source_id, count, triggered, "Occurrence counted");

            if triggered {
                let first = hits[0];
                detections.push(Detection {
                    pattern_id: first.pattern_id.clone(),
                    category: first.category.clone(),
                    severity: first.severity,
                    source_id: source_id.to_string(),
                    timestamp_ms: now_ms,
                });
                state.last_action_ms = Some(now_ms);
                state.occurrences.clear();
            }
        }

        detections
    }
}
