//! Forbidden-term pattern definitions.
//!
//! Patterns arrive as a JSON payload from an external repository. This module
//! turns that payload into typed [`Pattern`]s (rejecting malformed payloads
//! wholesale), compiles them into the inputs of the two matchers, and holds
//! the active set in a [`PatternRepository`] that is only ever replaced as a
//! whole.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::matcher::{CompiledTerm, PhraseEntry};
use crate::text::{normalize, token_texts, NormalizerConfig};

/// Category assigned to patterns that do not name one.
const DEFAULT_CATEGORY: &str = "default";

/// How serious a pattern hit is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    /// Mild language.
    Low,
    /// Default severity.
    #[default]
    Medium,
    /// Always blocked unless a context rule allows it first.
    High,
}

impl Severity {
    /// Check whether this is the high severity level.
    #[must_use]
    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// A forbidden-term pattern: one id, many words or phrases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pattern {
    /// Unique pattern identifier.
    pub id: String,

    /// Free-form category (lowercased on load).
    #[serde(default = "default_category")]
    pub category: String,

    /// Severity of a hit.
    #[serde(default)]
    pub severity: Severity,

    /// Raw words and phrases, in payload order.
    #[serde(rename = "tokensOrPhrases", alias = "items", default)]
    pub items: Vec<String>,
}

impl Pattern {
    /// Create a pattern from borrowed parts.
    #[must_use]
    pub fn new(id: &str, category: &str, severity: Severity, items: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            category: category.to_string(),
            severity,
            items: items.iter().map(ToString::to_string).collect(),
        }
    }
}

/// A complete pattern payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSet {
    /// Payload version as reported by the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// The patterns.
    #[serde(default)]
    pub patterns: Vec<Pattern>,

    /// Producer metadata; never affects matching.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl PatternSet {
    /// Build a validated set from patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPatterns`] if any pattern is invalid.
    pub fn new(patterns: Vec<Pattern>) -> Result<Self> {
        Self {
            version: None,
            patterns,
            meta: BTreeMap::new(),
        }
        .validated()
    }

    /// Parse and validate a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPatterns`] if the payload does not match the
    /// schema or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let set: Self =
            serde_json::from_str(json).map_err(|e| Error::invalid_patterns(e.to_string()))?;
        set.validated()
    }

    /// Read, parse and validate a JSON payload file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the payload is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check ids and canonicalize ids and categories.
    fn validated(mut self) -> Result<Self> {
        let mut seen = HashSet::new();
        for (index, pattern) in self.patterns.iter_mut().enumerate() {
            pattern.id = pattern.id.trim().to_string();
            if pattern.id.is_empty() {
                return Err(Error::invalid_patterns(format!(
                    "pattern at index {index} has an empty id"
                )));
            }
            if !seen.insert(pattern.id.clone()) {
                return Err(Error::invalid_patterns(format!(
                    "duplicate pattern id '{}'",
                    pattern.id
                )));
            }
            let category = pattern.category.trim().to_lowercase();
            pattern.category = if category.is_empty() {
                default_category()
            } else {
                category
            };
        }
        Ok(self)
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if the set holds no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Total number of words and phrases across all patterns.
    #[must_use]
    pub fn item_total(&self) -> usize {
        self.patterns.iter().map(|p| p.items.len()).sum()
    }

    /// Pattern count per category.
    #[must_use]
    pub fn count_by_category(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.patterns {
            *counts.entry(p.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Pattern count per severity.
    #[must_use]
    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.patterns {
            *counts.entry(p.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Compile every item into a token sequence for the phrase trie.
    ///
    /// Entries are deduplicated per pattern by token sequence; items that
    /// normalize to nothing are skipped.
    #[must_use]
    pub fn phrase_entries(&self, config: &NormalizerConfig) -> Vec<PhraseEntry> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for pattern in &self.patterns {
            for item in &pattern.items {
                let tokens = token_texts(&normalize(item, config));
                if tokens.is_empty() || !seen.insert((pattern.id.as_str(), tokens.clone())) {
                    continue;
                }
                entries.push(PhraseEntry {
                    pattern_id: pattern.id.clone(),
                    category: pattern.category.clone(),
                    severity: pattern.severity,
                    tokens,
                });
            }
        }
        entries
    }

    /// Compile the single-word items into evasion automaton terms.
    #[must_use]
    pub fn single_word_terms(&self, config: &NormalizerConfig) -> Vec<CompiledTerm> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for pattern in &self.patterns {
            for item in &pattern.items {
                let mut tokens = token_texts(&normalize(item, config));
                if tokens.len() != 1 {
                    continue;
                }
                let term = tokens.remove(0);
                if !seen.insert((pattern.id.as_str(), term.clone())) {
                    continue;
                }
                terms.push(CompiledTerm {
                    pattern_id: pattern.id.clone(),
                    term,
                    category: pattern.category.clone(),
                    severity: pattern.severity,
                });
            }
        }
        terms
    }
}

/// Outcome of a pattern update, reported back to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Whether the new set was installed.
    pub ok: bool,
    /// Number of patterns now active (zero on failure).
    pub pattern_count: usize,
    /// Number of words/phrases now active (zero on failure).
    pub item_total: usize,
    /// Pattern count per category.
    pub categories: BTreeMap<String, usize>,
    /// Pattern count per severity.
    pub severities: BTreeMap<Severity, usize>,
    /// Why the update was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateReport {
    fn accepted(set: &PatternSet) -> Self {
        Self {
            ok: true,
            pattern_count: set.len(),
            item_total: set.item_total(),
            categories: set.count_by_category(),
            severities: set.count_by_severity(),
            error: None,
        }
    }

    fn rejected(err: &Error) -> Self {
        Self {
            ok: false,
            pattern_count: 0,
            item_total: 0,
            categories: BTreeMap::new(),
            severities: BTreeMap::new(),
            error: Some(err.to_string()),
        }
    }
}

/// Holder of the active pattern set.
///
/// Readers get an `Arc` snapshot; updates swap the whole set at once, and a
/// rejected update leaves the previous set in place.
#[derive(Debug, Default)]
pub struct PatternRepository {
    current: RwLock<Arc<PatternSet>>,
}

impl PatternRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding an initial set.
    #[must_use]
    pub fn with_patterns(set: PatternSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Snapshot of the active set.
    #[must_use]
    pub fn current(&self) -> Arc<PatternSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the active set with a JSON payload.
    pub fn update_from_json(&self, json: &str) -> UpdateReport {
        match PatternSet::from_json(json) {
            Ok(set) => self.install(set),
            Err(err) => {
                warn!(error = %err, "Pattern update rejected");
                UpdateReport::rejected(&err)
            }
        }
    }

    /// Replace the active set with an already-parsed set.
    pub fn replace(&self, set: PatternSet) -> UpdateReport {
        match set.validated() {
            Ok(set) => self.install(set),
            Err(err) => {
                warn!(error = %err, "Pattern update rejected");
                UpdateReport::rejected(&err)
            }
        }
    }

    fn install(&self, set: PatternSet) -> UpdateReport {
        let report = UpdateReport::accepted(&set);
        info!(
            patterns = report.pattern_count,
            items = report.item_total,
            categories = ?report.categories,
            severities = ?report.severities,
            "Pattern set updated"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(set);
        report
    }
}
