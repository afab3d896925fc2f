//! Compiled engine sets.
//!
//! An [`EngineSet`] bundles everything compiled from one pattern set, one
//! lexicon and one group of settings. Sets are immutable and shared through
//! `Arc`; a configuration change builds a new set. The [`EngineRegistry`]
//! skips that rebuild when the content signature did not change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decision::{DecisionEngine, DecisionSettings};
use crate::error::Result;
use crate::lexicon::Lexicon;
use crate::matcher::{EvasionMatcher, EvasionSettings, PhraseMatcher};
use crate::patterns::PatternSet;
use crate::text::NormalizerConfig;

/// Settings that shape compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Normalizer flags.
    pub normalizer: NormalizerConfig,
    /// Evasion recomposition settings.
    pub evasion: EvasionSettings,
    /// Decision rule thresholds.
    pub decision: DecisionSettings,
}

/// Immutable bundle of compiled matchers.
#[derive(Debug)]
pub struct EngineSet {
    /// Normalizer flags the patterns were compiled with.
    pub normalizer: NormalizerConfig,
    /// Exact token-sequence matcher.
    pub phrase: PhraseMatcher,
    /// Evasion-resistant single-word matcher.
    pub evasion: EvasionMatcher,
    /// Candidate adjudication.
    pub decision: DecisionEngine,
    signature: String,
}

impl EngineSet {
    /// Compile patterns and lexicon under the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the evasion matcher cannot be built.
    pub fn build(
        patterns: &PatternSet,
        lexicon: Arc<Lexicon>,
        settings: &EngineSettings,
    ) -> Result<Self> {
        let signature = signature(patterns, &lexicon, settings)?;
        let phrase = PhraseMatcher::new(patterns.phrase_entries(&settings.normalizer));
        let evasion = EvasionMatcher::new(
            patterns.single_word_terms(&settings.normalizer),
            settings.evasion.clone(),
        )?;
        let decision = DecisionEngine::new(lexicon, settings.decision.clone());

        debug!(
            phrases = phrase.len(),
            terms = evasion.term_count(),
            signature = %&signature[..12],
            "Built engine set"
        );

        Ok(Self {
            normalizer: settings.normalizer.clone(),
            phrase,
            evasion,
            decision,
            signature,
        })
    }

    /// Content signature of the inputs this set was built from.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Hash of pattern content, lexicon words and settings.
///
/// Pattern metadata and payload version are left out: they never change what
/// matches.
///
/// # Errors
///
/// Returns an error if the inputs cannot be serialized.
pub fn signature(
    patterns: &PatternSet,
    lexicon: &Lexicon,
    settings: &EngineSettings,
) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(&patterns.patterns)?);
    hasher.update(b"\0");
    for word in lexicon.sorted_words() {
        hasher.update(word.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\0");
    hasher.update(&serde_json::to_vec(settings)?);
    Ok(hasher.finalize().to_hex().to_string())
}

/// Keeps the current engine set and rebuilds it only on real changes.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    current: Option<Arc<EngineSet>>,
}

impl EngineRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current set, if one was built.
    #[must_use]
    pub fn current(&self) -> Option<Arc<EngineSet>> {
        self.current.clone()
    }

    /// Check whether a set with this signature needs building.
    #[must_use]
    pub fn should_rebuild(&self, signature: &str) -> bool {
        self.current
            .as_ref()
            .map_or(true, |set| set.signature() != signature)
    }

    /// Return the current set, rebuilding it first if the inputs changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be built; the previous set stays.
    pub fn get_or_build(
        &mut self,
        patterns: &PatternSet,
        lexicon: Arc<Lexicon>,
        settings: &EngineSettings,
    ) -> Result<Arc<EngineSet>> {
        let sig = signature(patterns, &lexicon, settings)?;
        if let Some(set) = self.current.as_ref().filter(|set| set.signature() == sig) {
            debug!("Engine inputs unchanged, reusing engine set");
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(EngineSet::build(patterns, lexicon, settings)?);
        self.current = Some(Arc::clone(&set));
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{Pattern, Severity};

    fn patterns() -> PatternSet {
        PatternSet::new(vec![
            Pattern::new("p1", "adult", Severity::High, &["ass"]),
            Pattern::new("p3", "adult", Severity::Medium, &["reverse cowgirl"]),
        ])
        .unwrap()
    }

    fn lexicon() -> Arc<Lexicon> {
        Arc::new(Lexicon::builtin("en"))
    }

    #[test]
    fn test_build_compiles_both_matchers() {
        let set = EngineSet::build(&patterns(), lexicon(), &EngineSettings::default()).unwrap();
        assert_eq!(set.phrase.len(), 2);
        assert_eq!(set.evasion.term_count(), 1);
        assert_eq!(set.signature().len(), 64);
    }

    #[test]
    fn test_signature_ignores_meta() {
        let mut with_meta = patterns();
        with_meta
            .meta
            .insert("ts".to_string(), serde_json::json!("1700000000"));
        with_meta.version = Some(7);
        let settings = EngineSettings::default();
        let lex = lexicon();
        assert_eq!(
            signature(&patterns(), &lex, &settings).unwrap(),
            signature(&with_meta, &lex, &settings).unwrap()
        );
    }

    #[test]
    fn test_signature_tracks_settings_and_lexicon() {
        let lex = lexicon();
        let base = signature(&patterns(), &lex, &EngineSettings::default()).unwrap();

        let mut settings = EngineSettings::default();
        settings.decision.min_host_long = 8;
        assert_ne!(base, signature(&patterns(), &lex, &settings).unwrap());

        let fr = Lexicon::builtin("fr");
        assert_ne!(
            base,
            signature(&patterns(), &fr, &EngineSettings::default()).unwrap()
        );
    }

    #[test]
    fn test_registry_reuses_unchanged_set() {
        let mut registry = EngineRegistry::new();
        let settings = EngineSettings::default();
        let first = registry
            .get_or_build(&patterns(), lexicon(), &settings)
            .unwrap();
        assert!(!registry.should_rebuild(first.signature()));

        let second = registry
            .get_or_build(&patterns(), lexicon(), &settings)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_registry_rebuilds_on_change() {
        let mut registry = EngineRegistry::new();
        assert!(registry.should_rebuild("anything"));
        let first = registry
            .get_or_build(&patterns(), lexicon(), &EngineSettings::default())
            .unwrap();

        let more = PatternSet::new(vec![Pattern::new("p9", "x", Severity::Low, &["other"])])
            .unwrap();
        let second = registry
            .get_or_build(&more, lexicon(), &EngineSettings::default())
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(
            registry.current().unwrap().signature(),
            second.signature()
        );
    }

    #[test]
    fn test_registry_keeps_previous_on_failure() {
        let mut registry = EngineRegistry::new();
        let good = registry
            .get_or_build(&patterns(), lexicon(), &EngineSettings::default())
            .unwrap();

        let mut bad = EngineSettings::default();
        bad.evasion.separator_class = "(".to_string();
        assert!(registry.get_or_build(&patterns(), lexicon(), &bad).is_err());
        assert!(Arc::ptr_eq(&good, &registry.current().unwrap()));
    }
}
