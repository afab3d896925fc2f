//! Evasion-resistant single-word matching.
//!
//! Typists hide words with spacing (`a s s`), punctuation (`a.s.s`) and
//! leetspeak (`4ss`). The matcher strips separators, folds leet characters
//! that sit next to Latin letters, runs an Aho-Corasick automaton over the
//! result and maps every hit back to char offsets in the input.

use std::collections::HashMap;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::patterns::Severity;
use crate::text::{is_latin_letter, leet_substitute};

/// Default separator class: separators, punctuation, symbols, zero-width
/// characters, underscore and hyphen.
pub const DEFAULT_SEPARATOR_CLASS: &str = r"[\p{Z}\p{P}\p{S}\x{200B}\x{200C}\x{200D}_\-]";

/// A single-word term fed to the automaton.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CompiledTerm {
    /// Originating pattern.
    pub pattern_id: String,
    /// Normalized single-token term.
    pub term: String,
    /// Pattern category.
    pub category: String,
    /// Pattern severity.
    pub severity: Severity,
}

/// A possible forbidden-term occurrence awaiting a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Originating pattern.
    pub pattern_id: String,
    /// The matched term.
    pub term: String,
    /// Pattern severity.
    pub severity: Severity,
    /// Char offset of the first matched character (inclusive).
    pub start: usize,
    /// Char offset of the last matched character (inclusive).
    pub end: usize,
}

/// Settings for input recomposition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EvasionSettings {
    /// Drop separator characters before matching.
    pub remove_separators: bool,
    /// Regex character class describing one separator character.
    pub separator_class: String,
    /// Fold leet characters adjacent to Latin letters.
    pub leet_enabled: bool,
}

impl Default for EvasionSettings {
    fn default() -> Self {
        Self {
            remove_separators: true,
            separator_class: DEFAULT_SEPARATOR_CLASS.to_string(),
            leet_enabled: true,
        }
    }
}

impl EvasionSettings {
    /// Compile the separator class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the class is not a valid regex.
    pub fn separator_regex(&self) -> Result<Regex> {
        Regex::new(&self.separator_class).map_err(|e| {
            Error::validation(format!(
                "invalid separator class '{}': {e}",
                self.separator_class
            ))
        })
    }
}

/// Separator-stripped, leet-folded view of a string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Recomposed {
    text: String,
    /// Char offset in the input of each char of `text`.
    origin: Vec<usize>,
    /// Char index in `text` of each byte of `text`.
    byte_to_char: Vec<usize>,
}

/// Aho-Corasick matcher over recomposed text.
#[derive(Debug, Clone)]
pub struct EvasionMatcher {
    automaton: Option<AhoCorasick>,
    /// Terms sharing the automaton pattern at the same index.
    terms: Vec<Vec<CompiledTerm>>,
    settings: EvasionSettings,
    separator: Regex,
}

impl EvasionMatcher {
    /// Build the automaton over the given terms.
    ///
    /// # Errors
    ///
    /// Returns an error if the separator class is invalid or the automaton
    /// cannot be built.
    pub fn new(terms: Vec<CompiledTerm>, settings: EvasionSettings) -> Result<Self> {
        let separator = settings.separator_regex()?;

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut grouped: Vec<Vec<CompiledTerm>> = Vec::new();
        let mut needles: Vec<String> = Vec::new();
        for term in terms {
            if term.term.is_empty() {
                continue;
            }
            let slot = *index.entry(term.term.clone()).or_insert_with(|| {
                needles.push(term.term.clone());
                grouped.push(Vec::new());
                grouped.len() - 1
            });
            grouped[slot].push(term);
        }

        let automaton = if needles.is_empty() {
            None
        } else {
            let automaton = AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .build(&needles)
                .map_err(|e| Error::internal(format!("failed to build term automaton: {e}")))?;
            Some(automaton)
        };

        debug!(terms = needles.len(), "Built evasion automaton");

        Ok(Self {
            automaton,
            terms: grouped,
            settings,
            separator,
        })
    }

    /// Number of distinct terms in the automaton.
    #[must_use]
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Find every, possibly overlapping, term occurrence.
    ///
    /// Offsets in the returned candidates are inclusive char offsets into
    /// `normalized`.
    #[must_use]
    pub fn find_candidates(&self, normalized: &str) -> Vec<Candidate> {
        let Some(automaton) = &self.automaton else {
            return Vec::new();
        };
        let recomposed = self.recompose(normalized);
        if recomposed.text.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for hit in automaton.find_overlapping_iter(&recomposed.text) {
            let first = recomposed.byte_to_char[hit.start()];
            let last = recomposed.byte_to_char[hit.end() - 1];
            for term in &self.terms[hit.pattern().as_usize()] {
                candidates.push(Candidate {
                    pattern_id: term.pattern_id.clone(),
                    term: term.term.clone(),
                    severity: term.severity,
                    start: recomposed.origin[first],
                    end: recomposed.origin[last],
                });
            }
        }
        candidates
    }

    fn recompose(&self, input: &str) -> Recomposed {
        let chars: Vec<char> = input.chars().collect();
        let mut out = Recomposed {
            text: String::with_capacity(input.len()),
            origin: Vec::with_capacity(chars.len()),
            byte_to_char: Vec::with_capacity(input.len()),
        };
        let mut buf = [0u8; 4];

        for (i, &c) in chars.iter().enumerate() {
            if self.settings.remove_separators && self.separator.is_match(c.encode_utf8(&mut buf))
            {
                continue;
            }
            let emitted = if self.settings.leet_enabled {
                fold_in_context(&chars, i).unwrap_or(c)
            } else {
                c
            };
            let char_index = out.origin.len();
            out.origin.push(i);
            out.byte_to_char
                .extend(std::iter::repeat(char_index).take(emitted.len_utf8()));
            out.text.push(emitted);
        }
        out
    }
}

/// Fold the leet character at `i` when a neighbor is a letter and a
/// neighbor is a Latin letter.
fn fold_in_context(chars: &[char], i: usize) -> Option<char> {
    let letter = leet_substitute(chars[i])?;
    let prev = i.checked_sub(1).map(|p| chars[p]);
    let next = chars.get(i + 1).copied();
    let neighbors = [prev, next];
    let adjacent_letter = neighbors.iter().flatten().any(|c| c.is_alphabetic());
    let latin_context = neighbors.iter().flatten().any(|&c| is_latin_letter(c));
    (adjacent_letter && latin_context).then_some(letter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{normalize, NormalizerConfig};

    fn term(id: &str, term: &str, severity: Severity) -> CompiledTerm {
        CompiledTerm {
            pattern_id: id.to_string(),
            term: term.to_string(),
            category: "test".to_string(),
            severity,
        }
    }

    fn matcher() -> EvasionMatcher {
        EvasionMatcher::new(
            vec![term("p1", "ass", Severity::High)],
            EvasionSettings::default(),
        )
        .unwrap()
    }

    fn terms_found(m: &EvasionMatcher, raw: &str) -> Vec<String> {
        let norm = normalize(raw, &NormalizerConfig::default());
        m.find_candidates(&norm).into_iter().map(|c| c.term).collect()
    }

    #[test]
    fn test_spaced_letters() {
        let m = matcher();
        assert_eq!(terms_found(&m, "a s s"), ["ass"]);
        let cands = m.find_candidates("a s s");
        assert_eq!((cands[0].start, cands[0].end), (0, 4));
    }

    #[test]
    fn test_leet_symbols() {
        assert_eq!(terms_found(&matcher(), "a$$"), ["ass"]);
    }

    #[test]
    fn test_leet_digits_folded_in_recomposition() {
        // '4' is folded because its right neighbor is a Latin letter
        let m = matcher();
        let cands = m.find_candidates("4ss");
        assert_eq!(cands.len(), 1);
        assert_eq!((cands[0].start, cands[0].end), (0, 2));
    }

    #[test]
    fn test_punctuation_inserted() {
        assert_eq!(terms_found(&matcher(), "a.s-s!"), ["ass"]);
        assert_eq!(terms_found(&matcher(), "a\u{200B}s_s"), ["ass"]);
    }

    #[test]
    fn test_digits_only_produce_nothing() {
        let m = EvasionMatcher::new(
            vec![term("p", "ieo", Severity::Low), term("q", "eoe", Severity::Low)],
            EvasionSettings::default(),
        )
        .unwrap();
        assert!(terms_found(&m, "123 303").is_empty());
    }

    #[test]
    fn test_hebrew_context_does_not_fold() {
        let m = EvasionMatcher::new(
            vec![term("p", "שלוםe", Severity::Low)],
            EvasionSettings::default(),
        )
        .unwrap();
        assert!(terms_found(&m, "שלום 3").is_empty());
        assert!(m.find_candidates("שלום3").is_empty());
    }

    #[test]
    fn test_overlapping_hits_reported() {
        let m = EvasionMatcher::new(
            vec![term("a", "ass", Severity::High), term("b", "sse", Severity::Low)],
            EvasionSettings::default(),
        )
        .unwrap();
        let found = terms_found(&m, "asse");
        assert_eq!(found, ["ass", "sse"]);
    }

    #[test]
    fn test_shared_term_reports_each_pattern() {
        let m = EvasionMatcher::new(
            vec![term("a", "ass", Severity::High), term("b", "ass", Severity::Low)],
            EvasionSettings::default(),
        )
        .unwrap();
        assert_eq!(m.term_count(), 1);
        assert_eq!(m.find_candidates("ass").len(), 2);
    }

    #[test]
    fn test_offsets_map_to_char_positions() {
        let m = matcher();
        let cands = m.find_candidates("é a.s.s");
        assert_eq!((cands[0].start, cands[0].end), (2, 6));
    }

    #[test]
    fn test_separators_kept_when_disabled() {
        let settings = EvasionSettings {
            remove_separators: false,
            ..Default::default()
        };
        let m = EvasionMatcher::new(vec![term("p1", "ass", Severity::High)], settings).unwrap();
        assert!(m.find_candidates("a s s").is_empty());
        assert_eq!(m.find_candidates("bass").len(), 1);
    }

    #[test]
    fn test_invalid_separator_class() {
        let settings = EvasionSettings {
            separator_class: "[".to_string(),
            ..Default::default()
        };
        let err = EvasionMatcher::new(Vec::new(), settings).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_no_terms() {
        let m = EvasionMatcher::new(Vec::new(), EvasionSettings::default()).unwrap();
        assert!(m.find_candidates("anything").is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(matcher().find_candidates("").is_empty());
        assert!(matcher().find_candidates(" .,").is_empty());
    }
}
