//! Rule-based adjudication of evasion candidates.
//!
//! A candidate is a term hit somewhere in normalized text. The engine widens
//! it to its host word and walks a fixed list of rules; the first rule that
//! applies decides. Rules, in order:
//!
//! | Reason     | Action | Applies when |
//! |------------|--------|--------------|
//! | `R2`       | BLOCK  | punctuation right outside the host, term on that edge |
//! | `R1`       | BLOCK  | host is the term |
//! | `R3`       | BLOCK  | short host mostly made of the term |
//! | `R5`       | ALLOW  | host is a lexicon word |
//! | `R6B`      | ALLOW  | long host, term is a prefix or suffix of it |
//! | `R4`       | BLOCK  | high severity |
//! | `R7`/`R7A` | BLOCK/ALLOW | host segments cheaply, with/without the term as a word |
//! | `R6`       | ALLOW  | long host, term strictly inside |
//! | `FALLBACK` | ALLOW  | nothing else applied |

mod segmentation;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use segmentation::{analyze, Segmentation};

use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::matcher::Candidate;
use crate::text::same_script_letters;

/// Hosts at or below this length count as short for `R3`.
const SHORT_HOST_MAX: usize = 5;

/// What to do with a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// The text should be blocked.
    Block,
    /// The text is acceptable.
    Allow,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => write!(f, "BLOCK"),
            Self::Allow => write!(f, "ALLOW"),
        }
    }
}

/// Why a decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// Host equals the term.
    R1,
    /// Punctuation boundary at the term's edge.
    R2,
    /// Short host dominated by the term.
    R3,
    /// High severity.
    R4,
    /// Host is a known word.
    R5,
    /// Term strictly inside a long host.
    R6,
    /// Term is a prefix or suffix of a long host.
    R6B,
    /// Term is its own segment in a cheap segmentation.
    R7,
    /// Cheap segmentation without the term as a segment.
    R7A,
    /// No rule applied.
    #[serde(rename = "FALLBACK")]
    Fallback,
    /// Empty text.
    #[serde(rename = "EMPTY")]
    Empty,
    /// Candidate offsets outside the text.
    #[serde(rename = "BOUNDS")]
    Bounds,
    /// Exact phrase hit, no adjudication.
    #[serde(rename = "PHRASE")]
    Phrase,
    /// Deciding failed; the hit is allowed.
    #[serde(rename = "ERROR")]
    Error,
}

impl Reason {
    /// Allows that are expected on clean text and not worth reporting.
    #[must_use]
    pub fn is_benign_allow(self, host: &str, term: &str) -> bool {
        match self {
            Self::R6 | Self::R6B => true,
            Self::R5 => host != term,
            _ => false,
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::R1 => "R1",
            Self::R2 => "R2",
            Self::R3 => "R3",
            Self::R4 => "R4",
            Self::R5 => "R5",
            Self::R6 => "R6",
            Self::R6B => "R6B",
            Self::R7 => "R7",
            Self::R7A => "R7A",
            Self::Fallback => "FALLBACK",
            Self::Empty => "EMPTY",
            Self::Bounds => "BOUNDS",
            Self::Phrase => "PHRASE",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Verdict for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Block or allow.
    pub action: Action,
    /// The rule that decided.
    pub reason: Reason,
    /// The host word the candidate sits in (empty for degenerate input).
    pub host: String,
}

impl Decision {
    fn new(action: Action, reason: Reason, host: impl Into<String>) -> Self {
        Self {
            action,
            reason,
            host: host.into(),
        }
    }
}

/// Thresholds and switches of the rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionSettings {
    /// Hosts at least this long qualify for `R6` and `R6B`.
    pub min_host_long: usize,
    /// Term/host length ratio from which a short host is blocked (`R3`).
    pub small_host_ratio_block: f64,
    /// Block high-severity candidates (`R4`).
    pub severity_high_blocks: bool,
    /// Run segmentation (`R7`/`R7A`).
    pub segmentation_enabled: bool,
    /// Highest segmentation cost still considered a real split.
    pub segmentation_max_cost: usize,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            min_host_long: 6,
            small_host_ratio_block: 0.6,
            severity_high_blocks: true,
            segmentation_enabled: true,
            segmentation_max_cost: 4,
        }
    }
}

impl DecisionSettings {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.min_host_long == 0 {
            return Err(Error::validation("decision.min_host_long must be at least 1"));
        }
        if !(self.small_host_ratio_block > 0.0 && self.small_host_ratio_block <= 1.0) {
            return Err(Error::validation(
                "decision.small_host_ratio_block must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Applies the rule list to candidates.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    lexicon: Arc<Lexicon>,
    settings: DecisionSettings,
}

impl DecisionEngine {
    /// Create an engine over a lexicon.
    #[must_use]
    pub fn new(lexicon: Arc<Lexicon>, settings: DecisionSettings) -> Self {
        Self { lexicon, settings }
    }

    /// The active settings.
    #[must_use]
    pub fn settings(&self) -> &DecisionSettings {
        &self.settings
    }

    /// Decide one candidate over the normalized text it was found in.
    ///
    /// Deterministic: the same inputs always produce the same decision.
    #[must_use]
    pub fn decide(&self, normalized: &str, candidate: &Candidate) -> Decision {
        let chars: Vec<char> = normalized.chars().collect();
        if chars.is_empty() {
            return Decision::new(Action::Allow, Reason::Empty, "");
        }
        let n = chars.len();
        let (start, end) = (candidate.start, candidate.end);
        if start > end || end >= n {
            return Decision::new(Action::Allow, Reason::Bounds, "");
        }

        let mut left = start;
        while left > 0 && same_script_letters(chars[left - 1], chars[left]) {
            left -= 1;
        }
        let mut right = end;
        while right + 1 < n && same_script_letters(chars[right + 1], chars[right]) {
            right += 1;
        }
        let host_chars = &chars[left..=right];
        let host: String = host_chars.iter().collect();
        let host_len = host_chars.len();
        let term = candidate.term.as_str();
        let term_len = term.chars().count();

        // R2
        let is_boundary =
            |c: Option<&char>| c.is_some_and(|c| !c.is_alphabetic() && !c.is_whitespace());
        let before_boundary = is_boundary(left.checked_sub(1).and_then(|i| chars.get(i)));
        let after_boundary = is_boundary(chars.get(right + 1));
        let at_prefix = start == left;
        let at_suffix = end == right;
        if (at_prefix && before_boundary) || (at_suffix && after_boundary) {
            return Decision::new(Action::Block, Reason::R2, host);
        }

        // R1
        if host == term {
            return Decision::new(Action::Block, Reason::R1, host);
        }

        // R3
        if host_len <= SHORT_HOST_MAX {
            #[allow(clippy::cast_precision_loss)]
            let ratio = term_len as f64 / host_len as f64;
            if ratio >= self.settings.small_host_ratio_block {
                return Decision::new(Action::Block, Reason::R3, host);
            }
        }

        // R5
        if self.lexicon.contains(&host) {
            return Decision::new(Action::Allow, Reason::R5, host);
        }

        // Candidate span relative to the host
        let rel_start = start - left;
        let rel_end = end - left;
        let letter_before = rel_start > 0 && host_chars[rel_start - 1].is_alphabetic();
        let letter_after = rel_end + 1 < host_len && host_chars[rel_end + 1].is_alphabetic();
        let long_host = host_len >= self.settings.min_host_long;

        // R6B
        if long_host
            && ((rel_start == 0 && letter_after) || (rel_end + 1 == host_len && letter_before))
        {
            return Decision::new(Action::Allow, Reason::R6B, host);
        }

        // R4
        if self.settings.severity_high_blocks && candidate.severity.is_high() {
            return Decision::new(Action::Block, Reason::R4, host);
        }

        // R7 / R7A
        if self.settings.segmentation_enabled {
            let seg = analyze(&host, term, self.lexicon.trie());
            if seg.min_cost <= self.settings.segmentation_max_cost {
                return if seg.contains_standalone_term {
                    Decision::new(Action::Block, Reason::R7, host)
                } else {
                    Decision::new(Action::Allow, Reason::R7A, host)
                };
            }
        }

        // R6
        if long_host && letter_before && letter_after {
            return Decision::new(Action::Allow, Reason::R6, host);
        }

        Decision::new(Action::Allow, Reason::Fallback, host)
    }

    /// Decide a candidate, turning a panic into `ALLOW ERROR`.
    #[must_use]
    pub fn decide_or_allow(&self, normalized: &str, candidate: &Candidate) -> Decision {
        catch_unwind(AssertUnwindSafe(|| self.decide(normalized, candidate))).unwrap_or_else(
            |_| {
                warn!(
                    pattern_id = %candidate.pattern_id,
                    start = candidate.start,
                    end = candidate.end,
                    "Decision failed, allowing candidate"
                );
                Decision::new(Action::Allow, Reason::Error, "")
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::Severity;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(Arc::new(Lexicon::builtin("en")), DecisionSettings::default())
    }

    fn candidate(term: &str, severity: Severity, start: usize, end: usize) -> Candidate {
        Candidate {
            pattern_id: "p1".to_string(),
            term: term.to_string(),
            severity,
            start,
            end,
        }
    }

    /// Decide the first occurrence of `term` in `text`.
    fn decide_in(engine: &DecisionEngine, text: &str, term: &str, severity: Severity) -> Decision {
        let byte = text.find(term).unwrap();
        let start = text[..byte].chars().count();
        let end = start + term.chars().count() - 1;
        engine.decide(text, &candidate(term, severity, start, end))
    }

    #[test]
    fn test_r1_exact_host() {
        let d = decide_in(&engine(), "ass", "ass", Severity::Medium);
        assert_eq!((d.action, d.reason), (Action::Block, Reason::R1));
        assert_eq!(d.host, "ass");
    }

    #[test]
    fn test_r1_between_spaces() {
        let d = decide_in(&engine(), "you ass now", "ass", Severity::Low);
        assert_eq!(d.reason, Reason::R1);
    }

    #[test]
    fn test_r2_punctuation_after() {
        let d = decide_in(&engine(), "ass.", "ass", Severity::Medium);
        assert_eq!((d.action, d.reason), (Action::Block, Reason::R2));
    }

    #[test]
    fn test_r2_prefix_of_host() {
        let d = decide_in(&engine(), "(assistant", "ass", Severity::Low);
        assert_eq!((d.action, d.reason), (Action::Block, Reason::R2));
        assert_eq!(d.host, "assistant");
    }

    #[test]
    fn test_r3_short_host() {
        let d = decide_in(&engine(), "asss", "ass", Severity::Low);
        assert_eq!((d.action, d.reason), (Action::Block, Reason::R3));
    }

    #[test]
    fn test_r3_spaced_evasion() {
        let d = engine().decide("a s s", &candidate("ass", Severity::Low, 0, 4));
        assert_eq!((d.action, d.reason), (Action::Block, Reason::R3));
        assert_eq!(d.host, "a s s");
    }

    #[test]
    fn test_r5_lexicon_host() {
        let d = decide_in(&engine(), "sample", "amp", Severity::High);
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::R5));
    }

    #[test]
    fn test_r6b_prefix() {
        let d = decide_in(&engine(), "assistant", "ass", Severity::High);
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::R6B));
    }

    #[test]
    fn test_r6b_suffix() {
        let d = decide_in(&engine(), "carcass", "ass", Severity::High);
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::R6B));
    }

    #[test]
    fn test_r4_high_severity() {
        let d = decide_in(&engine(), "compassion", "ass", Severity::High);
        assert_eq!((d.action, d.reason), (Action::Block, Reason::R4));
    }

    #[test]
    fn test_r6_inside_long_host() {
        let d = decide_in(&engine(), "compassion", "ass", Severity::Medium);
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::R6));
        assert_eq!(d.host, "compassion");
    }

    #[test]
    fn test_r7_segmented_term() {
        let d = decide_in(&engine(), "lookthisassisgood", "ass", Severity::Medium);
        assert_eq!((d.action, d.reason), (Action::Block, Reason::R7));
    }

    #[test]
    fn test_r7a_segmented_without_term() {
        let lex = Lexicon::from_words(["look", "this", "lass", "is", "good"]);
        let engine = DecisionEngine::new(Arc::new(lex), DecisionSettings::default());
        let d = decide_in(&engine, "lookthislassisgood", "ass", Severity::Medium);
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::R7A));
    }

    #[test]
    fn test_fallback() {
        let d = decide_in(&engine(), "bass", "ass", Severity::Low);
        // Short hosts trip R3 under the default ratio
        assert_eq!(d.reason, Reason::R3);

        let settings = DecisionSettings {
            small_host_ratio_block: 0.9,
            segmentation_enabled: false,
            ..Default::default()
        };
        let engine = DecisionEngine::new(Arc::new(Lexicon::builtin("en")), settings);
        let d = decide_in(&engine, "bass", "ass", Severity::Low);
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::Fallback));
    }

    #[test]
    fn test_degenerate_inputs() {
        let e = engine();
        let d = e.decide("", &candidate("ass", Severity::High, 0, 2));
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::Empty));

        let d = e.decide("as", &candidate("ass", Severity::High, 0, 2));
        assert_eq!((d.action, d.reason), (Action::Allow, Reason::Bounds));

        let d = e.decide("ass", &candidate("ass", Severity::High, 2, 1));
        assert_eq!(d.reason, Reason::Bounds);
    }

    #[test]
    fn test_decide_is_idempotent() {
        let e = engine();
        let cases = [
            ("compassion", 3, 5),
            ("ass.", 0, 2),
            ("lookthisassisgood", 8, 10),
            ("a s s", 0, 4),
        ];
        for (text, start, end) in cases {
            let c = candidate("ass", Severity::Medium, start, end);
            assert_eq!(e.decide(text, &c), e.decide(text, &c), "{text}");
        }
    }

    #[test]
    fn test_host_does_not_cross_scripts() {
        let d = decide_in(&engine(), "שלוםass", "ass", Severity::Medium);
        assert_eq!(d.host, "ass");
        assert_eq!(d.reason, Reason::R1);
    }

    #[test]
    fn test_decide_or_allow_matches_decide() {
        let e = engine();
        let c = candidate("ass", Severity::Medium, 0, 2);
        assert_eq!(e.decide_or_allow("ass", &c), e.decide("ass", &c));
    }

    #[test]
    fn test_benign_allows() {
        assert!(Reason::R6.is_benign_allow("compassion", "ass"));
        assert!(Reason::R6B.is_benign_allow("assistant", "ass"));
        assert!(Reason::R5.is_benign_allow("sample", "amp"));
        assert!(!Reason::R5.is_benign_allow("ass", "ass"));
        assert!(!Reason::Fallback.is_benign_allow("bass", "ass"));
    }

    #[test]
    fn test_settings_validate() {
        assert!(DecisionSettings::default().validate().is_ok());
        let bad = DecisionSettings {
            small_host_ratio_block: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = DecisionSettings {
            min_host_long: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(Reason::R6B.to_string(), "R6B");
        assert_eq!(Reason::Fallback.to_string(), "FALLBACK");
        assert_eq!(Action::Block.to_string(), "BLOCK");
    }
}
