//! Text canonicalization shared by every detection stage.
//!
//! Normalization is a pure function: trim, lowercase, NFD, combining-mark
//! removal, optional leetspeak folding and whitespace collapsing. Running it
//! twice yields the same string as running it once.

use std::sync::Once;

use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Leetspeak characters and the letter each one stands for.
const LEET_TABLE: [(char, char); 6] = [
    ('0', 'o'),
    ('1', 'i'),
    ('3', 'e'),
    ('4', 'a'),
    ('@', 'a'),
    ('$', 's'),
];

static CONFIG_LOGGED: Once = Once::new();

/// Which combining marks the normalizer removes after NFD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkStripping {
    /// Remove every combining mark (accents, niqqud, ...).
    #[default]
    All,
    /// Remove only marks in the Hebrew niqqud / cantillation range.
    HebrewNiqqud,
}

/// Configuration flags for normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Which combining marks to strip.
    pub marks: MarkStripping,
    /// Fold leetspeak characters that are attached to letters.
    pub leet_substitutions: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            marks: MarkStripping::All,
            leet_substitutions: true,
        }
    }
}

/// Return the letter a leetspeak character stands for, if any.
#[must_use]
pub fn leet_substitute(c: char) -> Option<char> {
    LEET_TABLE
        .iter()
        .find_map(|&(leet, letter)| (leet == c).then_some(letter))
}

/// True for characters in the Hebrew niqqud / cantillation range.
#[must_use]
pub fn is_hebrew_niqqud(c: char) -> bool {
    ('\u{0591}'..='\u{05C7}').contains(&c)
}

/// True for letters in the Hebrew block.
#[must_use]
pub fn is_hebrew_letter(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c) && c.is_alphabetic()
}

/// True for ASCII Latin letters.
#[must_use]
pub fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// True when both characters are letters of the same broad script
/// (Hebrew versus everything else).
#[must_use]
pub fn same_script_letters(a: char, b: char) -> bool {
    a.is_alphabetic() && b.is_alphabetic() && is_hebrew_letter(a) == is_hebrew_letter(b)
}

/// Canonicalize raw text for matching.
///
/// Steps, in order: trim, lowercase, NFD, strip combining marks, fold
/// leetspeak (when enabled), collapse whitespace runs to one space.
///
/// # Examples
///
/// ```
/// use wordwatch::text::{normalize, NormalizerConfig};
///
/// let cfg = NormalizerConfig::default();
/// assert_eq!(normalize("  Héllo   W0rld ", &cfg), "hello world");
/// assert_eq!(normalize("call 911", &cfg), "call 911");
/// ```
#[must_use]
pub fn normalize(input: &str, config: &NormalizerConfig) -> String {
    CONFIG_LOGGED.call_once(|| {
        tracing::debug!(
            marks = ?config.marks,
            leet = config.leet_substitutions,
            "Normalizer configuration"
        );
    });

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lowered = trimmed.to_lowercase();
    let mut chars: Vec<char> = lowered
        .nfd()
        .filter(|&c| !strips_mark(c, config.marks))
        .collect();

    if config.leet_substitutions {
        fold_leet_runs(&mut chars);
    }

    collapse_whitespace(&chars)
}

fn strips_mark(c: char, marks: MarkStripping) -> bool {
    if !is_combining_mark(c) {
        return false;
    }
    match marks {
        MarkStripping::All => true,
        MarkStripping::HebrewNiqqud => is_hebrew_niqqud(c),
    }
}

/// Fold leet characters inside runs of letters/leet characters.
///
/// A run only folds when it holds at least one real letter, so numbers and
/// lone symbols survive untouched.
fn fold_leet_runs(chars: &mut [char]) {
    let in_run = |c: char| c.is_alphabetic() || leet_substitute(c).is_some();
    let mut i = 0;
    while i < chars.len() {
        if !in_run(chars[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && in_run(chars[i]) {
            i += 1;
        }
        let run = &mut chars[start..i];
        if run.iter().any(|c| c.is_alphabetic()) {
            for c in run.iter_mut() {
                if let Some(letter) = leet_substitute(*c) {
                    *c = letter;
                }
            }
        }
    }
}

fn collapse_whitespace(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut pending_space = false;
    for &c in chars {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}
