//! Word lexicons used to tell real words from forbidden-term hosts.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

const EN_WORDS: &[&str] = &[
    "look", "this", "is", "good", "host", "word", "sample", "unknown",
];
const FR_WORDS: &[&str] = &["culotte", "bonjour", "monde"];
const HE_WORDS: &[&str] = &["שלום", "עולם"];

#[derive(Debug, Default, Clone)]
struct TrieNode {
    children: HashMap<char, usize>,
    terminal: bool,
}

/// Character trie over lexicon words.
#[derive(Debug, Clone)]
pub struct LexiconTrie {
    nodes: Vec<TrieNode>,
}

impl Default for LexiconTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl LexiconTrie {
    fn insert(&mut self, word: &str) {
        let mut node = 0;
        for c in word.chars() {
            node = match self.nodes[node].children.get(&c) {
                Some(&next) => next,
                None => {
                    self.nodes.push(TrieNode::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children.insert(c, next);
                    next
                }
            };
        }
        self.nodes[node].terminal = true;
    }

    /// End offsets (exclusive) of every known word starting at `start`.
    #[must_use]
    pub fn word_ends_from(&self, chars: &[char], start: usize) -> Vec<usize> {
        let mut ends = Vec::new();
        let mut node = 0;
        for (j, c) in chars.iter().enumerate().skip(start) {
            match self.nodes[node].children.get(c) {
                Some(&next) => node = next,
                None => break,
            }
            if self.nodes[node].terminal {
                ends.push(j + 1);
            }
        }
        ends
    }
}

/// A set of known words plus a trie over them.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    words: HashSet<String>,
    trie: LexiconTrie,
}

impl Lexicon {
    /// Build a lexicon from words. Blank entries are skipped; words are
    /// trimmed and lowercased.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lexicon = Self::default();
        for word in words {
            let word = word.as_ref().trim().to_lowercase();
            if word.is_empty() || lexicon.words.contains(&word) {
                continue;
            }
            lexicon.trie.insert(&word);
            lexicon.words.insert(word);
        }
        lexicon
    }

    /// Built-in minimal word list for a locale code.
    ///
    /// Unknown locales fall back to English.
    #[must_use]
    pub fn builtin(locale: &str) -> Self {
        let words = match locale.trim().to_lowercase().replace('-', "_").as_str() {
            "fr" | "fr_fr" => FR_WORDS,
            "he" | "iw" | "he_il" => HE_WORDS,
            "en" | "en_us" | "en_gb" => EN_WORDS,
            other => {
                debug!(locale = other, "Unknown lexicon locale, using English");
                EN_WORDS
            }
        };
        Self::from_words(words)
    }

    /// Load a newline-delimited word list. Lines starting with `#` are
    /// comments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LexiconRead`] if the file cannot be read.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::LexiconRead {
            path: path.to_path_buf(),
            source,
        })?;
        let lexicon = Self::from_words(
            content
                .lines()
                .filter(|line| !line.trim_start().starts_with('#')),
        );
        debug!(path = %path.display(), words = lexicon.len(), "Loaded lexicon");
        Ok(lexicon)
    }

    /// Check whether a word is in the lexicon.
    #[must_use]
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    /// The trie over all words.
    #[must_use]
    pub fn trie(&self) -> &LexiconTrie {
        &self.trie
    }

    /// Number of words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if the lexicon is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words in sorted order.
    #[must_use]
    pub fn sorted_words(&self) -> Vec<&str> {
        let mut words: Vec<&str> = self.words.iter().map(String::as_str).collect();
        words.sort_unstable();
        words
    }
}
