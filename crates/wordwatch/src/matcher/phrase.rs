//! Exact token-sequence matching.

use std::collections::HashMap;

use serde::Serialize;

use crate::patterns::Severity;

/// A compiled phrase: one pattern item as a token sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PhraseEntry {
    /// Originating pattern.
    pub pattern_id: String,
    /// Pattern category.
    pub category: String,
    /// Pattern severity.
    pub severity: Severity,
    /// Normalized tokens of the item.
    pub tokens: Vec<String>,
}

/// A phrase hit over a token list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhraseMatch {
    /// Originating pattern.
    pub pattern_id: String,
    /// Pattern category.
    pub category: String,
    /// Pattern severity.
    pub severity: Severity,
    /// Index of the first matched token.
    pub start_token: usize,
    /// Index of the last matched token (inclusive).
    pub end_token: usize,
}

#[derive(Debug, Default, Clone)]
struct Node {
    next: HashMap<String, usize>,
    terminals: Vec<usize>,
}

/// Trie keyed by whole tokens.
///
/// Because edges are whole tokens, a term never matches as a substring of a
/// longer token: `ass` does not hit inside `assistant`.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    nodes: Vec<Node>,
    entries: Vec<PhraseEntry>,
}

impl PhraseMatcher {
    /// Build the trie. Entries with no tokens are ignored.
    #[must_use]
    pub fn new(entries: Vec<PhraseEntry>) -> Self {
        let mut nodes = vec![Node::default()];
        let mut kept = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.tokens.is_empty() {
                continue;
            }
            let mut node = 0;
            for token in &entry.tokens {
                node = match nodes[node].next.get(token) {
                    Some(&next) => next,
                    None => {
                        nodes.push(Node::default());
                        let next = nodes.len() - 1;
                        nodes[node].next.insert(token.clone(), next);
                        next
                    }
                };
            }
            nodes[node].terminals.push(kept.len());
            kept.push(entry);
        }

        Self {
            nodes,
            entries: kept,
        }
    }

    /// Number of phrases in the trie.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the trie holds no phrases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find every phrase occurrence in a token list.
    ///
    /// A fresh walk starts at each token; several phrases may end along the
    /// same walk and all are reported.
    #[must_use]
    pub fn find<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<PhraseMatch> {
        let mut matches = Vec::new();
        for start in 0..tokens.len() {
            let mut node = 0;
            for (end, token) in tokens.iter().enumerate().skip(start) {
                match self.nodes[node].next.get(token.as_ref()) {
                    Some(&next) => node = next,
                    None => break,
                }
                for &idx in &self.nodes[node].terminals {
                    let entry = &self.entries[idx];
                    matches.push(PhraseMatch {
                        pattern_id: entry.pattern_id.clone(),
                        category: entry.category.clone(),
                        severity: entry.severity,
                        start_token: start,
                        end_token: end,
                    });
                }
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, severity: Severity, tokens: &[&str]) -> PhraseEntry {
        PhraseEntry {
            pattern_id: id.to_string(),
            category: "test".to_string(),
            severity,
            tokens: tokens.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_find_single_token() {
        let m = PhraseMatcher::new(vec![entry("p1", Severity::High, &["ass"])]);
        let hits = m.find(&["you", "ass"]);
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].start_token, hits[0].end_token), (1, 1));
        assert_eq!(hits[0].severity, Severity::High);
    }

    #[test]
    fn test_find_never_matches_substring() {
        let m = PhraseMatcher::new(vec![entry("p1", Severity::High, &["ass"])]);
        assert!(m.find(&["assistant", "class", "bass"]).is_empty());
    }

    #[test]
    fn test_find_multi_token_phrase() {
        let m = PhraseMatcher::new(vec![entry("p3", Severity::Medium, &["reverse", "cowgirl"])]);
        let hits = m.find(&["a", "reverse", "cowgirl", "b"]);
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].start_token, hits[0].end_token), (1, 2));
        assert!(m.find(&["reverse", "a", "cowgirl"]).is_empty());
    }

    #[test]
    fn test_find_overlapping_phrases() {
        let m = PhraseMatcher::new(vec![
            entry("short", Severity::Low, &["very"]),
            entry("long", Severity::Low, &["very", "bad"]),
            entry("tail", Severity::Low, &["bad"]),
        ]);
        let hits = m.find(&["very", "bad"]);
        let ids: Vec<_> = hits.iter().map(|h| h.pattern_id.as_str()).collect();
        assert_eq!(ids, ["short", "long", "tail"]);
    }

    #[test]
    fn test_find_repeated_occurrences() {
        let m = PhraseMatcher::new(vec![entry("p", Severity::Low, &["x"])]);
        assert_eq!(m.find(&["x", "y", "x", "x"]).len(), 3);
    }

    #[test]
    fn test_same_sequence_different_patterns() {
        let m = PhraseMatcher::new(vec![
            entry("a", Severity::Low, &["bad"]),
            entry("b", Severity::High, &["bad"]),
        ]);
        assert_eq!(m.find(&["bad"]).len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        let m = PhraseMatcher::new(vec![entry("p", Severity::Low, &[])]);
        assert!(m.is_empty());
        let tokens: [&str; 0] = [];
        assert!(m.find(&tokens).is_empty());
    }
}
