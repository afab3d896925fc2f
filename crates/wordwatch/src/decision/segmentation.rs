//! Minimal-cost segmentation of a host word into lexicon words.

use serde::Serialize;

use crate::lexicon::LexiconTrie;

const UNREACHED: usize = usize::MAX / 4;

/// Outcome of segmenting a host word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segmentation {
    /// Cost of the cheapest segmentation. Known words cost nothing, unknown
    /// segments cost their length.
    pub min_cost: usize,
    /// Whether some cheapest segmentation has the term as its own segment.
    pub contains_standalone_term: bool,
}

/// Segment `host` with the lexicon trie and look for `term` as a segment.
///
/// Runs in O(n²) over the host length; hosts are single words.
#[must_use]
pub fn analyze(host: &str, term: &str, trie: &LexiconTrie) -> Segmentation {
    let chars: Vec<char> = host.chars().collect();
    let term: Vec<char> = term.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Segmentation {
            min_cost: 0,
            contains_standalone_term: false,
        };
    }

    // cost[i] and has_term[i] describe the best segmentations of chars[..i]
    let mut cost = vec![UNREACHED; n + 1];
    let mut has_term = vec![false; n + 1];
    cost[0] = 0;

    let relax = |cost: &mut [usize], has_term: &mut [bool], end: usize, c: usize, t: bool| {
        if c < cost[end] {
            cost[end] = c;
            has_term[end] = t;
        } else if c == cost[end] && t {
            has_term[end] = true;
        }
    };

    for i in 0..n {
        let base = cost[i];
        if base == UNREACHED {
            continue;
        }
        for end in trie.word_ends_from(&chars, i) {
            let is_term = chars[i..end] == term[..] || has_term[i];
            relax(&mut cost, &mut has_term, end, base, is_term);
        }
        for end in i + 1..=n {
            let is_term = chars[i..end] == term[..] || has_term[i];
            relax(&mut cost, &mut has_term, end, base + (end - i), is_term);
        }
    }

    Segmentation {
        min_cost: cost[n],
        contains_standalone_term: has_term[n],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Lexicon;

    fn run(host: &str, term: &str) -> Segmentation {
        analyze(host, term, Lexicon::builtin("en").trie())
    }

    #[test]
    fn test_term_between_known_words() {
        let seg = run("lookthisassisgood", "ass");
        assert_eq!(seg.min_cost, 3);
        assert!(seg.contains_standalone_term);
    }

    #[test]
    fn test_all_known_words() {
        let seg = run("lookgood", "ass");
        assert_eq!(seg.min_cost, 0);
        assert!(!seg.contains_standalone_term);
    }

    #[test]
    fn test_unknown_host_costs_its_length() {
        let seg = run("compassion", "ass");
        assert_eq!(seg.min_cost, 10);
    }

    #[test]
    fn test_term_is_known_word() {
        let seg = run("thisis", "is");
        assert_eq!(seg.min_cost, 0);
        assert!(seg.contains_standalone_term);
    }

    #[test]
    fn test_empty_host() {
        let seg = run("", "ass");
        assert_eq!(seg.min_cost, 0);
        assert!(!seg.contains_standalone_term);
    }

    #[test]
    fn test_hebrew_lexicon() {
        let lex = Lexicon::builtin("he");
        let seg = analyze("שלוםעולם", "עולם", lex.trie());
        assert_eq!(seg.min_cost, 0);
        assert!(seg.contains_standalone_term);
    }
}
