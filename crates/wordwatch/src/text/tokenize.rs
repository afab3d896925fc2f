//! Script-aware word tokenization.

use serde::Serialize;

use super::normalize::is_hebrew_letter;

/// Broad script classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    /// Basic and extended Latin letters.
    Latin,
    /// Hebrew letters.
    Hebrew,
    /// Numeric characters.
    Digit,
    /// Any other letter (Cyrillic, Arabic, CJK, ...).
    Other,
}

impl Script {
    /// Classify a single letter or digit.
    #[must_use]
    pub fn classify(c: char) -> Self {
        if c.is_numeric() {
            Self::Digit
        } else if is_hebrew_letter(c) {
            Self::Hebrew
        } else if ('\u{0041}'..='\u{024F}').contains(&c) {
            Self::Latin
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latin => write!(f, "latin"),
            Self::Hebrew => write!(f, "hebrew"),
            Self::Digit => write!(f, "digit"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A word or number token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// Lowercased token text.
    pub text: String,
    /// Char offset of the first character in the source text.
    pub start: usize,
    /// Char offset one past the last character (exclusive).
    pub end: usize,
    /// Script of the token.
    pub script: Script,
}

/// Split text into word and number tokens.
///
/// A token is a maximal run of letters/digits of one script. Digits only
/// merge with digits. Latin runs that still carry uppercase letters are
/// further split at lowercase→uppercase boundaries.
///
/// # Examples
///
/// ```
/// use wordwatch::text::tokenize;
///
/// let tokens = tokenize("hello_world-123");
/// let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
/// assert_eq!(texts, ["hello", "world", "123"]);
/// ```
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !c.is_alphanumeric() {
            i += 1;
            continue;
        }

        let start = i;
        let script = Script::classify(c);
        i += 1;
        while i < chars.len() && chars[i].is_alphanumeric() && Script::classify(chars[i]) == script
        {
            i += 1;
        }

        let run = &chars[start..i];
        if script == Script::Latin && run.iter().any(|c| c.is_uppercase()) {
            split_camel(run, start, &mut tokens);
        } else {
            tokens.push(Token {
                text: lowercase(run),
                start,
                end: i,
                script,
            });
        }
    }

    tokens
}

/// Tokenize and keep only the token texts.
#[must_use]
pub fn token_texts(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|t| t.text).collect()
}

fn split_camel(run: &[char], offset: usize, out: &mut Vec<Token>) {
    let mut piece_start = 0;
    for i in 1..run.len() {
        if run[i - 1].is_lowercase() && run[i].is_uppercase() {
            out.push(Token {
                text: lowercase(&run[piece_start..i]),
                start: offset + piece_start,
                end: offset + i,
                script: Script::Latin,
            });
            piece_start = i;
        }
    }
    out.push(Token {
        text: lowercase(&run[piece_start..]),
        start: offset + piece_start,
        end: offset + run.len(),
        script: Script::Latin,
    });
}

fn lowercase(chars: &[char]) -> String {
    chars.iter().flat_map(|c| c.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{normalize, NormalizerConfig};

    fn texts(raw: &str) -> Vec<String> {
        token_texts(&normalize(raw, &NormalizerConfig::default()))
    }

    #[test]
    fn test_tokenize_hello_world() {
        assert_eq!(texts("Hello, world!"), ["hello", "world"]);
    }

    #[test]
    fn test_tokenize_hebrew() {
        assert_eq!(texts("שלום—עולם"), ["שלום", "עולם"]);
    }

    #[test]
    fn test_tokenize_emoji_separator() {
        assert_eq!(texts("go🏃fast"), ["go", "fast"]);
    }

    #[test]
    fn test_tokenize_underscore_and_digits() {
        assert_eq!(texts("HELLO_world-123"), ["hello", "world", "123"]);
    }

    #[test]
    fn test_tokenize_script_switch() {
        let tokens = tokenize("abcשלום");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].script, Script::Latin);
        assert_eq!(tokens[1].script, Script::Hebrew);
        assert_eq!((tokens[1].start, tokens[1].end), (3, 7));
    }

    #[test]
    fn test_tokenize_letters_then_digits() {
        let tokens = tokenize("abc123 456");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["abc", "123", "456"]);
        assert_eq!(tokens[1].script, Script::Digit);
    }

    #[test]
    fn test_tokenize_camel_case_raw() {
        let tokens = tokenize("goFastNow");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["go", "fast", "now"]);
        assert_eq!((tokens[1].start, tokens[1].end), (2, 6));
    }

    #[test]
    fn test_tokenize_camel_case_after_normalization() {
        // Normalization lowercases, so no camel split happens
        assert_eq!(texts("goFastNow"), ["gofastnow"]);
    }

    #[test]
    fn test_tokenize_offsets_are_char_offsets() {
        let tokens = tokenize("é b");
        assert_eq!((tokens[0].start, tokens[0].end), (0, 1));
        assert_eq!((tokens[1].start, tokens[1].end), (2, 3));
    }

    #[test]
    fn test_tokenize_empty_and_separators_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" .,!? ").is_empty());
    }
}
