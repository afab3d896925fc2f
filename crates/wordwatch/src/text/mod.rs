//! Text normalization and tokenization.
//!
//! Every matcher works on normalized text: the normalizer canonicalizes raw
//! input and the tokenizer splits it into script-tagged word/number tokens.

mod normalize;
mod tokenize;

pub use normalize::{
    is_hebrew_letter, is_hebrew_niqqud, is_latin_letter, leet_substitute, normalize,
    same_script_letters, MarkStripping, NormalizerConfig,
};
pub use tokenize::{token_texts, tokenize, Script, Token};
