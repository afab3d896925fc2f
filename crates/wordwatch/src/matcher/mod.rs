//! Pattern matchers.
//!
//! Two complementary strategies run over normalized text:
//!
//! - [`PhraseMatcher`] matches whole tokens and token sequences exactly.
//! - [`EvasionMatcher`] finds single-word terms hidden by separators or
//!   leetspeak and yields [`Candidate`]s for the decision engine.

mod evasion;
mod phrase;

pub use evasion::{
    Candidate, CompiledTerm, EvasionMatcher, EvasionSettings, DEFAULT_SEPARATOR_CLASS,
};
pub use phrase::{PhraseEntry, PhraseMatch, PhraseMatcher};
