//! `wordwatch` - Forbidden-word detection for on-screen text
//!
//! This library matches text against operator-supplied pattern sets. Exact
//! phrases are matched over tokens; single words are matched through
//! separators and look-alike characters, then judged by a rule engine that
//! tells a standalone term apart from an innocent word that contains it.
//!
//! Two drivers sit on top: [`monitoring::MonitoringAggregator`] counts
//! repeated hits across text snapshots, and [`live::LiveTypingDetector`]
//! decides on a text field as it is typed.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod decision;
pub mod engines;
pub mod error;
pub mod feed;
pub mod lexicon;
pub mod live;
pub mod logging;
pub mod matcher;
pub mod monitoring;
pub mod patterns;
pub mod text;

pub use config::Config;
pub use decision::{Action, Decision, DecisionEngine, Reason};
pub use engines::{EngineRegistry, EngineSet, EngineSettings};
pub use error::{Error, Result};
pub use lexicon::Lexicon;
pub use live::{LiveDecision, LiveTypingDetector};
pub use logging::init_logging;
pub use monitoring::{Detection, MonitoringAggregator};
pub use patterns::{Pattern, PatternRepository, PatternSet, Severity, UpdateReport};
