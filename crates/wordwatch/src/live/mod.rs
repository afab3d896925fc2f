//! Live typing detection.
//!
//! The detector follows a text field as the user types. Every change event
//! carries the whole field; the detector reconciles it with its buffer and
//! evaluates the buffer either right away, when the just-typed character ends
//! a word, or once typing pauses for the debounce interval.
//!
//! State sits behind a per-instance mutex because debounce callbacks come back
//! from the scheduler. Each callback carries the generation it was scheduled
//! in; a focus change bumps the generation so stale callbacks do nothing.

mod schedule;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

pub use schedule::{
    Clock, DebounceScheduler, ManualClock, ManualScheduler, MonotonicClock, Task, TokioScheduler,
};

use crate::decision::{Action, Reason};
use crate::engines::EngineSet;
use crate::error::{Error, Result};
use crate::patterns::Severity;
use crate::text::{normalize, token_texts};

/// Characters that end a word while typing.
const BOUNDARY_CLASS: &str = r"[\x20\p{P}\p{S}\d_\-]";

/// Live detector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Typing pause after which the buffer is evaluated.
    pub debounce_ms: u64,
    /// Only block high-severity hits; other blocks become allows.
    pub block_high_severity_only: bool,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            block_high_severity_only: true,
        }
    }
}

impl LiveSettings {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(Error::validation("live.debounce_ms must be at least 1"));
        }
        Ok(())
    }
}

/// One reported live decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveDecision {
    /// Pattern that matched.
    pub pattern_id: String,
    /// Pattern severity.
    pub severity: Severity,
    /// Final action after severity gating.
    pub action: Action,
    /// Rule that decided, or `PHRASE` for exact phrase hits.
    pub reason: Reason,
}

/// Receives every reported live decision.
pub trait LiveObserver: Send + Sync {
    /// Called once per reported decision, outside the detector's lock.
    fn on_decision(&self, pattern_id: &str, severity: Severity, action: Action, reason: Reason);
}

/// How a change event relates to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    /// The field grew at the end.
    Append,
    /// The field shrank or was swapped for something short.
    Replace,
    /// Anything else.
    Reset,
}

#[derive(Debug, Default)]
struct State {
    buffer: String,
    last_event_ms: Option<u64>,
    debounce_scheduled: bool,
    generation: u64,
}

impl State {
    fn reconcile(&mut self, normalized: &str) -> Edit {
        let norm_len = normalized.chars().count();
        let buf_len = self.buffer.chars().count();

        let edit = if norm_len < buf_len.saturating_sub(2) || (norm_len < 4 && buf_len > 10) {
            Edit::Replace
        } else if normalized.starts_with(self.buffer.as_str()) {
            Edit::Append
        } else {
            Edit::Reset
        };

        match edit {
            Edit::Append => {
                let tail = &normalized[self.buffer.len()..];
                self.buffer.push_str(tail);
            }
            Edit::Replace | Edit::Reset => {
                self.buffer.clear();
                self.buffer.push_str(normalized);
            }
        }
        edit
    }
}

struct Inner {
    engines: RwLock<Arc<EngineSet>>,
    settings: RwLock<LiveSettings>,
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn DebounceScheduler>,
    observer: Option<Arc<dyn LiveObserver>>,
    boundary: Regex,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engines(&self) -> Arc<EngineSet> {
        Arc::clone(&self.engines.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn settings(&self) -> LiveSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_boundary(&self, c: char) -> bool {
        let mut buf = [0u8; 4];
        self.boundary.is_match(c.encode_utf8(&mut buf))
    }

    fn schedule_debounce(self: &Arc<Self>, delay_ms: u64, generation: u64) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.scheduler.schedule(
            delay_ms,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.debounce_fired(generation);
                }
            }),
        );
    }

    fn debounce_fired(self: &Arc<Self>, generation: u64) {
        let now = self.clock.now_ms();
        let debounce_ms = self.settings().debounce_ms;

        let mut reschedule = None;
        let text = {
            let mut state = self.state();
            if state.generation != generation {
                trace!(generation, "Stale debounce callback ignored");
                return;
            }
            state.debounce_scheduled = false;
            if state.buffer.is_empty() {
                return;
            }
            match state.last_event_ms {
                Some(last) if now.saturating_sub(last) >= debounce_ms => {
                    Some(std::mem::take(&mut state.buffer))
                }
                last => {
                    let elapsed = last.map_or(0, |last| now.saturating_sub(last));
                    state.debounce_scheduled = true;
                    reschedule = Some((debounce_ms - elapsed).max(1));
                    None
                }
            }
        };

        if let Some(delay) = reschedule {
            self.schedule_debounce(delay, generation);
        }
        if let Some(text) = text {
            self.finalize(&text);
        }
    }

    /// Evaluate normalized text without touching detector state.
    fn evaluate(&self, normalized: &str) -> Vec<LiveDecision> {
        if normalized.trim().is_empty() {
            return Vec::new();
        }
        let engines = self.engines();
        let high_only = self.settings().block_high_severity_only;
        let mut decisions = Vec::new();

        let tokens = token_texts(normalized);
        for hit in engines.phrase.find(&tokens) {
            let action = if !high_only || hit.severity.is_high() {
                Action::Block
            } else {
                Action::Allow
            };
            decisions.push(LiveDecision {
                pattern_id: hit.pattern_id,
                severity: hit.severity,
                action,
                reason: Reason::Phrase,
            });
        }

        for candidate in engines.evasion.find_candidates(normalized) {
            let decision = engines.decision.decide_or_allow(normalized, &candidate);
            let action = if decision.action == Action::Block
                && high_only
                && !candidate.severity.is_high()
            {
                Action::Allow
            } else {
                decision.action
            };
            if action == Action::Allow
                && decision
                    .reason
                    .is_benign_allow(&decision.host, &candidate.term)
            {
                trace!(
                    pattern_id = %candidate.pattern_id,
                    host = %decision.host,
                    reason = %decision.reason,
                    "Benign allow suppressed"
                );
                continue;
            }
            decisions.push(LiveDecision {
                pattern_id: candidate.pattern_id,
                severity: candidate.severity,
                action,
                reason: decision.reason,
            });
        }

        decisions
    }

    /// Evaluate and report. Must be called without the state lock held.
    fn finalize(&self, normalized: &str) -> Vec<LiveDecision> {
        let decisions = self.evaluate(normalized);
        for d in &decisions {
            if d.action == Action::Block {
                info!(
                    pattern_id = %d.pattern_id,
                    severity = %d.severity,
                    reason = %d.reason,
                    "Live block"
                );
            } else {
                debug!(
                    pattern_id = %d.pattern_id,
                    severity = %d.severity,
                    reason = %d.reason,
                    "Live warn"
                );
            }
            if let Some(observer) = &self.observer {
                observer.on_decision(&d.pattern_id, d.severity, d.action, d.reason);
            }
        }
        decisions
    }
}

/// Debounced detector over a live text field.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Clone)]
pub struct LiveTypingDetector {
    inner: Arc<Inner>,
}

impl fmt::Debug for LiveTypingDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("LiveTypingDetector")
            .field("buffer_len", &state.buffer.len())
            .field("debounce_scheduled", &state.debounce_scheduled)
            .field("generation", &state.generation)
            .field("settings", &self.inner.settings())
            .finish_non_exhaustive()
    }
}

impl LiveTypingDetector {
    /// Create a detector.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    pub fn new(
        engines: Arc<EngineSet>,
        settings: LiveSettings,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn DebounceScheduler>,
        observer: Option<Arc<dyn LiveObserver>>,
    ) -> Result<Self> {
        settings.validate()?;
        let boundary = Regex::new(BOUNDARY_CLASS)
            .map_err(|e| Error::internal(format!("boundary class: {e}")))?;
        Ok(Self {
            inner: Arc::new(Inner {
                engines: RwLock::new(engines),
                settings: RwLock::new(settings),
                state: Mutex::new(State::default()),
                clock,
                scheduler,
                observer,
                boundary,
            }),
        })
    }

    /// Feed the full current contents of the text field.
    ///
    /// Returns the decisions reported if the event finalized the buffer.
    pub fn on_text_changed(&self, raw: &str) -> Vec<LiveDecision> {
        let inner = &self.inner;
        let now = inner.clock.now_ms();
        let normalized = normalize(raw, &inner.engines().normalizer);
        let debounce_ms = inner.settings().debounce_ms;
        let just_typed = raw.chars().next_back();

        let (schedule, finalize) = {
            let mut state = inner.state();
            state.last_event_ms = Some(now);

            let schedule = (!state.debounce_scheduled).then(|| {
                state.debounce_scheduled = true;
                state.generation
            });

            let edit = state.reconcile(&normalized);
            trace!(?edit, buffer_len = state.buffer.len(), "Buffer reconciled");

            let at_boundary = edit == Edit::Append
                && !state.buffer.is_empty()
                && just_typed.is_some_and(|c| inner.is_boundary(c));
            let finalize = at_boundary.then(|| std::mem::take(&mut state.buffer));
            (schedule, finalize)
        };

        if let Some(generation) = schedule {
            inner.schedule_debounce(debounce_ms, generation);
        }
        finalize.map_or_else(Vec::new, |text| inner.finalize(&text))
    }

    /// Forget the buffer and any pending debounce.
    pub fn on_focus_changed(&self) {
        {
            let mut state = self.inner.state();
            state.buffer.clear();
            state.last_event_ms = None;
            state.debounce_scheduled = false;
            state.generation += 1;
        }
        self.inner.scheduler.cancel_all();
        trace!("Focus changed, live buffer cleared");
    }

    /// Evaluate normalized text without touching the buffer or the observer.
    #[must_use]
    pub fn evaluate(&self, normalized: &str) -> Vec<LiveDecision> {
        self.inner.evaluate(normalized)
    }

    /// Finalize the current buffer now.
    pub fn flush(&self) -> Vec<LiveDecision> {
        let text = std::mem::take(&mut self.inner.state().buffer);
        if text.is_empty() {
            return Vec::new();
        }
        self.inner.finalize(&text)
    }

    /// Current buffer contents.
    #[must_use]
    pub fn buffer(&self) -> String {
        self.inner.state().buffer.clone()
    }

    /// Replace the settings; takes effect on the next event.
    ///
    /// # Errors
    ///
    /// Returns an error if the new settings are invalid; the current ones
    /// stay active.
    pub fn update_settings(&self, settings: LiveSettings) -> Result<()> {
        settings.validate()?;
        debug!(?settings, "Live settings updated");
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(())
    }

    /// Swap in a new compiled engine set.
    pub fn replace_engines(&self, engines: Arc<EngineSet>) {
        debug!(signature = engines.signature(), "Live engines replaced");
        *self
            .inner
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner) = engines;
    }
}
