//! Snapshot feeds.
//!
//! A feed produces text snapshots for the aggregator or the live detector.
//! Reading the host UI is left to whoever embeds this crate; the feeds here
//! read line-oriented text, which is what the CLI drives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

/// One observed piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Where the text was observed.
    pub source_id: String,
    /// The raw text.
    pub text: String,
}

/// A stream of snapshots.
#[async_trait::async_trait]
pub trait SnapshotFeed: Send {
    /// Wait for the next snapshot. `None` means the feed is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails.
    async fn next_snapshot(&mut self) -> Result<Option<Snapshot>>;
}

/// Cloneable stop signal shared between a feed and its controller.
#[derive(Debug, Clone, Default)]
pub struct FeedHandle {
    stop_signal: Arc<AtomicBool>,
}

impl FeedHandle {
    /// Create a handle in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the feed to stop.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Clear the stop signal.
    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }
}

/// Feed that turns each input line into a snapshot.
///
/// In tagged mode a line reads `source<TAB>text`; lines without a tab use the
/// default source.
#[derive(Debug)]
pub struct LineFeed<R> {
    lines: Lines<R>,
    default_source: String,
    tagged: bool,
    handle: FeedHandle,
}

impl<R: AsyncBufRead + Unpin + Send> LineFeed<R> {
    /// Create a feed over a buffered reader.
    pub fn new(reader: R, default_source: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            default_source: default_source.into(),
            tagged: false,
            handle: FeedHandle::new(),
        }
    }

    /// Read `source<TAB>text` lines.
    #[must_use]
    pub fn tagged(mut self, tagged: bool) -> Self {
        self.tagged = tagged;
        self
    }

    /// Handle that stops this feed.
    #[must_use]
    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }

    fn snapshot(&self, line: String) -> Snapshot {
        if self.tagged {
            if let Some((source, text)) = line.split_once('\t') {
                return Snapshot {
                    source_id: source.trim().to_string(),
                    text: text.to_string(),
                };
            }
        }
        Snapshot {
            source_id: self.default_source.clone(),
            text: line,
        }
    }
}

#[async_trait::async_trait]
impl<R: AsyncBufRead + Unpin + Send> SnapshotFeed for LineFeed<R> {
    async fn next_snapshot(&mut self) -> Result<Option<Snapshot>> {
        if self.handle.should_stop() {
            return Ok(None);
        }
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(self.snapshot(line))),
            None => Ok(None),
        }
    }
}

/// Drive a feed on a background task and deliver snapshots over a channel.
///
/// The channel closes when the feed is exhausted, fails, or is stopped.
pub fn spawn_feed<F>(mut feed: F, handle: FeedHandle, capacity: usize) -> mpsc::Receiver<Snapshot>
where
    F: SnapshotFeed + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while !handle.should_stop() {
            match feed.next_snapshot().await {
                Ok(Some(snapshot)) => {
                    if tx.send(snapshot).await.is_err() {
                        debug!("Snapshot receiver dropped");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Snapshot feed failed");
                    break;
                }
            }
        }
        debug!("Snapshot feed finished");
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn test_feed_handle_stop_and_reset() {
        let handle = FeedHandle::new();
        assert!(!handle.should_stop());
        handle.stop();
        assert!(handle.should_stop());
        handle.reset();
        assert!(!handle.should_stop());
    }

    #[test]
    fn test_feed_handle_clone_shares_signal() {
        let a = FeedHandle::new();
        let b = a.clone();
        a.stop();
        assert!(b.should_stop());
    }

    #[tokio::test]
    async fn test_line_feed_reads_lines() {
        let input = "first line\nsecond\n".as_bytes();
        let mut feed = LineFeed::new(BufReader::new(input), "stdin");
        let a = feed.next_snapshot().await.unwrap().unwrap();
        assert_eq!(a.source_id, "stdin");
        assert_eq!(a.text, "first line");
        let b = feed.next_snapshot().await.unwrap().unwrap();
        assert_eq!(b.text, "second");
        assert!(feed.next_snapshot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_line_feed_tagged() {
        let input = "chat\thello there\nno tab here\n".as_bytes();
        let mut feed = LineFeed::new(BufReader::new(input), "default").tagged(true);
        let a = feed.next_snapshot().await.unwrap().unwrap();
        assert_eq!((a.source_id.as_str(), a.text.as_str()), ("chat", "hello there"));
        let b = feed.next_snapshot().await.unwrap().unwrap();
        assert_eq!(b.source_id, "default");
    }

    #[tokio::test]
    async fn test_line_feed_stops() {
        let input = "a\nb\n".as_bytes();
        let mut feed = LineFeed::new(BufReader::new(input), "s");
        feed.handle().stop();
        assert!(feed.next_snapshot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spawn_feed_delivers_all() {
        let input = "one\ntwo\nthree\n".as_bytes();
        let feed = LineFeed::new(BufReader::new(input), "s");
        let handle = feed.handle();
        let mut rx = spawn_feed(feed, handle, 4);
        let mut texts = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            texts.push(snapshot.text);
        }
        assert_eq!(texts, ["one", "two", "three"]);
    }
}
