//! Search input debouncing.
//!
//! Cancel-and-reschedule: every keystroke replaces the armed timer, so only
//! the last keystroke's timer ever fires. The pending text is readable
//! immediately for UI echo; the committed text arrives on the channel after
//! the quiet period.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct SearchDebouncer {
    quiet_period: Duration,
    pending_text: ArcSwap<String>,
    searching: AtomicBool,
    // Schedule generation; a timer only commits if it is still the latest.
    schedule: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
    commits: mpsc::UnboundedSender<String>,
}

impl SearchDebouncer {
    /// Returns the debouncer and the receiving end of the commit channel.
    pub fn new(quiet_period: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = Arc::new(Self {
            quiet_period,
            pending_text: ArcSwap::from_pointee(String::new()),
            searching: AtomicBool::new(false),
            schedule: AtomicU64::new(0),
            timer: Mutex::new(None),
            commits: tx,
        });
        (debouncer, rx)
    }

    /// Record a keystroke: update the echo text and restart the quiet-period
    /// timer, cancelling any previously armed one.
    pub fn on_text_change(self: &Arc<Self>, text: &str) {
        self.pending_text.store(Arc::new(text.to_string()));
        self.searching.store(true, Ordering::SeqCst);
        let generation = self.schedule.fetch_add(1, Ordering::SeqCst) + 1;

        let this = Arc::clone(self);
        let text = text.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.quiet_period).await;
            // A newer keystroke rescheduled while we slept.
            if this.schedule.load(Ordering::SeqCst) != generation {
                return;
            }
            this.searching.store(false, Ordering::SeqCst);
            if this.commits.send(text).is_err() {
                tracing::debug!("search commit receiver dropped");
            }
        });

        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
    }

    /// The text as typed, before the quiet period elapses.
    pub fn pending_text(&self) -> String {
        self.pending_text.load().as_ref().clone()
    }

    /// True exactly while a commit is pending.
    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::SeqCst)
    }

    /// Drop any armed timer without committing. Used on teardown and stream
    /// switch.
    pub fn cancel(&self) {
        self.schedule.fetch_add(1, Ordering::SeqCst);
        self.searching.store(false, Ordering::SeqCst);
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, Duration};

    #[tokio::test(start_paused = true)]
    async fn test_single_commit_after_quiet_period() {
        let (debouncer, mut commits) = SearchDebouncer::new(Duration::from_millis(300));

        debouncer.on_text_change("err");
        assert_eq!(debouncer.pending_text(), "err");
        assert!(debouncer.is_searching());

        advance(Duration::from_millis(301)).await;
        assert_eq!(commits.recv().await.unwrap(), "err");
        assert!(!debouncer.is_searching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_commits_only_last_text() {
        let (debouncer, mut commits) = SearchDebouncer::new(Duration::from_millis(300));

        debouncer.on_text_change("e");
        advance(Duration::from_millis(100)).await;
        debouncer.on_text_change("er");
        advance(Duration::from_millis(100)).await;
        debouncer.on_text_change("error");
        // Echo tracks the latest keystroke immediately.
        assert_eq!(debouncer.pending_text(), "error");

        advance(Duration::from_millis(301)).await;
        assert_eq!(commits.recv().await.unwrap(), "error");
        assert!(commits.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_commit() {
        let (debouncer, mut commits) = SearchDebouncer::new(Duration::from_millis(300));

        debouncer.on_text_change("half-typed");
        debouncer.cancel();
        assert!(!debouncer.is_searching());

        advance(Duration::from_millis(500)).await;
        assert!(commits.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_searching_flag_window() {
        let (debouncer, mut commits) = SearchDebouncer::new(Duration::from_millis(300));

        debouncer.on_text_change("a");
        advance(Duration::from_millis(200)).await;
        assert!(debouncer.is_searching());

        advance(Duration::from_millis(101)).await;
        commits.recv().await.unwrap();
        assert!(!debouncer.is_searching());
    }
}
