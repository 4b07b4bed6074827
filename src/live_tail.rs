//! Live-tail polling state machine.
//!
//! Every start bumps a generation counter; a poll result is applied only if
//! its generation is still current when it arrives. That single check is the
//! cancellation mechanism: stopping or restarting never aborts an in-flight
//! network call, it just makes the completion a no-op.
//!
//! Live tail bypasses the read-through cache; tailed data must always be
//! fresh.

use crate::client::LogApiClient;
use crate::config::StreamingConfig;
use crate::error::EngineError;
use crate::models::{LogRecord, QueryRequest};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Supplies the tick query at fire time, so ticks always see the current
/// filter/search state rather than the state captured at `start()`.
#[async_trait]
pub trait TickPlanSource: Send + Sync {
    async fn plan(&self, cursor_micros: i64, limit: usize) -> Result<QueryRequest, EngineError>;
}

/// Mutable state of one streaming session. Owned by the controller and only
/// mutated under its lock, with the generation check applied first.
struct SessionState {
    cursor_micros: i64,
    consecutive_errors: u32,
    interval: Duration,
    new_record_count: u64,
    buffer: VecDeque<LogRecord>,
    is_polling: bool,
    transient_retrying: bool,
    error: Option<EngineError>,
}

impl SessionState {
    fn idle(base_interval: Duration) -> Self {
        Self {
            cursor_micros: 0,
            consecutive_errors: 0,
            interval: base_interval,
            new_record_count: 0,
            buffer: VecDeque::new(),
            is_polling: false,
            transient_retrying: false,
            error: None,
        }
    }
}

/// UI-facing view of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingSnapshot {
    pub is_polling: bool,
    pub generation: u64,
    pub new_record_count: u64,
    pub buffer_len: usize,
    pub consecutive_errors: u32,
    pub interval: Duration,
    /// True from the warn threshold until the next success; drives the
    /// transient "retrying" banner.
    pub retrying: bool,
    pub error: Option<EngineError>,
}

pub struct LiveTailController {
    client: Arc<dyn LogApiClient>,
    plan: Arc<dyn TickPlanSource>,
    config: StreamingConfig,
    generation: AtomicU64,
    state: Mutex<SessionState>,
    task: Mutex<Option<JoinHandle<()>>>,
    notify: Arc<Notify>,
}

impl LiveTailController {
    pub fn new(
        client: Arc<dyn LogApiClient>,
        plan: Arc<dyn TickPlanSource>,
        config: StreamingConfig,
        notify: Arc<Notify>,
    ) -> Arc<Self> {
        let base_interval = config.base_interval();
        Arc::new(Self {
            client,
            plan,
            config,
            generation: AtomicU64::new(0),
            state: Mutex::new(SessionState::idle(base_interval)),
            task: Mutex::new(None),
            notify,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin polling under a fresh generation. Any previous session, polling
    /// or not, is superseded.
    pub fn start(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.lock_state();
            *state = SessionState::idle(self.config.base_interval());
            state.cursor_micros = Utc::now().timestamp_micros();
            state.is_polling = true;
        }
        tracing::info!(generation, "live tail started");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if this.generation() != generation {
                    return;
                }
                this.tick(generation).await;
                if this.generation() != generation {
                    return;
                }
                let delay = this.lock_state().interval;
                tokio::time::sleep(delay).await;
            }
        });

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        self.notify.notify_waiters();
    }

    /// Stop polling: invalidate in-flight ticks, cancel the scheduled one.
    /// The last persistent error is preserved for the UI.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
        }
        drop(task);

        let mut state = self.lock_state();
        state.is_polling = false;
        state.transient_retrying = false;
        drop(state);

        tracing::info!("live tail stopped");
        self.notify.notify_waiters();
    }

    /// Clear the preserved persistent error without touching polling state.
    pub fn dismiss_error(&self) {
        self.lock_state().error = None;
        self.notify.notify_waiters();
    }

    pub fn snapshot(&self) -> StreamingSnapshot {
        let state = self.lock_state();
        StreamingSnapshot {
            is_polling: state.is_polling,
            generation: self.generation(),
            new_record_count: state.new_record_count,
            buffer_len: state.buffer.len(),
            consecutive_errors: state.consecutive_errors,
            interval: state.interval,
            retrying: state.transient_retrying,
            error: state.error.clone(),
        }
    }

    /// Buffered records, newest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock_state().buffer.iter().cloned().collect()
    }

    async fn tick(self: &Arc<Self>, generation: u64) {
        let cursor = self.lock_state().cursor_micros;
        let request = match self.plan.plan(cursor, self.config.tick_limit).await {
            Ok(request) => request,
            Err(error) => {
                self.apply_failure(generation, error);
                return;
            }
        };

        match self.client.query(request).await {
            Ok(records) => self.apply_success(generation, records),
            Err(error) => self.apply_failure(generation, error),
        }
    }

    fn apply_success(&self, generation: u64, records: Vec<LogRecord>) {
        // Stale tick: a stop or restart happened while the call was in
        // flight. Discard wholesale.
        if self.generation() != generation {
            tracing::debug!(generation, "discarding stale tick result");
            return;
        }
        let mut state = self.lock_state();

        let fetched = records.len() as u64;
        let newest = records.iter().filter_map(LogRecord::timestamp_micros).max();

        // Newest first: new records go in front, oldest drop off the back.
        for record in records.into_iter().rev() {
            state.buffer.push_front(record);
        }
        while state.buffer.len() > self.config.max_buffer {
            state.buffer.pop_back();
        }
        if let Some(newest) = newest {
            state.cursor_micros = state.cursor_micros.max(newest);
        }
        state.new_record_count += fetched;
        state.consecutive_errors = 0;
        state.interval = self.config.base_interval();
        state.transient_retrying = false;
        state.error = None;
        drop(state);

        if fetched > 0 {
            tracing::debug!(generation, fetched, "live tail tick applied");
        }
        self.notify.notify_waiters();
    }

    fn apply_failure(&self, generation: u64, error: EngineError) {
        if self.generation() != generation {
            return;
        }
        let mut state = self.lock_state();
        state.consecutive_errors += 1;
        let errors = state.consecutive_errors;

        if errors >= self.config.fatal_threshold {
            // Halt for good; restarting requires an explicit user action.
            state.is_polling = false;
            state.transient_retrying = false;
            state.error = Some(EngineError::Network(format!(
                "Live tail stopped after {} consecutive failures (last: {})",
                errors,
                error.user_message()
            )));
            drop(state);
            self.generation.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(generation, errors, "live tail halted");
            self.notify.notify_waiters();
            return;
        }

        let exponent = errors.min(16);
        let backoff_ms = self
            .config
            .base_interval_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_interval_ms);
        state.interval = Duration::from_millis(backoff_ms);
        state.transient_retrying = errors >= self.config.warn_threshold;
        drop(state);

        tracing::warn!(generation, errors, backoff_ms, error = %error, "live tail tick failed");
        self.notify.notify_waiters();
    }
}
