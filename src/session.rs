//! Log-viewer session: the command API and observable snapshot.
//!
//! One session owns one `QueryState`. All mutations go through the command
//! methods here, so the state needs no locking discipline beyond the single
//! mutex; async completions are re-validated against the session's query
//! epoch before they touch the snapshot, mirroring the live-tail generation
//! check.

use crate::cache::CachingQueryGateway;
use crate::client::LogApiClient;
use crate::config::EngineConfig;
use crate::debounce::SearchDebouncer;
use crate::error::EngineError;
use crate::escape::escape_identifier;
use crate::live_tail::{LiveTailController, StreamingSnapshot, TickPlanSource};
use crate::models::{LogRecord, QueryRequest, TIMESTAMP_COLUMN};
use crate::query::{build_where_clause, validate_custom_sql, FilterClause};
use crate::time_window::{self, format_wire_timestamp, TimeRange};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// Aggregate query state for one viewed stream. Discarded wholesale on
/// stream switch.
#[derive(Debug, Clone)]
pub struct QueryState {
    pub stream: String,
    pub filters: Vec<FilterClause>,
    pub search_text: String,
    pub custom_sql: Option<String>,
    pub limit: usize,
    pub time_range: TimeRange,
    /// Column names from the stream schema; empty until the schema loads.
    pub columns: Vec<String>,
}

impl QueryState {
    fn new(stream: &str, default_limit: usize) -> Self {
        Self {
            stream: stream.to_string(),
            filters: Vec::new(),
            search_text: String::new(),
            custom_sql: None,
            limit: default_limit,
            time_range: TimeRange::default(),
            columns: Vec::new(),
        }
    }
}

/// Read-only snapshot handed to the UI. `streaming` is filled in at read
/// time from the live controller.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub logs: Vec<LogRecord>,
    pub columns: Vec<String>,
    pub is_loading: bool,
    pub error: Option<EngineError>,
    pub time_range: TimeRange,
    pub filters: Vec<FilterClause>,
    pub streaming: StreamingSnapshot,
    pub has_more: bool,
}

/// Builds live-tail tick queries from the session's *current* state, so a
/// tick fired long after `start()` still sees the latest filters and search
/// text.
struct SessionPlanSource {
    state: Arc<Mutex<QueryState>>,
}

#[async_trait]
impl TickPlanSource for SessionPlanSource {
    async fn plan(&self, cursor_micros: i64, limit: usize) -> Result<QueryRequest, EngineError> {
        let state = self.state.lock().await;
        let mut conditions = vec![format!("\"{}\" > {}", TIMESTAMP_COLUMN, cursor_micros)];
        if let Some(clause) =
            build_where_clause(&state.filters, &state.search_text, &state.columns)?
        {
            conditions.push(clause);
        }
        let query = format!(
            "SELECT * FROM \"{}\" WHERE {} ORDER BY \"{}\" DESC LIMIT {}",
            escape_identifier(&state.stream),
            conditions.join(" AND "),
            TIMESTAMP_COLUMN,
            limit
        );
        drop(state);

        let now = Utc::now();
        let start = DateTime::from_timestamp_micros(cursor_micros).unwrap_or(now);
        Ok(QueryRequest {
            query,
            start_time: format_wire_timestamp(start),
            end_time: format_wire_timestamp(now),
        })
    }
}

pub struct LogViewerSession {
    gateway: Arc<CachingQueryGateway>,
    config: EngineConfig,
    state: Arc<Mutex<QueryState>>,
    /// Bumped on stream switch; interactive completions carrying an old
    /// epoch are discarded on arrival.
    epoch: AtomicU64,
    base: ArcSwap<ViewSnapshot>,
    live_tail: Arc<LiveTailController>,
    debouncer: Arc<SearchDebouncer>,
    notify: Arc<Notify>,
}

impl LogViewerSession {
    /// `client` is used directly by live tail (which bypasses the cache);
    /// everything else goes through the gateway.
    pub fn new(
        gateway: Arc<CachingQueryGateway>,
        client: Arc<dyn LogApiClient>,
        config: EngineConfig,
        stream: &str,
    ) -> Arc<Self> {
        let state = Arc::new(Mutex::new(QueryState::new(
            stream,
            config.search.default_limit,
        )));
        let notify = Arc::new(Notify::new());
        let plan = Arc::new(SessionPlanSource {
            state: Arc::clone(&state),
        });
        let live_tail = LiveTailController::new(
            client,
            plan,
            config.streaming.clone(),
            Arc::clone(&notify),
        );
        let (debouncer, mut commits) =
            SearchDebouncer::new(std::time::Duration::from_millis(config.search.debounce_ms));

        let initial = ViewSnapshot {
            logs: Vec::new(),
            columns: Vec::new(),
            is_loading: false,
            error: None,
            time_range: TimeRange::default(),
            filters: Vec::new(),
            streaming: live_tail.snapshot(),
            has_more: false,
        };

        let session = Arc::new(Self {
            gateway,
            config,
            state,
            epoch: AtomicU64::new(0),
            base: ArcSwap::from_pointee(initial),
            live_tail,
            debouncer,
            notify,
        });

        // Debounce commits rebuild the query; the task dies with the session.
        let weak = Arc::downgrade(&session);
        tokio::spawn(async move {
            while let Some(text) = commits.recv().await {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                session.apply_search_commit(text).await;
            }
        });

        session
    }

    /// Current snapshot; `streaming` is read fresh from the controller.
    pub fn snapshot(&self) -> ViewSnapshot {
        let mut snapshot = (**self.base.load()).clone();
        snapshot.streaming = self.live_tail.snapshot();
        snapshot
    }

    /// Resolves once something observable changed.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }

    pub fn pending_search_text(&self) -> String {
        self.debouncer.pending_text()
    }

    pub fn is_searching(&self) -> bool {
        self.debouncer.is_searching()
    }

    /// Live-tail buffer, newest first.
    pub fn live_records(&self) -> Vec<LogRecord> {
        self.live_tail.records()
    }

    // ---- commands ----

    pub async fn add_filter(
        &self,
        column: &str,
        operator: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        let clause = FilterClause::new(column, operator, value)?;
        // Streaming does not survive a filter change.
        self.live_tail.stop();
        self.state.lock().await.filters.push(clause);
        self.refresh().await;
        Ok(())
    }

    pub async fn remove_filter(&self, index: usize) {
        self.live_tail.stop();
        {
            let mut state = self.state.lock().await;
            if index < state.filters.len() {
                state.filters.remove(index);
            }
        }
        self.refresh().await;
    }

    pub async fn clear_filters(&self) {
        self.live_tail.stop();
        self.state.lock().await.filters.clear();
        self.refresh().await;
    }

    /// Keystroke entry point. Deliberately does not stop an active live
    /// tail; only the debounced commit rebuilds the interactive query.
    pub fn on_search_text_change(self: &Arc<Self>, text: &str) {
        self.debouncer.on_text_change(text);
        self.notify.notify_waiters();
    }

    pub async fn set_time_range(&self, lookback_minutes: i64) {
        self.live_tail.stop();
        self.state.lock().await.time_range = TimeRange::last_minutes(lookback_minutes);
        self.refresh().await;
    }

    pub async fn set_custom_time_range(&self, start_millis: i64, end_millis: i64) {
        self.live_tail.stop();
        self.state.lock().await.time_range = TimeRange::Absolute {
            start_millis,
            end_millis,
        };
        self.refresh().await;
    }

    /// Validate and install a custom SQL override, then run it.
    pub async fn execute_custom_sql(&self, sql: &str) -> Result<(), EngineError> {
        let validated = validate_custom_sql(sql)?;
        self.state.lock().await.custom_sql = Some(validated);
        self.refresh().await;
        Ok(())
    }

    /// Drop the custom SQL override and return to filter-driven queries.
    pub async fn clear_custom_sql(&self) {
        self.state.lock().await.custom_sql = None;
        self.refresh().await;
    }

    pub fn start_streaming(&self) {
        self.live_tail.start();
    }

    pub fn stop_streaming(&self) {
        self.live_tail.stop();
    }

    pub fn dismiss_streaming_error(&self) {
        self.live_tail.dismiss_error();
    }

    /// Grow the result window by one page and re-run the query.
    pub async fn load_more(&self) {
        self.state.lock().await.limit += self.config.search.page_size;
        self.refresh().await;
    }

    /// Replace the viewed stream: everything query-related resets, streaming
    /// stops, and any in-flight interactive fetch becomes a no-op.
    pub async fn switch_stream(&self, stream: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.debouncer.cancel();
        self.live_tail.stop();
        self.live_tail.dismiss_error();

        {
            let mut state = self.state.lock().await;
            *state = QueryState::new(stream, self.config.search.default_limit);
        }
        self.publish(|snapshot| {
            snapshot.logs.clear();
            snapshot.error = None;
            snapshot.has_more = false;
        })
        .await;

        self.refresh().await;
    }

    /// Re-run the interactive query with the current state. Never retries;
    /// failures sit in the snapshot until the user acts again.
    pub async fn refresh(&self) {
        let epoch = self.epoch.load(Ordering::SeqCst);

        self.ensure_schema().await;

        let request = match self.build_request().await {
            Ok(request) => request,
            Err(error) => {
                self.publish(|snapshot| {
                    snapshot.is_loading = false;
                    snapshot.error = Some(error);
                })
                .await;
                return;
            }
        };

        self.publish(|snapshot| {
            snapshot.is_loading = true;
        })
        .await;

        let result = self.gateway.query(request).await;

        // A stream switch happened while the query was in flight; the
        // result belongs to a dead session.
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("discarding interactive result for stale epoch");
            return;
        }

        let limit = self.state.lock().await.limit;
        match result {
            Ok(logs) => {
                let has_more = logs.len() >= limit;
                self.publish(move |snapshot| {
                    snapshot.has_more = has_more;
                    snapshot.logs = logs;
                    snapshot.is_loading = false;
                    snapshot.error = None;
                })
                .await;
            }
            Err(error) => {
                tracing::warn!(kind = error.kind(), "interactive query failed");
                self.publish(|snapshot| {
                    snapshot.is_loading = false;
                    snapshot.error = Some(error);
                })
                .await;
            }
        }
    }

    async fn apply_search_commit(&self, text: String) {
        self.state.lock().await.search_text = text;
        // Note: an active live tail keeps polling; its next tick picks up
        // the new search text through the plan source.
        self.refresh().await;
    }

    /// Load schema columns once per stream so free-text search has a column
    /// set. A failed load is not fatal here; search will surface
    /// `SearchUnavailable` until a later attempt succeeds.
    async fn ensure_schema(&self) {
        let (stream, needs_schema) = {
            let state = self.state.lock().await;
            (state.stream.clone(), state.columns.is_empty())
        };
        if !needs_schema {
            return;
        }
        match self.gateway.get_schema(&stream, false).await {
            Ok(fields) => {
                let columns: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
                let mut state = self.state.lock().await;
                if state.stream == stream {
                    state.columns = columns;
                }
            }
            Err(error) => {
                tracing::debug!(stream = %stream, kind = error.kind(), "schema load failed");
            }
        }
    }

    async fn build_request(&self) -> Result<QueryRequest, EngineError> {
        let state = self.state.lock().await;

        let query = match &state.custom_sql {
            Some(custom) => custom.clone(),
            None => {
                let mut sql = format!("SELECT * FROM \"{}\"", escape_identifier(&state.stream));
                if let Some(clause) =
                    build_where_clause(&state.filters, &state.search_text, &state.columns)?
                {
                    sql.push_str(" WHERE ");
                    sql.push_str(&clause);
                }
                sql.push_str(&format!(
                    " ORDER BY \"{}\" DESC LIMIT {}",
                    TIMESTAMP_COLUMN, state.limit
                ));
                sql
            }
        };

        let window = time_window::resolve(state.time_range, Utc::now());
        Ok(QueryRequest {
            query,
            start_time: window.start,
            end_time: window.end,
        })
    }

    /// Swap in an updated snapshot. State-derived fields are refreshed on
    /// every publish so the snapshot never lags the command that caused it.
    async fn publish<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ViewSnapshot),
    {
        let (filters, time_range, columns) = {
            let state = self.state.lock().await;
            (
                state.filters.clone(),
                state.time_range,
                state.columns.clone(),
            )
        };
        let mut snapshot = (**self.base.load()).clone();
        snapshot.filters = filters;
        snapshot.time_range = time_range;
        snapshot.columns = columns;
        mutate(&mut snapshot);
        self.base.store(Arc::new(snapshot));
        self.notify.notify_waiters();
    }
}
