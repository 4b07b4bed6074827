/// Live-tail loop behavior through the public API: records flow into the
/// bounded buffer, repeated failures back off and finally halt, and stop()
/// cancels the scheduled tick.
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamtail::client::LogApiClient;
use streamtail::config::StreamingConfig;
use streamtail::error::EngineError;
use streamtail::live_tail::{LiveTailController, TickPlanSource};
use streamtail::models::{
    AlertRule, LogRecord, QueryRequest, RetentionInfo, SavedFilter, SchemaField, ServerInfo,
    StreamInfo, StreamStats,
};
use tokio::sync::Notify;

struct FixedPlan;

#[async_trait]
impl TickPlanSource for FixedPlan {
    async fn plan(&self, cursor_micros: i64, limit: usize) -> Result<QueryRequest, EngineError> {
        Ok(QueryRequest {
            query: format!(
                "SELECT * FROM \"app\" WHERE \"_timestamp\" > {} ORDER BY \"_timestamp\" DESC LIMIT {}",
                cursor_micros, limit
            ),
            start_time: "2024-01-01T00:00:00.000000+00:00".to_string(),
            end_time: "2024-01-01T01:00:00.000000+00:00".to_string(),
        })
    }
}

struct ScriptedClient {
    batches: Mutex<VecDeque<Result<Vec<LogRecord>, EngineError>>>,
    calls: AtomicUsize,
    /// Returned once the script runs out.
    fallback: Result<Vec<LogRecord>, EngineError>,
}

impl ScriptedClient {
    fn new(
        batches: Vec<Result<Vec<LogRecord>, EngineError>>,
        fallback: Result<Vec<LogRecord>, EngineError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches.into_iter().collect()),
            calls: AtomicUsize::new(0),
            fallback,
        })
    }
}

#[async_trait]
impl LogApiClient for ScriptedClient {
    async fn query(&self, _request: QueryRequest) -> Result<Vec<LogRecord>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn list_streams(&self) -> Result<Vec<StreamInfo>, EngineError> {
        Ok(Vec::new())
    }
    async fn get_schema(&self, _stream: &str) -> Result<Vec<SchemaField>, EngineError> {
        Ok(Vec::new())
    }
    async fn get_stream_stats(&self, _stream: &str) -> Result<StreamStats, EngineError> {
        Err(EngineError::Network("not scripted".to_string()))
    }
    async fn get_retention(&self) -> Result<RetentionInfo, EngineError> {
        Ok(RetentionInfo { retention_days: None })
    }
    async fn get_server_info(&self) -> Result<ServerInfo, EngineError> {
        Err(EngineError::Network("not scripted".to_string()))
    }
    async fn list_saved_filters(&self) -> Result<Vec<SavedFilter>, EngineError> {
        Ok(Vec::new())
    }
    async fn create_saved_filter(&self, filter: SavedFilter) -> Result<SavedFilter, EngineError> {
        Ok(filter)
    }
    async fn delete_saved_filter(&self, _id: &str) -> Result<(), EngineError> {
        Ok(())
    }
    async fn list_alerts(&self) -> Result<Vec<AlertRule>, EngineError> {
        Ok(Vec::new())
    }
    async fn delete_alert(&self, _name: &str) -> Result<(), EngineError> {
        Ok(())
    }
    async fn delete_stream(&self, _stream: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

fn record(ts: i64) -> LogRecord {
    serde_json::from_value(json!({"_timestamp": ts, "message": "m"})).unwrap()
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_records_flow_into_buffer() {
    let far_future = i64::MAX - 10;
    let client = ScriptedClient::new(
        vec![
            Ok(vec![record(far_future), record(far_future - 1)]),
            Ok(vec![]),
        ],
        Ok(vec![]),
    );
    let controller = LiveTailController::new(
        client.clone(),
        Arc::new(FixedPlan),
        StreamingConfig::default(),
        Arc::new(Notify::new()),
    );

    controller.start();
    settle().await;

    let snapshot = controller.snapshot();
    assert!(snapshot.is_polling);
    assert_eq!(snapshot.new_record_count, 2);
    assert_eq!(snapshot.buffer_len, 2);

    let timestamps: Vec<i64> = controller
        .records()
        .iter()
        .filter_map(LogRecord::timestamp_micros)
        .collect();
    assert_eq!(timestamps, vec![far_future, far_future - 1]);

    controller.stop();
    assert!(!controller.snapshot().is_polling);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_failures_halt_with_persistent_error() {
    let client = ScriptedClient::new(
        Vec::new(),
        Err(EngineError::Network("connection refused".to_string())),
    );
    let controller = LiveTailController::new(
        client.clone(),
        Arc::new(FixedPlan),
        StreamingConfig::default(),
        Arc::new(Notify::new()),
    );

    controller.start();
    // Enough virtual time for all backoff sleeps (2+4+8+16+30s would be the
    // worst case before the fifth failure).
    for _ in 0..200 {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        if !controller.snapshot().is_polling {
            break;
        }
    }

    let snapshot = controller.snapshot();
    assert!(!snapshot.is_polling, "streaming should have halted");
    let error = snapshot.error.expect("persistent error expected");
    assert!(error.to_string().contains("consecutive failures"));
    assert_eq!(client.calls.load(Ordering::SeqCst), 5);

    // No auto-restart after the fatal stop.
    tokio::time::advance(Duration::from_secs(300)).await;
    settle().await;
    assert_eq!(client.calls.load(Ordering::SeqCst), 5);

    controller.dismiss_error();
    assert!(controller.snapshot().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_scheduled_tick() {
    let client = ScriptedClient::new(Vec::new(), Ok(vec![]));
    let controller = LiveTailController::new(
        client.clone(),
        Arc::new(FixedPlan),
        StreamingConfig::default(),
        Arc::new(Notify::new()),
    );

    controller.start();
    settle().await;
    let calls_before = client.calls.load(Ordering::SeqCst);
    assert!(calls_before >= 1);

    controller.stop();
    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(client.calls.load(Ordering::SeqCst), calls_before);
}

#[tokio::test(start_paused = true)]
async fn test_restart_supersedes_previous_session() {
    let far_future = i64::MAX - 10;
    let client = ScriptedClient::new(vec![Ok(vec![record(far_future)])], Ok(vec![]));
    let controller = LiveTailController::new(
        client.clone(),
        Arc::new(FixedPlan),
        StreamingConfig::default(),
        Arc::new(Notify::new()),
    );

    controller.start();
    settle().await;
    assert_eq!(controller.snapshot().new_record_count, 1);
    let first_generation = controller.snapshot().generation;

    // Restart wipes the buffer and counters under a fresh generation.
    controller.start();
    settle().await;
    let snapshot = controller.snapshot();
    assert!(snapshot.generation > first_generation);
    assert_eq!(snapshot.new_record_count, 0);
    assert_eq!(snapshot.buffer_len, 0);
    assert!(snapshot.is_polling);

    controller.stop();
}
