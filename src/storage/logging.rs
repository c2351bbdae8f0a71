//! Outcome persistence: inserts, the SQLite sink, and recent-outcome queries.

use serde::Serialize;
use sqlx::SqlitePool;

use super::sink::{OutcomeRecord, OutcomeSink};

impl OutcomeRecord {
    /// Insert this record into the database.
    pub async fn insert(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO outcomes (
                correlation_id, timestamp, mode, question,
                endpoint_index, endpoint_url, endpoint_model,
                success, elapsed_seconds, message, message_length
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.correlation_id)
        .bind(&self.timestamp)
        .bind(self.mode.as_str())
        .bind(&self.question)
        .bind(self.endpoint_index as i64)
        .bind(&self.endpoint_url)
        .bind(&self.endpoint_model)
        .bind(self.outcome.is_success())
        .bind(self.outcome.elapsed_seconds)
        .bind(self.outcome.message.as_deref())
        .bind(self.outcome.message_length as i64)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Spawn a fire-and-forget database write.
///
/// If the write fails, a warning is logged but the error is not propagated.
/// Outside a Tokio runtime the record is dropped with a warning.
pub fn spawn_log_write(pool: &SqlitePool, record: OutcomeRecord) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(
            correlation_id = %record.correlation_id,
            "No runtime available, outcome not persisted"
        );
        return;
    };

    let pool = pool.clone();
    handle.spawn(async move {
        if let Err(e) = record.insert(&pool).await {
            tracing::warn!(
                correlation_id = %record.correlation_id,
                error = %e,
                "Failed to write outcome to database"
            );
        }
    });
}

/// Persists every record to SQLite without blocking the caller.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl OutcomeSink for SqliteSink {
    fn record(&self, record: OutcomeRecord) {
        spawn_log_write(&self.pool, record);
    }
}

/// A persisted outcome row.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OutcomeRow {
    pub id: i64,
    pub correlation_id: String,
    pub timestamp: String,
    pub mode: String,
    pub question: String,
    pub endpoint_index: i64,
    pub endpoint_url: String,
    pub endpoint_model: String,
    pub success: bool,
    pub elapsed_seconds: f64,
    pub message: Option<String>,
    pub message_length: i64,
}

/// Most recent outcomes, newest first.
pub async fn recent_outcomes(
    pool: &SqlitePool,
    limit: u32,
) -> Result<Vec<OutcomeRow>, sqlx::Error> {
    sqlx::query_as::<_, OutcomeRow>(
        "SELECT id, correlation_id, timestamp, mode, question, endpoint_index, \
         endpoint_url, endpoint_model, success, elapsed_seconds, message, message_length \
         FROM outcomes ORDER BY id DESC LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ChatOutcome;
    use crate::storage::sink::DispatchMode;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    async fn memory_pool() -> SqlitePool {
        // One connection, or each pooled connection would get its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!().run(&pool).await.expect("migrations");
        pool
    }

    fn record(correlation_id: &str, outcome: ChatOutcome) -> OutcomeRecord {
        OutcomeRecord {
            correlation_id: correlation_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode: DispatchMode::Single,
            question: "hello".to_string(),
            endpoint_index: 1,
            endpoint_url: "https://b.test/v1/chat/completions".to_string(),
            endpoint_model: "model-b".to_string(),
            outcome,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back_newest_first() {
        let pool = memory_pool().await;

        record("first", ChatOutcome::success(Duration::from_millis(420), "hi there".to_string()))
            .insert(&pool)
            .await
            .unwrap();
        record("second", ChatOutcome::failure("Upstream returned 500"))
            .insert(&pool)
            .await
            .unwrap();

        let rows = recent_outcomes(&pool, 10).await.unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].correlation_id, "second");
        assert!(!rows[0].success);
        assert_eq!(rows[0].elapsed_seconds, -1.0);
        assert_eq!(rows[0].message_length, 0);

        assert_eq!(rows[1].correlation_id, "first");
        assert!(rows[1].success);
        assert_eq!(rows[1].elapsed_seconds, 0.42);
        assert_eq!(rows[1].message.as_deref(), Some("hi there"));
        assert_eq!(rows[1].mode, "single");
        assert_eq!(rows[1].endpoint_index, 1);
    }

    #[tokio::test]
    async fn recent_outcomes_respects_limit() {
        let pool = memory_pool().await;
        for i in 0..5 {
            record(&format!("r{}", i), ChatOutcome::failure("x"))
                .insert(&pool)
                .await
                .unwrap();
        }

        let rows = recent_outcomes(&pool, 2).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.correlation_id.as_str()).collect();
        assert_eq!(ids, vec!["r4", "r3"]);
    }

    #[tokio::test]
    async fn sqlite_sink_writes_in_background() {
        let pool = memory_pool().await;
        let sink = SqliteSink::new(pool.clone());

        sink.record(record("bg", ChatOutcome::failure("timeout")));

        let mut rows = Vec::new();
        for _ in 0..50 {
            rows = recent_outcomes(&pool, 10).await.unwrap();
            if !rows.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].correlation_id, "bg");
    }
}
