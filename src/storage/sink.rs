//! Outcome sinks: where the dispatcher reports finished calls.

use serde::Serialize;
use std::borrow::Cow;

use crate::proxy::ChatOutcome;

/// Which dispatcher operation produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Single,
    Broadcast,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Single => "single",
            DispatchMode::Broadcast => "broadcast",
        }
    }
}

/// A finished endpoint call, ready to be recorded.
///
/// All fields are owned so the record can move into a spawned task.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub correlation_id: String,
    pub timestamp: String,
    pub mode: DispatchMode,
    pub question: String,
    pub endpoint_index: usize,
    pub endpoint_url: String,
    pub endpoint_model: String,
    pub outcome: ChatOutcome,
}

/// Receives one record per endpoint call.
///
/// Implementations must return promptly and must not panic: the dispatcher
/// calls `record` inline and never waits on or inspects the result.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: OutcomeRecord);
}

/// Answers longer than this many characters are cut in debug logs.
const PREVIEW_CHARS: usize = 200;

/// First [`PREVIEW_CHARS`] characters of `message`, with `...` when cut.
fn message_preview(message: &str) -> Cow<'_, str> {
    match message.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &message[..cut])),
        None => Cow::Borrowed(message),
    }
}

/// Writes each record as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn record(&self, record: OutcomeRecord) {
        if record.outcome.is_success() {
            tracing::info!(
                correlation_id = %record.correlation_id,
                mode = record.mode.as_str(),
                status = record.outcome.status.as_str(),
                endpoint = record.endpoint_index,
                question = %record.question,
                elapsed_seconds = record.outcome.elapsed_seconds,
                message_length = record.outcome.message_length,
                "Dispatch outcome recorded"
            );
            tracing::debug!(
                correlation_id = %record.correlation_id,
                endpoint = record.endpoint_index,
                message = %message_preview(record.outcome.message.as_deref().unwrap_or("")),
                "Dispatch answer"
            );
        } else {
            tracing::warn!(
                correlation_id = %record.correlation_id,
                mode = record.mode.as_str(),
                status = record.outcome.status.as_str(),
                endpoint = record.endpoint_index,
                question = %record.question,
                error = record.outcome.message.as_deref().unwrap_or(""),
                "Dispatch failure recorded"
            );
        }
    }
}
