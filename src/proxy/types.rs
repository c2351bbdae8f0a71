//! Request, response, and outcome types.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Sampling parameters every upstream receives. Not configurable per call.
pub const TEMPERATURE: f64 = 0.2;
pub const PRESENCE_PENALTY: f64 = 0.0;
pub const FREQUENCY_PENALTY: f64 = 0.0;
pub const TOP_P: f64 = 1.0;

/// Streaming chat completion request sent upstream (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    pub stream: bool,
    pub model: String,
    pub temperature: f64,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub top_p: f64,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl ChatCompletionRequest {
    /// Build the system + user payload with the fixed sampling parameters.
    pub fn streaming(model: &str, system_prompt: &str, question: &str) -> Self {
        Self {
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: question.to_string(),
                },
            ],
            stream: true,
            model: model.to_string(),
            temperature: TEMPERATURE,
            presence_penalty: PRESENCE_PENALTY,
            frequency_penalty: FREQUENCY_PENALTY,
            top_p: TOP_P,
        }
    }
}

/// One decoded `data:` frame of a streaming response.
///
/// Every level is optional; frames without delta content (role headers,
/// usage trailers) decode fine and simply contribute nothing.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Option<Vec<ChunkChoice>>,
}

/// A streaming choice delta.
#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<Delta>,
}

/// Delta content in streaming response.
#[derive(Debug, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// `choices[0].delta.content`, if present.
    pub fn first_delta_content(&self) -> Option<&str> {
        self.choices
            .as_ref()?
            .first()?
            .delta
            .as_ref()?
            .content
            .as_deref()
    }
}

/// Whether an upstream call produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failure => "failure",
        }
    }
}

/// Timed result of one upstream call. Every call yields one, failed or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub status: OutcomeStatus,
    /// Wall seconds rounded to 2 decimals, or [`ChatOutcome::FAILURE_ELAPSED`].
    #[serde(rename = "time")]
    pub elapsed_seconds: f64,
    pub message: Option<String>,
    pub message_length: usize,
}

impl ChatOutcome {
    /// Sentinel elapsed time carried by every failure.
    pub const FAILURE_ELAPSED: f64 = -1.0;

    pub fn success(elapsed: Duration, message: String) -> Self {
        let message_length = message.chars().count();
        Self {
            status: OutcomeStatus::Success,
            elapsed_seconds: round_secs(elapsed),
            message: Some(message),
            message_length,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            elapsed_seconds: Self::FAILURE_ELAPSED,
            message: Some(message.into()),
            message_length: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Round a duration to seconds with two decimals.
pub fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

/// One participant's entry in a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub endpoint_index: usize,
    pub endpoint_url: String,
    pub endpoint_model: String,
    pub outcome: ChatOutcome,
}

/// Body of POST /chat.
///
/// The aliases accept the field names of the older front end.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "问题")]
    pub question: String,
    /// Explicit endpoint index; round-robin when absent.
    ///
    /// Accepts a number or a numeric string. An empty string means absent.
    #[serde(default, alias = "接口", deserialize_with = "deserialize_endpoint_index")]
    pub endpoint: Option<usize>,
}

fn deserialize_endpoint_index<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IndexRepr {
        Number(usize),
        Text(String),
    }

    match Option::<IndexRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IndexRepr::Number(index)) => Ok(Some(index)),
        Some(IndexRepr::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse().map(Some).map_err(|_| {
                de::Error::custom(format!(
                    "endpoint index must be a non-negative integer, got {:?}",
                    text
                ))
            })
        }
    }
}

/// Response of POST /chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub endpoint_index: usize,
    pub data: ChatOutcome,
}

/// Body of POST /test_all.
#[derive(Debug, Clone, Deserialize)]
pub struct TestAllRequest {
    #[serde(default = "default_test_question", alias = "问题")]
    pub question: String,
}

pub fn default_test_question() -> String {
    "你好".to_string()
}

impl Default for TestAllRequest {
    fn default() -> Self {
        Self {
            question: default_test_question(),
        }
    }
}
