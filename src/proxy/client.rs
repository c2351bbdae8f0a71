//! Single-endpoint streaming client.

use reqwest::header;
use std::time::{Duration, Instant};

use super::stream::{aggregate_stream, AggregatedStream};
use super::types::{ChatCompletionRequest, ChatOutcome};
use crate::config::ClientConfig;
use crate::error::CallError;
use crate::router::EndpointDescriptor;

/// User-Agent sent on every upstream call.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const ACCEPT_STREAM: &str = "application/json, text/event-stream";

/// Issues one streaming chat request to one endpoint and times it.
#[derive(Debug, Clone)]
pub struct EndpointClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl EndpointClient {
    /// Wrap an existing HTTP client. `timeout` bounds each whole call.
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Build a client with the configured connect and call timeouts.
    pub fn from_config(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self::new(http, Duration::from_secs(config.timeout_secs)))
    }

    /// Ask `question` of one endpoint and aggregate the streamed answer.
    ///
    /// Never fails: transport errors, non-2xx statuses, broken bodies, and
    /// timeouts all come back as a failed outcome with the -1 sentinel.
    pub async fn call(
        &self,
        endpoint: &EndpointDescriptor,
        question: &str,
        system_prompt: &str,
    ) -> ChatOutcome {
        let start = Instant::now();

        let result =
            match tokio::time::timeout(self.timeout, self.ask(endpoint, question, system_prompt))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout(self.timeout)),
            };

        match result {
            Ok(aggregated) => {
                let outcome = ChatOutcome::success(start.elapsed(), aggregated.content);
                tracing::info!(
                    index = endpoint.index,
                    model = %endpoint.model,
                    elapsed_seconds = outcome.elapsed_seconds,
                    message_length = outcome.message_length,
                    fragments = aggregated.fragments,
                    decode_errors = aggregated.decode_errors,
                    "Endpoint call succeeded"
                );
                outcome
            }
            Err(e) => {
                tracing::warn!(
                    index = endpoint.index,
                    url = %endpoint.url,
                    error = %e,
                    "Endpoint call failed"
                );
                ChatOutcome::failure(e.to_string())
            }
        }
    }

    async fn ask(
        &self,
        endpoint: &EndpointDescriptor,
        question: &str,
        system_prompt: &str,
    ) -> Result<AggregatedStream, CallError> {
        let payload = ChatCompletionRequest::streaming(&endpoint.model, system_prompt, question);

        let response = self
            .http
            .post(&endpoint.url)
            .header(header::ACCEPT, ACCEPT_STREAM)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", endpoint.credential.expose_secret()),
            )
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .json(&payload)
            .send()
            .await
            .map_err(CallError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::UpstreamHttp { status, body });
        }

        aggregate_stream(response.bytes_stream())
            .await
            .map_err(CallError::Body)
    }
}
