//! Single-call and broadcast dispatch over the endpoint registry.
//!
//! Single dispatch picks one endpoint (explicitly or round-robin) and asks
//! it. Broadcast asks every endpoint at once, waits for all of them, and
//! ranks the results by elapsed time. Upstream failures never abort either
//! operation; they arrive as failed [`ChatOutcome`]s.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::client::EndpointClient;
use super::types::{round_secs, BroadcastResult, ChatOutcome};
use crate::error::{Error, Result};
use crate::router::{EndpointDescriptor, EndpointRegistry, RoundRobinSelector};
use crate::storage::{DispatchMode, OutcomeRecord, OutcomeSink};

/// Result of a single dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct SingleDispatch {
    pub correlation_id: String,
    pub endpoint_index: usize,
    pub outcome: ChatOutcome,
}

/// Result of a broadcast dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastReport {
    /// Wall time across the whole fan-out, rounded to 2 decimals.
    pub total_elapsed_seconds: f64,
    pub endpoint_count: usize,
    /// One entry per endpoint, ascending by elapsed time. Failures carry
    /// the -1 sentinel and therefore come first.
    pub results: Vec<BroadcastResult>,
}

/// Routes questions to upstream endpoints.
///
/// Owns the selector and shares the registry read-only; the selector cursor
/// is the only mutable state and is updated atomically.
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    selector: RoundRobinSelector,
    client: EndpointClient,
    system_prompt: String,
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        client: EndpointClient,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            selector: RoundRobinSelector::new(registry.clone()),
            registry,
            client,
            system_prompt: system_prompt.into(),
            sinks: Vec::new(),
        }
    }

    /// Add a sink that receives a record for every endpoint call.
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Ask one endpoint.
    ///
    /// With `explicit_index` the caller picks the endpoint and an
    /// out-of-range index is rejected before any network activity. Without
    /// it the round-robin selector picks.
    pub async fn single_dispatch(
        &self,
        question: &str,
        explicit_index: Option<usize>,
    ) -> Result<SingleDispatch> {
        let (index, endpoint) = match explicit_index {
            Some(index) => {
                let endpoint = self.registry.get(index).ok_or(Error::InvalidEndpoint {
                    index,
                    count: self.registry.count(),
                })?;
                (index, endpoint)
            }
            None => self.selector.next()?,
        };

        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            correlation_id = %correlation_id,
            index,
            explicit = explicit_index.is_some(),
            url = %endpoint.url,
            model = %endpoint.model,
            "Selected endpoint"
        );

        let outcome = self.client.call(endpoint, question, &self.system_prompt).await;
        self.emit(&correlation_id, DispatchMode::Single, question, endpoint, &outcome);

        Ok(SingleDispatch {
            correlation_id,
            endpoint_index: index,
            outcome,
        })
    }

    /// Ask every endpoint concurrently and rank the answers by elapsed time.
    ///
    /// Waits for every call to finish; one participant failing or timing out
    /// does not cancel the others.
    pub async fn broadcast_dispatch(&self, question: &str) -> BroadcastReport {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let endpoint_count = self.registry.count();
        tracing::info!(
            correlation_id = %correlation_id,
            endpoints = endpoint_count,
            "Starting broadcast"
        );

        let start = Instant::now();
        let calls = self.registry.all().iter().map(|endpoint| {
            let correlation_id = correlation_id.as_str();
            async move {
                let outcome = self.client.call(endpoint, question, &self.system_prompt).await;
                self.emit(correlation_id, DispatchMode::Broadcast, question, endpoint, &outcome);
                BroadcastResult {
                    endpoint_index: endpoint.index,
                    endpoint_url: endpoint.url.clone(),
                    endpoint_model: endpoint.model.clone(),
                    outcome,
                }
            }
        });
        let mut results = join_all(calls).await;
        let total_elapsed_seconds = round_secs(start.elapsed());

        // Stable sort: equal times keep registry order
        results.sort_by(|a, b| {
            a.outcome
                .elapsed_seconds
                .total_cmp(&b.outcome.elapsed_seconds)
        });

        let failures = results.iter().filter(|r| !r.outcome.is_success()).count();
        tracing::info!(
            correlation_id = %correlation_id,
            endpoints = endpoint_count,
            failures,
            total_elapsed_seconds,
            "Broadcast complete"
        );

        BroadcastReport {
            total_elapsed_seconds,
            endpoint_count,
            results,
        }
    }

    fn emit(
        &self,
        correlation_id: &str,
        mode: DispatchMode,
        question: &str,
        endpoint: &EndpointDescriptor,
        outcome: &ChatOutcome,
    ) {
        if self.sinks.is_empty() {
            return;
        }

        let record = OutcomeRecord {
            correlation_id: correlation_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode,
            question: question.to_string(),
            endpoint_index: endpoint.index,
            endpoint_url: endpoint.url.clone(),
            endpoint_model: endpoint.model.clone(),
            outcome: outcome.clone(),
        };
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, EndpointConfig};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<OutcomeRecord>>);

    impl OutcomeSink for CollectingSink {
        fn record(&self, record: OutcomeRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    /// A port nothing listens on, so every call fails fast.
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/v1/chat/completions", port)
    }

    fn dispatcher(n: usize) -> Dispatcher {
        let url = closed_port_url();
        let endpoints = (0..n)
            .map(|i| EndpointConfig {
                url: url.clone(),
                key: ApiKey::from("sk-test"),
                model: format!("model-{}", i),
            })
            .collect();
        let registry = Arc::new(EndpointRegistry::new(endpoints).unwrap());
        let client = EndpointClient::new(reqwest::Client::new(), Duration::from_secs(5));
        Dispatcher::new(registry, client, "sys")
    }

    #[tokio::test]
    async fn explicit_index_out_of_range_is_rejected() {
        let dispatcher = dispatcher(2);
        let result = dispatcher.single_dispatch("hi", Some(2)).await;
        assert!(matches!(
            result,
            Err(Error::InvalidEndpoint { index: 2, count: 2 })
        ));
    }

    #[tokio::test]
    async fn round_robin_used_without_explicit_index() {
        let dispatcher = dispatcher(3);
        let mut picked = Vec::new();
        for _ in 0..4 {
            picked.push(dispatcher.single_dispatch("hi", None).await.unwrap().endpoint_index);
        }
        assert_eq!(picked, vec![0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn explicit_index_does_not_advance_round_robin() {
        let dispatcher = dispatcher(3);
        dispatcher.single_dispatch("hi", Some(2)).await.unwrap();
        let next = dispatcher.single_dispatch("hi", None).await.unwrap();
        assert_eq!(next.endpoint_index, 0);
    }

    #[tokio::test]
    async fn sinks_receive_every_call() {
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = dispatcher(3).with_sink(sink.clone());

        let single = dispatcher.single_dispatch("one", None).await.unwrap();
        dispatcher.broadcast_dispatch("all").await;

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].mode, DispatchMode::Single);
        assert_eq!(records[0].correlation_id, single.correlation_id);
        assert_eq!(records[0].question, "one");
        assert!(!records[0].outcome.is_success());

        let broadcast: Vec<&OutcomeRecord> = records[1..].iter().collect();
        assert!(broadcast.iter().all(|r| r.mode == DispatchMode::Broadcast));
        assert!(broadcast
            .iter()
            .all(|r| r.correlation_id == broadcast[0].correlation_id));
        let mut indices: Vec<usize> = broadcast.iter().map(|r| r.endpoint_index).collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn broadcast_of_failures_keeps_registry_order() {
        let report = dispatcher(4).broadcast_dispatch("hi").await;

        assert_eq!(report.endpoint_count, 4);
        let indices: Vec<usize> = report.results.iter().map(|r| r.endpoint_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(report
            .results
            .iter()
            .all(|r| r.outcome.elapsed_seconds == ChatOutcome::FAILURE_ELAPSED));
    }
}
