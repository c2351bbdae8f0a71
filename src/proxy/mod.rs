//! Upstream dispatch and the HTTP front end.
//!
//! This module holds the streaming client, the SSE aggregator, the
//! dispatcher, and the axum server that exposes them.

mod client;
pub mod dispatch;
mod handlers;
mod server;
pub mod stream;
pub mod types;

pub use client::{EndpointClient, BROWSER_USER_AGENT};
pub use dispatch::{BroadcastReport, Dispatcher, SingleDispatch};
pub use handlers::REQUEST_ID_HEADER;
pub use server::{build_dispatcher, create_router, run_server, AppState};
pub use stream::{aggregate_stream, AggregatedStream, SseAggregator, StreamDecodeError};
pub use types::{
    BroadcastResult, ChatCompletionRequest, ChatOutcome, ChatRequest, ChatResponse, Message,
    OutcomeStatus, TestAllRequest,
};
