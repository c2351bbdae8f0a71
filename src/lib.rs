//! chatrelay - Round-robin gateway for OpenAI-compatible chat endpoints
//!
//! This library provides the core of the chatrelay gateway: the endpoint
//! registry and round-robin selector, the SSE stream aggregator, the
//! single-endpoint client, and the dispatcher that ties them together.

pub mod config;
pub mod error;
pub mod proxy;
pub mod router;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
