//! Router module for endpoint selection.
//!
//! This module holds the endpoint registry and the round-robin selector
//! that picks an endpoint for each single-dispatch request.

mod registry;
mod selector;

pub use registry::{EndpointDescriptor, EndpointRegistry};
pub use selector::RoundRobinSelector;
