//! The ordered, read-only set of upstream endpoints.

use crate::config::{ApiKey, Config, ConfigError, EndpointConfig};

/// One upstream endpoint with its stable registry position.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub index: usize,
    pub url: String,
    pub credential: ApiKey,
    pub model: String,
}

/// Ordered list of endpoints, fixed at construction.
///
/// There is no mutation API; callers share it behind an `Arc`.
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    /// Build a registry, rejecting an empty list or any unusable entry.
    pub fn new(endpoints: Vec<EndpointConfig>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::Validation(
                "No endpoints configured".to_string(),
            ));
        }

        let mut descriptors = Vec::with_capacity(endpoints.len());
        for (index, endpoint) in endpoints.into_iter().enumerate() {
            endpoint.validate(index)?;
            descriptors.push(EndpointDescriptor {
                index,
                url: endpoint.url,
                credential: endpoint.key,
                model: endpoint.model,
            });
        }

        tracing::debug!(count = descriptors.len(), "Endpoint registry built");
        Ok(Self {
            endpoints: descriptors,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(config.endpoints.clone())
    }

    /// All endpoints in registration order.
    pub fn all(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn get(&self, index: usize) -> Option<&EndpointDescriptor> {
        self.endpoints.get(index)
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            endpoints: Vec::new(),
        }
    }
}
