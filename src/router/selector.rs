//! Round-robin endpoint selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::registry::{EndpointDescriptor, EndpointRegistry};
use crate::error::{Error, Result};

/// Cycles through the registry in registration order.
///
/// The cursor always holds a valid index. It is advanced with a single
/// atomic update, so concurrent callers each receive their own slot and no
/// index is skipped or handed out twice within a cycle.
#[derive(Debug)]
pub struct RoundRobinSelector {
    registry: Arc<EndpointRegistry>,
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self {
            registry,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Return the endpoint under the cursor and advance it by one.
    pub fn next(&self) -> Result<(usize, &EndpointDescriptor)> {
        let count = self.registry.count();
        if count == 0 {
            return Err(Error::NoEndpoints);
        }

        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % count)
            })
            .unwrap_or_else(|current| current);

        let descriptor = self.registry.get(index).ok_or(Error::NoEndpoints)?;
        tracing::debug!(index, model = %descriptor.model, "Round-robin selected endpoint");
        Ok((index, descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, EndpointConfig};
    use std::collections::HashMap;

    fn registry_of(n: usize) -> Arc<EndpointRegistry> {
        let endpoints = (0..n)
            .map(|i| EndpointConfig {
                url: format!("https://e{}.test/v1/chat/completions", i),
                key: ApiKey::from(format!("key-{}", i)),
                model: format!("model-{}", i),
            })
            .collect();
        Arc::new(EndpointRegistry::new(endpoints).unwrap())
    }

    #[test]
    fn test_cycles_in_registration_order() {
        for n in 1..=5 {
            let selector = RoundRobinSelector::new(registry_of(n));
            let picked: Vec<usize> = (0..n).map(|_| selector.next().unwrap().0).collect();
            assert_eq!(picked, (0..n).collect::<Vec<_>>());

            // N+1-th call wraps around
            assert_eq!(selector.next().unwrap().0, 0);
        }
    }

    #[test]
    fn test_descriptor_matches_index() {
        let selector = RoundRobinSelector::new(registry_of(3));
        for _ in 0..7 {
            let (index, descriptor) = selector.next().unwrap();
            assert_eq!(descriptor.index, index);
            assert_eq!(descriptor.model, format!("model-{}", index));
        }
    }

    #[test]
    fn test_empty_registry_fails() {
        let selector = RoundRobinSelector::new(Arc::new(EndpointRegistry::empty()));
        assert!(matches!(selector.next(), Err(Error::NoEndpoints)));
    }

    #[test]
    fn test_concurrent_callers_share_evenly() {
        let selector = Arc::new(RoundRobinSelector::new(registry_of(3)));
        let threads = 12;
        let per_thread = 300;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let selector = selector.clone();
                std::thread::spawn(move || {
                    let mut counts: HashMap<usize, usize> = HashMap::new();
                    for _ in 0..per_thread {
                        let (index, _) = selector.next().unwrap();
                        *counts.entry(index).or_default() += 1;
                    }
                    counts
                })
            })
            .collect();

        let mut totals: HashMap<usize, usize> = HashMap::new();
        for handle in handles {
            for (index, count) in handle.join().unwrap() {
                *totals.entry(index).or_default() += count;
            }
        }

        let expected = threads * per_thread / 3;
        assert_eq!(totals.len(), 3);
        for index in 0..3 {
            assert_eq!(totals[&index], expected, "index {} was not served evenly", index);
        }
    }
}
