//! Request generations for discarding stale async results.
//!
//! Every fetch of a resource takes a new [`Generation`] from the
//! [`GenerationTracker`]. When the result arrives it is applied only if its
//! generation is still the latest one issued for that resource; otherwise a
//! newer request has started in the meantime and the result is dropped.

use dashmap::DashMap;

/// Ticket of one request for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    resource: String,
    value: u64,
}

impl Generation {
    /// Resource this ticket belongs to.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Sequence number, starting at 1 per resource.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Per-resource, monotonically increasing request counters.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    current: DashMap<String, u64>,
}

impl GenerationTracker {
    /// Creates a tracker with no issued generations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request for `resource`, superseding all earlier ones.
    pub fn begin(&self, resource: &str) -> Generation {
        let mut entry = self.current.entry(resource.to_string()).or_insert(0);
        *entry += 1;
        Generation {
            resource: resource.to_string(),
            value: *entry,
        }
    }

    /// Whether `generation` is still the latest for its resource.
    #[must_use]
    pub fn is_current(&self, generation: &Generation) -> bool {
        self.current
            .get(&generation.resource)
            .is_some_and(|latest| *latest == generation.value)
    }

    /// Supersedes every outstanding request, e.g. when the store resets.
    pub fn invalidate_all(&self) {
        for mut entry in self.current.iter_mut() {
            *entry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn newer_generation_supersedes_older() {
        let tracker = GenerationTracker::new();
        let first = tracker.begin("rows");
        assert!(tracker.is_current(&first));
        let second = tracker.begin("rows");
        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));
        assert_eq!(second.value(), 2);
    }

    #[test]
    fn resources_are_independent() {
        let tracker = GenerationTracker::new();
        let rows = tracker.begin("rows");
        let _schema = tracker.begin("schema");
        assert!(tracker.is_current(&rows));
        assert_eq!(rows.resource(), "rows");
    }

    #[test]
    fn invalidate_all_supersedes_everything() {
        let tracker = GenerationTracker::new();
        let rows = tracker.begin("rows");
        let views = tracker.begin("views");
        tracker.invalidate_all();
        assert!(!tracker.is_current(&rows));
        assert!(!tracker.is_current(&views));
    }

    #[test]
    fn concurrent_begins_hand_out_distinct_values() {
        let tracker = Arc::new(GenerationTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    (0..100).map(|_| tracker.begin("rows").value()).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all.last(), Some(&800));
    }
}
