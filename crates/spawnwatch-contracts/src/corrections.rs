use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::BoundedCache;
use crate::ids::CorrelationId;
use crate::spawn::ImageSource;

pub const DEFAULT_CORRECTION_CAPACITY: usize = 4096;
pub const DEFAULT_CORRECTION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Data needed to re-run identification for one notified spawn.
///
/// Shared by every recipient of that spawn's notification.
#[derive(Debug, Clone)]
pub struct PendingCorrection {
    pub image: ImageSource,
    /// Raw image bytes as fetched when the spawn was processed.
    pub image_bytes: Arc<Vec<u8>>,
    pub scope_name: String,
    pub message_link: String,
    pub created_at: Instant,
}

/// In-memory correction entries keyed by correlation id.
///
/// Entries are read but never removed by a correction; they leave the
/// registry only through capacity eviction (oldest first) or the TTL sweep.
/// A missing id is the only expiry signal callers see.
#[derive(Debug)]
pub struct CorrectionRegistry {
    entries: BoundedCache<CorrelationId, PendingCorrection>,
    ttl: Duration,
}

impl Default for CorrectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CORRECTION_CAPACITY, DEFAULT_CORRECTION_TTL)
    }
}

impl CorrectionRegistry {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: BoundedCache::new(capacity),
            ttl,
        }
    }

    /// Stores `correction` under a freshly generated id and returns the id.
    pub fn register(&mut self, correction: PendingCorrection) -> CorrelationId {
        let id = CorrelationId::new();
        if let Some((evicted, _)) = self.entries.insert(id, correction) {
            tracing::debug!(correlation_id = %evicted, "correction registry evicted oldest entry");
        }
        id
    }

    pub fn get(&self, id: &CorrelationId) -> Option<&PendingCorrection> {
        self.entries.peek(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries older than the TTL relative to `now`; returns how many
    /// were removed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correction(created_at: Instant) -> PendingCorrection {
        PendingCorrection {
            image: ImageSource::Url("https://cdn.example/spawn.png".to_string()),
            image_bytes: Arc::new(vec![1, 2, 3]),
            scope_name: "Kanto".to_string(),
            message_link: "https://discord.com/channels/1/2/3".to_string(),
            created_at,
        }
    }

    #[test]
    fn register_returns_fresh_ids_and_reads_do_not_consume() {
        let mut registry = CorrectionRegistry::default();
        let now = Instant::now();
        let first = registry.register(correction(now));
        let second = registry.register(correction(now));
        assert_ne!(first, second);

        assert!(registry.get(&first).is_some());
        assert!(registry.get(&first).is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_id_is_absent() {
        let registry = CorrectionRegistry::default();
        assert!(registry.get(&CorrelationId::new()).is_none());
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let mut registry = CorrectionRegistry::new(2, DEFAULT_CORRECTION_TTL);
        let now = Instant::now();
        let first = registry.register(correction(now));
        let second = registry.register(correction(now));
        let third = registry.register(correction(now));

        assert!(registry.get(&first).is_none());
        assert!(registry.get(&second).is_some());
        assert!(registry.get(&third).is_some());
    }

    #[test]
    fn sweep_drops_entries_past_ttl() {
        let mut registry = CorrectionRegistry::new(8, Duration::from_secs(60));
        let start = Instant::now();
        let old = registry.register(correction(start));
        let fresh = registry.register(correction(start + Duration::from_secs(45)));

        let removed = registry.sweep_expired(start + Duration::from_secs(90));
        assert_eq!(removed, 1);
        assert!(registry.get(&old).is_none());
        assert!(registry.get(&fresh).is_some());
    }
}
