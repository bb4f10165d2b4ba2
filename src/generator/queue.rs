//! Thread-safe validation requests.
//!
//! Resource threads must not touch the generator. They hold a
//! [`ValidationQueue`] instead and post requests that the owning thread runs
//! with [`ShaderGenerator::drain_validation_queue`].
//!
//! [`ShaderGenerator::drain_validation_queue`]: super::ShaderGenerator::drain_validation_queue

use std::sync::Arc;

use parking_lot::Mutex;

/// Work posted to the generator's owning thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationRequest {
    Validate { scheme: String, material: String },
    InvalidateMaterial { scheme: String, material: String },
    InvalidateScheme(String),
}

impl ValidationRequest {
    #[must_use]
    pub fn is_invalidation(&self) -> bool {
        !matches!(self, Self::Validate { .. })
    }
}

/// Counters shared by every clone of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub drained: u64,
}

impl QueueStats {
    #[inline]
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.drained)
    }
}

/// Sending side of the generator's request channel.
#[derive(Debug, Clone)]
pub struct ValidationQueue {
    sender: flume::Sender<ValidationRequest>,
    stats: Arc<Mutex<QueueStats>>,
}

impl ValidationQueue {
    pub(crate) fn new(
        sender: flume::Sender<ValidationRequest>,
        stats: Arc<Mutex<QueueStats>>,
    ) -> Self {
        Self { sender, stats }
    }

    /// Posts a request. Returns `false` once the generator is gone.
    pub fn send(&self, request: ValidationRequest) -> bool {
        if self.sender.send(request).is_err() {
            return false;
        }
        self.stats.lock().enqueued += 1;
        true
    }

    pub fn validate(&self, scheme: &str, material: &str) -> bool {
        self.send(ValidationRequest::Validate {
            scheme: scheme.to_string(),
            material: material.to_string(),
        })
    }

    pub fn invalidate_material(&self, scheme: &str, material: &str) -> bool {
        self.send(ValidationRequest::InvalidateMaterial {
            scheme: scheme.to_string(),
            material: material.to_string(),
        })
    }

    pub fn invalidate_scheme(&self, scheme: &str) -> bool {
        self.send(ValidationRequest::InvalidateScheme(scheme.to_string()))
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        *self.stats.lock()
    }
}

/// Outcome of one [`drain_validation_queue`] call.
///
/// [`drain_validation_queue`]: super::ShaderGenerator::drain_validation_queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Validations that produced a usable technique.
    pub validated: usize,
    /// Validations that fell back to the source technique.
    pub failed: usize,
    /// Invalidations applied.
    pub invalidations: usize,
    /// Invalidations dropped as duplicates of one already pending.
    pub coalesced: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let (tx, rx) = flume::unbounded();
        let queue = ValidationQueue::new(tx, Arc::default());
        let other = queue.clone();

        assert!(queue.validate("RTSS", "Rock"));
        assert!(other.invalidate_scheme("RTSS"));
        assert_eq!(queue.stats().enqueued, 2);
        assert_eq!(rx.len(), 2);
        assert!(rx.try_recv().is_ok_and(|r| !r.is_invalidation()));
    }

    #[test]
    fn closed_channel_rejects_requests() {
        let (tx, rx) = flume::unbounded();
        let queue = ValidationQueue::new(tx, Arc::default());
        drop(rx);
        assert!(!queue.validate("RTSS", "Rock"));
        assert_eq!(queue.stats().pending(), 0);
    }
}
