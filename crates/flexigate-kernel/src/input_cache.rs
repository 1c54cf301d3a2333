//! [`InputCache`] – latest decoded input snapshot shared between the inbound
//! delivery path and the control cycle.
//!
//! The writer decodes outside the lock and holds it only for the copy; the
//! reader copies the whole slot out.  Both sides therefore see either the
//! initial record or a record that was passed to [`InputCache::store`] in one
//! piece, never a mixture of two.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use flexigate_codec::InputRecord;
use tracing::warn;

/// A snapshot together with the moment it was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampedInput {
    pub record: InputRecord,
    /// `None` until the first frame has been stored.
    pub received_at: Option<Instant>,
    /// Number of stores so far.
    pub generation: u64,
}

#[derive(Default)]
struct CacheSlot {
    record: InputRecord,
    stored_at: Option<Instant>,
    generation: u64,
}

/// Thread-safe single-slot cache of the most recent [`InputRecord`].
///
/// # Example
///
/// ```
/// use flexigate_codec::InputRecord;
/// use flexigate_kernel::InputCache;
///
/// let cache = InputCache::new();
/// assert_eq!(cache.snapshot(), InputRecord::default());
///
/// cache.store(InputRecord::nominal());
/// assert_eq!(cache.snapshot(), InputRecord::nominal());
/// assert_eq!(cache.stamped_snapshot().generation, 1);
/// ```
#[derive(Default)]
pub struct InputCache {
    slot: Mutex<CacheSlot>,
}

impl InputCache {
    /// Create a cache holding the all-zero default record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached record, stamping it with the current instant.
    pub fn store(&self, record: InputRecord) {
        self.store_at(record, Instant::now());
    }

    /// Replace the cached record with an explicit receive instant.
    pub fn store_at(&self, record: InputRecord, at: Instant) {
        let mut slot = self.lock();
        slot.record = record;
        slot.stored_at = Some(at);
        slot.generation += 1;
    }

    /// Copy of the most recently stored record.
    pub fn snapshot(&self) -> InputRecord {
        self.lock().record
    }

    /// Copy of the record plus its receive instant and generation, taken
    /// under a single lock acquisition.
    pub fn stamped_snapshot(&self) -> StampedInput {
        let slot = self.lock();
        StampedInput {
            record: slot.record,
            received_at: slot.stored_at,
            generation: slot.generation,
        }
    }

    // The slot is plain `Copy` data that is written in one assignment, so a
    // panic elsewhere while the lock was held cannot leave it inconsistent.
    fn lock(&self) -> MutexGuard<'_, CacheSlot> {
        self.slot.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("input cache lock was poisoned; recovering last stored record");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexigate_codec::{decode_input, InputFrame, INPUT_FRAME_LEN};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn empty_cache_returns_default_record() {
        let cache = InputCache::new();
        let stamped = cache.stamped_snapshot();
        assert_eq!(stamped.record, InputRecord::default());
        assert_eq!(stamped.received_at, None);
        assert_eq!(stamped.generation, 0);
    }

    #[test]
    fn store_replaces_record_and_bumps_generation() {
        let cache = InputCache::new();
        let t0 = Instant::now();
        cache.store_at(InputRecord::nominal(), t0);

        let faulted = InputRecord {
            em_stop_ok: false,
            ..InputRecord::nominal()
        };
        cache.store_at(faulted, t0 + Duration::from_millis(5));

        let stamped = cache.stamped_snapshot();
        assert_eq!(stamped.record, faulted);
        assert_eq!(stamped.received_at, Some(t0 + Duration::from_millis(5)));
        assert_eq!(stamped.generation, 2);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let cache = Arc::new(InputCache::new());
        cache.store(InputRecord::nominal());

        let poisoner = Arc::clone(&cache);
        let _ = thread::spawn(move || {
            let _guard = poisoner.slot.lock().unwrap();
            panic!("poison the cache");
        })
        .join();

        assert_eq!(cache.snapshot(), InputRecord::nominal());
        cache.store(InputRecord::default());
        assert_eq!(cache.snapshot(), InputRecord::default());
    }

    /// A writer alternating between two records that differ in every field
    /// must never let the reader observe a mixture of them.
    #[test]
    fn concurrent_store_and_snapshot_never_tear() {
        const OPS: usize = 1000;
        let all_set = decode_input(&InputFrame::new([0xFF; INPUT_FRAME_LEN]));
        let all_clear = InputRecord::default();
        assert_ne!(all_set, all_clear);

        let cache = Arc::new(InputCache::new());
        let writer_cache = Arc::clone(&cache);
        let writer = thread::spawn(move || {
            for i in 0..OPS {
                let record = if i % 2 == 0 { all_set } else { all_clear };
                writer_cache.store(record);
            }
        });

        let reader_cache = Arc::clone(&cache);
        let reader = thread::spawn(move || {
            for _ in 0..OPS {
                let seen = reader_cache.snapshot();
                assert!(
                    seen == all_set || seen == all_clear,
                    "torn snapshot: {seen:?}"
                );
            }
        });

        writer.join().expect("writer panicked");
        reader.join().expect("reader panicked");
        assert_eq!(cache.stamped_snapshot().generation, OPS as u64);
    }
}
