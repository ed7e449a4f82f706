//! Per-subject serialization of check-decide-write sequences

use rollcall_util::SubjectId;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// The subject stayed busy for the whole wait
#[derive(Debug, Clone, Error)]
#[error("subject {subject_id} busy for {waited:?}")]
pub struct LockTimeout {
    pub subject_id: SubjectId,
    pub waited: Duration,
}

/// Registry of subjects with a request in flight.
///
/// Only subjects currently held are tracked, so the set never grows beyond
/// the number of concurrent requests. Requests for different subjects never
/// wait on each other.
pub struct SubjectLocks {
    busy: Mutex<HashSet<SubjectId>>,
    released: Condvar,
    timeout: Duration,
}

impl SubjectLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            busy: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Wait until `subject_id` is free, for at most the configured timeout
    pub fn acquire(&self, subject_id: &SubjectId) -> Result<SubjectGuard<'_>, LockTimeout> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        // The set holds no invariant a panicking holder could break
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);

        while busy.contains(subject_id) {
            let now = Instant::now();
            if now >= deadline {
                debug!(subject_id = %subject_id, "Subject lock timed out");
                return Err(LockTimeout {
                    subject_id: subject_id.clone(),
                    waited: now - started,
                });
            }

            let (guard, _) = self
                .released
                .wait_timeout(busy, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            busy = guard;
        }

        busy.insert(subject_id.clone());
        Ok(SubjectGuard {
            locks: self,
            subject_id: subject_id.clone(),
        })
    }

    /// Number of subjects currently held
    pub fn held(&self) -> usize {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Releases the subject when dropped
pub struct SubjectGuard<'a> {
    locks: &'a SubjectLocks,
    subject_id: SubjectId,
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self
            .locks
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.subject_id);
        drop(busy);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_subject_times_out() {
        let locks = SubjectLocks::new(Duration::from_millis(20));
        let subject = SubjectId::new("S1");

        let _held = locks.acquire(&subject).unwrap();
        let err = locks.acquire(&subject).err().unwrap();
        assert_eq!(err.subject_id, subject);
        assert!(err.waited >= Duration::from_millis(20));
    }

    #[test]
    fn test_different_subjects_independent() {
        let locks = SubjectLocks::new(Duration::from_millis(20));
        let _a = locks.acquire(&SubjectId::new("S1")).unwrap();
        let _b = locks.acquire(&SubjectId::new("S2")).unwrap();
        assert_eq!(locks.held(), 2);
    }

    #[test]
    fn test_release_on_drop() {
        let locks = SubjectLocks::new(Duration::from_millis(20));
        let subject = SubjectId::new("S1");

        drop(locks.acquire(&subject).unwrap());
        assert_eq!(locks.held(), 0);
        assert!(locks.acquire(&subject).is_ok());
    }

    #[test]
    fn test_waiter_proceeds_after_release() {
        let locks = Arc::new(SubjectLocks::new(Duration::from_secs(5)));
        let subject = SubjectId::new("S1");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let subject = subject.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.acquire(&subject).unwrap();
                    let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now_inside, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.held(), 0);
    }
}
