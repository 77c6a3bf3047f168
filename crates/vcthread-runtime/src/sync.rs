//! Notification-safe locking
//!
//! A user thread that is interrupted while holding a queue lock, and is
//! then switched out by the notification handler, would leave its core
//! spinning on a lock nobody can release. Every runtime lock taken from
//! user-thread context therefore masks the thread's notifications for
//! the duration of the critical section.
//!
//! From vcore context, or off the core pool entirely, there is nothing
//! to mask and the lock is taken as-is.

use crate::uthread;
use crate::vcore;
use vcthread_core::error::{VcoreError, VcoreResult};
use vcthread_core::{DisseminationBarrier, QueueLock, QueueLockNode, QueueMutex};

/// Holds a queue lock taken with `lock_notifsafe`
///
/// Releases the lock, then unmasks if acquisition masked. Masking is
/// recorded per guard, so a lock taken before the caller migrated onto
/// a core is released without a spurious unmask.
#[must_use = "the lock is released when the guard is dropped"]
pub struct NotifSafeGuard<'a> {
    lock: &'a QueueLock,
    node: &'a QueueLockNode,
    masked: bool,
}

/// Mask the current user thread's notifications, then acquire `lock`
pub fn lock_notifsafe<'a>(lock: &'a QueueLock, node: &'a QueueLockNode) -> NotifSafeGuard<'a> {
    let masked = uthread::mask_if_in_uthread();
    // Safety: the node is borrowed for as long as the guard lives
    unsafe { lock.acquire(node) };
    NotifSafeGuard { lock, node, masked }
}

impl NotifSafeGuard<'_> {
    /// Whether taking this lock masked notifications
    #[inline]
    pub fn masked(&self) -> bool {
        self.masked
    }
}

impl Drop for NotifSafeGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.lock.release(self.node) };
        if self.masked {
            uthread::uth_enable_notifs();
        }
    }
}

/// `QueueMutex::with`, with notifications masked around it
pub fn with_notifsafe<T, R>(mutex: &QueueMutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
    notif_safe(|| mutex.with(f))
}

/// Run `f` with the current user thread's notifications masked
pub fn notif_safe<R>(f: impl FnOnce() -> R) -> R {
    let masked = uthread::mask_if_in_uthread();
    let out = f();
    if masked {
        uthread::uth_enable_notifs();
    }
    out
}

/// Barrier for `nprocs` participants, bounded by the configured pool
pub fn vcore_barrier(nprocs: usize) -> VcoreResult<DisseminationBarrier> {
    let max = vcore::max_vcores();
    if nprocs > max {
        return Err(VcoreError::RequestImpossible {
            requested: nprocs,
            max,
        });
    }
    DisseminationBarrier::new(nprocs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_plain_thread_does_not_mask() {
        let lock = QueueLock::new();
        let node = QueueLockNode::new();
        let guard = lock_notifsafe(&lock, &node);
        assert!(!guard.masked());
        assert!(lock.is_locked());
        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_with_notifsafe_excludes() {
        let counter = Arc::new(QueueMutex::new(0u64));
        let threads = crate::config::host_cpus().clamp(1, 4);
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        with_notifsafe(&c, |n| *n += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.with(|n| *n), threads as u64 * 10_000);
    }

    #[test]
    fn test_barrier_bounded_by_pool() {
        let max = vcore::max_vcores();
        assert_eq!(vcore_barrier(1).unwrap().participants(), 1);
        assert!(matches!(
            vcore_barrier(max + 1),
            Err(VcoreError::RequestImpossible { .. })
        ));
    }

    #[test]
    fn test_notif_safe_returns_value() {
        assert_eq!(notif_safe(|| 42), 42);
    }
}
