//! MCS queue lock
//!
//! A FIFO, local-spin mutual exclusion primitive. Each acquisition
//! brings its own `QueueLockNode`; waiters spin on the `locked` flag in
//! their own node instead of on a shared word, and the lock itself is a
//! single pointer to the most recently enqueued node.
//!
//! The lock never allocates and never calls into scheduler code, so it
//! is safe to use from vcore context, from the entry gate and while a
//! user thread has notifications masked.
//!
//! `DisseminationBarrier` is the matching rendezvous primitive: each of
//! `n` participants signals one partner per round and spins on its own
//! flag, for `ceil(log2 n)` rounds.

use crate::constants::MAX_VCORES;
use crate::error::{VcoreError, VcoreResult};
use core::cell::UnsafeCell;
use core::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, Ordering};

/// Per-acquisition queue node
///
/// Must stay at a fixed address, and must not be reused, from the
/// moment it is passed to `acquire` until the matching `release`
/// returns.
#[repr(C, align(64))]
pub struct QueueLockNode {
    next: AtomicPtr<QueueLockNode>,
    locked: AtomicBool,
}

impl QueueLockNode {
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            locked: AtomicBool::new(false),
        }
    }

    #[inline]
    fn as_ptr(&self) -> *mut QueueLockNode {
        self as *const QueueLockNode as *mut QueueLockNode
    }
}

impl Default for QueueLockNode {
    fn default() -> Self {
        Self::new()
    }
}

/// MCS queue lock: the tail of the waiter queue, null when unlocked
pub struct QueueLock {
    tail: AtomicPtr<QueueLockNode>,
}

impl QueueLock {
    pub const fn new() -> Self {
        Self {
            tail: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Acquire the lock, queueing behind any current holder
    ///
    /// # Safety
    ///
    /// `node` must remain valid and unmoved until `release(node)` returns,
    /// and must not be used for any other acquisition in the meantime.
    pub unsafe fn acquire(&self, node: &QueueLockNode) {
        let me = node.as_ptr();
        node.next.store(ptr::null_mut(), Ordering::Relaxed);
        node.locked.store(true, Ordering::Relaxed);

        let pred = self.tail.swap(me, Ordering::AcqRel);
        if pred.is_null() {
            return;
        }

        // Publish ourselves to the predecessor, then spin on our own flag
        (*pred).next.store(me, Ordering::Release);
        while node.locked.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }

    /// Acquire the lock only if nobody holds or waits for it
    ///
    /// # Safety
    ///
    /// Same contract as `acquire` when this returns `true`.
    pub unsafe fn try_acquire(&self, node: &QueueLockNode) -> bool {
        let me = node.as_ptr();
        node.next.store(ptr::null_mut(), Ordering::Relaxed);
        node.locked.store(false, Ordering::Relaxed);
        self.tail
            .compare_exchange(ptr::null_mut(), me, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock, handing it to the next queued node if any
    ///
    /// # Safety
    ///
    /// `node` must be the node this caller acquired the lock with.
    pub unsafe fn release(&self, node: &QueueLockNode) {
        let me = node.as_ptr();
        let mut next = node.next.load(Ordering::Acquire);

        if next.is_null() {
            if self
                .tail
                .compare_exchange(me, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            // A successor swapped itself into the tail but has not linked
            // itself to us yet.
            loop {
                next = node.next.load(Ordering::Acquire);
                if !next.is_null() {
                    break;
                }
                std::hint::spin_loop();
            }
        }

        (*next).locked.store(false, Ordering::Release);
    }

    /// Whether some node currently holds or waits for the lock
    #[inline]
    pub fn is_locked(&self) -> bool {
        !self.tail.load(Ordering::Acquire).is_null()
    }
}

impl Default for QueueLock {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: all state is atomics; nodes are owned by their acquirers
unsafe impl Send for QueueLock {}
unsafe impl Sync for QueueLock {}

/// A queue lock that owns the data it protects
///
/// Access goes through `with`, which allocates the queue node on the
/// caller's stack for the duration of the critical section.
pub struct QueueMutex<T> {
    lock: QueueLock,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `lock`
unsafe impl<T: Send> Send for QueueMutex<T> {}
unsafe impl<T: Send> Sync for QueueMutex<T> {}

impl<T> QueueMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            lock: QueueLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Run `f` with exclusive access to the protected value
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let node = QueueLockNode::new();
        unsafe { self.lock.acquire(&node) };
        let _release = ReleaseOnDrop {
            lock: &self.lock,
            node: &node,
        };
        f(unsafe { &mut *self.data.get() })
    }

    /// Like `with`, but gives up instead of queueing
    pub fn try_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let node = QueueLockNode::new();
        if !unsafe { self.lock.try_acquire(&node) } {
            return None;
        }
        let _release = ReleaseOnDrop {
            lock: &self.lock,
            node: &node,
        };
        Some(f(unsafe { &mut *self.data.get() }))
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for QueueMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Releases on scope exit, including unwinding out of the critical section
struct ReleaseOnDrop<'a> {
    lock: &'a QueueLock,
    node: &'a QueueLockNode,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        unsafe { self.lock.release(self.node) };
    }
}

// ============================================================================
// Dissemination barrier
// ============================================================================

/// One participant's flags
///
/// `flags[round][parity]` is written by the participant `2^round`
/// places behind; parity alternates between episodes so the flags of the
/// previous episode never need resetting.
#[repr(align(64))]
struct BarrierNode {
    flags: Box<[[AtomicBool; 2]]>,
    parity: AtomicU8,
    sense: AtomicBool,
}

impl BarrierNode {
    fn new(rounds: usize) -> Self {
        Self {
            flags: (0..rounds)
                .map(|_| [AtomicBool::new(false), AtomicBool::new(false)])
                .collect(),
            parity: AtomicU8::new(0),
            sense: AtomicBool::new(true),
        }
    }
}

/// Reusable spinning barrier for a fixed set of participants
///
/// Participant ids run from 0 to `participants() - 1`, and each id must
/// be used by one caller at a time. Waiting never allocates.
pub struct DisseminationBarrier {
    nodes: Box<[BarrierNode]>,
    rounds: usize,
}

impl DisseminationBarrier {
    /// Barrier for `nprocs` participants, at most one per virtual core
    pub fn new(nprocs: usize) -> VcoreResult<Self> {
        if nprocs == 0 {
            return Err(VcoreError::Config("barrier needs at least one participant"));
        }
        if nprocs > MAX_VCORES {
            return Err(VcoreError::RequestImpossible {
                requested: nprocs,
                max: MAX_VCORES,
            });
        }
        let rounds = nprocs.next_power_of_two().trailing_zeros() as usize;
        Ok(Self {
            nodes: (0..nprocs).map(|_| BarrierNode::new(rounds)).collect(),
            rounds,
        })
    }

    #[inline]
    pub fn participants(&self) -> usize {
        self.nodes.len()
    }

    /// Signalling rounds per episode
    #[inline]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Wait until every participant has arrived
    ///
    /// Panics if `pid` is not a participant id.
    pub fn wait(&self, pid: usize) {
        let n = self.nodes.len();
        assert!(pid < n, "barrier participant {} out of range ({})", pid, n);
        let me = &self.nodes[pid];
        let parity = me.parity.load(Ordering::Relaxed) as usize;
        let sense = me.sense.load(Ordering::Relaxed);

        for round in 0..self.rounds {
            let partner = (pid + (1 << round)) % n;
            self.nodes[partner].flags[round][parity].store(sense, Ordering::Release);
            while me.flags[round][parity].load(Ordering::Acquire) != sense {
                std::hint::spin_loop();
            }
        }

        if parity == 1 {
            me.sense.store(!sense, Ordering::Relaxed);
        }
        me.parity.store(1 - parity as u8, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for DisseminationBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisseminationBarrier")
            .field("participants", &self.nodes.len())
            .field("rounds", &self.rounds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_uncontended() {
        let lock = QueueLock::new();
        let node = QueueLockNode::new();
        assert!(!lock.is_locked());
        unsafe { lock.acquire(&node) };
        assert!(lock.is_locked());
        unsafe { lock.release(&node) };
        assert!(!lock.is_locked());

        // Nodes may be reused once released
        unsafe { lock.acquire(&node) };
        unsafe { lock.release(&node) };
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_acquire() {
        let lock = QueueLock::new();
        let a = QueueLockNode::new();
        let b = QueueLockNode::new();
        assert!(unsafe { lock.try_acquire(&a) });
        assert!(!unsafe { lock.try_acquire(&b) });
        unsafe { lock.release(&a) };
        assert!(unsafe { lock.try_acquire(&b) });
        unsafe { lock.release(&b) };
    }

    /// Spinning contenders beyond the CPU count only measure the OS scheduler
    fn contenders() -> usize {
        thread::available_parallelism().map_or(1, |n| n.get()).clamp(1, 4)
    }

    #[test]
    fn test_mutual_exclusion() {
        const ITERS: u64 = 100_000;
        let threads = contenders();

        for _round in 0..3 {
            let counter = Arc::new(QueueMutex::new(0u64));
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    thread::spawn(move || {
                        for _ in 0..ITERS {
                            counter.with(|c| *c += 1);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(counter.with(|c| *c), threads as u64 * ITERS);
        }
    }

    #[test]
    fn test_fifo_handoff_order() {
        const WAITERS: usize = 8;

        let lock = Arc::new(QueueLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let holder = QueueLockNode::new();
        unsafe { lock.acquire(&holder) };

        let mut handles = Vec::new();
        let mut last_tail = lock.tail.load(Ordering::Acquire);
        for i in 0..WAITERS {
            let lock2 = Arc::clone(&lock);
            let order2 = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let node = QueueLockNode::new();
                unsafe { lock2.acquire(&node) };
                order2.lock().unwrap().push(i);
                unsafe { lock2.release(&node) };
            }));
            // Wait until waiter i is the tail before starting waiter i + 1
            loop {
                let tail = lock.tail.load(Ordering::Acquire);
                if tail != last_tail {
                    last_tail = tail;
                    break;
                }
                thread::yield_now();
            }
        }

        unsafe { lock.release(&holder) };
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), (0..WAITERS).collect::<Vec<_>>());
    }

    #[test]
    fn test_try_with_contended() {
        let m = QueueMutex::new(5u32);
        let inner = m.with(|v| {
            *v += 1;
            m.try_with(|_| ())
        });
        assert!(inner.is_none());
        assert_eq!(m.try_with(|v| *v), Some(6));
        assert_eq!(m.into_inner(), 6);
    }

    #[test]
    fn test_barrier_sizes() {
        assert!(DisseminationBarrier::new(0).is_err());
        assert!(matches!(
            DisseminationBarrier::new(MAX_VCORES + 1),
            Err(VcoreError::RequestImpossible { .. })
        ));
        let rounds = |n| DisseminationBarrier::new(n).unwrap().rounds();
        assert_eq!(rounds(1), 0);
        assert_eq!(rounds(2), 1);
        assert_eq!(rounds(3), 2);
        assert_eq!(rounds(4), 2);
        assert_eq!(rounds(5), 3);
        assert_eq!(rounds(MAX_VCORES), 6);
    }

    #[test]
    fn test_barrier_single_participant() {
        let b = DisseminationBarrier::new(1).unwrap();
        for _ in 0..4 {
            b.wait(0);
        }
    }

    #[test]
    fn test_barrier_phases() {
        const EPISODES: usize = 50;

        // Odd sizes exercise the wrap-around partners
        for n in [2usize, 3, 5] {
            let barrier = Arc::new(DisseminationBarrier::new(n).unwrap());
            let arrived: Arc<Vec<AtomicUsize>> =
                Arc::new((0..EPISODES).map(|_| AtomicUsize::new(0)).collect());
            let handles: Vec<_> = (0..n)
                .map(|pid| {
                    let barrier = Arc::clone(&barrier);
                    let arrived = Arc::clone(&arrived);
                    thread::spawn(move || {
                        for ep in 0..EPISODES {
                            arrived[ep].fetch_add(1, Ordering::SeqCst);
                            barrier.wait(pid);
                            // Nobody leaves an episode before everyone entered it
                            assert_eq!(arrived[ep].load(Ordering::SeqCst), n);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        }
    }
}
