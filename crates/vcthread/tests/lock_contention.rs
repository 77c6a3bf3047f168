//! Mutual exclusion of the notification-safe queue lock across cores

mod common;

use common::{boot, check, fail, pass, wait_until};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vcthread::fifo::FifoSched;
use vcthread::{QueueLock, QueueLockNode, QueueMutex};

static SCHED: FifoSched = FifoSched::new();

const ITERS: u64 = 100_000;

/// One spinning contender per host CPU, at most four; more contenders
/// than CPUs turn every handoff into a scheduler time slice
fn contenders() -> usize {
    vcthread::config::host_cpus().clamp(1, 4)
}

static COUNTER: QueueMutex<u64> = QueueMutex::new(0);

/// A counter only ever touched under `RAW_LOCK`
struct Unguarded(UnsafeCell<u64>);
unsafe impl Sync for Unguarded {}

static RAW_LOCK: QueueLock = QueueLock::new();
static RAW: Unguarded = Unguarded(UnsafeCell::new(0));

static DONE: AtomicUsize = AtomicUsize::new(0);

fn hammer() {
    for i in 0..ITERS {
        vcthread::with_notifsafe(&COUNTER, |n| *n += 1);

        let node = QueueLockNode::new();
        let guard = vcthread::lock_notifsafe(&RAW_LOCK, &node);
        // Safety: serialized by RAW_LOCK
        unsafe { *RAW.0.get() += 1 };
        drop(guard);

        if i % 10_000 == 0 {
            vcthread::fifo::yield_now();
        }
    }
    DONE.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    let cores = contenders();
    boot(cores, &SCHED);

    for _ in 0..cores {
        if let Err(e) = SCHED.spawn_closure(hammer) {
            fail(&format!("spawn failed: {}", e));
        }
    }

    wait_until("workers", Duration::from_secs(120), || {
        DONE.load(Ordering::SeqCst) == cores
    });

    let total = vcthread::with_notifsafe(&COUNTER, |n| *n);
    check(total == cores as u64 * ITERS, "queue mutex lost increments");
    let node = QueueLockNode::new();
    let raw = {
        let _guard = vcthread::lock_notifsafe(&RAW_LOCK, &node);
        unsafe { *RAW.0.get() }
    };
    check(raw == cores as u64 * ITERS, "queue lock lost increments");
    check(!RAW_LOCK.is_locked(), "lock left held");
    pass("lock_contention")
}
