//! A minimal FIFO two-level scheduler
//!
//! One global run queue shared by every core. Threads spawned through
//! it own their stack and are freed when they exit. Cores with nothing
//! to run spin for a while, then give themselves back.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use vcthread_core::error::VcoreResult;
use vcthread_core::{kdebug, QueueMutex};
use vcthread_runtime::init::library_initialized;
use vcthread_runtime::memory::UthreadStack;
use vcthread_runtime::sync::{notif_safe, with_notifsafe};
use vcthread_runtime::uthread::{
    self, current_uthread, init_uthread_context, run_uthread, take_current_uthread,
    uthread_cleanup, uthread_init, SchedOps, UserThread, UthreadPtr,
};
use vcthread_runtime::vcore;

/// Idle polls before a core gives itself back
pub const DEFAULT_IDLE_SPINS: usize = 100_000;

/// A thread created by `FifoSched::spawn`
///
/// `ut` sits at offset 0, so a `UthreadPtr` to it converts back.
#[repr(C)]
struct Spawned {
    ut: UserThread,
    stack: UthreadStack,
    body: Cell<Option<Box<dyn FnOnce() + Send>>>,
}

/// Run queue plus counters
///
/// Only threads created by `spawn_closure` (or `SchedOps::spawn`) may
/// exit under this scheduler; their storage is freed on exit.
pub struct FifoSched {
    queue: QueueMutex<VecDeque<UthreadPtr>>,
    idle_spins: usize,
    spawned: AtomicUsize,
    exited: AtomicUsize,
}

impl FifoSched {
    pub const fn new() -> Self {
        Self::with_idle_spins(DEFAULT_IDLE_SPINS)
    }

    /// Cores never give themselves back
    pub const fn spinning() -> Self {
        Self::with_idle_spins(usize::MAX)
    }

    pub const fn with_idle_spins(idle_spins: usize) -> Self {
        Self {
            queue: QueueMutex::new(VecDeque::new()),
            idle_spins,
            spawned: AtomicUsize::new(0),
            exited: AtomicUsize::new(0),
        }
    }

    fn push(&self, ut: UthreadPtr) {
        with_notifsafe(&self.queue, |q| q.push_back(ut));
    }

    fn pop(&self) -> Option<UthreadPtr> {
        with_notifsafe(&self.queue, |q| q.pop_front())
    }

    /// Threads waiting in the run queue
    pub fn queued(&self) -> usize {
        with_notifsafe(&self.queue, |q| q.len())
    }

    /// Spawned threads that have not exited yet
    pub fn live(&self) -> usize {
        self.spawned.load(Ordering::SeqCst) - self.exited.load(Ordering::SeqCst)
    }

    /// Create a thread running `f` and queue it
    pub fn spawn_closure(&self, f: impl FnOnce() + Send + 'static) -> VcoreResult<UthreadPtr> {
        notif_safe(|| self.spawn_masked(Box::new(f)))
    }

    fn spawn_masked(&self, f: Box<dyn FnOnce() + Send>) -> VcoreResult<UthreadPtr> {
        let spawned = Box::new(Spawned {
            ut: UserThread::new(),
            stack: UthreadStack::with_default_size()?,
            body: Cell::new(Some(f)),
        });
        uthread_init(&spawned.ut)?;
        init_uthread_context(&spawned.ut, spawned_main, &spawned.stack);

        let raw = Box::into_raw(spawned);
        // Safety: just leaked; freed in thread_exited
        let ut = UthreadPtr::new(unsafe { &(*raw).ut });
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.thread_runnable(ut);
        Ok(ut)
    }

    /// Ask for another core if some are parked
    fn want_core(&self) {
        if library_initialized() && vcore::num_vcores() < vcore::max_vcores() {
            let _ = vcore::vcore_request(1);
        }
    }
}

impl Default for FifoSched {
    fn default() -> Self {
        Self::new()
    }
}

fn spawned_main() {
    let Some(ut) = current_uthread() else {
        return;
    };
    // Safety: only FifoSched::spawn_closure starts threads here
    let spawned = unsafe { &*ut.as_raw().cast::<Spawned>() };
    if let Some(body) = spawned.body.take() {
        body();
    }
}

impl SchedOps for FifoSched {
    fn sched_entry(&self) -> ! {
        // Still current means it was interrupted: round-robin it
        if let Some(ut) = take_current_uthread() {
            self.push(ut);
        }
        let mut idle = 0usize;
        loop {
            if let Some(next) = self.pop() {
                run_uthread(next);
            }
            vcore::vcore_poll_notifications();
            idle = idle.saturating_add(1);
            if idle >= self.idle_spins {
                kdebug!("idle, giving the core back");
                vcore::vcore_yield();
            }
            std::hint::spin_loop();
        }
    }

    fn thread_runnable(&self, ut: UthreadPtr) {
        self.push(ut);
        self.want_core();
    }

    fn thread_exited(&self, ut: UthreadPtr) {
        // Safety: created by spawn_closure; this runs on the transition
        // stack, so the thread's own stack is no longer in use
        let spawned = unsafe { Box::from_raw(ut.as_raw().cast::<Spawned>()) };
        uthread_cleanup(&spawned.ut);
        drop(spawned);
        self.exited.fetch_add(1, Ordering::SeqCst);
    }

    fn spawn(&self, entry: fn(usize), data: usize) -> VcoreResult<UthreadPtr> {
        self.spawn_closure(move || entry(data))
    }
}

/// Yield and go to the back of the run queue
pub fn yield_now() {
    uthread::uthread_pause();
}
