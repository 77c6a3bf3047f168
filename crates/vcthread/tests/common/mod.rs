//! Shared helpers for the integration scenarios
//!
//! These binaries run without the libtest harness: the runtime moves
//! `main` onto vcore 0, and a panic unwinding through a switched stack
//! is not recoverable. Failures print and exit non-zero instead.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use vcthread::fifo::{self, FifoSched};
use vcthread::{Collaborators, Runtime, SchedOps, UthreadPtr, VcoreConfig, VcoreResult};

pub fn config(max_vcores: usize) -> VcoreConfig {
    VcoreConfig::from_env()
        .max_vcores(max_vcores)
        .pin_cores(false)
}

/// Start the runtime with `sched`; returns on vcore 0
pub fn boot(max_vcores: usize, sched: &'static dyn SchedOps) {
    boot_with(max_vcores, sched, Collaborators::none());
}

pub fn boot_with(max_vcores: usize, sched: &'static dyn SchedOps, collaborators: Collaborators) {
    let started = Runtime::new()
        .config(config(max_vcores))
        .collaborators(collaborators)
        .sched_ops(sched)
        .start();
    if let Err(e) = started {
        fail(&format!("runtime start failed: {}", e));
    }
    check(vcthread::vcore_id().as_u32() == 0, "main did not land on vcore 0");
    check(vcthread::is_in_uthread(), "main is not a user thread");
}

pub fn fail(msg: &str) -> ! {
    eprintln!("FAILED: {}", msg);
    std::process::exit(1)
}

pub fn check(cond: bool, msg: &str) {
    if !cond {
        fail(msg);
    }
}

/// Yield from the calling user thread until `done` holds
pub fn wait_until(what: &str, timeout: Duration, done: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        if Instant::now() > deadline {
            fail(&format!("timed out waiting for {}", what));
        }
        fifo::yield_now();
    }
}

pub fn pass(name: &str) -> ! {
    println!("{}: ok", name);
    std::process::exit(0)
}

/// xorshift64*, enough for shuffling test inputs
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

/// Times some core restarted itself through `TracingSched::arm_reenter`
pub static REENTRIES: AtomicUsize = AtomicUsize::new(0);

fn reentered() -> ! {
    REENTRIES.fetch_add(1, Ordering::SeqCst);
    vcthread::uthread_vcore_entry()
}

/// FIFO scheduling that also counts preemptions and can force a core
/// re-entry
pub struct TracingSched {
    pub fifo: FifoSched,
    preempts: AtomicUsize,
    reenter_armed: AtomicBool,
}

impl TracingSched {
    pub const fn new(fifo: FifoSched) -> Self {
        Self {
            fifo,
            preempts: AtomicUsize::new(0),
            reenter_armed: AtomicBool::new(false),
        }
    }

    /// Threads interrupted by a notification so far
    pub fn preempts(&self) -> usize {
        self.preempts.load(Ordering::SeqCst)
    }

    /// The next core to enter the scheduler restarts from its entry
    /// point first
    pub fn arm_reenter(&self) {
        self.reenter_armed.store(true, Ordering::SeqCst);
    }
}

impl SchedOps for TracingSched {
    fn sched_entry(&self) -> ! {
        if self.reenter_armed.swap(false, Ordering::SeqCst) {
            vcthread::vcore_reenter(reentered);
        }
        self.fifo.sched_entry()
    }

    fn thread_runnable(&self, ut: UthreadPtr) {
        self.fifo.thread_runnable(ut);
    }

    fn thread_exited(&self, ut: UthreadPtr) {
        self.fifo.thread_exited(ut);
    }

    fn preempt_pending(&self) {
        self.preempts.fetch_add(1, Ordering::SeqCst);
    }

    fn spawn(&self, entry: fn(usize), data: usize) -> VcoreResult<UthreadPtr> {
        self.fifo.spawn(entry, data)
    }
}
