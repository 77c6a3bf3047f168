//! # vcthread - Virtual-core threads
//!
//! An M:N user-level threading substrate. Many lightweight user threads
//! are multiplexed onto a small fixed pool of virtual cores, each backed
//! by one pinned pthread. The application (or a two-level scheduler
//! built on top) decides which thread runs where; the kernel is only
//! involved to park idle cores and to deliver notifications.
//!
//! ## Quick Start
//!
//! ```ignore
//! use vcthread::{fifo::FifoSched, Runtime, VcoreConfig};
//!
//! static SCHED: FifoSched = FifoSched::new();
//!
//! fn main() {
//!     Runtime::new()
//!         .config(VcoreConfig::from_env().max_vcores(4))
//!         .sched_ops(&SCHED)
//!         .start()
//!         .expect("runtime start");
//!
//!     // Now running on vcore 0 as a user thread
//!     SCHED.spawn_closure(|| println!("hello from vcore {}", vcthread::vcore_id())).unwrap();
//!     vcthread::fifo::yield_now();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Two-level scheduler (SchedOps)              │
//! │        sched_entry, thread_runnable, thread_paused ...      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    User-thread primitives                   │
//! │     yield + continuation, run, swap, hijack, masking        │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  vcore 0  │      │  vcore 1  │      │  vcore N  │
//!    │  mailbox  │      │  mailbox  │      │  mailbox  │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │        Backing pthreads: futex gate, SIGURG, stacks     │
//!    └─────────────────────────────────────────────────────────┘
//! ```

pub mod fifo;

// Re-export core types
pub use vcthread_core::{
    CoreId,
    VcoreState,
    UthreadState,
    QueueLock,
    QueueLockNode,
    QueueMutex,
    DisseminationBarrier,
    EventType,
    EventPayload,
    VcoreError,
    VcoreResult,
};
pub use vcthread_core::traits::{
    AlarmId, AlarmService, BlockingForwarder, DtlsData, DtlsKey, DynamicStorage, TlsAllocator,
    TlsRegion,
};

// Re-export kprint macros for debug logging
pub use vcthread_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace, fatal};
pub use vcthread_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use vcthread_core::{env_get, env_get_bool, env_get_opt, env_get_size, env_is_set};

// Re-export runtime API
pub use vcthread_runtime::*;

use std::sync::atomic::{AtomicBool, Ordering};

/// The user thread the bootstrapping caller becomes
static MAIN_UTHREAD: UserThread = UserThread::new();

static STARTED: AtomicBool = AtomicBool::new(false);

/// Builder for bringing the runtime up
///
/// Everything registered here must be in place before the core pool
/// starts, so `start` applies it all in order and then bootstraps.
#[derive(Default)]
pub struct Runtime {
    config: Option<VcoreConfig>,
    collaborators: Option<Collaborators>,
    sched: Option<&'static dyn SchedOps>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of reading the environment
    pub fn config(mut self, config: VcoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// The two-level scheduler
    pub fn sched_ops(mut self, ops: &'static dyn SchedOps) -> Self {
        self.sched = Some(ops);
        self
    }

    /// Bring the runtime up; the caller continues on vcore 0
    pub fn start(self) -> VcoreResult<()> {
        self.start_as(&MAIN_UTHREAD)
    }

    /// Like `start`, with caller-provided storage for the main thread
    pub fn start_as(self, main_ut: &'static UserThread) -> VcoreResult<()> {
        if STARTED.swap(true, Ordering::SeqCst) {
            return Err(VcoreError::AlreadyInitialized);
        }
        if let Some(config) = self.config {
            vcore::set_config(config)?;
        }
        if let Some(collaborators) = self.collaborators {
            set_collaborators(collaborators)?;
        }
        if let Some(ops) = self.sched {
            set_sched_ops(ops)?;
        }
        library_init(main_ut)
    }
}

/// Spawn a user thread through the registered scheduler
pub fn spawn<F>(f: F) -> VcoreResult<UthreadPtr>
where
    F: FnOnce() + Send + 'static,
{
    fn run_boxed(data: usize) {
        // Safety: produced by Box::into_raw below, consumed exactly once
        let f = unsafe { Box::from_raw(data as *mut Box<dyn FnOnce() + Send>) };
        f();
    }

    notif_safe(|| {
        let boxed: Box<Box<dyn FnOnce() + Send>> = Box::new(Box::new(f));
        let data = Box::into_raw(boxed) as usize;
        sched_ops().spawn(run_boxed, data).inspect_err(|_| {
            // Never started: reclaim the closure
            drop(unsafe { Box::from_raw(data as *mut Box<dyn FnOnce() + Send>) });
        })
    })
}

/// Whether the caller runs as a user thread
#[inline]
pub fn is_in_uthread() -> bool {
    current_uthread().is_some() && !in_vcore_context()
}
