//! # vcthread-runtime
//!
//! Linux runtime for vcthread.
//!
//! This crate provides:
//! - Virtual-core manager (backing pthreads, entry gate, futex parking)
//! - Signal-based notifications (SIGURG) and the notification handler
//! - Per-core event channel on top of the core crate's mailboxes
//! - User-thread primitives (yield, run, swap, hijack, masking)
//! - Blocking-call forwarding
//! - Context switching (architecture-specific assembly)
//! - Stack mapping with guard pages

pub mod config;
pub mod memory;
pub mod signal;
pub mod arch;
pub mod parking;
pub mod tls;
pub mod collab;
pub mod sync;
pub mod vcore;
pub mod event;
pub mod uthread;
pub mod blocking;
pub mod init;
mod notify;

// Re-exports
pub use config::VcoreConfig;
pub use collab::{set_collaborators, Collaborators};
pub use vcore::{
    check_allocation_invariant, in_vcore_context, max_vcores, notification_pending, num_vcores,
    resume_saved_context, set_vcore_entry, take_saved_context, vcore_id, vcore_is_allocated,
    vcore_lib_init, vcore_poll_notifications, vcore_reenter, vcore_request,
    vcore_request_specific, vcore_signal, vcore_stats, vcore_yield, VcoreEntry, VcoreStats,
};
pub use event::{
    disable_notifs, enable_notifs, handle_events, register_event_handler, send_event, send_ipi,
    EventHandler,
};
pub use uthread::{
    current_uthread, hijack_current_uthread, init_uthread_context, run_current_uthread,
    run_uthread, sched_ops, set_sched_ops, swap_uthreads, take_current_uthread,
    uth_disable_notifs, uth_enable_notifs, uthread_cleanup, uthread_exit, uthread_get_specific,
    uthread_has_blocked, uthread_init, uthread_pause, uthread_paused, uthread_runnable,
    uthread_set_specific, uthread_vcore_entry, uthread_yield, uthread_yield_with, Continuation,
    SchedOps, UserThread, UthreadPtr, NO_INTERRUPT,
};
pub use blocking::{
    uthread_blocking_call, uthread_blocking_call_timeout, BlockingCall, ThreadAlarms,
    ThreadForwarder,
};
pub use sync::{lock_notifsafe, notif_safe, vcore_barrier, with_notifsafe, NotifSafeGuard};
pub use memory::{Stack, UthreadStack};
pub use init::{library_init, library_initialized};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(not(target_os = "linux"))] {
        compile_error!("Unsupported platform");
    }
}
