//! Library bootstrap
//!
//! Brings up the core pool and the user-thread layer, then moves the
//! calling kernel thread onto core 0 as the user thread `main_ut`.

use crate::blocking;
use crate::event;
use crate::uthread::{self, UserThread};
use crate::vcore;
use std::sync::atomic::{AtomicBool, Ordering};
use vcthread_core::error::{VcoreError, VcoreResult};
use vcthread_core::{kdebug, EventType};

static LIBRARY_UP: AtomicBool = AtomicBool::new(false);

/// Whether `library_init` has completed
pub fn library_initialized() -> bool {
    LIBRARY_UP.load(Ordering::Acquire)
}

/// One-shot bootstrap
///
/// On success the caller runs on core 0 as `main_ut` with notifications
/// enabled. A second call returns `Err(AlreadyInitialized)`.
pub fn library_init(main_ut: &'static UserThread) -> VcoreResult<()> {
    if LIBRARY_UP.swap(true, Ordering::AcqRel) {
        return Err(VcoreError::AlreadyInitialized);
    }

    vcore::vcore_lib_init()?;
    uthread::adopt_main(main_ut);
    vcore::set_vcore_entry(uthread::uthread_core_entry);
    event::register_event_handler(EventType::Syscall, blocking::handle_blocking_event);
    event::register_event_handler(EventType::Alarm, blocking::handle_blocking_event);

    // The first request ever made migrates the caller onto core 0
    vcore::vcore_request(1)?;
    if vcore::vcore_id().is_none() {
        // Somebody else bootstrapped the pool first
        return Err(VcoreError::AlreadyInitialized);
    }
    kdebug!("main is now a user thread on vcore {}", vcore::vcore_id());

    uthread::uth_enable_notifs();
    Ok(())
}
