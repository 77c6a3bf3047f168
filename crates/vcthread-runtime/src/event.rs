//! Event delivery
//!
//! `send_event` posts an envelope to a core's mailbox and makes sure the
//! core will look at it: a parked core is allocated, a running one is
//! signalled (or has its pending flag set when it has notifications
//! disabled). `handle_events` drains the caller's mailbox in vcore
//! context, dispatching each envelope through the handler table.

use crate::sync;
use crate::vcore;
use std::sync::atomic::{AtomicUsize, Ordering};
use vcthread_core::error::{VcoreError, VcoreResult};
use vcthread_core::{kdebug, kwarn};
use vcthread_core::{CoreId, EventEnvelope, EventPayload, EventType};

/// Handler for one event type; runs in vcore context
pub type EventHandler = fn(EventPayload, EventType);

static HANDLERS: [AtomicUsize; EventType::COUNT] = [const { AtomicUsize::new(0) }; EventType::COUNT];

/// Install `handler` for `ty`, replacing any previous one
pub fn register_event_handler(ty: EventType, handler: EventHandler) {
    HANDLERS[ty.as_index()].store(handler as *const () as usize, Ordering::Release);
}

fn handler_for(ty: EventType) -> Option<EventHandler> {
    match HANDLERS[ty.as_index()].load(Ordering::Acquire) {
        0 => None,
        // Safety: only register_event_handler stores here
        raw => Some(unsafe { std::mem::transmute::<usize, EventHandler>(raw) }),
    }
}

/// Post `payload` to `core` and make sure it gets handled
pub fn send_event(payload: EventPayload, ty: EventType, core: CoreId) -> VcoreResult<()> {
    let target = vcore::vcore(core)?;
    // Allocation and the mailbox lock both run masked
    sync::notif_safe(|| target.mailbox.push(EventEnvelope::new(ty, payload)));

    // A core checks its mailbox under the manager lock before parking,
    // and the restart decision is taken under the same lock
    if vcore::vcore_request_specific(core)? {
        kdebug!("woke vcore {} for {:?}", core, ty);
        return Ok(());
    }
    vcore::vcore_signal(core)
}

/// Drain the caller's mailbox; returns the number of events dispatched
///
/// Vcore context only. Also consumes the core's pending flag, since every
/// deferred notification is answered by this drain.
pub fn handle_events() -> usize {
    let Some(core) = vcore::current_vcore() else {
        return 0;
    };
    debug_assert!(core.in_vcore_context(), "handle_events from user-thread context");
    core.mailbox.take_pending();

    let mut handled = 0;
    while let Some(env) = core.mailbox.pop() {
        let (ty, payload) = env.into_parts();
        match handler_for(ty) {
            Some(handler) => handler(payload, ty),
            None => kwarn!("no handler for {:?}, dropping event", ty),
        }
        handled += 1;
    }
    handled
}

/// Enable notifications on `core`; returns whether a deferred one was
/// re-raised
pub fn enable_notifs(core: CoreId) -> VcoreResult<bool> {
    let target = vcore::vcore(core)?;
    if target.mailbox.enable() {
        target.raise()?;
        return Ok(true);
    }
    Ok(false)
}

/// Disable notifications on `core`; deliveries set its pending flag
pub fn disable_notifs(core: CoreId) -> VcoreResult<()> {
    let target = vcore::vcore(core)?;
    target.mailbox.disable();
    Ok(())
}

/// `send_event` with a user-defined payload, as an inter-core interrupt
pub fn send_ipi<T: Send + 'static>(value: T, core: CoreId) -> VcoreResult<()> {
    if core.is_none() {
        return Err(VcoreError::InvalidCore(core));
    }
    sync::notif_safe(|| send_event(Box::new(value), EventType::UserIpi, core))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    static SEEN: AtomicU32 = AtomicU32::new(0);

    fn count_none(payload: EventPayload, ty: EventType) {
        assert_eq!(ty, EventType::None);
        if let Ok(n) = payload.downcast::<u32>() {
            SEEN.fetch_add(*n, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_and_lookup() {
        assert!(handler_for(EventType::None).is_none());
        register_event_handler(EventType::None, count_none);
        let handler = handler_for(EventType::None).unwrap();
        handler(Box::new(5u32), EventType::None);
        assert_eq!(SEEN.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_off_pool() {
        assert_eq!(handle_events(), 0);
        assert!(matches!(
            send_event(Box::new(()), EventType::UserIpi, CoreId::new(0)),
            Err(VcoreError::NotInitialized)
        ));
        assert!(matches!(
            send_ipi((), CoreId::NONE),
            Err(VcoreError::InvalidCore(_))
        ));
        assert!(enable_notifs(CoreId::new(0)).is_err());
    }
}
