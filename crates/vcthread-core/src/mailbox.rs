//! Per-core event mailbox
//!
//! Each virtual core owns one `Mailbox`: a FIFO of heap-allocated
//! envelopes protected by a queue lock, plus two independent flags.
//!
//! - `enabled`: whether a delivery may interrupt the core right away.
//! - `pending`: a notification was deferred and the core must re-check
//!   its mailbox before it next runs user code.
//!
//! Delivery never drops a notification: when `enabled` is clear the
//! sender sets `pending` instead of signalling, and `enable` clears
//! `pending` and tells the caller to re-signal.

use crate::constants::MAX_NR_EVENT;
use crate::qlock::QueueMutex;
use std::any::Any;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Opaque event payload, interpreted by the handler for its type
pub type EventPayload = Box<dyn Any + Send>;

/// Event type tag, indexing the handler table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    None = 0,
    /// A forwarded blocking call completed
    Syscall = 1,
    /// An alarm armed through the alarm collaborator fired
    Alarm = 2,
    /// Application-defined inter-core interrupt
    UserIpi = 3,
}

impl EventType {
    pub const COUNT: usize = MAX_NR_EVENT;

    #[inline]
    pub const fn as_index(self) -> usize {
        self as usize
    }

    pub const fn from_index(idx: usize) -> Option<EventType> {
        match idx {
            0 => Some(EventType::None),
            1 => Some(EventType::Syscall),
            2 => Some(EventType::Alarm),
            3 => Some(EventType::UserIpi),
            _ => None,
        }
    }
}

/// One queued event
pub struct EventEnvelope {
    pub ev_type: EventType,
    pub payload: EventPayload,
    next: *mut EventEnvelope,
}

impl EventEnvelope {
    /// Box a new envelope; done by the sender outside any lock
    pub fn new(ev_type: EventType, payload: EventPayload) -> Box<Self> {
        Box::new(Self {
            ev_type,
            payload,
            next: ptr::null_mut(),
        })
    }

    /// Unpack a dequeued envelope for dispatch
    pub fn into_parts(self: Box<Self>) -> (EventType, EventPayload) {
        let env = *self;
        (env.ev_type, env.payload)
    }
}

/// Intrusive singly linked FIFO; linking never allocates
struct Fifo {
    head: *mut EventEnvelope,
    tail: *mut EventEnvelope,
}

// Safety: the envelopes are owned by the list and only touched under the lock
unsafe impl Send for Fifo {}

impl Fifo {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
        }
    }

    fn push_back(&mut self, env: Box<EventEnvelope>) {
        let raw = Box::into_raw(env);
        unsafe { (*raw).next = ptr::null_mut() };
        if self.tail.is_null() {
            self.head = raw;
        } else {
            unsafe { (*self.tail).next = raw };
        }
        self.tail = raw;
    }

    fn pop_front(&mut self) -> Option<Box<EventEnvelope>> {
        if self.head.is_null() {
            return None;
        }
        let raw = self.head;
        self.head = unsafe { (*raw).next };
        if self.head.is_null() {
            self.tail = ptr::null_mut();
        }
        let mut env = unsafe { Box::from_raw(raw) };
        env.next = ptr::null_mut();
        Some(env)
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}

/// A virtual core's mailbox
pub struct Mailbox {
    queue: QueueMutex<Fifo>,
    len: AtomicUsize,
    enabled: AtomicBool,
    pending: AtomicBool,
}

impl Mailbox {
    /// New, empty mailbox with notifications enabled
    pub const fn new() -> Self {
        Self {
            queue: QueueMutex::new(Fifo::new()),
            len: AtomicUsize::new(0),
            enabled: AtomicBool::new(true),
            pending: AtomicBool::new(false),
        }
    }

    /// Append an envelope
    pub fn push(&self, env: Box<EventEnvelope>) {
        self.queue.with(|q| {
            q.push_back(env);
            self.len.fetch_add(1, Ordering::SeqCst);
        });
    }

    /// Remove the oldest envelope
    pub fn pop(&self) -> Option<Box<EventEnvelope>> {
        self.queue.with(|q| {
            let env = q.pop_front();
            if env.is_some() {
                self.len.fetch_sub(1, Ordering::SeqCst);
            }
            env
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn has_events(&self) -> bool {
        self.len() != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_events()
    }

    /// Decide whether a delivery should raise a signal now
    ///
    /// Returns `false` if a notification is already pending (the core is
    /// already going to look), or if notifications are disabled, in which
    /// case `pending` is set for `enable` to pick up.
    pub fn notify(&self) -> bool {
        if self.pending.load(Ordering::SeqCst) {
            return false;
        }
        if self.enabled.load(Ordering::SeqCst) {
            return true;
        }
        self.pending.store(true, Ordering::SeqCst);
        // enable() may have run between the two loads; if so nobody else
        // will see the flag we just set.
        self.enabled.load(Ordering::SeqCst) && self.pending.swap(false, Ordering::SeqCst)
    }

    /// Enable notifications; returns whether a deferred one must be re-raised
    pub fn enable(&self) -> bool {
        self.enabled.store(true, Ordering::SeqCst);
        self.pending.swap(false, Ordering::SeqCst)
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Record a notification that could not be acted on yet
    #[inline]
    pub fn set_pending(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Consume the pending flag
    #[inline]
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn envelope(n: u32) -> Box<EventEnvelope> {
        EventEnvelope::new(EventType::UserIpi, Box::new(n))
    }

    fn payload(env: Box<EventEnvelope>) -> u32 {
        *env.payload.downcast::<u32>().unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mb = Mailbox::new();
        for i in 0..5 {
            mb.push(envelope(i));
        }
        assert_eq!(mb.len(), 5);
        let got: Vec<u32> = std::iter::from_fn(|| mb.pop()).map(payload).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        assert!(mb.is_empty());
        assert!(mb.pop().is_none());
    }

    #[test]
    fn test_notify_when_enabled() {
        let mb = Mailbox::new();
        assert!(mb.notify());
        assert!(!mb.is_pending());
    }

    #[test]
    fn test_disabled_delivery_sets_pending() {
        let mb = Mailbox::new();
        mb.disable();
        assert!(!mb.notify());
        assert!(mb.is_pending());

        // Already pending: no second signal even once enabled elsewhere
        assert!(!mb.notify());

        assert!(mb.enable());
        assert!(!mb.is_pending());
        assert!(!mb.enable());
    }

    #[test]
    fn test_pending_suppresses_signal() {
        let mb = Mailbox::new();
        mb.set_pending();
        assert!(!mb.notify());
        assert!(mb.take_pending());
        assert!(mb.notify());
    }

    #[test]
    fn test_drop_releases_queued_envelopes() {
        let marker = Arc::new(());
        let mb = Mailbox::new();
        for _ in 0..3 {
            mb.push(EventEnvelope::new(EventType::None, Box::new(Arc::clone(&marker))));
        }
        assert_eq!(Arc::strong_count(&marker), 4);
        drop(mb);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_no_lost_notifications_under_masking() {
        // Every delivery either signals or leaves `pending` for enable()
        const SENDS: usize = 20_000;
        let mb = Arc::new(Mailbox::new());
        let mb2 = Arc::clone(&mb);

        let toggler = thread::spawn(move || {
            let mut raised = 0usize;
            for i in 0..SENDS {
                if i % 3 == 0 {
                    mb2.disable();
                } else if mb2.enable() {
                    raised += 1;
                }
            }
            if mb2.enable() {
                raised += 1;
            }
            raised
        });

        let mut signalled = 0usize;
        for i in 0..SENDS {
            mb.push(envelope(i as u32));
            if mb.notify() {
                signalled += 1;
            }
        }
        let raised = toggler.join().unwrap();
        if mb.enable() {
            // A send raced with the final enable
            signalled += 1;
        }

        assert!(signalled + raised > 0);
        assert!(!mb.is_pending());
        assert_eq!(mb.len(), SENDS);
    }
}
