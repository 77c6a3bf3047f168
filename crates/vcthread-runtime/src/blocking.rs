//! Blocking calls
//!
//! A user thread must never block its core in the kernel. Instead it
//! yields with a continuation that hands the call to the forwarder
//! collaborator; the forwarder runs it on some other kernel thread and
//! the completion comes back as an event on the issuing core, whose
//! handler makes the thread runnable again.

use crate::collab;
use crate::event;
use crate::sync;
use crate::uthread::{self, UthreadPtr};
use crate::vcore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicIsize, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use vcthread_core::error::{VcoreError, VcoreResult};
use vcthread_core::traits::{AlarmId, AlarmService, BlockingForwarder};
use vcthread_core::{fatal, kwarn};
use vcthread_core::{CoreId, EventPayload, EventType};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// One in-flight blocking call
///
/// Shared between the blocked thread, the forwarded job, the alarm (if
/// any) and the completion event. Exactly one of completion and alarm
/// wins and posts the event.
pub struct BlockingCall {
    ut: UthreadPtr,
    core: AtomicU32,
    result: AtomicIsize,
    state: AtomicU8,
    alarm: AtomicU64,
}

impl BlockingCall {
    fn new(ut: UthreadPtr) -> Self {
        Self {
            ut,
            core: AtomicU32::new(CoreId::NONE.as_u32()),
            result: AtomicIsize::new(0),
            state: AtomicU8::new(PENDING),
            alarm: AtomicU64::new(0),
        }
    }

    /// The blocked thread
    #[inline]
    pub fn uthread(&self) -> UthreadPtr {
        self.ut
    }

    /// Core the completion event is posted to
    #[inline]
    pub fn core(&self) -> CoreId {
        CoreId::new(self.core.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) != PENDING
    }

    #[inline]
    pub fn timed_out(&self) -> bool {
        self.state.load(Ordering::Acquire) == TIMED_OUT
    }

    /// Return value of the call; meaningful once completed
    #[inline]
    pub fn result(&self) -> isize {
        self.result.load(Ordering::Acquire)
    }

    /// Move out of PENDING; only the first caller succeeds
    fn finish(&self, next: u8) -> bool {
        self.state
            .compare_exchange(PENDING, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn post(call: Arc<BlockingCall>, ty: EventType) {
    let core = call.core();
    if let Err(e) = event::send_event(Box::new(call), ty, core) {
        fatal!("cannot post {:?} completion to vcore {}: {}", ty, core, e);
    }
}

/// Called by the forwarded job when the call returns
fn complete(call: Arc<BlockingCall>, result: isize) {
    if !call.finish(COMPLETED) {
        return;
    }
    call.result.store(result, Ordering::Release);
    if let Some(alarms) = collab::alarm_service() {
        let id = call.alarm.load(Ordering::Acquire);
        if id != 0 {
            alarms.disarm(AlarmId(id));
        }
    }
    post(call, EventType::Syscall);
}

fn expire(call: Arc<BlockingCall>) {
    if call.finish(TIMED_OUT) {
        post(call, EventType::Alarm);
    }
}

/// Handler for `Syscall` and `Alarm` events
pub(crate) fn handle_blocking_event(payload: EventPayload, ty: EventType) {
    let call = match payload.downcast::<Arc<BlockingCall>>() {
        Ok(call) => call,
        Err(_) => {
            kwarn!("{:?} event without a blocking call, dropped", ty);
            return;
        }
    };
    let ut = call.uthread();
    ut.get().sysc.store(std::ptr::null_mut(), Ordering::Release);
    uthread::uthread_runnable(ut);
}

/// Where forwarded calls run when no forwarder is installed
pub struct ThreadForwarder;

impl BlockingForwarder for ThreadForwarder {
    fn forward(&self, job: Box<dyn FnOnce() + Send>) {
        let spawned = thread::Builder::new()
            .name("vct-blocking".into())
            .spawn(job);
        if let Err(e) = spawned {
            fatal!("cannot spawn a blocking-call thread: {}", e);
        }
    }
}

static DEFAULT_FORWARDER: ThreadForwarder = ThreadForwarder;

fn forwarder() -> &'static dyn BlockingForwarder {
    collab::forwarder().unwrap_or(&DEFAULT_FORWARDER)
}

fn in_uthread() -> Option<UthreadPtr> {
    if vcore::in_vcore_context() {
        return None;
    }
    vcore::current_vcore()?;
    uthread::current_uthread()
}

fn issue<F>(ut: UthreadPtr, f: F, deadline: Option<Instant>) -> Arc<BlockingCall>
where
    F: FnOnce() -> isize + Send + 'static,
{
    let call = sync::notif_safe(|| Arc::new(BlockingCall::new(ut)));
    ut.get()
        .sysc
        .store(Arc::as_ptr(&call).cast_mut(), Ordering::Release);

    let shared = Arc::clone(&call);
    uthread::uthread_yield_with(true, move |ut| {
        // Off the thread's stack now; the completion must come back here
        shared.core.store(vcore::vcore_id().as_u32(), Ordering::Release);
        uthread::sched_ops().thread_blockon(ut, &shared);

        if let (Some(deadline), Some(alarms)) = (deadline, collab::alarm_service()) {
            let on_alarm = Arc::clone(&shared);
            let id = alarms.arm(deadline, Box::new(move || expire(on_alarm)));
            shared.alarm.store(id.0, Ordering::Release);
        }
        let job_call = Arc::clone(&shared);
        forwarder().forward(Box::new(move || complete(job_call, f())));
    });
    call
}

/// Run `f`, which may block in the kernel, without blocking the core
///
/// From a user thread, the thread blocks until `f` returns on a
/// forwarder thread. Anywhere else `f` is simply called.
pub fn uthread_blocking_call<F>(f: F) -> isize
where
    F: FnOnce() -> isize + Send + 'static,
{
    match in_uthread() {
        Some(ut) => {
            let call = issue(ut, f, None);
            sync::notif_safe(move || call.result())
        }
        None => f(),
    }
}

/// `uthread_blocking_call`, abandoned after `timeout`
///
/// Needs an alarm service. A call that times out keeps running on its
/// forwarder thread; its result is discarded.
pub fn uthread_blocking_call_timeout<F>(f: F, timeout: Duration) -> VcoreResult<isize>
where
    F: FnOnce() -> isize + Send + 'static,
{
    if collab::alarm_service().is_none() {
        return Err(VcoreError::Unsupported);
    }
    let Some(ut) = in_uthread() else {
        return Ok(f());
    };
    let call = issue(ut, f, Some(Instant::now() + timeout));
    sync::notif_safe(move || {
        if call.timed_out() {
            return Err(VcoreError::Timeout);
        }
        Ok(call.result())
    })
}

type ArmedMap = Arc<Mutex<HashSet<u64>>>;

/// An alarm service backed by one sleeping thread per alarm
#[derive(Default)]
pub struct ThreadAlarms {
    next: AtomicU64,
    armed: ArmedMap,
}

impl ThreadAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alarms armed and neither fired nor disarmed
    pub fn armed(&self) -> usize {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Whoever removes the entry decides between firing and disarming
fn take(armed: &ArmedMap, id: u64) -> bool {
    armed
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id)
}

impl AlarmService for ThreadAlarms {
    fn arm(&self, deadline: Instant, callback: Box<dyn FnOnce() + Send>) -> AlarmId {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);

        let armed = Arc::clone(&self.armed);
        let spawned = thread::Builder::new().name("vct-alarm".into()).spawn(move || {
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
            if take(&armed, id) {
                callback();
            }
        });
        if let Err(e) = spawned {
            fatal!("cannot spawn an alarm thread: {}", e);
        }
        AlarmId(id)
    }

    fn disarm(&self, id: AlarmId) -> bool {
        take(&self.armed, id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uthread::UserThread;
    use std::sync::mpsc;

    #[test]
    fn test_direct_call_off_core() {
        assert_eq!(uthread_blocking_call(|| 7), 7);
    }

    #[test]
    fn test_single_winner() {
        let ut = UserThread::new();
        let call = BlockingCall::new(ut.as_ptr());
        assert!(!call.is_done());
        assert!(call.finish(COMPLETED));
        assert!(!call.finish(TIMED_OUT));
        assert!(call.is_done());
        assert!(!call.timed_out());
        assert!(call.core().is_none());
    }

    #[test]
    fn test_thread_forwarder_runs_job() {
        let (tx, rx) = mpsc::channel();
        ThreadForwarder.forward(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_alarm_fires() {
        let alarms = ThreadAlarms::new();
        let (tx, rx) = mpsc::channel();
        alarms.arm(
            Instant::now() + Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(alarms.armed(), 0);
    }

    #[test]
    fn test_alarm_disarm() {
        let alarms = ThreadAlarms::new();
        let (tx, rx) = mpsc::channel::<()>();
        let id = alarms.arm(
            Instant::now() + Duration::from_millis(200),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(alarms.disarm(id));
        assert!(!alarms.disarm(id));
        // Callback is dropped unfired once the sleeper wakes
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
    }
}
