//! Notifications interrupt user threads that never yield

mod common;

use common::{boot, check, fail, pass, wait_until, TracingSched};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use vcthread::fifo::FifoSched;
use vcthread::{CoreId, EventPayload, EventType};

const CORES: usize = 2;
const IPIS: usize = 200;

static SCHED: TracingSched = TracingSched::new(FifoSched::new());

static HANDLED: AtomicUsize = AtomicUsize::new(0);
static SPINS: AtomicU64 = AtomicU64::new(0);
static SPINNER_CORE: AtomicU32 = AtomicU32::new(u32::MAX);
static STOP: AtomicBool = AtomicBool::new(false);

fn count_ipi(payload: EventPayload, _ty: EventType) {
    if payload.downcast::<u32>().is_ok() {
        HANDLED.fetch_add(1, Ordering::SeqCst);
    }
}

/// Never yields and never allocates; only notifications take it off
/// its core
fn spin() {
    while !STOP.load(Ordering::Relaxed) {
        SPINNER_CORE.store(vcthread::vcore_id().as_u32(), Ordering::Relaxed);
        SPINS.fetch_add(1, Ordering::Relaxed);
        std::hint::spin_loop();
    }
}

fn main() {
    boot(CORES, &SCHED);
    vcthread::register_event_handler(EventType::UserIpi, count_ipi);

    // Raised to ourselves while masked inside send_ipi, re-raised on
    // unmask; main is interrupted and resumed before the call returns
    let preempts = SCHED.preempts();
    if let Err(e) = vcthread::send_ipi(0u32, vcthread::vcore_id()) {
        fail(&format!("self send_ipi: {}", e));
    }
    check(HANDLED.load(Ordering::SeqCst) == 1, "self IPI not handled on return");
    check(SCHED.preempts() > preempts, "main was not interrupted by its own IPI");

    if let Err(e) = SCHED.fifo.spawn_closure(spin) {
        fail(&format!("spawn failed: {}", e));
    }
    wait_until("the spinner to start", Duration::from_secs(10), || {
        SPINS.load(Ordering::SeqCst) > 0
    });

    let preempts = SCHED.preempts();
    for i in 0..IPIS {
        let target = CoreId::new(SPINNER_CORE.load(Ordering::SeqCst));
        if let Err(e) = vcthread::send_ipi(i as u32 + 1, target) {
            fail(&format!("send_ipi to {}: {}", target, e));
        }
    }
    wait_until("every IPI to be handled", Duration::from_secs(30), || {
        HANDLED.load(Ordering::SeqCst) == IPIS + 1
    });
    check(SCHED.preempts() > preempts, "the spinner was never interrupted");

    // Interrupted, not stopped
    let spins = SPINS.load(Ordering::SeqCst);
    wait_until("the spinner to keep running", Duration::from_secs(10), || {
        SPINS.load(Ordering::SeqCst) > spins + 1000
    });

    STOP.store(true, Ordering::SeqCst);
    wait_until("the spinner to exit", Duration::from_secs(10), || SCHED.fifo.live() == 0);
    check(HANDLED.load(Ordering::SeqCst) == IPIS + 1, "an IPI was handled twice");
    check(vcthread::check_allocation_invariant(), "allocation invariant");
    pass("preemption")
}
