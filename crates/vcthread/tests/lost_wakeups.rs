//! Random masking plus random sends: every event is handled exactly once

mod common;

use common::{boot, check, fail, pass, wait_until, Rng};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;
use vcthread::fifo::FifoSched;
use vcthread::{CoreId, EventPayload, EventType};

static SCHED: FifoSched = FifoSched::with_idle_spins(20_000);

const CORES: usize = 4;
const SENDS: usize = 5_000;

static SEEN: [AtomicU8; SENDS] = [const { AtomicU8::new(0) }; SENDS];
static HANDLED: AtomicUsize = AtomicUsize::new(0);

fn on_ipi(payload: EventPayload, _ty: EventType) {
    match payload.downcast::<usize>() {
        Ok(id) => {
            if SEEN[*id].fetch_add(1, Ordering::SeqCst) != 0 {
                fail(&format!("event {} handled twice", id));
            }
            HANDLED.fetch_add(1, Ordering::SeqCst);
        }
        Err(_) => fail("unexpected payload"),
    }
}

fn main() {
    vcthread::register_event_handler(EventType::UserIpi, on_ipi);
    boot(CORES, &SCHED);
    let _ = vcthread::vcore_request(CORES);

    let mut rng = Rng::new(0x5eed);
    for id in 0..SENDS {
        let core = CoreId::new(rng.below(CORES as u64) as u32);
        match rng.below(4) {
            0 => {
                let _ = vcthread::disable_notifs(core);
            }
            1 => {
                let _ = vcthread::enable_notifs(core);
            }
            _ => {}
        }
        if let Err(e) = vcthread::send_ipi(id, core) {
            fail(&format!("send {} to {} failed: {}", id, core, e));
        }
        if id % 64 == 0 {
            vcthread::fifo::yield_now();
        }
    }

    for i in 0..CORES {
        let _ = vcthread::enable_notifs(CoreId::new(i as u32));
    }

    wait_until("all events", Duration::from_secs(60), || {
        HANDLED.load(Ordering::SeqCst) == SENDS
    });
    check(
        SEEN.iter().all(|s| s.load(Ordering::SeqCst) == 1),
        "every event exactly once",
    );
    check(vcthread::check_allocation_invariant(), "allocation invariant");
    pass("lost_wakeups")
}
