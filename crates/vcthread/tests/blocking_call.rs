//! Blocking calls are forwarded off the cores and completed by events

mod common;

use common::{boot_with, check, fail, pass, wait_until};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use vcthread::fifo::FifoSched;
use vcthread::{Collaborators, ThreadAlarms, VcoreError};

static SCHED: FifoSched = FifoSched::new();
static ALARMS: OnceLock<ThreadAlarms> = OnceLock::new();

const THREADS: usize = 6;

static DONE: AtomicUsize = AtomicUsize::new(0);

fn sleeper(n: isize) {
    let got = vcthread::uthread_blocking_call(move || {
        thread::sleep(Duration::from_millis(20));
        n * 10
    });
    if got != n * 10 {
        fail(&format!("thread {} got {}", n, got));
    }
    check(
        vcthread::current_uthread().is_some_and(|ut| unsafe { !ut.as_ref().has_blocking_call() }),
        "in-flight call not cleared",
    );
    DONE.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    let alarms: &'static ThreadAlarms = ALARMS.get_or_init(ThreadAlarms::new);
    boot_with(3, &SCHED, Collaborators::none().alarms(alarms));

    // Main blocks too; its core is free to run others meanwhile
    let got = vcthread::uthread_blocking_call(|| {
        thread::sleep(Duration::from_millis(10));
        7
    });
    check(got == 7, "main's blocking call result");

    for n in 1..=THREADS as isize {
        if let Err(e) = SCHED.spawn_closure(move || sleeper(n)) {
            fail(&format!("spawn failed: {}", e));
        }
    }

    let fast = vcthread::uthread_blocking_call_timeout(|| 3, Duration::from_secs(10));
    check(fast == Ok(3), "fast call should beat its alarm");

    let slow = vcthread::uthread_blocking_call_timeout(
        || {
            thread::sleep(Duration::from_millis(500));
            1
        },
        Duration::from_millis(20),
    );
    check(slow == Err(VcoreError::Timeout), "slow call should time out");

    wait_until("sleepers", Duration::from_secs(30), || {
        DONE.load(Ordering::SeqCst) == THREADS
    });
    wait_until("alarms to settle", Duration::from_secs(10), || alarms.armed() == 0);
    check(vcthread::check_allocation_invariant(), "allocation invariant");
    pass("blocking_call")
}
