//! Core allocation and the enable/pending protocol on a pool of four

mod common;

use common::{boot, check, pass, wait_until};
use std::time::Duration;
use vcthread::fifo::FifoSched;
use vcthread::{CoreId, VcoreError};

// Idle cores keep spinning so the allocation count stays put
static SCHED: FifoSched = FifoSched::spinning();

fn main() {
    boot(4, &SCHED);

    check(vcthread::num_vcores() == 1, "bootstrap should allocate only core 0");
    check(vcthread::vcore_is_allocated(CoreId::new(0)), "core 0 not allocated");

    check(
        matches!(
            vcthread::vcore_request(5),
            Err(VcoreError::RequestImpossible { requested: 5, max: 4 })
        ),
        "over-maximum request must fail",
    );
    check(vcthread::num_vcores() == 1, "failed request changed the count");
    check(vcthread::vcore_request(0) == Ok(0), "zero request");

    // Three more are free; the grant is partial but not an error
    check(vcthread::vcore_request(4) == Ok(3), "expected a grant of 3");
    check(vcthread::num_vcores() == 4, "expected 4 cores allocated");
    check(vcthread::check_allocation_invariant(), "allocation invariant");
    check(
        vcthread::vcore_request(1) == Err(VcoreError::NoCoresAvailable),
        "full pool must refuse",
    );
    check(
        vcthread::vcore_request_specific(CoreId::new(2)) == Ok(false),
        "allocated core is not re-allocated",
    );
    check(
        matches!(
            vcthread::vcore_request_specific(CoreId::new(9)),
            Err(VcoreError::InvalidCore(_))
        ),
        "out-of-range core",
    );

    let core = CoreId::new(2);
    wait_until("core 2 to start", Duration::from_secs(10), || {
        vcthread::vcore_stats(core).is_some_and(|s| s.wakeups > 0)
    });
    let before = vcthread::vcore_stats(core).unwrap_or_default();

    // Disabled: the delivery only leaves a pending mark
    vcthread::disable_notifs(core).unwrap_or_else(|e| common::fail(&e.to_string()));
    vcthread::vcore_signal(core).unwrap_or_else(|e| common::fail(&e.to_string()));
    let after = vcthread::vcore_stats(core).unwrap_or_default();
    check(after.signals_sent == before.signals_sent, "signal sent while disabled");
    check(vcthread::notification_pending(core), "pending not set");

    // A second delivery is absorbed by the pending mark
    vcthread::vcore_signal(core).unwrap_or_else(|e| common::fail(&e.to_string()));
    check(
        vcthread::vcore_stats(core).unwrap_or_default().signals_sent == before.signals_sent,
        "pending core was signalled again",
    );

    // Enabling reconciles: one re-signal, pending consumed
    check(vcthread::enable_notifs(core) == Ok(true), "enable should re-signal");
    check(
        vcthread::vcore_stats(core).unwrap_or_default().signals_sent == before.signals_sent + 1,
        "exactly one re-signal expected",
    );
    check(vcthread::enable_notifs(core) == Ok(false), "nothing left to re-signal");

    // The core answers the signal from its idle loop
    wait_until("core 2 to see the notification", Duration::from_secs(10), || {
        vcthread::vcore_stats(core).is_some_and(|s| s.notifications > before.notifications)
            && !vcthread::notification_pending(core)
    });

    check(vcthread::num_vcores() == 4, "cores left the pool");
    check(vcthread::check_allocation_invariant(), "allocation invariant at exit");
    pass("vcore_request")
}
