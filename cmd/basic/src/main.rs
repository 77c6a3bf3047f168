//! Basic vcthread example
//!
//! Boots the runtime with a FIFO scheduler, spawns a few user threads
//! that yield and hop between cores, and sends each core an event.
//!
//! # Environment Variables
//!
//! - `VCORE_LIMIT=4` - Number of virtual cores
//! - `VCT_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `VCT_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use vcthread::fifo::{yield_now, FifoSched};
use vcthread::{kdebug, kinfo, CoreId, EventPayload, EventType, Runtime, VcoreConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static SCHED: FifoSched = FifoSched::new();
static PINGS: AtomicUsize = AtomicUsize::new(0);

fn on_ping(payload: EventPayload, _ty: EventType) {
    if let Ok(from) = payload.downcast::<u32>() {
        kdebug!("ping from vcore {}", from);
    }
    PINGS.fetch_add(1, Ordering::SeqCst);
}

// VCT_LOG_LEVEL=debug VCT_FLUSH_EPRINT=1 cargo run -p vcthread-basic
fn main() {
    println!("=== vcthread Basic Example ===\n");

    vcthread::register_event_handler(EventType::UserIpi, on_ping);

    let config = VcoreConfig::from_env().debug_logging(false);
    if let Err(e) = Runtime::new().config(config).sched_ops(&SCHED).start() {
        eprintln!("runtime start failed: {}", e);
        std::process::exit(1);
    }
    kinfo!("main now runs on vcore {}", vcthread::vcore_id());

    let completed = Arc::new(AtomicUsize::new(0));
    for i in 1..=4 {
        let c = Arc::clone(&completed);
        let spawned = vcthread::spawn(move || {
            for j in 0..3 {
                kdebug!("[uthread {}] iteration {} on vcore {}", i, j, vcthread::vcore_id());
                yield_now();
            }
            c.fetch_add(1, Ordering::SeqCst);
        });
        match spawned {
            Ok(ut) => println!("Spawned user thread {} ({:?})", i, ut),
            Err(e) => eprintln!("spawn {} failed: {}", i, e),
        }
    }

    let cores = vcthread::max_vcores();
    for core in 0..cores {
        let _ = vcthread::send_ipi(vcthread::vcore_id().as_u32(), CoreId::from(core));
    }

    println!("\nWaiting for user threads and pings...\n");
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(10);
    while completed.load(Ordering::SeqCst) < 4 || PINGS.load(Ordering::SeqCst) < cores {
        if start.elapsed() > timeout {
            println!("WARNING: Timeout!");
            break;
        }
        yield_now();
    }

    kinfo!(
        "{} user thread(s) completed, {} ping(s) handled, {} core(s) allocated",
        completed.load(Ordering::SeqCst),
        PINGS.load(Ordering::SeqCst),
        vcthread::num_vcores()
    );
    for core in 0..cores {
        if let Some(stats) = vcthread::vcore_stats(CoreId::from(core)) {
            println!("vcore {}: {:?}", core, stats);
        }
    }

    println!("\n=== Example Complete ===");
}
