//! Notification signal plumbing
//!
//! Virtual cores are interrupted with SIGURG. Handlers run on a per-core
//! alternate stack so that a handler which switches away from a user
//! thread leaves that thread's frame somewhere the core no longer uses.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("Unsupported platform");
    }
}
