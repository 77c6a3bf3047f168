//! Architecture-specific context switching
//!
//! Each architecture exports a zero-sized `Arch` implementing
//! `vcthread_core::traits::ArchContext`. Everything else in the runtime
//! goes through the helpers below.

use vcthread_core::traits::ArchContext;
use vcthread_core::Context;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        pub use self::x86_64::Arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
        pub use self::aarch64::Arch;
    } else {
        compile_error!("Unsupported architecture");
    }
}

/// Entry signature for fresh contexts
pub type ContextEntry = extern "C" fn(usize) -> !;

#[inline]
pub fn init_context(ctx: &mut Context, stack_top: *mut u8, entry: ContextEntry, arg: usize) {
    Arch::init_context(ctx, stack_top, entry, arg)
}

/// # Safety
///
/// See `ArchContext::switch`.
#[inline]
pub unsafe fn switch(old: *mut Context, new: *const Context) {
    Arch::switch(old, new)
}

/// # Safety
///
/// See `ArchContext::restore`.
#[inline]
pub unsafe fn restore(ctx: *const Context) -> ! {
    Arch::restore(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Stack;
    use std::cell::UnsafeCell;

    struct Pair {
        main: UnsafeCell<Context>,
        side: UnsafeCell<Context>,
        hits: UnsafeCell<u64>,
    }

    thread_local! {
        static PAIR: Pair = const {
            Pair {
                main: UnsafeCell::new(Context::new()),
                side: UnsafeCell::new(Context::new()),
                hits: UnsafeCell::new(0),
            }
        };
    }

    extern "C" fn ping(rounds: usize) -> ! {
        PAIR.with(|p| unsafe {
            for _ in 0..rounds {
                *p.hits.get() += 1;
                switch(p.side.get(), p.main.get());
            }
            *p.hits.get() += 1000;
            restore(p.main.get())
        });
        unreachable!()
    }

    #[test]
    fn test_switch_round_trip() {
        let stack = Stack::new(64 * 1024).unwrap();
        PAIR.with(|p| unsafe {
            init_context(&mut *p.side.get(), stack.top(), ping, 5);
            let mut local = 7u64;
            for i in 0..5u64 {
                switch(p.main.get(), p.side.get());
                // Locals survive the round trip
                assert_eq!(local, 7 + i);
                local += 1;
                assert_eq!(*p.hits.get(), i + 1);
            }
            switch(p.main.get(), p.side.get());
            assert_eq!(*p.hits.get(), 1005);
        });
    }

    #[test]
    fn test_fpu_control_preserved() {
        let stack = Stack::new(64 * 1024).unwrap();
        PAIR.with(|p| unsafe {
            init_context(&mut *p.side.get(), stack.top(), ping, 1);
            let x = std::hint::black_box(1.5f64);
            switch(p.main.get(), p.side.get());
            assert_eq!(std::hint::black_box(x) * 2.0, 3.0);
            switch(p.main.get(), p.side.get());
        });
    }
}
