//! Wait/wake on an address
//!
//! The primitive cores park on: block while a 32-bit word holds an
//! expected value, and wake threads blocked on that word. Spurious
//! returns are absorbed here; `wait_while` only returns once the word
//! has changed.

use std::sync::atomic::{AtomicU32, Ordering};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        use futex_linux as sys;
    } else {
        compile_error!("Unsupported platform");
    }
}

/// Block the calling OS thread until `word != expected`
pub fn wait_while(word: &AtomicU32, expected: u32) {
    while word.load(Ordering::Acquire) == expected {
        sys::futex_wait(word, expected);
    }
}

/// Wake one thread blocked in `wait_while` on `word`
#[inline]
pub fn wake_one(word: &AtomicU32) {
    sys::futex_wake(word, 1);
}

/// Wake every thread blocked in `wait_while` on `word`
#[inline]
pub fn wake_all(word: &AtomicU32) {
    sys::futex_wake(word, i32::MAX);
}

/// Store `value` into `word` and wake all waiters
#[inline]
pub fn set_and_wake(word: &AtomicU32, value: u32) {
    word.store(value, Ordering::Release);
    wake_all(word);
}

/// Park the calling OS thread for good
pub fn park_forever() -> ! {
    let never = AtomicU32::new(0);
    loop {
        wait_while(&never, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_returns_on_changed_value() {
        let word = AtomicU32::new(1);
        // Value already differs: must not block
        wait_while(&word, 0);
    }

    #[test]
    fn test_wake_one() {
        let word = Arc::new(AtomicU32::new(0));
        let word2 = Arc::clone(&word);

        let handle = thread::spawn(move || {
            wait_while(&word2, 0);
            word2.load(Ordering::Acquire)
        });

        thread::sleep(Duration::from_millis(50));
        word.store(7, Ordering::Release);
        wake_one(&word);
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn test_wake_all() {
        let word = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let w = Arc::clone(&word);
                thread::spawn(move || wait_while(&w, 0))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        set_and_wake(&word, 1);
        for h in handles {
            h.join().unwrap();
        }
    }
}
