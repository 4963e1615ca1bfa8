//! # Concurrency Guard
//!
//! Exclusive logical locks over normalized match keys. A resolution holds
//! the locks for every key it touches from before the match until its
//! transaction commits, so two requests for overlapping identities can
//! never interleave and observe each other's partial state.
//!
//! Acquisition is all-or-nothing under one table mutex: a caller waits
//! until every requested key is free, then claims them together, so two
//! multi-key requests cannot deadlock on each other.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;

/// Table of currently-held logical keys.
#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every key in `keys` is free, then hold them all until the
    /// returned guard drops.
    pub fn acquire(&self, mut keys: Vec<String>) -> KeyLockGuard<'_> {
        keys.sort();
        keys.dedup();

        let mut held = self.held.lock();
        while keys.iter().any(|key| held.contains(key)) {
            self.released.wait(&mut held);
        }
        for key in &keys {
            held.insert(key.clone());
        }
        KeyLockGuard { locks: self, keys }
    }
}

/// RAII guard releasing its keys, waking all waiters.
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    locks: &'a KeyLocks,
    keys: Vec<String>,
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for key in &self.keys {
            held.remove(key);
        }
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn overlapping_keys_are_mutually_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let in_section = Arc::clone(&in_section);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard =
                            locks.acquire(vec!["e:shared@x.io".into(), "p:111".into()]);
                        let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(50));
                        in_section.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disjoint_keys_do_not_block_each_other() {
        let locks = KeyLocks::new();
        let _a = locks.acquire(vec!["e:a@x.io".into()]);
        // Must not block; a deadlock here would hang the test.
        let _b = locks.acquire(vec!["e:b@x.io".into()]);
    }

    #[test]
    fn duplicate_keys_collapse_before_acquisition() {
        let locks = KeyLocks::new();
        let guard = locks.acquire(vec!["e:a@x.io".into(), "e:a@x.io".into()]);
        assert_eq!(guard.keys.len(), 1);
        drop(guard);
        let _again = locks.acquire(vec!["e:a@x.io".into()]);
    }
}
