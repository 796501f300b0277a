//! Loom models of the upgrade and release protocol.
//!
//! Run with `RUSTFLAGS="--cfg loom" cargo test --test loom_lock --release`.

#![cfg(loom)]

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

use tandem::{SharedPtr, WeakPtr};

struct Flagged(Arc<AtomicUsize>);

impl Drop for Flagged {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// An upgrade racing the final release never sees a disposed value.
#[test]
fn test_lock_vs_last_release() {
    loom::model(|| {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = SharedPtr::new(Flagged(Arc::clone(&drops)));
        let weak = WeakPtr::from(&strong);

        let locker = thread::spawn({
            let drops = Arc::clone(&drops);
            move || {
                if let Some(upgraded) = weak.upgrade() {
                    assert_eq!(drops.load(Ordering::SeqCst), 0);
                    drop(upgraded);
                }
            }
        });

        drop(strong);
        locker.join().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

/// Two owners released concurrently dispose exactly once.
#[test]
fn test_concurrent_release() {
    loom::model(|| {
        let drops = Arc::new(AtomicUsize::new(0));
        let a = SharedPtr::new(Flagged(Arc::clone(&drops)));
        let b = a.clone();

        let other = thread::spawn(move || drop(b));
        drop(a);
        other.join().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

/// The last weak and the last strong handle race to free the block.
#[test]
fn test_weak_and_strong_release_race() {
    loom::model(|| {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = SharedPtr::new(Flagged(Arc::clone(&drops)));
        let weak = WeakPtr::from(&strong);

        let other = thread::spawn(move || drop(weak));
        drop(strong);
        other.join().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}
