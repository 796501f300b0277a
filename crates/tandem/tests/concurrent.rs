//! Cross-thread clone, drop and upgrade of shared and weak pointers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tandem::{SharedPtr, WeakPtr};

const THREADS: usize = 8;
const ITERATIONS: usize = 1_000;

struct Payload {
    value: usize,
    drops: Arc<AtomicUsize>,
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn payload(value: usize) -> (SharedPtr<Payload>, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let ptr = SharedPtr::new(Payload {
        value,
        drops: Arc::clone(&drops),
    });
    (ptr, drops)
}

#[test]
fn test_concurrent_clone_and_drop() {
    let (ptr, drops) = payload(7);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ptr = ptr.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERATIONS {
                    let copy = ptr.clone();
                    assert_eq!(copy.value, 7);
                    drop(copy);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ptr.use_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(ptr);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_last_owner_on_any_thread_disposes_once() {
    for _ in 0..50 {
        let (ptr, drops) = payload(1);
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let ptr = ptr.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    drop(ptr);
                })
            })
            .collect();
        drop(ptr);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_lock_races_final_release() {
    for round in 0..200 {
        let (ptr, drops) = payload(round);
        let weak = WeakPtr::from(&ptr);
        let start = Arc::new(Barrier::new(THREADS + 1));
        let upgraded = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let weak = weak.clone();
                let start = Arc::clone(&start);
                let upgraded = Arc::clone(&upgraded);
                thread::spawn(move || {
                    start.wait();
                    if let Some(strong) = weak.upgrade() {
                        // A successful upgrade always sees a live value.
                        assert_eq!(strong.value, round);
                        assert_eq!(strong.drops.load(Ordering::SeqCst), 0);
                        upgraded.fetch_add(1, Ordering::SeqCst);
                    } else {
                        assert!(weak.lock().is_empty());
                    }
                })
            })
            .collect();

        start.wait();
        drop(ptr);
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(weak.expired());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(upgraded.load(Ordering::SeqCst) <= THREADS);
        drop(weak);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_weak_clone_and_drop_across_threads() {
    let (ptr, drops) = payload(3);
    let weak = WeakPtr::from(&ptr);
    let stop = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let weak = weak.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen_live = 0_usize;
                while !stop.load(Ordering::Relaxed) {
                    let copy = weak.clone();
                    if copy.lock().is_some() {
                        seen_live += 1;
                    }
                    thread::yield_now();
                }
                seen_live
            })
        })
        .collect();

    thread::sleep(std::time::Duration::from_millis(10));
    drop(ptr);
    stop.store(true, Ordering::Relaxed);

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(weak.expired());
    assert_eq!(weak.weak_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(weak);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
