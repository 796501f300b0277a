//! Tests for the `test-util` helpers.

#![cfg(feature = "test-util")]

use std::sync::atomic::Ordering;

use tandem::test_util::{CountingDeleter, DropLog};
use tandem::{SharedPtr, WeakPtr};

#[test]
fn test_drop_log_records_disposal_order() {
    let log = DropLog::new();
    let first = SharedPtr::new(log.track("first"));
    let second = SharedPtr::new(log.track("second"));
    let second_copy = second.clone();
    assert_eq!(first.label(), "first");

    drop(second);
    assert!(log.entries().is_empty());
    drop(first);
    drop(second_copy);
    assert_eq!(log.entries(), vec!["first", "second"]);
    assert_eq!(log.count("second"), 1);
}

#[test]
fn test_counting_deleter_counts_once() {
    let deleter = CountingDeleter::new();
    let calls = deleter.calls();
    let raw = Box::into_raw(Box::new(vec![1, 2, 3]));
    let ptr = unsafe { SharedPtr::from_raw_with_deleter(raw, deleter) };
    let weak = WeakPtr::from(&ptr);
    let copy = ptr.clone();

    drop(ptr);
    drop(copy);
    assert!(weak.expired());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    drop(weak);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
