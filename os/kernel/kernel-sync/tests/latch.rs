use kernel_sync::{Latch, SpinTimeout};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn raises_exactly_once() {
    let latch = Latch::new();
    assert!(!latch.is_set());
    assert!(!latch.set());
    assert!(latch.is_set());
    assert!(latch.set());
    assert!(latch.is_set(), "never lowered again");
}

#[test]
fn bounded_wait_times_out_on_lowered_latch() {
    let latch = Latch::new();
    assert_eq!(latch.spin_until_set_or(1_000), Err(SpinTimeout { spins: 1_000 }));
    latch.set();
    assert_eq!(latch.spin_until_set_or(0), Ok(()));
}

#[test]
fn raise_publishes_prior_writes() {
    let latch = Latch::new();
    let payload = AtomicU64::new(0);

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            payload.store(0xC0FFEE, Ordering::Relaxed);
            latch.set();
        });
        latch.spin_until_set();
        assert_eq!(payload.load(Ordering::Relaxed), 0xC0FFEE);
    });
}

#[test]
fn reporting_wait_reports_and_still_completes() {
    let latch = Latch::new();
    let reports = AtomicU64::new(0);

    thread::scope(|s| {
        s.spawn(|| {
            while reports.load(Ordering::Relaxed) < 2 {
                thread::yield_now();
            }
            latch.set();
        });
        latch.spin_until_set_reporting(100, |spins| {
            assert_eq!(spins % 100, 0);
            reports.fetch_add(1, Ordering::Relaxed);
        });
    });
    assert!(reports.load(Ordering::Relaxed) >= 2);
}
