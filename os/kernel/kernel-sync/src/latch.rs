use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// One-shot readiness flag.
///
/// Starts lowered, is raised exactly once by its owner and never lowered
/// again. Raising publishes every write the owner made before it; a poller
/// that observes the flag raised also observes those writes.
///
/// ```rust
/// # use kernel_sync::Latch;
/// let ready = Latch::new();
/// assert!(!ready.is_set());
/// assert!(!ready.set());
/// assert!(ready.set(), "second raise reports the earlier one");
/// ready.spin_until_set();
/// ```
#[derive(Debug, Default)]
pub struct Latch {
    raised: AtomicBool,
}

/// A bounded wait on a [`Latch`] ran out of spins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("latch still lowered after {spins} spins")]
pub struct SpinTimeout {
    pub spins: u64,
}

impl Latch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
        }
    }

    /// Raise the flag. Returns whether it had already been raised.
    #[inline]
    pub fn set(&self) -> bool {
        self.raised.swap(true, Ordering::AcqRel)
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Spin until the flag is raised. There is no timeout.
    #[inline]
    pub fn spin_until_set(&self) {
        while !self.is_set() {
            spin_loop();
        }
    }

    /// Spin at most `budget` polls.
    ///
    /// # Errors
    /// [`SpinTimeout`] if the flag was still lowered after `budget` polls.
    pub fn spin_until_set_or(&self, budget: u64) -> Result<(), SpinTimeout> {
        for _ in 0..budget {
            if self.is_set() {
                return Ok(());
            }
            spin_loop();
        }
        if self.is_set() {
            Ok(())
        } else {
            Err(SpinTimeout { spins: budget })
        }
    }

    /// Spin until raised, calling `report` with the total number of polls
    /// every `interval` polls. Still waits forever.
    pub fn spin_until_set_reporting(&self, interval: u64, mut report: impl FnMut(u64)) {
        let interval = interval.max(1);
        let mut spins = 0u64;
        while let Err(timeout) = self.spin_until_set_or(interval) {
            spins = spins.wrapping_add(timeout.spins);
            report(spins);
        }
    }
}
