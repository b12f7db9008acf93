use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

/// Display and success counters of one choice.
///
/// Updated with atomic increments; `success <= total` holds at all times
/// because a success is only counted while it stays below the displays.
#[derive(Debug, Default)]
pub struct Tally {
    total: AtomicU64,
    success: AtomicU64,
}

impl Tally {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Acquire)
    }

    pub(crate) fn displayed(&self) {
        self.total.fetch_add(1, Ordering::AcqRel);
    }

    /// Counts a success unless it would overtake the display count.
    pub(crate) fn try_succeed(&self) -> bool {
        self.success
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |success| {
                (success < self.total()).then_some(success + 1)
            })
            .is_ok()
    }

    pub(crate) fn clear(&self) {
        // success first so a reader never sees success > total
        self.success.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
    }

    fn restore(total: u64, success: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            success: AtomicU64::new(success.min(total)),
        }
    }
}

/// One recommendable option held by a [`Coordinator`](crate::Coordinator).
///
/// The value never changes. The identifier is renewed whenever the
/// coordinator's statistics are reset, and the lever index follows the
/// choice's position in the coordinator's list.
#[derive(Debug)]
pub struct Choice<T> {
    value: T,
    id: Mutex<Uuid>,
    index: AtomicUsize,
    tally: Tally,
}

impl<T> Choice<T> {
    pub(crate) fn new(value: T, index: usize) -> Self {
        Self {
            value,
            id: Mutex::new(Uuid::new_v4()),
            index: AtomicUsize::new(index),
            tally: Tally::default(),
        }
    }

    pub(crate) fn restored(id: Uuid, value: T, index: usize, total: u64, success: u64) -> Self {
        Self {
            value,
            id: Mutex::new(id),
            index: AtomicUsize::new(index),
            tally: Tally::restore(total, success),
        }
    }

    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        *self.id.lock()
    }

    /// Current lever index in the coordinator's strategy.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.tally.total()
    }

    #[must_use]
    pub fn success(&self) -> u64 {
        self.tally.success()
    }

    #[must_use]
    pub fn failure(&self) -> u64 {
        self.total().saturating_sub(self.success())
    }

    /// Success ratio, `None` while the choice has never been displayed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> Option<f64> {
        let success = self.success();
        match self.total() {
            0 => None,
            total => Some(success as f64 / total as f64),
        }
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Release);
    }

    pub(crate) fn renew_id(&self) {
        *self.id.lock() = Uuid::new_v4();
    }
}
