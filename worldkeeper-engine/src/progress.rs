//! Progress decimation.
//!
//! Transport callbacks fire far more often than a chat line or console bar
//! should update. The adapter keeps percentages monotonic and drops updates
//! smaller than a minimum step, except the terminal 100%.

/// Minimum growth between reported percentages.
const DEFAULT_MIN_STEP: u8 = 5;

#[derive(Debug)]
pub struct ProgressAdapter {
    last: Option<u8>,
    min_step: u8,
}

impl Default for ProgressAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_STEP)
    }
}

impl ProgressAdapter {
    pub fn new(min_step: u8) -> Self {
        Self {
            last: None,
            min_step: min_step.max(1),
        }
    }

    /// Feed a raw percentage; returns the value to report, or `None` when the
    /// update is decimated. Regressions are dropped outright.
    pub fn update(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        match self.last {
            Some(last) if percent <= last => None,
            Some(last) if percent < 100 && percent - last < self.min_step => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    /// Map `current/total` into the `[lo, hi]` band of an overall operation.
    pub fn scaled(lo: u8, hi: u8, current: u64, total: u64) -> u8 {
        debug_assert!(lo <= hi);
        if total == 0 {
            return lo;
        }
        let span = u64::from(hi - lo);
        let offset = (current.min(total) * span) / total;
        lo + offset as u8
    }
}
