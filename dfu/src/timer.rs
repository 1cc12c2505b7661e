use std::{
    thread,
    time::{Duration, Instant},
};

use crate::{CancelToken, DfuError, cancel::CANCEL_SLICE};

/// Drift-corrected interval wait
///
/// Each [IntervalTimer::wait] is measured from the instant the previous one
/// actually returned, so the error of a call does not carry over into the
/// next one.
#[derive(Debug)]
pub struct IntervalTimer {
    last: Instant,
    cancel: CancelToken,
}

impl IntervalTimer {
    pub fn new(cancel: CancelToken) -> Self {
        IntervalTimer {
            last: Instant::now(),
            cancel,
        }
    }

    /// Use the current time as baseline for the next wait
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Instant the last wait returned (or the timer was reset)
    pub fn last(&self) -> Instant {
        self.last
    }

    /// Block until at least `min` has elapsed since the baseline
    pub fn wait(&mut self, min: Duration) -> Result<(), DfuError> {
        let target = self.last + min;
        loop {
            self.cancel.check()?;
            let now = Instant::now();
            if now >= target {
                self.last = now;
                return Ok(());
            }
            thread::sleep((target - now).min(CANCEL_SLICE));
        }
    }
}
