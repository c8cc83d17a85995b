use std::{num::NonZeroUsize, thread, time::Duration};

/// Suspends the caller between attempts.
pub trait Sleep {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A bounded, fixed-interval retry policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: NonZeroUsize,
    interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: NonZeroUsize, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn max_attempts(&self) -> NonZeroUsize {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Calls `f` until it returns `true` or the attempts are exhausted.
    ///
    /// The sleeper is called between attempts, never after the last one. Returns whether `f`
    /// succeeded.
    pub fn run<S, F>(&self, sleeper: &mut S, mut f: F) -> bool
    where
        S: Sleep + ?Sized,
        F: FnMut(usize) -> bool,
    {
        let max_attempts = self.max_attempts.get();

        for attempt in 1..=max_attempts {
            if f(attempt) {
                return true;
            }

            if attempt < max_attempts {
                sleeper.sleep(self.interval);
            }
        }

        false
    }
}

impl Default for RetryPolicy {
    /// Ten attempts, one second apart.
    fn default() -> Self {
        const MAX_ATTEMPTS: NonZeroUsize = match NonZeroUsize::new(10) {
            Some(n) => n,
            None => unreachable!(),
        };

        Self::new(MAX_ATTEMPTS, Duration::from_secs(1))
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSleep {
    pub(crate) durations: Vec<Duration>,
}

#[cfg(test)]
impl Sleep for RecordingSleep {
    fn sleep(&mut self, duration: Duration) {
        self.durations.push(duration);
    }
}
