use std::thread;
use std::time::{Duration, Instant};

use crate::config::PollOptions;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deadline exceeded after {waited:?}")]
pub struct DeadlineExceeded {
    pub waited: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum PollError<E> {
    #[error(transparent)]
    Check(E),
    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Sleeps between checks of a condition, doubling the delay up to the
/// configured maximum and failing once the timeout is exhausted.
#[derive(Debug)]
pub struct Poller {
    options: PollOptions,
    started: Instant,
    interval: Duration,
}

impl Poller {
    pub fn new(options: PollOptions) -> Self {
        Self {
            options,
            started: Instant::now(),
            interval: options.initial_interval,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Waits before the next check. Never sleeps past the deadline.
    pub fn backoff(&mut self) -> Result<(), DeadlineExceeded> {
        let waited = self.elapsed();
        let delay = match self.options.timeout {
            Some(timeout) if waited >= timeout => return Err(DeadlineExceeded { waited }),
            Some(timeout) => self.interval.min(timeout - waited),
            None => self.interval,
        };

        tracing::trace!(?delay, ?waited, "condition not met yet");
        thread::sleep(delay);
        self.interval = (self.interval * 2).min(self.options.max_interval);
        Ok(())
    }
}

/// Runs `check` until it yields a value.
pub fn poll_until<T, E, F>(options: PollOptions, mut check: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    let mut poller = Poller::new(options);
    loop {
        if let Some(value) = check().map_err(PollError::Check)? {
            return Ok(value);
        }
        poller.backoff()?;
    }
}
