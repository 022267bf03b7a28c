//! Exponential backoff with jitter, and a deadline-bounded retry loop built
//! on it.

use std::time::{Duration, Instant};

use rand::Rng;

/// Capped exponential delays with up to 10% random jitter on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay after the `attempt`-th failure (1-based): `base` doubled per
    /// earlier failure, capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_ms = (capped.as_millis() / 10) as u64;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

/// Outcome of a single attempt inside [`retry_until`].
pub enum Attempt<T, E> {
    Done(T),
    /// Transient failure; try again if the deadline allows.
    Retry(E),
    /// Permanent failure; give up immediately.
    Fail(E),
}

/// Why [`retry_until`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed permanently.
    Failed(E),
    /// The deadline passed; carries the last transient error.
    TimedOut(E),
}

/// Run `op` until it succeeds, fails permanently, or `budget` elapses.
///
/// Sleeps on the calling thread between attempts, so this is for the
/// supervisor's synchronous control path only.
pub fn retry_until<T, E, F>(budget: Duration, backoff: Backoff, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Attempt<T, E>,
{
    let deadline = Instant::now() + budget;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op() {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(err) => return Err(RetryError::Failed(err)),
            Attempt::Retry(err) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RetryError::TimedOut(err));
                }
                let delay = backoff.delay(attempt).min(deadline - now);
                std::thread::sleep(delay);
            }
        }
    }
}
