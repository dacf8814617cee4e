//! Retry policy and backoff computation.
//!
//! The retry loop is an explicit state machine (attempt → wait → attempt,
//! or give up) so its decisions are testable without real delays. Waiting
//! itself goes through the [`Sleeper`] trait, which tests replace with a
//! recording no-op.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use zenrag_shared::ZenragError;

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Abstraction over backoff waiting, so tests run without real delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(delay))
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Exponential backoff policy: `base * 2^attempt`, capped, with up to 25%
/// additive jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Decide what happens after a failed attempt. `attempt` is zero-based:
    /// attempt 0 is the initial request.
    ///
    /// Non-retryable errors and an exhausted budget both end the loop; a
    /// server-provided `Retry-After` overrides the computed backoff.
    pub fn next_step(&self, attempt: u32, error: &ZenragError) -> RetryStep {
        if !error.is_retryable() || attempt >= self.max_retries {
            return RetryStep::GiveUp;
        }

        if let ZenragError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            return RetryStep::Wait(Duration::from_secs(*secs));
        }

        RetryStep::Wait(self.backoff_delay(attempt))
    }

    /// Computed backoff for the given zero-based attempt, jittered.
    /// `max_delay` is a hard ceiling, jitter included.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        (exp + jitter(exp / 4)).min(self.max_delay)
    }
}

/// The state the retry loop moves to after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait, then re-attempt.
    Wait(Duration),
    /// Budget exhausted or the error is final; surface it to the caller.
    GiveUp,
}

/// Uniform random duration in `[0, max)`. Zero `max` yields zero jitter.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut buf = [0u8; 8];
    // Entropy failure here is effectively impossible; fall back to no jitter.
    if getrandom::fill(&mut buf).is_err() {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from_le_bytes(buf) % max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(10))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        for (attempt, base_ms) in [(0u32, 100u64), (1, 200), (2, 400), (3, 800)] {
            let d = p.backoff_delay(attempt).as_millis() as u64;
            // Base delay plus at most 25% jitter.
            assert!(d >= base_ms, "attempt {attempt}: {d}ms < {base_ms}ms");
            assert!(d <= base_ms + base_ms / 4, "attempt {attempt}: {d}ms too large");
        }

        // Far past the cap: pinned to max_delay exactly.
        assert_eq!(p.backoff_delay(20), Duration::from_secs(10));
    }

    #[test]
    fn jittered_delay_never_exceeds_cap() {
        // 900ms base with 25% jitter would overshoot a 1s cap without the
        // final clamp.
        let p = RetryPolicy::new(10, Duration::from_millis(900), Duration::from_secs(1));
        for attempt in 0..10 {
            assert!(p.backoff_delay(attempt) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn retryable_error_waits_until_budget_exhausted() {
        let p = policy();
        let err = ZenragError::Network("timeout".into());
        assert!(matches!(p.next_step(0, &err), RetryStep::Wait(_)));
        assert!(matches!(p.next_step(2, &err), RetryStep::Wait(_)));
        assert_eq!(p.next_step(3, &err), RetryStep::GiveUp);
    }

    #[test]
    fn fatal_error_gives_up_immediately() {
        let p = policy();
        assert_eq!(
            p.next_step(0, &ZenragError::Auth("bad token".into())),
            RetryStep::GiveUp
        );
        assert_eq!(
            p.next_step(0, &ZenragError::NotFound("workspace".into())),
            RetryStep::GiveUp
        );
        assert_eq!(
            p.next_step(0, &ZenragError::MalformedResponse("not json".into())),
            RetryStep::GiveUp
        );
    }

    #[test]
    fn retry_after_overrides_computed_backoff() {
        let p = policy();
        let err = ZenragError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(p.next_step(0, &err), RetryStep::Wait(Duration::from_secs(30)));
    }

    #[test]
    fn rate_limit_without_header_uses_backoff() {
        let p = policy();
        let err = ZenragError::RateLimited {
            retry_after_secs: None,
        };
        match p.next_step(1, &err) {
            RetryStep::Wait(d) => {
                let ms = d.as_millis() as u64;
                assert!((200..=250).contains(&ms));
            }
            RetryStep::GiveUp => panic!("expected a wait"),
        }
    }
}
