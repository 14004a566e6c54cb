use rand::{Rng, RngCore};
use std::time::Duration;

/// "Equal jitter": the delay lands in `[backoff/2, backoff]`.
pub(crate) fn jittered_backoff(rng: &mut impl RngCore, backoff: Duration) -> Duration {
    let backoff_ms = backoff.as_millis() as u64;
    if backoff_ms <= 1 {
        return backoff;
    }
    let half_ms = backoff_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}

/// Delay before attempt `attempt` (1-based) of an exponential schedule capped at `max`.
pub(crate) fn exponential(initial: Duration, max: Duration, attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    initial.saturating_mul(1u32 << shift).min(max)
}
