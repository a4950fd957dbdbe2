//! Capped exponential backoff between lookup attempts.
//!
//! Deliberately jitter-free so retry timing is reproducible in tests.

use std::time::Duration;

/// Returns how long to wait after the given failed attempt.
///
/// The wait grows as `base_secs ^ attempt`, capped at `cap_secs`.
/// `attempt` is 1-based: the first failure waits `base_secs ^ 1` seconds.
/// Overflow saturates, which the cap then clamps — callers keep `attempt`
/// bounded by a small retry budget anyway.
#[must_use]
pub const fn wait(attempt: u32, base_secs: u64, cap_secs: u64) -> Duration {
    let uncapped = base_secs.saturating_pow(attempt);
    let secs = if uncapped < cap_secs { uncapped } else { cap_secs };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_until_capped() {
        assert_eq!(wait(1, 3, 15), Duration::from_secs(3));
        assert_eq!(wait(2, 3, 15), Duration::from_secs(9));
        assert_eq!(wait(3, 3, 15), Duration::from_secs(15));
        assert_eq!(wait(4, 3, 15), Duration::from_secs(15));
    }

    #[test]
    fn monotonically_non_decreasing() {
        let mut previous = Duration::ZERO;
        for attempt in 1..=12 {
            let current = wait(attempt, 2, 30);
            assert!(current >= previous, "wait decreased at attempt {attempt}");
            previous = current;
        }
    }

    #[test]
    fn large_attempt_saturates_to_cap() {
        assert_eq!(wait(64, 10, 15), Duration::from_secs(15));
    }

    #[test]
    fn zero_cap_means_no_wait() {
        assert_eq!(wait(5, 3, 0), Duration::ZERO);
    }
}
