//! # Jitter policy for restart delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that a fleet of
//! warden instances sharing a host does not restart crashed servers in
//! lockstep.
//!
//! - [`JitterPolicy::None`] — no randomization, predictable delays
//! - [`JitterPolicy::Full`] — random delay in `[0, base]`
//! - [`JitterPolicy::Equal`] — delay = `base/2 + random[0, base/2]`

use std::time::Duration;

use rand::Rng;

/// Policy controlling randomization of restart delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use the exact backoff delay.
    #[default]
    None,

    /// Full jitter: random delay in `[0, base]`.
    Full,

    /// Equal jitter: `base/2 + random[0, base/2]`.
    ///
    /// Preserves at least half of the computed delay.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Self::full_jitter(delay),
            JitterPolicy::Equal => Self::equal_jitter(delay),
        }
    }

    fn full_jitter(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(0..=ms))
    }

    fn equal_jitter(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let half = ms / 2;
        let mut rng = rand::rng();
        let jitter = if half == 0 { 0 } else { rng.random_range(0..=half) };
        Duration::from_millis(half + jitter)
    }
}
