//! Retry policies for backoff loops.
//!
//! A [`RetryPolicy`] is plain configuration; turn it into a [`RetryIter`] to
//! get the sequence of delays to wait between attempts. The iterator yields
//! `None` once the policy's attempt budget is spent.
//!
//! ```rust
//! use std::time::Duration;
//! use common::RetryPolicy;
//!
//! let policy = RetryPolicy::exponential(
//!     Duration::from_millis(50),
//!     1.5,
//!     Some(10),
//!     Some(Duration::from_secs(30)),
//! );
//!
//! let mut retries = policy.into_iter();
//! while let Some(delay) = retries.next() {
//!     // attempt the operation, break on success, otherwise sleep for `delay`
//! #   let _ = delay;
//! #   break;
//! }
//! ```

use std::borrow::Cow;
use std::cmp;
use std::num::NonZeroUsize;
use std::time::Duration;

use rand::Rng;

const DEFAULT_JITTER_MULTIPLIER: f32 = 0.3;

// Jitter always adds at least this much so delays avoid round values.
const MIN_JITTER: Duration = Duration::from_millis(3);

/// Policy describing how long to wait between attempts and when to give up.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case"
)]
pub enum RetryPolicy {
    /// Never retry.
    #[default]
    None,
    /// Wait the same interval before every retry.
    FixedDelay {
        /// Parsed with [`humantime`], e.g. `100ms`.
        #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
        interval: humantime::Duration,
        /// Infinite retries if unset.
        #[serde(default)]
        max_attempts: Option<NonZeroUsize>,
    },
    /// Wait `min(previous * factor, max_interval)`, starting from `initial_interval`.
    Exponential {
        #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
        initial_interval: humantime::Duration,
        factor: f32,
        /// Infinite retries if unset.
        #[serde(default)]
        max_attempts: Option<NonZeroUsize>,
        #[serde(
            default,
            with = "serde_with::As::<Option<serde_with::DisplayFromStr>>"
        )]
        max_interval: Option<humantime::Duration>,
    },
}

impl RetryPolicy {
    pub fn fixed_delay(interval: Duration, max_attempts: Option<usize>) -> Self {
        Self::FixedDelay {
            interval: interval.into(),
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
        }
    }

    pub fn exponential(
        initial_interval: Duration,
        factor: f32,
        max_attempts: Option<usize>,
        max_interval: Option<Duration>,
    ) -> Self {
        Self::Exponential {
            initial_interval: initial_interval.into(),
            factor,
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
            max_interval: max_interval.map(Into::into),
        }
    }

    /// Returns this policy with its attempt bound replaced by `max_attempts`.
    ///
    /// `None` keeps retrying forever. [`RetryPolicy::None`] is returned as-is.
    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        match &mut self {
            RetryPolicy::None => {}
            RetryPolicy::FixedDelay {
                max_attempts: bound,
                ..
            }
            | RetryPolicy::Exponential {
                max_attempts: bound,
                ..
            } => *bound = max_attempts.and_then(NonZeroUsize::new),
        }
        self
    }

    pub fn max_attempts(&self) -> Option<NonZeroUsize> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay { max_attempts, .. }
            | RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    pub fn iter(&self) -> RetryIter<'_> {
        RetryIter {
            policy: Cow::Borrowed(self),
            attempts: 0,
            last_retry: None,
            jitter: true,
        }
    }
}

impl IntoIterator for RetryPolicy {
    type Item = Duration;
    type IntoIter = RetryIter<'static>;

    fn into_iter(self) -> Self::IntoIter {
        RetryIter {
            policy: Cow::Owned(self),
            attempts: 0,
            last_retry: None,
            jitter: true,
        }
    }
}

/// Iterator over the delays of a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryIter<'a> {
    policy: Cow<'a, RetryPolicy>,
    attempts: usize,
    last_retry: Option<Duration>,
    jitter: bool,
}

impl RetryIter<'_> {
    /// Disables the random jitter added on top of every delay.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// The un-jittered value of the last delay handed out.
    pub fn last_retry(&self) -> Option<Duration> {
        self.last_retry
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter {
            with_jitter(delay, DEFAULT_JITTER_MULTIPLIER)
        } else {
            delay
        }
    }
}

impl Iterator for RetryIter<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.attempts += 1;
        match self.policy.as_ref() {
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay {
                interval,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|limit| self.attempts > limit.get()) {
                    None
                } else {
                    self.last_retry = Some(**interval);
                    Some(self.apply_jitter(**interval))
                }
            }
            RetryPolicy::Exponential {
                initial_interval,
                factor,
                max_attempts,
                max_interval,
            } => {
                if max_attempts.is_some_and(|limit| self.attempts > limit.get()) {
                    return None;
                }
                let delay = match self.last_retry {
                    Some(last) => {
                        let grown =
                            Duration::try_from_secs_f64(last.as_secs_f64() * f64::from(*factor))
                                .unwrap_or(Duration::MAX);
                        let cap = max_interval.as_ref().map_or(Duration::MAX, |max| **max);
                        cmp::min(grown, cap)
                    }
                    None => **initial_interval,
                };
                self.last_retry = Some(delay);
                Some(self.apply_jitter(delay))
            }
        }
    }
}

/// Adds a random delay between 3ms and `max_multiplier * duration`.
pub fn with_jitter(duration: Duration, max_multiplier: f32) -> Duration {
    let max_jitter = duration.mul_f32(max_multiplier);
    if max_jitter <= MIN_JITTER {
        duration.saturating_add(MIN_JITTER)
    } else {
        let jitter = rand::rng().random_range(MIN_JITTER..max_jitter);
        duration.saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_never_retry_with_none_policy() {
        assert_eq!(
            Vec::<Duration>::new(),
            RetryPolicy::None.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn should_yield_fixed_delays_up_to_max_attempts() {
        // given
        let policy = RetryPolicy::fixed_delay(Duration::from_millis(100), Some(4));

        // when
        let delays: Vec<_> = policy.into_iter().without_jitter().collect();

        // then
        assert_eq!(delays, vec![Duration::from_millis(100); 4]);
    }

    #[test]
    fn should_grow_exponentially_and_cap_at_max_interval() {
        // given
        let policy = RetryPolicy::exponential(
            Duration::from_millis(100),
            2.0,
            Some(6),
            Some(Duration::from_millis(1000)),
        );

        // when
        let delays: Vec<_> = policy.into_iter().without_jitter().collect();

        // then
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1000),
                Duration::from_millis(1000),
            ]
        );
    }

    #[test]
    fn should_keep_yielding_without_max_attempts() {
        // given
        let policy = RetryPolicy::exponential(
            Duration::from_millis(10),
            1.5,
            None,
            Some(Duration::from_secs(1)),
        );

        // when
        let mut iter = policy.into_iter();
        let taken = iter.by_ref().take(1_000).count();

        // then
        assert_eq!(taken, 1_000);
        assert_eq!(iter.last_retry(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn should_add_bounded_jitter() {
        // given
        let base = Duration::from_millis(100);
        let policy = RetryPolicy::fixed_delay(base, Some(50));

        // when/then
        for delay in policy.into_iter() {
            assert!(delay >= base + MIN_JITTER);
            assert!(delay <= base + base.mul_f32(DEFAULT_JITTER_MULTIPLIER));
        }
    }

    #[test]
    fn should_count_attempts() {
        // given
        let policy = RetryPolicy::fixed_delay(Duration::from_millis(1), Some(2));
        let mut iter = policy.iter();

        // when
        iter.next();
        iter.next();
        let exhausted = iter.next();

        // then
        assert!(exhausted.is_none());
        assert_eq!(iter.attempts(), 3);
    }

    #[test]
    fn should_deserialize_exponential_policy_from_yaml() {
        // given
        let yaml = r#"
type: exponential
initial-interval: 50ms
factor: 1.5
max-interval: 30s
"#;

        // when
        let policy: RetryPolicy = serde_yaml::from_str(yaml).unwrap();

        // then
        assert_eq!(
            policy,
            RetryPolicy::exponential(
                Duration::from_millis(50),
                1.5,
                None,
                Some(Duration::from_secs(30))
            )
        );
    }

    #[test]
    fn should_serialize_intervals_in_humantime_format() {
        // given
        let policy = RetryPolicy::fixed_delay(Duration::from_millis(250), Some(3));

        // when
        let yaml = serde_yaml::to_string(&policy).unwrap();
        let parsed: RetryPolicy = serde_yaml::from_str(&yaml).unwrap();

        // then
        assert!(yaml.contains("interval: 250ms"));
        assert_eq!(parsed, policy);
    }

    #[test]
    fn should_reject_unparseable_interval() {
        let yaml = "type: fixed-delay\ninterval: soon\n";
        assert!(serde_yaml::from_str::<RetryPolicy>(yaml).is_err());
    }

    #[test]
    fn should_replace_attempt_bound_and_keep_delays() {
        // given
        let policy = RetryPolicy::exponential(
            Duration::from_millis(50),
            1.5,
            None,
            Some(Duration::from_secs(30)),
        );

        // when
        let bounded = policy.clone().with_max_attempts(Some(2));

        // then
        assert_eq!(bounded.max_attempts().map(NonZeroUsize::get), Some(2));
        assert_eq!(bounded.clone().with_max_attempts(None), policy);
        assert_eq!(bounded.into_iter().without_jitter().count(), 2);
        assert_eq!(RetryPolicy::None.with_max_attempts(Some(5)), RetryPolicy::None);
    }
}
