/*!
Bounded retry combinator.

An operation reports each attempt as an explicit [`Attempt`]; the policy
decides whether to run the recovery step and try again.
*/

use ptz_shared::{BridgeError, Result};
use std::thread;
use std::time::Duration;
use tracing::{error, warn};

/// Outcome of a single attempt
#[derive(Debug)]
pub enum Attempt<T> {
    /// Finished, stop retrying
    Done(T),
    /// Failed in a way another attempt may fix
    Retry(BridgeError),
    /// Failed in a way retrying cannot fix
    Fatal(BridgeError),
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `op` against `target` up to `attempts` times.
    ///
    /// After every retryable failure except the last, `recover` runs (for a
    /// camera link: a full reconnect) and the policy sleeps for `delay`. A
    /// failing `recover` counts as the outcome of that attempt.
    pub fn run<S, T>(
        &self,
        target: &mut S,
        mut op: impl FnMut(&mut S) -> Attempt<T>,
        mut recover: impl FnMut(&mut S, &BridgeError) -> Result<()>,
    ) -> Result<T> {
        let mut last = BridgeError::NoResponse;

        for attempt in 1..=self.attempts {
            match op(target) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retry(err) => {
                    warn!("Attempt {}/{} failed: {}", attempt, self.attempts, err);
                    if attempt < self.attempts {
                        if let Err(recover_err) = recover(target, &err) {
                            warn!("Recovery after attempt {} failed: {}", attempt, recover_err);
                            last = recover_err;
                        } else {
                            last = err;
                        }
                        if !self.delay.is_zero() {
                            thread::sleep(self.delay);
                        }
                    } else {
                        last = err;
                    }
                }
            }
        }

        error!("Giving up after {} attempts: {}", self.attempts, last);
        Err(BridgeError::CommandFailed {
            attempts: self.attempts,
            last: Box::new(last),
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        attempts: u32,
        recoveries: u32,
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[test]
    fn test_success_after_retries() {
        let mut counter = Counter::default();
        let value = policy()
            .run(
                &mut counter,
                |c| {
                    c.attempts += 1;
                    if c.attempts < 3 {
                        Attempt::Retry(BridgeError::NoResponse)
                    } else {
                        Attempt::Done(c.attempts)
                    }
                },
                |c, _| {
                    c.recoveries += 1;
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(counter.recoveries, 2);
    }

    #[test]
    fn test_exhaustion_reports_attempts() {
        let mut counter = Counter::default();
        let err = policy()
            .run(
                &mut counter,
                |c| -> Attempt<()> {
                    c.attempts += 1;
                    Attempt::Retry(BridgeError::connection("socket gone"))
                },
                |c, _| {
                    c.recoveries += 1;
                    Ok(())
                },
            )
            .unwrap_err();

        assert_eq!(counter.attempts, 3);
        assert_eq!(counter.recoveries, 2);
        match err {
            BridgeError::CommandFailed { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, BridgeError::ConnectionFault(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fatal_stops_immediately() {
        let mut counter = Counter::default();
        let err = policy()
            .run(
                &mut counter,
                |c| -> Attempt<()> {
                    c.attempts += 1;
                    Attempt::Fatal(BridgeError::invalid_parameter("speed"))
                },
                |c, _| {
                    c.recoveries += 1;
                    Ok(())
                },
            )
            .unwrap_err();

        assert!(matches!(err, BridgeError::InvalidParameter(_)));
        assert_eq!(counter.attempts, 1);
        assert_eq!(counter.recoveries, 0);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let mut counter = Counter::default();
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let result = policy.run(
            &mut counter,
            |c| {
                c.attempts += 1;
                Attempt::Done(())
            },
            |_, _| Ok(()),
        );
        assert!(result.is_ok());
        assert_eq!(counter.attempts, 1);
    }
}
