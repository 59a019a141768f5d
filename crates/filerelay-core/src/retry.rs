// ── Bounded retry ────────────────────────────────────────────────────────────
//
// One combinator shared by download verification, upload and SFTP connection
// establishment. It never inspects errors itself: the caller decides what an
// acceptable outcome looks like.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_tries: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn immediate(max_tries: u32) -> Self {
        Self {
            max_tries: max_tries.max(1),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(max_tries: u32, delay: Duration) -> Self {
        Self {
            max_tries: max_tries.max(1),
            delay,
        }
    }
}

/// Outcome of [`attempt`]: the last value produced and how it was reached.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub tries: u32,
    /// Whether `value` satisfied the acceptance check.
    pub accepted: bool,
}

/// Run `op` until `accept` approves its output or the policy is exhausted.
/// `op` receives the 1-based attempt number.
pub async fn attempt<T, Op, Fut, Accept>(
    policy: RetryPolicy,
    mut op: Op,
    accept: Accept,
) -> Attempted<T>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    Accept: Fn(&T) -> bool,
{
    let max_tries = policy.max_tries.max(1);
    let mut tries = 0;
    loop {
        tries += 1;
        let value = op(tries).await;
        let accepted = accept(&value);
        if accepted || tries >= max_tries {
            return Attempted {
                value,
                tries,
                accepted,
            };
        }
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }
}
