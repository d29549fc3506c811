//! Reconnecting wrapper for progress streams
//!
//! Transport-level concern only: when an upstream stream drops before its
//! terminal item, reconnect with exponential backoff. A fresh upstream may
//! replay or even rewind state, so only items that move past the last
//! delivered one are passed through.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::{stream, Stream, StreamExt};
use tracing::{debug, warn};

use crate::models::PhaseEvent;

/// Items a resumable stream carries
pub trait Resumable {
    /// No further items follow this one
    fn is_terminal(&self) -> bool;

    /// `self` moves past `last`. Replays and rewinds after a reconnect
    /// return false.
    fn supersedes(&self, last: &Self) -> bool;
}

impl Resumable for PhaseEvent {
    fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    fn supersedes(&self, last: &Self) -> bool {
        self.phase.rank() > last.phase.rank()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(15),
            max_attempts: Some(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

struct ReconnectState<F, S, T> {
    connect: F,
    current: Option<S>,
    last: Option<T>,
    failures: u32,
    done: bool,
}

/// Wrap a connection factory into a single logical stream.
///
/// `connect` is called again whenever the current stream ends without a
/// terminal item or fails to open. The combined stream ends after a terminal
/// item or once the backoff policy gives up.
pub fn reconnecting<T, S, E, F, Fut>(connect: F, policy: BackoffPolicy) -> impl Stream<Item = T>
where
    T: Resumable + Clone,
    S: Stream<Item = T> + Unpin,
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, E>>,
{
    let state = ReconnectState {
        connect,
        current: None,
        last: None,
        failures: 0,
        done: false,
    };

    stream::unfold(state, move |mut st| async move {
        loop {
            if st.done {
                return None;
            }

            let Some(upstream) = st.current.as_mut() else {
                if st.failures > 0 {
                    tokio::time::sleep(policy.delay(st.failures)).await;
                }
                match (st.connect)().await {
                    Ok(upstream) => {
                        debug!(attempt = st.failures + 1, "Stream connected");
                        st.current = Some(upstream);
                    }
                    Err(e) => {
                        st.failures += 1;
                        warn!(error = %e, failures = st.failures, "Stream connection failed");
                        if policy.exhausted(st.failures) {
                            return None;
                        }
                    }
                }
                continue;
            };

            match upstream.next().await {
                Some(item) => {
                    st.failures = 0;
                    if st.last.as_ref().is_some_and(|last| !item.supersedes(last)) {
                        debug!("Dropping item that does not advance past the last one");
                        continue;
                    }
                    st.done = item.is_terminal();
                    st.last = Some(item.clone());
                    return Some((item, st));
                }
                None => {
                    st.current = None;
                    st.failures += 1;
                    warn!(failures = st.failures, "Stream ended before a terminal item, reconnecting");
                    if policy.exhausted(st.failures) {
                        return None;
                    }
                }
            }
        }
    })
}
