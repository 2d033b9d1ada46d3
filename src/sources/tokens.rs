//! Rotating pool of API tokens for a rate-limited upstream.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub hash: String,
    /// `None` means usable now.
    pub retry_after: Option<Instant>,
}

impl Credential {
    pub fn is_usable(&self, now: Instant) -> bool {
        self.retry_after.map_or(true, |deadline| deadline <= now)
    }
}

#[derive(Debug)]
struct PoolState {
    tokens: Vec<Credential>,
    current: usize,
}

/// Token rotation state behind a mutex. The guard is never held across an await.
#[derive(Debug)]
pub struct TokenPool {
    state: Mutex<PoolState>,
}

impl TokenPool {
    /// Returns `None` for an empty token list.
    pub fn new<I, S>(hashes: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<Credential> = hashes
            .into_iter()
            .map(|h| Credential { hash: h.into(), retry_after: None })
            .collect();
        if tokens.is_empty() {
            return None;
        }
        Some(Self { state: Mutex::new(PoolState { tokens, current: 0 }) })
    }

    /// Pick a credential to use now.
    ///
    /// Starting at the rotation pointer, the first credential out of cooldown wins and becomes
    /// current. A single cooling credential is slept out and then returned. With several
    /// credentials all cooling, the current one is returned without waiting; callers check
    /// `retry_after` themselves.
    pub async fn acquire(&self) -> Credential {
        let wait_until = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let len = state.tokens.len();
            let usable = (0..len)
                .map(|offset| (state.current + offset) % len)
                .find(|&idx| state.tokens[idx].is_usable(now));

            match usable {
                Some(idx) => {
                    state.current = idx;
                    state.tokens[idx].retry_after = None;
                    return state.tokens[idx].clone();
                }
                None if len > 1 => return state.tokens[state.current].clone(),
                None => state.tokens[0].retry_after,
            }
        };

        if let Some(deadline) = wait_until {
            tracing::debug!(wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64, "single token cooling down, waiting");
            sleep_until(deadline).await;
        }

        let mut state = self.state.lock();
        state.tokens[0].retry_after = None;
        state.tokens[0].clone()
    }

    /// Put `credential` in cooldown for `retry_after` and advance the rotation pointer past it.
    pub fn mark_exceeded(&self, credential: &Credential, retry_after: Duration) {
        let mut state = self.state.lock();
        let len = state.tokens.len();
        let idx = state
            .tokens
            .iter()
            .position(|t| t.hash == credential.hash)
            .unwrap_or(state.current);
        state.tokens[idx].retry_after = Some(Instant::now() + retry_after);
        state.current = (idx + 1) % len;
    }
}
