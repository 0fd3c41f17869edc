//! Iterative-deepening evaluation poller.
//!
//! A poll asks the service for the same position at increasing depth until
//! the rounded normalized score has been identical for
//! [`stabilization_count`](PollConfig::stabilization_count) answers in a row,
//! the iteration cap is reached, a request fails, or a newer poll replaces
//! it. Every answer is published immediately through a
//! [`watch`] channel so the display can follow along.
//!
//! Only one session is ever current. Starting a poll for a different
//! position cancels the running one; its token stops matching and anything
//! it receives afterwards is dropped instead of published. A poll for the
//! position that is already being polled is rejected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, EvaluationCache};
use crate::client::EvaluationService;
use crate::config::PollConfig;
use crate::error::EvalError;
use crate::score::{normalize, tenths};
use crate::types::{EvaluationResult, PositionKey};

/// What the display should currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum Published {
    /// A poll has started and nothing has arrived yet.
    Pending,
    /// The last poll ended without any result.
    NoData,
    Score {
        result: EvaluationResult,
        normalized: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling {
        position: PositionKey,
        depth: u32,
        stable_count: u32,
    },
}

#[derive(Debug)]
pub enum AbortReason {
    Error(EvalError),
    /// `max_iterations` requests went by without the score settling.
    IterationLimit,
}

#[derive(Debug)]
pub enum PollOutcome {
    /// Served from the cache; no request was made.
    Cached(EvaluationResult),
    Stabilized(EvaluationResult),
    Aborted {
        reason: AbortReason,
        last: Option<EvaluationResult>,
    },
    /// Replaced by a newer poll or cancelled; nothing more was published.
    Superseded,
    /// The same key is already being polled.
    AlreadyPolling,
}

struct ActiveSession {
    token: u64,
    key: CacheKey,
    cancel: CancellationToken,
    depth: u32,
    stable_count: u32,
}

pub struct EvaluationPoller<S> {
    service: S,
    config: PollConfig,
    cache: Mutex<EvaluationCache>,
    published: watch::Sender<Published>,
    active: Mutex<Option<ActiveSession>>,
    next_token: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: EvaluationService> EvaluationPoller<S> {
    pub fn new(service: S, config: PollConfig, cache: EvaluationCache) -> Self {
        let (published, _) = watch::channel(Published::NoData);
        Self {
            service,
            config,
            cache: Mutex::new(cache),
            published,
            active: Mutex::new(None),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<Published> {
        self.published.subscribe()
    }

    pub fn published(&self) -> Published {
        self.published.borrow().clone()
    }

    pub fn state(&self) -> PollState {
        match &*lock(&self.active) {
            None => PollState::Idle,
            Some(s) => PollState::Polling {
                position: s.key.position.clone(),
                depth: s.depth,
                stable_count: s.stable_count,
            },
        }
    }

    pub fn cached(&self, key: &CacheKey) -> Option<EvaluationResult> {
        lock(&self.cache).get(key)
    }

    /// Abandon the running session, if any. The display keeps its value.
    pub fn cancel(&self) {
        if let Some(session) = lock(&self.active).take() {
            debug!(fen = %session.key.position, "cancelling evaluation poll");
            session.cancel.cancel();
        }
    }

    /// Cancel any session and forget every cached evaluation. Used when a
    /// new game starts or a different game is loaded.
    pub fn invalidate(&self) {
        self.cancel();
        lock(&self.cache).clear();
        self.published.send_replace(Published::NoData);
    }

    /// Poll `key` until it settles. Never returns service errors as `Err`;
    /// they end the session and are reported in the outcome.
    pub async fn poll(&self, key: CacheKey) -> PollOutcome {
        let (token, cancel) = {
            let mut active = lock(&self.active);
            if let Some(session) = active.as_ref() {
                if session.key == key {
                    debug!(fen = %key.position, "poll already running, ignoring request");
                    return PollOutcome::AlreadyPolling;
                }
            }
            if let Some(old) = active.take() {
                debug!(fen = %old.key.position, "superseding running evaluation poll");
                old.cancel.cancel();
            }

            if let Some(result) = lock(&self.cache).get(&key) {
                debug!(fen = %key.position, depth = result.depth, "evaluation served from cache");
                self.published.send_replace(self.score(result));
                return PollOutcome::Cached(result);
            }

            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            *active = Some(ActiveSession {
                token,
                key: key.clone(),
                cancel: cancel.clone(),
                depth: self.config.starting_depth.max(1),
                stable_count: 0,
            });
            self.published.send_replace(Published::Pending);
            (token, cancel)
        };

        info!(fen = %key.position, ply = ?key.ply, "starting evaluation poll");
        self.run(token, &key, &cancel).await
    }

    async fn run(&self, token: u64, key: &CacheKey, cancel: &CancellationToken) -> PollOutcome {
        let mut depth = self.config.starting_depth.max(1);
        let mut previous: Option<i32> = None;
        let mut run_length = 0;
        let mut last = None;

        for _ in 0..self.config.max_iterations {
            let request = self.service.request_evaluation(&key.position, depth, cancel);
            let answer = match tokio::time::timeout(self.config.request_timeout, request).await {
                Ok(answer) => answer,
                Err(_) => Err(EvalError::Timeout(self.config.request_timeout)),
            };

            let result = match answer {
                Ok(result) => result,
                Err(e) => return self.abort(token, key, AbortReason::Error(e), last),
            };

            let normalized = normalize(&result, self.config.mate_scaling);
            let rounded = tenths(normalized);
            if previous == Some(rounded) {
                run_length += 1;
            } else {
                previous = Some(rounded);
                run_length = 1;
            }

            {
                let mut active = lock(&self.active);
                let Some(session) = active.as_mut().filter(|s| s.token == token) else {
                    debug!(fen = %key.position, depth, "discarding late evaluation");
                    return PollOutcome::Superseded;
                };
                session.depth = depth;
                session.stable_count = run_length;
                self.published.send_replace(self.score(result));
                last = Some(result);
                debug!(fen = %key.position, depth, value = result.value, kind = ?result.kind, run_length, "evaluation received");

                if run_length >= self.config.stabilization_count {
                    *active = None;
                    lock(&self.cache).record(key, result);
                    info!(fen = %key.position, depth, "evaluation stabilized");
                    return PollOutcome::Stabilized(result);
                }
            }

            depth += self.config.depth_increment.max(1);
        }

        self.abort(token, key, AbortReason::IterationLimit, last)
    }

    fn abort(
        &self,
        token: u64,
        key: &CacheKey,
        reason: AbortReason,
        last: Option<EvaluationResult>,
    ) -> PollOutcome {
        let mut active = lock(&self.active);
        if !active.as_ref().is_some_and(|s| s.token == token) {
            debug!(fen = %key.position, "poll ended after being superseded");
            return PollOutcome::Superseded;
        }
        *active = None;

        match &reason {
            AbortReason::Error(e) => warn!(fen = %key.position, error = %e, "evaluation poll aborted"),
            AbortReason::IterationLimit => {
                warn!(fen = %key.position, "evaluation did not settle within the iteration limit")
            }
        }
        match last {
            Some(result) => {
                lock(&self.cache).record(key, result);
            }
            None => {
                self.published.send_replace(Published::NoData);
            }
        }
        PollOutcome::Aborted { reason, last }
    }

    fn score(&self, result: EvaluationResult) -> Published {
        Published::Score {
            result,
            normalized: normalize(&result, self.config.mate_scaling),
        }
    }
}
