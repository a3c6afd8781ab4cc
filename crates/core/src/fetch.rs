//! Query cache for the question list.
//!
//! Every consumer of the list goes through [`QueryCache::get`]. At most one
//! underlying `list()` is in flight per logical fetch: callers that arrive
//! while it runs await the same shared future. Failures are retried per
//! [`RetryConfig`] and only the last one is published.
//!
//! State machine:
//!
//! ```text
//! Loading --fetch ok--> Ready(records)
//! Loading --retries spent--> Failed(error)
//! Ready | Failed --invalidate/teardown--> Loading
//! ```

use crate::error::FetchFailure;
use crate::question::Question;
use crate::retry::RetryConfig;
use crate::store::QuestionStore;

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

/// Cache keys. The gallery has a single list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Questions,
}

impl QueryKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKey::Questions => "questions",
        }
    }
}

/// What a consumer of the list sees
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
    Loading,
    Ready(Arc<Vec<Question>>),
    Failed(FetchFailure),
}

impl QueryState {
    /// `Ready` and `Failed` hold until the cache is invalidated
    pub fn is_settled(&self) -> bool {
        !matches!(self, QueryState::Loading)
    }

    pub fn questions(&self) -> Option<&[Question]> {
        match self {
            QueryState::Ready(questions) => Some(questions.as_slice()),
            _ => None,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, QueryState>>;

#[derive(Default)]
struct Slot {
    /// Bumped on every invalidation; results from older fetches are dropped
    generation: u64,
    in_flight: Option<SharedFetch>,
}

/// De-duplicating, retrying cache over [`QuestionStore::list`]
pub struct QueryCache {
    key: QueryKey,
    store: Arc<dyn QuestionStore>,
    retry: RetryConfig,
    slot: Mutex<Slot>,
    state: watch::Sender<QueryState>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn QuestionStore>, retry: RetryConfig) -> Self {
        let (state, _) = watch::channel(QueryState::Loading);
        Self { key: QueryKey::Questions, store, retry, slot: Mutex::new(Slot::default()), state }
    }

    pub fn key(&self) -> QueryKey {
        self.key
    }

    /// Current state without triggering a fetch
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    /// Resolve the list, fetching only if nothing is cached or in flight
    #[instrument(skip(self), fields(key = self.key.as_str(), store = self.store.name()))]
    pub async fn get(&self) -> QueryState {
        loop {
            let (fetch, generation) = {
                let mut slot = self.lock_slot();
                let current = self.state.borrow().clone();
                if current.is_settled() {
                    return current;
                }

                let generation = slot.generation;
                let fetch = match &slot.in_flight {
                    Some(fetch) => {
                        debug!("Joining in-flight fetch");
                        fetch.clone()
                    }
                    None => {
                        debug!(generation, "Starting fetch");
                        let fetch = fetch_with_retry(Arc::clone(&self.store), self.retry.clone()).boxed().shared();
                        slot.in_flight = Some(fetch.clone());
                        fetch
                    }
                };
                (fetch, generation)
            };

            let result = fetch.await;

            let mut slot = self.lock_slot();
            if slot.generation == generation {
                slot.in_flight = None;
                self.state.send_replace(result.clone());
                return result;
            }
            debug!(generation, current = slot.generation, "Discarding result of a superseded fetch");
        }
    }

    /// Drop the cached result so the next `get` reads the store again
    pub fn invalidate(&self) {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        slot.in_flight = None;
        self.state.send_replace(QueryState::Loading);
        debug!(key = self.key.as_str(), generation = slot.generation, "Invalidated query");
    }

    /// Release cached data when the consuming view goes away
    pub fn teardown(&self) {
        debug!(key = self.key.as_str(), "Tearing down query");
        self.invalidate();
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn fetch_with_retry(store: Arc<dyn QuestionStore>, retry: RetryConfig) -> QueryState {
    let mut attempt = 0;
    loop {
        let delay = retry.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;

        match store.list().await {
            Ok(questions) => {
                debug!(attempt, count = questions.len(), "Fetched questions");
                return QueryState::Ready(Arc::new(questions));
            }
            Err(e) if retry.should_retry(attempt) => {
                warn!(attempt, max_attempts = retry.max_attempts, "List fetch failed, retrying: {}", e);
            }
            Err(e) => {
                warn!(attempt, "List fetch failed, giving up: {}", e);
                return QueryState::Failed(FetchFailure { attempts: attempt, message: e.to_string() });
            }
        }
    }
}
