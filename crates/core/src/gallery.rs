//! The surface a front end talks to: cached list reads, search, and writes
//! that invalidate the cached list on success.

use crate::error::Result;
use crate::fetch::{QueryCache, QueryState};
use crate::filter::filter_questions;
use crate::question::{Question, QuestionDraft, QuestionId, QuestionPatch};
use crate::retry::RetryConfig;
use crate::store::QuestionStore;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

pub struct Gallery {
    store: Arc<dyn QuestionStore>,
    cache: QueryCache,
}

impl Gallery {
    pub fn new(store: Arc<dyn QuestionStore>, retry: RetryConfig) -> Self {
        let cache = QueryCache::new(Arc::clone(&store), retry);
        Self { store, cache }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.cache.subscribe()
    }

    /// All questions, newest first
    pub async fn list(&self) -> QueryState {
        self.cache.get().await
    }

    /// Questions matching the search box. A failed or loading list passes through.
    pub async fn search(&self, query: &str) -> QueryState {
        match self.cache.get().await {
            QueryState::Ready(questions) => QueryState::Ready(Arc::new(filter_questions(&questions, query))),
            other => other,
        }
    }

    pub async fn get(&self, id: QuestionId) -> Result<Option<Question>> {
        self.store.get(id).await
    }

    #[instrument(skip_all)]
    pub async fn create(&self, draft: QuestionDraft) -> Result<Question> {
        let question = self.store.create(draft).await.inspect_err(|e| warn!("Create rejected: {}", e))?;
        self.cache.invalidate();
        info!(id = %question.id, "Question created");
        Ok(question)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: QuestionId, patch: QuestionPatch) -> Result<()> {
        self.store.update(id, patch).await.inspect_err(|e| warn!("Update rejected: {}", e))?;
        self.cache.invalidate();
        info!(%id, "Question updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: QuestionId) -> Result<()> {
        self.store.delete(id).await.inspect_err(|e| warn!("Delete rejected: {}", e))?;
        self.cache.invalidate();
        info!(%id, "Question deleted");
        Ok(())
    }

    /// Drop cached data; the next read goes back to the store
    pub fn close(&self) {
        self.cache.teardown();
    }
}
