//! Question store kept entirely in the local cache's `questions` slot.
//!
//! This is the tier used before an authoritative store exists. Ids are
//! millisecond timestamps and new entries are appended to the stored array.

use crate::error::{Error, Result};
use crate::local_cache::{LocalCache, QUESTIONS_SLOT};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use qagallery_core::question::sort_for_display;
use qagallery_core::{Question, QuestionDraft, QuestionId, QuestionPatch, QuestionStore, WriteOp, next_timestamp_id};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// One element of the `questions` slot
///
/// Older entries carry only `id`; their creation time is taken from the id,
/// which was a millisecond timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalEntry {
    id: QuestionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    draft: QuestionDraft,
}

impl LocalEntry {
    fn into_question(self) -> Question {
        let created_at = self
            .created_at
            .or_else(|| Utc.timestamp_millis_opt(self.id.0).single())
            .unwrap_or_default();
        Question::from_draft(self.id, created_at, self.draft)
    }
}

pub struct LocalQuestionStore {
    cache: Arc<LocalCache>,
    /// Serializes read-modify-write cycles on the slot
    write_lock: Mutex<()>,
}

impl LocalQuestionStore {
    pub fn new(cache: Arc<LocalCache>) -> Self {
        Self { cache, write_lock: Mutex::new(()) }
    }

    async fn load(&self) -> Result<Vec<LocalEntry>> {
        match self.cache.get_item(QUESTIONS_SLOT).await {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::invalid_record(format!("'{QUESTIONS_SLOT}' slot does not hold question records: {e}"))),
        }
    }

    async fn save(&self, entries: &[LocalEntry]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.cache.set_item(QUESTIONS_SLOT, raw).await
    }
}

#[async_trait]
impl QuestionStore for LocalQuestionStore {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self), fields(store = "local"))]
    async fn list(&self) -> qagallery_core::Result<Vec<Question>> {
        let entries = self.load().await.map_err(Error::into_fetch)?;
        let mut questions: Vec<Question> = entries.into_iter().map(LocalEntry::into_question).collect();
        sort_for_display(&mut questions);
        Ok(questions)
    }

    #[instrument(skip_all, fields(store = "local"))]
    async fn create(&self, draft: QuestionDraft) -> qagallery_core::Result<Question> {
        let draft = draft.normalized();
        draft
            .validate()
            .map_err(|e| qagallery_core::Error::write(WriteOp::Create, None, e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await.map_err(|e| e.into_write(WriteOp::Create, None))?;

        let now = Utc::now();
        let last = entries.iter().map(|e| e.id).max();
        let entry = LocalEntry { id: next_timestamp_id(last, now), created_at: Some(now), draft };
        entries.push(entry.clone());

        self.save(&entries).await.map_err(|e| e.into_write(WriteOp::Create, None))?;
        tracing::debug!(id = %entry.id, "Stored question in local cache");
        Ok(entry.into_question())
    }

    #[instrument(skip(self, patch), fields(store = "local"))]
    async fn update(&self, id: QuestionId, patch: QuestionPatch) -> qagallery_core::Result<()> {
        let patch = patch.normalized();
        patch
            .validate()
            .map_err(|e| qagallery_core::Error::write(WriteOp::Update, Some(id), e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await.map_err(|e| e.into_write(WriteOp::Update, Some(id)))?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| qagallery_core::Error::write(WriteOp::Update, Some(id), "no question with that id"))?;

        let mut question = entry.clone().into_question();
        question.apply(patch);
        entry.draft = QuestionDraft {
            title: question.title,
            description: question.description,
            answer: question.answer,
            tags: question.tags,
        };

        self.save(&entries).await.map_err(|e| e.into_write(WriteOp::Update, Some(id)))
    }

    #[instrument(skip(self), fields(store = "local"))]
    async fn delete(&self, id: QuestionId) -> qagallery_core::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await.map_err(|e| e.into_write(WriteOp::Delete, Some(id)))?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(qagallery_core::Error::write(WriteOp::Delete, Some(id), "no question with that id"));
        }

        self.save(&entries).await.map_err(|e| e.into_write(WriteOp::Delete, Some(id)))
    }
}
