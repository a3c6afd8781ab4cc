//! The record store contract and the in-memory tier.

use crate::error::{Error, Result, WriteOp};
use crate::question::{Question, QuestionDraft, QuestionId, QuestionPatch, sort_for_display};
use crate::seed::default_questions;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};
use tracing::instrument;

/// Read/write access to whichever tier currently holds the questions
///
/// `list` returns records newest first. An empty list is not an error.
/// Read failures surface as [`Error::Fetch`]; rejected writes surface as
/// [`Error::Write`] carrying the backend's cause.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Short name used in logs ("memory", "local", "sqlite")
    fn name(&self) -> &'static str;

    async fn list(&self) -> Result<Vec<Question>>;

    async fn create(&self, draft: QuestionDraft) -> Result<Question>;

    async fn update(&self, id: QuestionId, patch: QuestionPatch) -> Result<()>;

    async fn delete(&self, id: QuestionId) -> Result<()>;

    /// Look up a single question
    async fn get(&self, id: QuestionId) -> Result<Option<Question>> {
        Ok(self.list().await?.into_iter().find(|q| q.id == id))
    }
}

/// Next id for tiers without a server: the current time in milliseconds,
/// bumped past `last` so ids stay unique when two inserts share a millisecond.
pub fn next_timestamp_id(last: Option<QuestionId>, now: DateTime<Utc>) -> QuestionId {
    let candidate = now.timestamp_millis();
    match last {
        Some(QuestionId(last)) if last >= candidate => QuestionId(last + 1),
        _ => QuestionId(candidate),
    }
}

/// Questions held in process memory; starts from the seed set or empty
#[derive(Debug, Default)]
pub struct MemoryQuestionStore {
    questions: RwLock<Vec<Question>>,
}

impl MemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the default seed questions
    pub fn seeded() -> Self {
        Self::with_questions(default_questions())
    }

    pub fn with_questions(mut questions: Vec<Question>) -> Self {
        sort_for_display(&mut questions);
        Self { questions: RwLock::new(questions) }
    }

    pub fn len(&self) -> usize {
        self.questions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<Question>> {
        Ok(self.questions.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    #[instrument(skip_all, fields(store = "memory"))]
    async fn create(&self, draft: QuestionDraft) -> Result<Question> {
        let draft = draft.normalized();
        draft.validate().map_err(|e| Error::write(WriteOp::Create, None, e.to_string()))?;

        let mut questions = self.questions.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let last = questions.iter().map(|q| q.id).max();
        let question = Question::from_draft(next_timestamp_id(last, now), now, draft);

        questions.push(question.clone());
        sort_for_display(&mut questions);
        tracing::debug!(id = %question.id, "Created question");
        Ok(question)
    }

    #[instrument(skip(self, patch), fields(store = "memory"))]
    async fn update(&self, id: QuestionId, patch: QuestionPatch) -> Result<()> {
        let patch = patch.normalized();
        patch.validate().map_err(|e| Error::write(WriteOp::Update, Some(id), e.to_string()))?;

        let mut questions = self.questions.write().unwrap_or_else(PoisonError::into_inner);
        let question = questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| Error::write(WriteOp::Update, Some(id), "no question with that id"))?;
        question.apply(patch);
        Ok(())
    }

    #[instrument(skip(self), fields(store = "memory"))]
    async fn delete(&self, id: QuestionId) -> Result<()> {
        let mut questions = self.questions.write().unwrap_or_else(PoisonError::into_inner);
        let before = questions.len();
        questions.retain(|q| q.id != id);
        if questions.len() == before {
            return Err(Error::write(WriteOp::Delete, Some(id), "no question with that id"));
        }
        Ok(())
    }
}
