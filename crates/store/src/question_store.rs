//! SQLite-backed authoritative question store
use crate::error::{Error, Result};
use crate::schema::{QUESTION_COLUMNS, QUESTIONS_SQL};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use qagallery_core::{Question, QuestionDraft, QuestionId, QuestionPatch, QuestionStore, WriteOp};
use rusqlite::{OptionalExtension, Row, params, types::Type};
use std::{path::Path, sync::Arc};
use tokio_rusqlite::Connection;
use tracing::instrument;

/// A handle to the question table in a SQLite database
///
/// Ids come from `INTEGER PRIMARY KEY AUTOINCREMENT`, so they are never
/// reused after a delete.
#[derive(Clone)]
pub struct SqliteQuestionStore {
    conn: Arc<Connection>,
}

impl SqliteQuestionStore {
    /// Open or create a question store at the given path
    ///
    /// Creates the parent directory and the questions table if missing.
    #[instrument(skip_all, fields(db_path = %db_path.display()))]
    pub async fn open(db_path: &Path) -> Result<Self> {
        tracing::info!("Opening question store at {}", db_path.display());

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(db_path)
            .await
            .map_err(|e| Error::database(format!("Failed to open database: {e}")))?;

        Self::from_connection(conn).await
    }

    /// Open a throwaway store that lives only as long as the handle
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::database(format!("Failed to open database: {e}")))?;

        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(QUESTIONS_SQL)?;
            Ok::<(), rusqlite::Error>(())
        })
        .await
        .map_err(|e| Error::database(format!("Failed to create questions table: {e}")))?;

        tracing::info!("Question store opened successfully");
        Ok(Self { conn: Arc::new(conn) })
    }

    /// All questions, newest first
    pub async fn fetch_all(&self) -> Result<Vec<Question>> {
        let questions = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions ORDER BY created_at DESC, id DESC"
                ))?;
                let questions = stmt
                    .query_map([], question_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok::<_, rusqlite::Error>(questions)
            })
            .await?;

        Ok(questions)
    }

    /// Retrieve a question by id
    pub async fn fetch_one(&self, id: QuestionId) -> Result<Option<Question>> {
        let question = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"))?;
                let question = stmt.query_row(params![id.0], question_from_row).optional()?;
                Ok::<_, rusqlite::Error>(question)
            })
            .await?;

        Ok(question)
    }

    /// Insert a validated draft; the database assigns the id
    pub async fn insert(&self, draft: QuestionDraft) -> Result<Question> {
        let created_at = Utc::now().trunc_subsecs(6);
        let created_at_text = format_timestamp(&created_at);
        let tags_json = serde_json::to_string(&draft.tags)?;
        let row_draft = draft.clone();

        let id = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r#"
                    INSERT INTO questions (created_at, title, description, answer, tags_json)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )?;
                stmt.execute(params![
                    &created_at_text,
                    &row_draft.title,
                    &row_draft.description,
                    &row_draft.answer,
                    &tags_json
                ])?;
                Ok::<_, rusqlite::Error>(conn.last_insert_rowid())
            })
            .await?;

        Ok(Question::from_draft(QuestionId(id), created_at, draft))
    }

    /// Apply a patch; returns false when no row has that id
    pub async fn patch(&self, id: QuestionId, patch: QuestionPatch) -> Result<bool> {
        let tags_json = patch.tags.as_ref().map(serde_json::to_string).transpose()?;

        let updated = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r#"
                    UPDATE questions SET
                        title = COALESCE(?2, title),
                        description = COALESCE(?3, description),
                        answer = COALESCE(?4, answer),
                        tags_json = COALESCE(?5, tags_json)
                    WHERE id = ?1
                    "#,
                )?;
                let rows_affected =
                    stmt.execute(params![id.0, &patch.title, &patch.description, &patch.answer, &tags_json])?;
                Ok::<_, rusqlite::Error>(rows_affected > 0)
            })
            .await?;

        Ok(updated)
    }

    /// Delete a question; returns false when no row has that id
    pub async fn remove(&self, id: QuestionId) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("DELETE FROM questions WHERE id = ?1")?;
                let rows_affected = stmt.execute(params![id.0])?;
                Ok::<_, rusqlite::Error>(rows_affected > 0)
            })
            .await?;

        Ok(deleted)
    }

    /// Number of stored questions
    pub async fn count(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?;
                Ok::<_, rusqlite::Error>(count)
            })
            .await?;

        Ok(count as usize)
    }
}

#[async_trait]
impl QuestionStore for SqliteQuestionStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self), fields(store = "sqlite"))]
    async fn list(&self) -> qagallery_core::Result<Vec<Question>> {
        let questions = self.fetch_all().await.map_err(Error::into_fetch)?;
        tracing::debug!("Listed {} questions", questions.len());
        Ok(questions)
    }

    #[instrument(skip_all, fields(store = "sqlite"))]
    async fn create(&self, draft: QuestionDraft) -> qagallery_core::Result<Question> {
        let draft = draft.normalized();
        draft
            .validate()
            .map_err(|e| qagallery_core::Error::write(WriteOp::Create, None, e.to_string()))?;

        let question = self.insert(draft).await.map_err(|e| e.into_write(WriteOp::Create, None))?;
        tracing::debug!(id = %question.id, "Inserted question");
        Ok(question)
    }

    #[instrument(skip(self, patch), fields(store = "sqlite"))]
    async fn update(&self, id: QuestionId, patch: QuestionPatch) -> qagallery_core::Result<()> {
        let patch = patch.normalized();
        patch
            .validate()
            .map_err(|e| qagallery_core::Error::write(WriteOp::Update, Some(id), e.to_string()))?;

        let updated = self.patch(id, patch).await.map_err(|e| e.into_write(WriteOp::Update, Some(id)))?;
        if !updated {
            return Err(qagallery_core::Error::write(WriteOp::Update, Some(id), "no question with that id"));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(store = "sqlite"))]
    async fn delete(&self, id: QuestionId) -> qagallery_core::Result<()> {
        let deleted = self.remove(id).await.map_err(|e| e.into_write(WriteOp::Delete, Some(id)))?;
        if !deleted {
            return Err(qagallery_core::Error::write(WriteOp::Delete, Some(id), "no question with that id"));
        }
        Ok(())
    }

    async fn get(&self, id: QuestionId) -> qagallery_core::Result<Option<Question>> {
        self.fetch_one(id).await.map_err(Error::into_fetch)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    let created_at_text: String = row.get(1)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    let tags_json: String = row.get(5)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Question {
        id: QuestionId(row.get(0)?),
        created_at,
        title: row.get(2)?,
        description: row.get(3)?,
        answer: row.get(4)?,
        tags,
    })
}
