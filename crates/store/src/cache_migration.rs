//! One-shot move of locally cached questions into the authoritative store
//!
//! Drafts are inserted in cache order, one at a time. Progress lives in
//! [`MIGRATED_SLOT`] as the set of entry keys already inserted, keyed by the
//! local id (or by content for entries without one), so edits to the cached
//! list between runs cannot shift what counts as done. The key of each draft
//! is recorded as in flight before its insert; a later run that finds it there
//! checks the store before inserting again.
//!
//! A run that stops partway leaves the [`QUESTIONS_SLOT`] list untouched. Both
//! slots are cleared together only once every draft is in.

use crate::local_cache::{LocalCache, MIGRATED_SLOT, QUESTIONS_SLOT};

use qagallery_core::{MigrationFailure, Question, QuestionDraft, QuestionStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a completed migration run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The cache held no questions; nothing was read or written
    NothingToMigrate,
    /// Every cached draft is now in the store and the cache slots are gone
    ///
    /// `skipped` counts drafts a previous run had already inserted.
    Complete { migrated: usize, skipped: usize },
}

/// Contents of [`MIGRATED_SLOT`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct Progress {
    #[serde(default)]
    migrated: BTreeSet<String>,
    /// Draft whose insert was started but not confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in_flight: Option<String>,
}

/// A decoded cache entry and the key progress is tracked under
#[derive(Debug, Clone)]
struct CachedDraft {
    key: String,
    draft: QuestionDraft,
}

pub struct MigrationRunner {
    cache: Arc<LocalCache>,
    target: Arc<dyn QuestionStore>,
}

impl MigrationRunner {
    pub fn new(cache: Arc<LocalCache>, target: Arc<dyn QuestionStore>) -> Self {
        Self { cache, target }
    }

    /// Run the migration
    ///
    /// Consumes the runner: a session migrates at most once.
    #[instrument(skip_all, fields(target = self.target.name()))]
    pub async fn run(self) -> qagallery_core::Result<MigrationOutcome> {
        let Some(raw) = self.cache.get_item(QUESTIONS_SLOT).await else {
            return Ok(MigrationOutcome::NothingToMigrate);
        };

        let entries = decode_entries(&raw)?;
        if entries.is_empty() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let mut progress = self.load_progress().await;
        if let Some(key) = progress.in_flight.take()
            && let Some(entry) = entries.iter().find(|e| e.key == key && !progress.migrated.contains(&e.key))
        {
            let landed = self
                .already_stored(entry, &entries, &progress)
                .await
                .map_err(|e| failure(0, pending(&entries, &progress), format!("could not check the store: {e}")))?;
            if landed {
                debug!("Draft from an interrupted run is already stored");
                progress.migrated.insert(key);
            }
        }

        let remaining: Vec<&CachedDraft> = entries.iter().filter(|e| !progress.migrated.contains(&e.key)).collect();
        let skipped = entries.len() - remaining.len();
        info!("Migrating {} cached question(s), {} already done", remaining.len(), skipped);

        for (position, entry) in remaining.iter().enumerate() {
            let migrated = position;
            let left = || remaining[position..].iter().map(|e| e.draft.clone()).collect::<Vec<_>>();

            progress.in_flight = Some(entry.key.clone());
            if let Err(e) = self.save_progress(&progress).await {
                warn!("Could not record migration progress: {}", e);
                return Err(failure(migrated, left(), format!("could not record progress: {e}")));
            }

            if let Err(e) = self.target.create(entry.draft.clone()).await {
                warn!(position, "Migration stopped: {}", e);
                return Err(failure(migrated, left(), e.to_string()));
            }

            progress.in_flight = None;
            progress.migrated.insert(entry.key.clone());
            if let Err(e) = self.save_progress(&progress).await {
                warn!("Could not record migration progress: {}", e);
                let rest = remaining[position + 1..].iter().map(|e| e.draft.clone()).collect();
                return Err(failure(migrated + 1, rest, format!("could not record progress: {e}")));
            }
        }

        let migrated = remaining.len();
        self.cache
            .remove_items(&[QUESTIONS_SLOT, MIGRATED_SLOT])
            .await
            .map_err(|e| failure(migrated, Vec::new(), format!("could not clear local cache: {e}")))?;

        info!("Migrated {} question(s) out of the local cache", migrated);
        Ok(MigrationOutcome::Complete { migrated, skipped })
    }

    async fn load_progress(&self) -> Progress {
        let Some(raw) = self.cache.get_item(MIGRATED_SLOT).await else {
            return Progress::default();
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Unreadable migration progress {:?}, starting over: {}", raw, e);
            Progress::default()
        })
    }

    async fn save_progress(&self, progress: &Progress) -> crate::Result<()> {
        let raw = serde_json::to_string(progress)?;
        self.cache.set_item(MIGRATED_SLOT, raw).await
    }

    /// True when the store holds more records with the entry's content than
    /// the migrated entries sharing that content account for
    async fn already_stored(
        &self,
        entry: &CachedDraft,
        entries: &[CachedDraft],
        progress: &Progress,
    ) -> qagallery_core::Result<bool> {
        let stored = self.target.list().await?;
        let in_store = stored.iter().filter(|q| same_content(q, &entry.draft)).count();
        let accounted = entries
            .iter()
            .filter(|e| e.draft == entry.draft && progress.migrated.contains(&e.key))
            .count();
        Ok(in_store > accounted)
    }
}

fn same_content(question: &Question, draft: &QuestionDraft) -> bool {
    question.title == draft.title
        && question.description == draft.description
        && question.answer == draft.answer
        && question.tags == draft.tags
}

/// Drafts not yet migrated, in cache order
fn pending(entries: &[CachedDraft], progress: &Progress) -> Vec<QuestionDraft> {
    entries.iter().filter(|e| !progress.migrated.contains(&e.key)).map(|e| e.draft.clone()).collect()
}

/// Decode every cached entry, rejecting the whole list if any entry is bad
///
/// Nothing is written when this fails. The returned failure lists the entries
/// that did decode as pending.
fn decode_entries(raw: &str) -> qagallery_core::Result<Vec<CachedDraft>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| failure(0, Vec::new(), format!("'{QUESTIONS_SLOT}' slot is not a JSON array: {e}")))?;

    let mut entries = Vec::with_capacity(values.len());
    let mut first_error = None;
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, value) in values.into_iter().enumerate() {
        let id = value.get("id").filter(|id| id.is_number() || id.is_string()).map(|id| id.to_string());
        let decoded = serde_json::from_value::<QuestionDraft>(value)
            .map_err(|e| e.to_string())
            .map(QuestionDraft::normalized)
            .and_then(|draft| draft.validate().map(|_| draft).map_err(|e| e.to_string()));

        match decoded {
            Ok(draft) => {
                let key = match id {
                    Some(id) => format!("id:{id}"),
                    None => content_key(&draft, &mut seen),
                };
                entries.push(CachedDraft { key, draft });
            }
            Err(reason) if first_error.is_none() => first_error = Some(format!("cached entry {index} is invalid: {reason}")),
            Err(_) => {}
        }
    }

    match first_error {
        Some(cause) => Err(failure(0, entries.into_iter().map(|e| e.draft).collect(), cause)),
        None => Ok(entries),
    }
}

/// Key for an entry without an id; repeats of the same content are numbered
fn content_key(draft: &QuestionDraft, seen: &mut HashMap<String, usize>) -> String {
    let content = serde_json::json!([draft.title, draft.description, draft.answer, draft.tags]).to_string();
    let occurrence = seen.entry(content.clone()).or_insert(0);
    *occurrence += 1;
    format!("content:{occurrence}:{content}")
}

fn failure(migrated: usize, pending: Vec<QuestionDraft>, cause: String) -> qagallery_core::Error {
    MigrationFailure { migrated, pending, cause }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::local_store::LocalQuestionStore;
    use qagallery_core::{MemoryQuestionStore, QuestionId, QuestionPatch, WriteOp};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Memory store that rejects the create call with the given 1-based number
    ///
    /// With `store_then_reject` the rejected draft is stored anyway, like a
    /// connection that drops after the server committed.
    struct RejectNth {
        inner: MemoryQuestionStore,
        creates: AtomicUsize,
        reject: Option<usize>,
        store_then_reject: bool,
    }

    impl RejectNth {
        fn new(reject: Option<usize>) -> Self {
            Self { inner: MemoryQuestionStore::new(), creates: AtomicUsize::new(0), reject, store_then_reject: false }
        }

        fn storing_rejected(reject: usize) -> Self {
            Self { store_then_reject: true, ..Self::new(Some(reject)) }
        }
    }

    #[async_trait]
    impl QuestionStore for RejectNth {
        fn name(&self) -> &'static str {
            "reject-nth"
        }

        async fn list(&self) -> qagallery_core::Result<Vec<Question>> {
            self.inner.list().await
        }

        async fn create(&self, draft: QuestionDraft) -> qagallery_core::Result<Question> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject == Some(n) {
                if self.store_then_reject {
                    self.inner.create(draft).await?;
                }
                return Err(qagallery_core::Error::write(WriteOp::Create, None, "connection reset"));
            }
            self.inner.create(draft).await
        }

        async fn update(&self, id: QuestionId, patch: QuestionPatch) -> qagallery_core::Result<()> {
            self.inner.update(id, patch).await
        }

        async fn delete(&self, id: QuestionId) -> qagallery_core::Result<()> {
            self.inner.delete(id).await
        }
    }

    async fn cache_with(temp_dir: &TempDir, titles: &[&str]) -> Arc<LocalCache> {
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        let entries: Vec<serde_json::Value> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                serde_json::json!({
                    "id": 1_700_000_000_000_i64 + i as i64,
                    "title": title,
                    "description": "desc",
                    "answer": "ans",
                    "tags": ["csv"],
                })
            })
            .collect();
        cache.set_item(QUESTIONS_SLOT, serde_json::to_string(&entries).unwrap()).await.unwrap();
        cache
    }

    async fn titles(store: &dyn QuestionStore) -> Vec<String> {
        let mut titles: Vec<String> = store.list().await.unwrap().into_iter().map(|q| q.title).collect();
        titles.sort();
        titles
    }

    #[tokio::test]
    async fn test_absent_slot_is_nothing_to_migrate() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        let target = Arc::new(MemoryQuestionStore::new());

        let outcome = MigrationRunner::new(cache, target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::NothingToMigrate);
        assert!(target.is_empty());
    }

    #[tokio::test]
    async fn test_empty_array_leaves_cache_alone() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_with(&temp_dir, &[]).await;
        let target = Arc::new(MemoryQuestionStore::new());

        let outcome = MigrationRunner::new(cache.clone(), target).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::NothingToMigrate);
        assert_eq!(cache.get_item(QUESTIONS_SLOT).await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_full_migration_clears_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_with(&temp_dir, &["a", "b", "c"]).await;
        let target = Arc::new(MemoryQuestionStore::new());

        let outcome = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 3, skipped: 0 });
        assert_eq!(titles(target.as_ref()).await, vec!["a", "b", "c"]);
        assert!(cache.is_empty().await);

        let stored = target.list().await.unwrap();
        assert!(stored.iter().all(|q| q.tags == vec!["CSV".to_string()]));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_cache_and_reports_pending() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_with(&temp_dir, &["a", "b", "c", "d"]).await;
        let original = cache.get_item(QUESTIONS_SLOT).await;
        let target = Arc::new(RejectNth::new(Some(3)));

        let err = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();
        let failure = err.as_migration_failure().unwrap();
        assert_eq!(failure.migrated, 2);
        let pending: Vec<&str> = failure.pending.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(pending, vec!["c", "d"]);
        assert!(failure.cause.contains("connection reset"));

        assert_eq!(titles(target.as_ref()).await, vec!["a", "b"]);
        assert_eq!(cache.get_item(QUESTIONS_SLOT).await, original);

        let progress: serde_json::Value = serde_json::from_str(&cache.get_item(MIGRATED_SLOT).await.unwrap()).unwrap();
        assert_eq!(progress["migrated"].as_array().map(|m| m.len()), Some(2));
    }

    #[tokio::test]
    async fn test_rerun_after_failure_does_not_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_with(&temp_dir, &["a", "b", "c"]).await;
        let target = Arc::new(RejectNth::new(Some(2)));

        MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();

        let outcome = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 2, skipped: 1 });
        assert_eq!(titles(target.as_ref()).await, vec!["a", "b", "c"]);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_entry_aborts_before_any_write() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        cache
            .set_item(
                QUESTIONS_SLOT,
                r#"[{"title": "ok", "description": "d", "answer": "a"}, {"title": "   ", "description": "d", "answer": "a"}, {"nope": 1}]"#,
            )
            .await
            .unwrap();
        let target = Arc::new(MemoryQuestionStore::new());

        let err = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();
        let failure = err.as_migration_failure().unwrap();
        assert_eq!(failure.migrated, 0);
        assert_eq!(failure.pending.len(), 1);
        assert!(failure.cause.contains("entry 1"));
        assert!(target.is_empty());
        assert!(cache.get_item(QUESTIONS_SLOT).await.is_some());
    }

    #[tokio::test]
    async fn test_slot_that_is_not_an_array() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        cache.set_item(QUESTIONS_SLOT, r#"{"title": "x"}"#).await.unwrap();

        let err = MigrationRunner::new(cache, Arc::new(MemoryQuestionStore::new())).run().await.unwrap_err();
        assert!(err.as_migration_failure().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_marker_starts_over() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_with(&temp_dir, &["a", "b"]).await;
        cache.set_item(MIGRATED_SLOT, "9").await.unwrap();
        let target = Arc::new(MemoryQuestionStore::new());

        let outcome = MigrationRunner::new(cache, target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 2, skipped: 0 });
        assert_eq!(target.len(), 2);
    }

    #[tokio::test]
    async fn test_local_delete_between_runs_loses_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        let local = LocalQuestionStore::new(cache.clone());
        let a = local.create(QuestionDraft::new("a", "d", "x", ["csv"])).await.unwrap();
        local.create(QuestionDraft::new("b", "d", "x", ["csv"])).await.unwrap();
        local.create(QuestionDraft::new("c", "d", "x", ["csv"])).await.unwrap();

        let target = Arc::new(RejectNth::new(Some(2)));
        MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();
        assert_eq!(titles(target.as_ref()).await, vec!["a"]);

        local.delete(a.id).await.unwrap();

        let outcome = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 2, skipped: 0 });
        assert_eq!(titles(target.as_ref()).await, vec!["a", "b", "c"]);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_local_edit_between_runs_migrates_edited_draft() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        let local = LocalQuestionStore::new(cache.clone());
        local.create(QuestionDraft::new("a", "d", "x", ["csv"])).await.unwrap();
        let b = local.create(QuestionDraft::new("b", "d", "x", ["csv"])).await.unwrap();

        let target = Arc::new(RejectNth::new(Some(2)));
        MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();

        local.update(b.id, QuestionPatch::new().with_title("b2")).await.unwrap();

        let outcome = MigrationRunner::new(cache, target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 1, skipped: 1 });
        assert_eq!(titles(target.as_ref()).await, vec!["a", "b2"]);
    }

    #[tokio::test]
    async fn test_insert_that_landed_before_an_error_is_not_repeated() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_with(&temp_dir, &["a", "b", "c"]).await;
        let target = Arc::new(RejectNth::storing_rejected(2));

        let err = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();
        assert_eq!(err.as_migration_failure().unwrap().migrated, 1);

        let outcome = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 1, skipped: 2 });
        assert_eq!(titles(target.as_ref()).await, vec!["a", "b", "c"]);
    }

    /// Stores drafts, and after the first one blocks the cache's temp file so
    /// the next progress write fails
    struct BreakCacheAfterCreate {
        inner: MemoryQuestionStore,
        tmp_path: PathBuf,
        armed: Mutex<bool>,
    }

    #[async_trait]
    impl QuestionStore for BreakCacheAfterCreate {
        fn name(&self) -> &'static str {
            "break-cache"
        }

        async fn list(&self) -> qagallery_core::Result<Vec<Question>> {
            self.inner.list().await
        }

        async fn create(&self, draft: QuestionDraft) -> qagallery_core::Result<Question> {
            let question = self.inner.create(draft).await?;
            let mut armed = self.armed.lock().unwrap();
            if *armed {
                *armed = false;
                std::fs::create_dir(&self.tmp_path).unwrap();
            }
            Ok(question)
        }

        async fn update(&self, id: QuestionId, patch: QuestionPatch) -> qagallery_core::Result<()> {
            self.inner.update(id, patch).await
        }

        async fn delete(&self, id: QuestionId) -> qagallery_core::Result<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_failed_progress_write_does_not_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_with(&temp_dir, &["a", "b", "c"]).await;
        let tmp_path = temp_dir.path().join("cache.json.tmp");
        let target =
            Arc::new(BreakCacheAfterCreate { inner: MemoryQuestionStore::new(), tmp_path: tmp_path.clone(), armed: Mutex::new(true) });

        let err = MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();
        let failure = err.as_migration_failure().unwrap();
        assert_eq!(failure.migrated, 1);
        let pending: Vec<&str> = failure.pending.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(pending, vec!["b", "c"]);
        assert!(failure.cause.contains("could not record progress"));

        std::fs::remove_dir(&tmp_path).unwrap();
        let reopened = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());

        let outcome = MigrationRunner::new(reopened.clone(), target.clone()).run().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 2, skipped: 1 });
        assert_eq!(titles(target.as_ref()).await, vec!["a", "b", "c"]);
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn test_interrupted_duplicate_is_not_mistaken_for_stored() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        cache
            .set_item(
                QUESTIONS_SLOT,
                r#"[{"id": 1, "title": "same", "description": "d", "answer": "a"},
                    {"id": 2, "title": "same", "description": "d", "answer": "a"}]"#,
            )
            .await
            .unwrap();
        let target = Arc::new(RejectNth::new(Some(2)));

        MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();
        let outcome = MigrationRunner::new(cache, target.clone()).run().await.unwrap();

        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 1, skipped: 1 });
        assert_eq!(target.inner.len(), 2);
    }

    #[tokio::test]
    async fn test_entries_without_ids_are_tracked_by_content() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::open(&temp_dir.path().join("cache.json")).await.unwrap());
        cache
            .set_item(
                QUESTIONS_SLOT,
                r#"[{"title": "same", "description": "d", "answer": "a"},
                    {"title": "same", "description": "d", "answer": "a"},
                    {"title": "other", "description": "d", "answer": "a"}]"#,
            )
            .await
            .unwrap();
        let target = Arc::new(RejectNth::new(Some(2)));

        MigrationRunner::new(cache.clone(), target.clone()).run().await.unwrap_err();
        let outcome = MigrationRunner::new(cache, target.clone()).run().await.unwrap();

        assert_eq!(outcome, MigrationOutcome::Complete { migrated: 2, skipped: 1 });
        assert_eq!(titles(target.as_ref()).await, vec!["other", "same", "same"]);
    }
}
