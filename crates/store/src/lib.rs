//! Persistent question stores
//!
//! Two tiers implement [`qagallery_core::QuestionStore`]:
//!
//! - [`SqliteQuestionStore`], the authoritative store, backed by SQLite
//! - [`LocalQuestionStore`], a JSON list in the [`LocalCache`] file
//!
//! [`MigrationRunner`] moves whatever the local tier holds into the
//! authoritative one.
//!
//! # Example
//!
//! ```ignore
//! use qagallery_store::{LocalCache, MigrationRunner, SqliteQuestionStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteQuestionStore::open(&db_path).await?);
//! let cache = Arc::new(LocalCache::open(&cache_path).await?);
//!
//! match MigrationRunner::new(cache, store.clone()).run().await {
//!     Ok(outcome) => println!("{outcome:?}"),
//!     Err(e) => eprintln!("migration stopped: {e}"),
//! }
//! ```

mod cache_migration;
mod error;
mod local_cache;
mod local_store;
mod question_store;
pub mod schema;

pub use cache_migration::{MigrationOutcome, MigrationRunner};
pub use error::{Error, Result};
pub use local_cache::{LocalCache, MIGRATED_SLOT, QUESTIONS_SLOT};
pub use local_store::LocalQuestionStore;
pub use question_store::SqliteQuestionStore;
