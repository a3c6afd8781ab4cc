pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod gallery;
pub mod logging;
pub mod question;
pub mod retry;
pub mod seed;
pub mod store;

pub use config::{Config, FetchConfig, LoggingConfig, StoreBackend, StoreConfig};
pub use error::{Error, FetchFailure, MigrationFailure, Result, WriteFailure, WriteOp};
pub use fetch::{QueryCache, QueryKey, QueryState};
pub use filter::filter_questions;
pub use gallery::Gallery;
pub use question::{Question, QuestionDraft, QuestionId, QuestionPatch, normalize_tags, parse_tag_input};
pub use retry::RetryConfig;
pub use seed::default_questions;
pub use store::{MemoryQuestionStore, QuestionStore, next_timestamp_id};
