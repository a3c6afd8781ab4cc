//! SQLite schema for the question store

/// SQL to create the questions table, safe to run on every open
///
/// `created_at` is RFC 3339 UTC text with fixed microsecond precision, so
/// lexical order is chronological order. `tags_json` is a JSON array of
/// uppercase strings.
pub const QUESTIONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT NOT NULL,
    answer TEXT NOT NULL,
    tags_json TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_questions_created_at
ON questions(created_at DESC, id DESC);
"#;

/// Columns selected whenever a full record is read
pub const QUESTION_COLUMNS: &str = "id, created_at, title, description, answer, tags_json";
