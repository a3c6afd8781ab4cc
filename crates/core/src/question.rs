//! Question records, drafts, and patches.
//!
//! A [`QuestionDraft`] is what a form produces; a store turns it into a
//! [`Question`] by assigning an id and a creation timestamp. Tags are
//! uppercased whenever a draft or patch is built, never when records are read
//! back.

use crate::error::{Error, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Identity of a stored question. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub i64);

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for QuestionId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(QuestionId)
            .map_err(|e| Error::Parse(format!("invalid question id '{s}': {e}")))
    }
}

/// A fully identified, persisted question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Question {
    /// Build a record from a draft once the store has assigned identity
    pub fn from_draft(id: QuestionId, created_at: DateTime<Utc>, draft: QuestionDraft) -> Self {
        Self {
            id,
            created_at,
            title: draft.title,
            description: draft.description,
            answer: draft.answer,
            tags: draft.tags,
        }
    }

    /// Apply an edit in place. The id and creation time never change.
    pub fn apply(&mut self, patch: QuestionPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(answer) = patch.answer {
            self.answer = answer;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
    }

    /// Case-insensitive substring match over title, description, and tags.
    ///
    /// `needle` must already be lowercase.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }

    /// Display ordering: newest first, ties broken by the higher id
    pub fn display_order(a: &Question, b: &Question) -> Ordering {
        b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
    }
}

/// Sort records into display order (newest first)
pub fn sort_for_display(questions: &mut [Question]) {
    questions.sort_by(Question::display_order);
}

/// A question before the store assigns `id` and `created_at`
///
/// Decoding tolerates (and drops) an `id` or `created_at` left on entries
/// written by the local cache tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub title: String,
    pub description: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl QuestionDraft {
    /// Create a draft, normalizing tags to uppercase
    pub fn new<I, T>(
        title: impl Into<String>, description: impl Into<String>, answer: impl Into<String>, tags: I,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            title: title.into(),
            description: description.into(),
            answer: answer.into(),
            tags: normalize_tags(tags),
        }
    }

    /// Uppercase the tags of a draft that did not come through [`QuestionDraft::new`]
    pub fn normalized(mut self) -> Self {
        self.tags = normalize_tags(std::mem::take(&mut self.tags));
        self
    }

    /// Check the fields a store requires before insertion
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }
        Ok(())
    }
}

/// An edit to an existing question. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl QuestionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    /// Replace the tag list; tags are uppercased here
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = Some(normalize_tags(tags));
        self
    }

    /// Uppercase tags on a patch built without [`QuestionPatch::with_tags`]
    pub fn normalized(mut self) -> Self {
        self.tags = self.tags.take().map(normalize_tags);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.answer.is_none() && self.tags.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title
            && title.trim().is_empty()
        {
            return Err(Error::validation("title must not be empty"));
        }
        Ok(())
    }
}

/// Uppercase and trim tags, dropping empty entries. Order is kept.
pub fn normalize_tags<I, T>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    tags.into_iter()
        .map(|tag| tag.into().trim().to_uppercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Turn the raw comma-separated tag field of a form into tags
pub fn parse_tag_input(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}
