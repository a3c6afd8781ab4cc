//! Search box filtering over the loaded question list.

use crate::question::Question;

/// Keep the questions whose title, description, or any tag contains `query`.
///
/// Matching is a case-insensitive substring test (both sides lowercased).
/// An empty query keeps everything. Relative order is preserved.
pub fn filter_questions(questions: &[Question], query: &str) -> Vec<Question> {
    if query.is_empty() {
        return questions.to_vec();
    }

    let needle = query.to_lowercase();
    questions.iter().filter(|q| q.matches_lowercase(&needle)).cloned().collect()
}
