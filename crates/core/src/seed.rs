//! Compiled-in questions shown when nothing else has data.

use crate::question::{Question, QuestionDraft, QuestionId};

use chrono::{DateTime, TimeZone, Utc};

const CENTER_A_DIV: &str = "There are several ways to center a div:

1. Using Flexbox:
.parent {
  display: flex;
  justify-content: center;
  align-items: center;
}

2. Using Grid:
.parent {
  display: grid;
  place-items: center;
}

3. Using position absolute:
.child {
  position: absolute;
  top: 50%;
  left: 50%;
  transform: translate(-50%, -50%);
}";

const LET_VS_CONST: &str = "let allows you to declare variables that can be reassigned, while const declares variables that cannot be reassigned after initialization.

Example:
let x = 1;
x = 2; // This works

const y = 1;
y = 2; // This throws an error";

const ASYNC_IN_REACT: &str = "There are several ways to handle async operations in React:

1. Using async/await:
async function fetchData() {
  try {
    const response = await fetch(url);
    const data = await response.json();
    setState(data);
  } catch (error) {
    console.error(error);
  }
}

2. Using useEffect:
useEffect(() => {
  fetchData();
}, []);

3. Using Promise.then():
fetch(url)
  .then(response => response.json())
  .then(data => setState(data))
  .catch(error => console.error(error));";

fn seeded_at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).single().unwrap_or_default()
}

/// The default question set, already in display order (newest first)
pub fn default_questions() -> Vec<Question> {
    vec![
        Question::from_draft(
            QuestionId(1),
            seeded_at(3),
            QuestionDraft::new(
                "How to center a div?",
                "Learn the different ways to center content in CSS",
                CENTER_A_DIV,
                ["CSS", "Layout", "Flexbox"],
            ),
        ),
        Question::from_draft(
            QuestionId(2),
            seeded_at(2),
            QuestionDraft::new(
                "What is the difference between let and const?",
                "Understanding variable declarations in JavaScript",
                LET_VS_CONST,
                ["JavaScript", "ES6", "Variables"],
            ),
        ),
        Question::from_draft(
            QuestionId(3),
            seeded_at(1),
            QuestionDraft::new(
                "How to handle async operations in React?",
                "Best practices for managing asynchronous operations",
                ASYNC_IN_REACT,
                ["React", "Async", "Hooks"],
            ),
        ),
    ]
}
