//! String comparison rules used to grade answers.
//!
//! Quiz answers and memory recalls are graded by two different policies.
//! Answers are case-sensitive; recalls are not. Keep them separate.

use crate::models::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPolicy {
    /// Trim both sides, then exact, case-sensitive equality.
    Answer,
    /// Trim both sides, lowercase both, then equality.
    Recall,
}

impl ComparisonPolicy {
    pub fn matches(&self, expected: &str, candidate: &str) -> bool {
        match self {
            ComparisonPolicy::Answer => expected.trim() == candidate.trim(),
            ComparisonPolicy::Recall => {
                expected.trim().to_lowercase() == candidate.trim().to_lowercase()
            }
        }
    }
}

pub fn score_answer(question: &Question, candidate: &str) -> bool {
    ComparisonPolicy::Answer.matches(&question.correct_answer, candidate)
}

pub fn score_recall(prompt_text: &str, recalled_text: &str) -> bool {
    ComparisonPolicy::Recall.matches(prompt_text, recalled_text)
}
