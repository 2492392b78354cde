use rand::Rng;
use std::time::Instant;

use crate::models::{AuthSession, Mood, Question, QuestionFilter};
use crate::store::{QuestionSource, StoreError};
use crate::{log_performance, log_service_success};

/// How many questions of one difficulty a mood asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyQuota {
    pub difficulty: i32,
    pub limit: usize,
}

const SAD_QUOTA: &[DifficultyQuota] = &[DifficultyQuota { difficulty: 1, limit: 5 }];

const NEUTRAL_QUOTA: &[DifficultyQuota] = &[
    DifficultyQuota { difficulty: 2, limit: 3 },
    DifficultyQuota { difficulty: 3, limit: 2 },
];

const HAPPY_QUOTA: &[DifficultyQuota] = &[
    DifficultyQuota { difficulty: 2, limit: 2 },
    DifficultyQuota { difficulty: 3, limit: 3 },
];

/// Difficulty rows for a mood, in lookup order.
pub fn difficulty_quota(mood: Mood) -> &'static [DifficultyQuota] {
    match mood {
        Mood::Sad => SAD_QUOTA,
        Mood::Neutral => NEUTRAL_QUOTA,
        Mood::Happy => HAPPY_QUOTA,
    }
}

/// Upper bound on quiz length for a mood. The real length may be shorter.
pub fn nominal_quiz_size(mood: Mood) -> usize {
    difficulty_quota(mood).iter().map(|row| row.limit).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("No categories selected")]
    NoCategories,

    #[error("Question lookup for difficulty {difficulty} failed: {source}")]
    Lookup {
        difficulty: i32,
        #[source]
        source: StoreError,
    },
}

/// Select and shuffle the questions for one quiz.
pub async fn select_questions<S>(
    source: &S,
    auth: &AuthSession,
    mood: Mood,
    categories: &[String],
) -> Result<Vec<Question>, SelectionError>
where
    S: QuestionSource + ?Sized,
{
    let mut questions = gather_questions(source, auth, mood, categories).await?;
    shuffle(&mut questions, &mut rand::thread_rng());
    Ok(questions)
}

/// Issue one lookup per quota row, in order, and concatenate the results.
///
/// Stops at the first failing lookup; rows already fetched are dropped.
/// A short row is not backfilled from another difficulty.
pub async fn gather_questions<S>(
    source: &S,
    auth: &AuthSession,
    mood: Mood,
    categories: &[String],
) -> Result<Vec<Question>, SelectionError>
where
    S: QuestionSource + ?Sized,
{
    if categories.is_empty() {
        return Err(SelectionError::NoCategories);
    }

    let start = Instant::now();
    let mut combined = Vec::with_capacity(nominal_quiz_size(mood));

    for row in difficulty_quota(mood) {
        let filter = QuestionFilter {
            categories: categories.to_vec(),
            difficulty: row.difficulty,
            limit: row.limit,
        };

        let rows = source
            .fetch_questions(auth, &filter)
            .await
            .map_err(|source| SelectionError::Lookup {
                difficulty: row.difficulty,
                source,
            })?;

        combined.extend(rows);
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    log_performance!("gather_questions", duration_ms = duration_ms);
    log_service_success!(
        "question_selector",
        "gather_questions",
        question_count = combined.len(),
        duration_ms = duration_ms
    );

    Ok(combined)
}

/// In-place Fisher–Yates shuffle.
pub fn shuffle<T, R>(items: &mut [T], rng: &mut R)
where
    R: Rng + ?Sized,
{
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
