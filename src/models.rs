use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A quiz question as stored in the `questions` table.
///
/// Field names follow the store's column names on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    #[serde(rename = "kategorie")]
    pub category: String,
    #[serde(rename = "frage")]
    pub prompt: String,
    #[serde(rename = "antwortoptionen", default)]
    pub answer_options: Option<Vec<String>>,
    #[serde(rename = "korrekte_antwort")]
    pub correct_answer: String,
    #[serde(rename = "schwierigkeitsgrad")]
    pub difficulty: i32,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(rename = "erklaerung", default)]
    pub explanation: Option<String>,
}

/// A question to be inserted into the local store (id assigned by the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    #[serde(rename = "kategorie")]
    pub category: String,
    #[serde(rename = "frage")]
    pub prompt: String,
    #[serde(rename = "antwortoptionen", default)]
    pub answer_options: Option<Vec<String>>,
    #[serde(rename = "korrekte_antwort")]
    pub correct_answer: String,
    #[serde(rename = "schwierigkeitsgrad")]
    pub difficulty: i32,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(rename = "erklaerung", default)]
    pub explanation: Option<String>,
}

/// Question as shown to a quiz taker: everything but the correct answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: i64,
    pub category: String,
    pub prompt: String,
    pub answer_options: Vec<String>,
    pub difficulty: i32,
    pub tag: Option<String>,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            category: question.category.clone(),
            prompt: question.prompt.clone(),
            answer_options: question.answer_options.clone().unwrap_or_default(),
            difficulty: question.difficulty,
            tag: question.tag.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Sad,
    #[default]
    Neutral,
    Happy,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Sad => "sad",
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sad" => Ok(Mood::Sad),
            "neutral" => Ok(Mood::Neutral),
            "happy" => Ok(Mood::Happy),
            other => Err(format!("Unknown mood '{}'", other)),
        }
    }
}

/// Lookup predicate for one difficulty row of the selection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionFilter {
    pub categories: Vec<String>,
    pub difficulty: i32,
    pub limit: usize,
}

pub const QUIZ_SESSION_TYPE: &str = "quiz";

/// One row of `user_activity` as it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivityRecord {
    pub user_id: String,
    pub question_id: i64,
    pub score: i32,
    pub session_type: String,
    pub mood: Mood,
    pub timestamp: DateTime<Utc>,
}

impl NewActivityRecord {
    pub fn quiz_answer(user_id: &str, question_id: i64, correct: bool, mood: Mood) -> Self {
        Self {
            user_id: user_id.to_string(),
            question_id,
            score: if correct { 1 } else { 0 },
            session_type: QUIZ_SESSION_TYPE.to_string(),
            mood,
            timestamp: Utc::now(),
        }
    }
}

/// One row of `user_activity` as it is read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: String,
    pub question_id: i64,
    pub score: i32,
    pub session_type: String,
    pub mood: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPrompt {
    pub id: i64,
    pub user_id: String,
    pub prompt_text: String,
    #[serde(default)]
    pub recalled_text: Option<String>,
    #[serde(default)]
    pub recall_score: Option<i32>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub checked_at: Option<DateTime<Utc>>,
}

impl MemoryPrompt {
    pub fn recall_status(&self) -> RecallStatus {
        match self.recall_score {
            Some(1) => RecallStatus::Correct,
            Some(0) => RecallStatus::Incorrect,
            _ => RecallStatus::Unchecked,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemoryPrompt {
    pub user_id: String,
    pub prompt_text: String,
}

/// Fields written once by the evening recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallUpdate {
    pub recalled_text: String,
    pub recall_score: i32,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecallStatus {
    Correct,
    Incorrect,
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Client-held choices carried from the mood screen to the quiz.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub mood: Option<Mood>,
    pub category_ids: Vec<String>,
}

/// In-memory quiz progress. Never persisted; only activity rows are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub mood: Mood,
    pub questions: Vec<Question>,
    pub current: usize,
    pub score: u32,
    /// Index of the last question that added to `score`; each question scores once.
    #[serde(default)]
    pub scored_index: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn new(user_id: &str, mood: Mood, questions: Vec<Question>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            mood,
            questions,
            current: 0,
            score: 0,
            scored_index: None,
            created_at: Utc::now(),
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.questions.len()
    }

    pub fn view(&self) -> QuizSessionView {
        QuizSessionView {
            session_id: self.session_id,
            mood: self.mood,
            questions: self.questions.iter().map(QuestionView::from).collect(),
            current: self.current,
            score: self.score,
            total: self.questions.len(),
            finished: self.is_finished(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSessionView {
    pub session_id: Uuid,
    pub mood: Mood,
    pub questions: Vec<QuestionView>,
    pub current: usize,
    pub score: u32,
    pub total: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub question_id: i64,
    pub correct: bool,
    pub explanation: Option<String>,
    pub score: u32,
    pub current: usize,
    pub total: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallOutcome {
    pub prompt_id: i64,
    pub correct: bool,
    pub prompt_text: String,
    pub recalled_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub activity: Vec<ActivityRecord>,
    pub answered: usize,
    pub correct: usize,
    pub memory_prompt: Option<MemoryPrompt>,
    pub recall_status: Option<RecallStatus>,
}
