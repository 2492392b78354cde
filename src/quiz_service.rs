use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::map_category_ids;
use crate::client_state::ClientState;
use crate::display_name_cache::DisplayNameCache;
use crate::models::*;
use crate::question_selector::{select_questions, SelectionError};
use crate::scoring::{score_answer, score_recall};
use crate::store::{QuizStore, StoreError};
use crate::{log_service_error, log_service_start, log_service_success, log_service_warn, log_validation};

pub const MEMORY_PROMPT_MAX_CHARS: usize = 100;
pub const REPORT_ACTIVITY_LIMIT: usize = 10;
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 120;

const SERVICE: &str = "quiz_service";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Quiz session '{0}' not found")]
    SessionNotFound(Uuid),

    #[error("Quiz session '{0}' is already finished")]
    SessionFinished(Uuid),

    #[error("No memory prompt found")]
    NoMemoryPrompt,

    #[error("{0}")]
    Validation(String),
}

impl ServiceError {
    /// A store call failed for a reason other than the caller's credentials.
    pub fn is_store_failure(&self) -> bool {
        match self {
            ServiceError::Store(source)
            | ServiceError::Selection(SelectionError::Lookup { source, .. }) => !source.is_auth(),
            _ => false,
        }
    }
}

/// One method per user action. Each action runs its store calls one after
/// another and stops at the first failure; nothing is retried.
#[derive(Clone)]
pub struct QuizService {
    store: Arc<dyn QuizStore>,
    client_state: ClientState,
    display_names: DisplayNameCache,
    sessions: Arc<RwLock<HashMap<Uuid, QuizSession>>>,
    session_ttl: Duration,
}

impl QuizService {
    pub fn new(store: Arc<dyn QuizStore>, display_names: DisplayNameCache) -> Self {
        Self {
            store,
            client_state: ClientState::new(),
            display_names,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }

    /// Quiz sessions older than `ttl` are dropped when a new quiz starts.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    // Selection flow
    pub async fn choose_mood(&self, user_id: &str, mood: &str) -> Result<Mood, ServiceError> {
        let mood = mood.parse::<Mood>().map_err(|e| {
            log_validation!(failure, "mood", error = e);
            ServiceError::Validation(e)
        })?;
        self.client_state.set_mood(user_id, mood).await;
        Ok(mood)
    }

    pub async fn choose_categories(
        &self,
        user_id: &str,
        category_ids: Vec<String>,
    ) -> Result<Selection, ServiceError> {
        if category_ids.is_empty() {
            log_validation!(failure, "categories", error = "empty selection");
            return Err(ServiceError::Validation(
                "Select at least one category".to_string(),
            ));
        }
        self.client_state.set_categories(user_id, category_ids).await;
        Ok(self.client_state.get(user_id).await)
    }

    pub async fn selection(&self, user_id: &str) -> Selection {
        self.client_state.get(user_id).await
    }

    // Quiz flow
    pub async fn start_quiz(&self, auth: &AuthSession) -> Result<QuizSession, ServiceError> {
        let user_id = auth.user_id();
        log_service_start!(SERVICE, "start_quiz", user_id = user_id);
        let start = Instant::now();

        let selection = self.client_state.get(user_id).await;
        let mood = selection.mood.unwrap_or_default();
        let categories = map_category_ids(&selection.category_ids);

        let questions = select_questions(self.store.as_ref(), auth, mood, &categories)
            .await
            .map_err(|e| {
                log_service_error!(SERVICE, "start_quiz", user_id = user_id, error = e);
                e
            })?;

        if questions.is_empty() {
            log_service_warn!(SERVICE, "start_quiz", "no questions matched the selection");
        }

        let session = QuizSession::new(user_id, mood, questions);
        {
            let mut sessions = self.sessions.write().await;
            let cutoff = session.created_at - self.session_ttl;
            let before = sessions.len();
            sessions.retain(|_, existing| existing.created_at > cutoff);
            if sessions.len() < before {
                tracing::debug!(expired = before - sessions.len(), "Dropped expired quiz sessions");
            }
            sessions.insert(session.session_id, session.clone());
        }

        log_service_success!(
            SERVICE,
            "start_quiz",
            question_count = session.questions.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(session)
    }

    pub async fn quiz_session(
        &self,
        user_id: &str,
        session_id: Uuid,
    ) -> Result<QuizSession, ServiceError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .filter(|session| session.user_id == user_id)
            .cloned()
            .ok_or(ServiceError::SessionNotFound(session_id))
    }

    /// Grade the current question and append its activity row.
    ///
    /// A correct answer raises the score before the row is written. If the
    /// write fails the score keeps the increment but the session stays on the
    /// same question. A question adds to the score at most once, so retries
    /// and concurrent answers cannot push the score past the question count.
    pub async fn answer_question(
        &self,
        auth: &AuthSession,
        session_id: Uuid,
        answer: &str,
    ) -> Result<AnswerOutcome, ServiceError> {
        let user_id = auth.user_id();

        let (question, correct, mood, index) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .filter(|session| session.user_id == user_id)
                .ok_or(ServiceError::SessionNotFound(session_id))?;

            let Some(question) = session.current_question().cloned() else {
                log_service_warn!(SERVICE, "answer_question", "session already finished");
                return Err(ServiceError::SessionFinished(session_id));
            };

            let correct = score_answer(&question, answer);
            if correct && session.scored_index != Some(session.current) {
                session.score += 1;
                session.scored_index = Some(session.current);
            }
            (question, correct, session.mood, session.current)
        };

        let record = NewActivityRecord::quiz_answer(user_id, question.id, correct, mood);
        if let Err(e) = self.store.insert_activity(auth, &record).await {
            log_service_error!(SERVICE, "answer_question", user_id = user_id, error = e);
            return Err(e.into());
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(ServiceError::SessionNotFound(session_id))?;
        if session.current == index {
            session.current += 1;
        }

        Ok(AnswerOutcome {
            question_id: question.id,
            correct,
            explanation: question.explanation,
            score: session.score,
            current: session.current,
            total: session.questions.len(),
            finished: session.is_finished(),
        })
    }

    // Memory flow
    pub async fn save_memory_prompt(
        &self,
        auth: &AuthSession,
        prompt_text: &str,
    ) -> Result<MemoryPrompt, ServiceError> {
        let prompt_text = prompt_text.trim();
        if prompt_text.is_empty() {
            log_validation!(failure, "memory_prompt", error = "empty text");
            return Err(ServiceError::Validation("Please enter a text".to_string()));
        }
        if prompt_text.chars().count() > MEMORY_PROMPT_MAX_CHARS {
            log_validation!(failure, "memory_prompt", error = "text too long");
            return Err(ServiceError::Validation(format!(
                "Text must be at most {} characters",
                MEMORY_PROMPT_MAX_CHARS
            )));
        }

        let prompt = NewMemoryPrompt {
            user_id: auth.user_id().to_string(),
            prompt_text: prompt_text.to_string(),
        };
        let saved = self.store.insert_memory_prompt(auth, &prompt).await?;
        log_service_success!(SERVICE, "save_memory_prompt", "memory prompt stored");
        Ok(saved)
    }

    pub async fn latest_memory_prompt(
        &self,
        auth: &AuthSession,
    ) -> Result<Option<MemoryPrompt>, ServiceError> {
        Ok(self.store.latest_memory_prompt(auth, None).await?)
    }

    /// Compare the recall against the latest prompt and record the result on that row.
    pub async fn evening_recall(
        &self,
        auth: &AuthSession,
        recalled_text: &str,
    ) -> Result<RecallOutcome, ServiceError> {
        let recalled_text = recalled_text.trim();
        if recalled_text.is_empty() {
            log_validation!(failure, "recall", error = "empty text");
            return Err(ServiceError::Validation("Please enter a text".to_string()));
        }

        let prompt = self
            .store
            .latest_memory_prompt(auth, None)
            .await?
            .ok_or(ServiceError::NoMemoryPrompt)?;

        let correct = score_recall(&prompt.prompt_text, recalled_text);
        let update = RecallUpdate {
            recalled_text: recalled_text.to_string(),
            recall_score: if correct { 1 } else { 0 },
            checked_at: Utc::now(),
        };

        if let Err(e) = self.store.update_memory_recall(auth, prompt.id, &update).await {
            log_service_error!(SERVICE, "evening_recall", user_id = auth.user_id(), error = e);
            return Err(e.into());
        }

        Ok(RecallOutcome {
            prompt_id: prompt.id,
            correct,
            prompt_text: prompt.prompt_text,
            recalled_text: update.recalled_text,
        })
    }

    // Report flow
    pub async fn daily_report(&self, auth: &AuthSession) -> Result<DailyReport, ServiceError> {
        self.daily_report_at(auth, Utc::now()).await
    }

    pub async fn daily_report_at(
        &self,
        auth: &AuthSession,
        now: DateTime<Utc>,
    ) -> Result<DailyReport, ServiceError> {
        let since = start_of_day(now);

        let activity = self
            .store
            .recent_activity(auth, Some(since), REPORT_ACTIVITY_LIMIT)
            .await?;
        let memory_prompt = self.store.latest_memory_prompt(auth, Some(since)).await?;

        Ok(DailyReport {
            date: now.date_naive(),
            answered: activity.len(),
            correct: activity.iter().filter(|record| record.score == 1).count(),
            activity,
            recall_status: memory_prompt.as_ref().map(MemoryPrompt::recall_status),
            memory_prompt,
        })
    }

    // Profile
    pub async fn display_name(&self, auth: &AuthSession) -> Result<Option<String>, ServiceError> {
        if let Some(name) = self.display_names.get(auth.user_id()).await {
            return Ok(Some(name));
        }

        let name = self.store.display_name(auth).await?;
        if let Some(name) = &name {
            self.display_names.put(auth.user_id(), name).await;
        }
        Ok(name)
    }

    pub async fn forget_display_name(&self, user_id: &str) {
        self.display_names.invalidate(user_id).await;
    }
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}
