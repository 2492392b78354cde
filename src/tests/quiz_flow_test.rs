use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::display_name_cache::DisplayNameCache;
use crate::errors::ApiError;
use crate::models::*;
use crate::quiz_service::{QuizService, ServiceError};
use crate::store::{QuestionSource, QuizStore, StoreError};

/// Store whose activity inserts and recall updates can be switched to fail.
#[derive(Default)]
struct ScriptedStore {
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    inserted: Mutex<Vec<NewActivityRecord>>,
    prompt: Mutex<Option<MemoryPrompt>>,
    lookups: AtomicUsize,
}

fn question(id: i64, difficulty: i32, answer: &str) -> Question {
    Question {
        id,
        category: "Mathe".to_string(),
        prompt: format!("Frage {}", id),
        answer_options: None,
        correct_answer: answer.to_string(),
        difficulty,
        tag: None,
        explanation: Some(format!("Erklärung {}", id)),
    }
}

#[async_trait]
impl QuestionSource for ScriptedStore {
    async fn fetch_questions(
        &self,
        _auth: &AuthSession,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok((0..filter.limit as i64)
            .map(|n| question(filter.difficulty as i64 * 100 + n, filter.difficulty, "42"))
            .collect())
    }
}

#[async_trait]
impl QuizStore for ScriptedStore {
    async fn insert_activity(
        &self,
        _auth: &AuthSession,
        record: &NewActivityRecord,
    ) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::PermissionDenied(
                "new row violates row-level security policy".to_string(),
            ));
        }
        self.inserted.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn recent_activity(
        &self,
        _auth: &AuthSession,
        _since: Option<DateTime<Utc>>,
        _limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn insert_memory_prompt(
        &self,
        _auth: &AuthSession,
        _prompt: &NewMemoryPrompt,
    ) -> Result<MemoryPrompt, StoreError> {
        Err(StoreError::Decode("not scripted".to_string()))
    }

    async fn update_memory_recall(
        &self,
        _auth: &AuthSession,
        _prompt_id: i64,
        _update: &RecallUpdate,
    ) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::PermissionDenied(
                "new row violates row-level security policy".to_string(),
            ));
        }
        Ok(())
    }

    async fn latest_memory_prompt(
        &self,
        _auth: &AuthSession,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Option<MemoryPrompt>, StoreError> {
        Ok(self.prompt.lock().unwrap().clone())
    }

    async fn display_name(&self, _auth: &AuthSession) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

fn session_for(user_id: &str) -> AuthSession {
    AuthSession {
        access_token: "token".to_string(),
        refresh_token: None,
        expires_in: None,
        user: AuthUser {
            id: user_id.to_string(),
            email: None,
        },
    }
}

fn service(store: Arc<ScriptedStore>) -> QuizService {
    QuizService::new(store, DisplayNameCache::new(10, 30))
}

#[tokio::test]
async fn failed_insert_keeps_score_but_not_progress() {
    let store = Arc::new(ScriptedStore::default());
    let service = service(store.clone());
    let auth = session_for("u1");

    service.choose_mood("u1", "sad").await.unwrap();
    service
        .choose_categories("u1", vec!["mathe".to_string()])
        .await
        .unwrap();
    let session = service.start_quiz(&auth).await.unwrap();
    assert_eq!(session.questions.len(), 5);

    store.fail_inserts.store(true, Ordering::SeqCst);
    let result = service
        .answer_question(&auth, session.session_id, "42")
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::Store(StoreError::PermissionDenied(_)))
    ));

    let after_failure = service.quiz_session("u1", session.session_id).await.unwrap();
    assert_eq!(after_failure.current, 0);
    assert_eq!(after_failure.score, 1);

    store.fail_inserts.store(false, Ordering::SeqCst);
    let outcome = service
        .answer_question(&auth, session.session_id, "42")
        .await
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.current, 1);
    assert_eq!(outcome.score, 1);
    assert_eq!(store.inserted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn retried_question_scores_once() {
    let store = Arc::new(ScriptedStore::default());
    let service = service(store.clone());
    let auth = session_for("u1");

    service
        .choose_categories("u1", vec!["mathe".to_string()])
        .await
        .unwrap();
    let session = service.start_quiz(&auth).await.unwrap();
    let total = session.questions.len();

    store.fail_inserts.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        assert!(service.answer_question(&auth, session.session_id, "42").await.is_err());
    }
    let stuck = service.quiz_session("u1", session.session_id).await.unwrap();
    assert_eq!(stuck.current, 0);
    assert_eq!(stuck.score, 1);

    store.fail_inserts.store(false, Ordering::SeqCst);
    let mut last = None;
    for _ in 0..total {
        last = Some(
            service
                .answer_question(&auth, session.session_id, "42")
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert!(last.finished);
    assert_eq!(last.score as usize, total);
}

#[tokio::test]
async fn failed_recall_update_is_reported() {
    let store = Arc::new(ScriptedStore::default());
    *store.prompt.lock().unwrap() = Some(MemoryPrompt {
        id: 7,
        user_id: "u1".to_string(),
        prompt_text: "Blauer Himmel".to_string(),
        recalled_text: None,
        recall_score: None,
        created_at: Utc::now(),
        checked_at: None,
    });
    store.fail_updates.store(true, Ordering::SeqCst);
    let service = service(store.clone());
    let auth = session_for("u1");

    let result = service.evening_recall(&auth, "blauer himmel").await;
    let error = match result {
        Err(error @ ServiceError::Store(StoreError::PermissionDenied(_))) => error,
        other => panic!("expected a denied update, got {:?}", other),
    };
    assert!(error.is_store_failure());
    assert!(matches!(ApiError::from(error), ApiError::PermissionDenied(_)));

    store.fail_updates.store(false, Ordering::SeqCst);
    let outcome = service.evening_recall(&auth, "blauer himmel").await.unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.prompt_id, 7);
}

#[tokio::test]
async fn expired_sessions_are_dropped_on_next_start() {
    let store = Arc::new(ScriptedStore::default());
    let service = service(store).with_session_ttl(Duration::zero());
    let auth = session_for("u1");

    service
        .choose_categories("u1", vec!["mathe".to_string()])
        .await
        .unwrap();
    let first = service.start_quiz(&auth).await.unwrap();
    assert!(service.quiz_session("u1", first.session_id).await.is_ok());

    let second = service.start_quiz(&auth).await.unwrap();
    assert!(matches!(
        service.quiz_session("u1", first.session_id).await,
        Err(ServiceError::SessionNotFound(_))
    ));
    assert!(service.quiz_session("u1", second.session_id).await.is_ok());
}

#[tokio::test]
async fn live_sessions_survive_a_new_start() {
    let store = Arc::new(ScriptedStore::default());
    let service = service(store);
    let auth = session_for("u1");

    service
        .choose_categories("u1", vec!["mathe".to_string()])
        .await
        .unwrap();
    let first = service.start_quiz(&auth).await.unwrap();
    service.start_quiz(&auth).await.unwrap();

    assert!(service.quiz_session("u1", first.session_id).await.is_ok());
}

#[tokio::test]
async fn answering_past_the_end_is_rejected() {
    let store = Arc::new(ScriptedStore::default());
    let service = service(store.clone());
    let auth = session_for("u1");

    service.choose_mood("u1", "sad").await.unwrap();
    service
        .choose_categories("u1", vec!["mathe".to_string()])
        .await
        .unwrap();
    let session = service.start_quiz(&auth).await.unwrap();

    let mut last = None;
    for _ in 0..session.questions.len() {
        last = Some(
            service
                .answer_question(&auth, session.session_id, "wrong")
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert!(last.finished);
    assert_eq!(last.score, 0);

    let inserted = store.inserted.lock().unwrap().clone();
    assert_eq!(inserted.len(), 5);
    assert!(inserted.iter().all(|record| record.score == 0 && record.mood == Mood::Sad));

    let result = service
        .answer_question(&auth, session.session_id, "42")
        .await;
    assert!(matches!(result, Err(ServiceError::SessionFinished(_))));
}

#[tokio::test]
async fn sessions_are_private_to_their_user() {
    let store = Arc::new(ScriptedStore::default());
    let service = service(store);
    let owner = session_for("owner");
    let other = session_for("other");

    service
        .choose_categories("owner", vec!["trivia".to_string()])
        .await
        .unwrap();
    let session = service.start_quiz(&owner).await.unwrap();
    assert_eq!(session.mood, Mood::Neutral);

    let result = service
        .answer_question(&other, session.session_id, "42")
        .await;
    assert!(matches!(result, Err(ServiceError::SessionNotFound(_))));
}

#[tokio::test]
async fn unknown_category_ids_never_reach_the_store() {
    let store = Arc::new(ScriptedStore::default());
    let service = service(store.clone());
    let auth = session_for("u1");

    service
        .choose_categories("u1", vec!["astronomie".to_string()])
        .await
        .unwrap();
    let result = service.start_quiz(&auth).await;

    assert!(matches!(
        result,
        Err(ServiceError::Selection(crate::question_selector::SelectionError::NoCategories))
    ));
    assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
}
