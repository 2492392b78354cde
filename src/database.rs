use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Instant;

use crate::log_db_operation;
use crate::models::*;
use crate::store::{QuestionSource, QuizStore, StoreError};

/// Local SQLite mirror of the managed backend's tables.
///
/// Row-level security is not emulated; every query is scoped to the
/// session's user id explicitly.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Each in-memory connection would otherwise see its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "schema ready");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kategorie TEXT NOT NULL,
                frage TEXT NOT NULL,
                antwortoptionen TEXT,
                korrekte_antwort TEXT NOT NULL,
                schwierigkeitsgrad INTEGER NOT NULL CHECK (schwierigkeitsgrad BETWEEN 1 AND 3),
                tag TEXT,
                erklaerung TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                question_id INTEGER NOT NULL,
                score INTEGER NOT NULL CHECK (score IN (0, 1)),
                session_type TEXT NOT NULL,
                mood TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                prompt_text TEXT NOT NULL,
                recalled_text TEXT,
                recall_score INTEGER CHECK (recall_score IN (0, 1)),
                created_at TEXT NOT NULL,
                checked_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                first_name TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_questions_lookup ON questions (kategorie, schwierigkeitsgrad)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Question operations (reference data, written only by the import tool and tests)
    pub async fn insert_question(&self, question: &NewQuestion) -> Result<Question> {
        let options_json = question
            .answer_options
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO questions (kategorie, frage, antwortoptionen, korrekte_antwort,
                                   schwierigkeitsgrad, tag, erklaerung)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&question.category)
        .bind(&question.prompt)
        .bind(&options_json)
        .bind(&question.correct_answer)
        .bind(question.difficulty)
        .bind(&question.tag)
        .bind(&question.explanation)
        .execute(&self.pool)
        .await?;

        Ok(Question {
            id: result.last_insert_rowid(),
            category: question.category.clone(),
            prompt: question.prompt.clone(),
            answer_options: question.answer_options.clone(),
            correct_answer: question.correct_answer.clone(),
            difficulty: question.difficulty,
            tag: question.tag.clone(),
            explanation: question.explanation.clone(),
        })
    }

    /// Insert a batch in one transaction; nothing is written if any row fails.
    pub async fn insert_questions(&self, questions: &[NewQuestion]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for question in questions {
            let options_json = question
                .answer_options
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO questions (kategorie, frage, antwortoptionen, korrekte_antwort,
                                       schwierigkeitsgrad, tag, erklaerung)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&question.category)
            .bind(&question.prompt)
            .bind(&options_json)
            .bind(&question.correct_answer)
            .bind(question.difficulty)
            .bind(&question.tag)
            .bind(&question.explanation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(questions.len())
    }

    pub async fn count_questions(&self) -> Result<i64> {
        let count = sqlx::query("SELECT COUNT(*) AS count FROM questions")
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("count");
        Ok(count)
    }

    pub async fn upsert_profile(&self, user_id: &str, first_name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, first_name) VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET first_name = excluded.first_name
            "#,
        )
        .bind(user_id)
        .bind(first_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_question(row: &SqliteRow) -> Result<Question, StoreError> {
        let answer_options = row
            .get::<Option<String>, _>("antwortoptionen")
            .map(|json| serde_json::from_str::<Vec<String>>(&json))
            .transpose()
            .map_err(|e| StoreError::Decode(format!("antwortoptionen: {}", e)))?;

        Ok(Question {
            id: row.get("id"),
            category: row.get("kategorie"),
            prompt: row.get("frage"),
            answer_options,
            correct_answer: row.get("korrekte_antwort"),
            difficulty: row.get("schwierigkeitsgrad"),
            tag: row.get("tag"),
            explanation: row.get("erklaerung"),
        })
    }

    fn row_to_activity(row: &SqliteRow) -> Result<ActivityRecord, StoreError> {
        Ok(ActivityRecord {
            id: Some(row.get("id")),
            user_id: row.get("user_id"),
            question_id: row.get("question_id"),
            score: row.get("score"),
            session_type: row.get("session_type"),
            mood: row.get("mood"),
            timestamp: parse_db_timestamp(&row.get::<String, _>("timestamp"))?,
        })
    }

    fn row_to_memory_prompt(row: &SqliteRow) -> Result<MemoryPrompt, StoreError> {
        Ok(MemoryPrompt {
            id: row.get("id"),
            user_id: row.get("user_id"),
            prompt_text: row.get("prompt_text"),
            recalled_text: row.get("recalled_text"),
            recall_score: row.get("recall_score"),
            created_at: parse_db_timestamp(&row.get::<String, _>("created_at"))?,
            checked_at: row
                .get::<Option<String>, _>("checked_at")
                .map(|s| parse_db_timestamp(&s))
                .transpose()?,
        })
    }
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn to_db_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("timestamp '{}': {}", value, e)))
}

#[async_trait]
impl QuestionSource for Database {
    async fn fetch_questions(
        &self,
        _auth: &AuthSession,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>, StoreError> {
        if filter.categories.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let placeholders = filter
            .categories
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT * FROM questions WHERE kategorie IN ({}) AND schwierigkeitsgrad = ? LIMIT ?",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for category in &filter.categories {
            query = query.bind(category);
        }
        let rows = query
            .bind(filter.difficulty)
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await?;
        let questions = rows
            .iter()
            .map(Self::row_to_question)
            .collect::<Result<Vec<_>, _>>()?;

        log_db_operation!(
            debug,
            "fetch_questions",
            count = questions.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(questions)
    }
}

#[async_trait]
impl QuizStore for Database {
    async fn insert_activity(
        &self,
        _auth: &AuthSession,
        record: &NewActivityRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_activity (user_id, question_id, score, session_type, mood, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.user_id)
        .bind(record.question_id)
        .bind(record.score)
        .bind(&record.session_type)
        .bind(record.mood.as_str())
        .bind(to_db_timestamp(&record.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_activity(
        &self,
        auth: &AuthSession,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let rows = match since {
            Some(since) => {
                sqlx::query(
                    "SELECT * FROM user_activity WHERE user_id = ?1 AND timestamp >= ?2 ORDER BY timestamp DESC, id DESC LIMIT ?3",
                )
                .bind(auth.user_id())
                .bind(to_db_timestamp(&since))
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM user_activity WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
                )
                .bind(auth.user_id())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::row_to_activity).collect()
    }

    async fn insert_memory_prompt(
        &self,
        _auth: &AuthSession,
        prompt: &NewMemoryPrompt,
    ) -> Result<MemoryPrompt, StoreError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO memory_prompts (user_id, prompt_text, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&prompt.user_id)
        .bind(&prompt.prompt_text)
        .bind(to_db_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(MemoryPrompt {
            id: result.last_insert_rowid(),
            user_id: prompt.user_id.clone(),
            prompt_text: prompt.prompt_text.clone(),
            recalled_text: None,
            recall_score: None,
            created_at,
            checked_at: None,
        })
    }

    async fn update_memory_recall(
        &self,
        auth: &AuthSession,
        prompt_id: i64,
        update: &RecallUpdate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE memory_prompts
            SET recalled_text = ?1, recall_score = ?2, checked_at = ?3
            WHERE id = ?4 AND user_id = ?5
            "#,
        )
        .bind(&update.recalled_text)
        .bind(update.recall_score)
        .bind(to_db_timestamp(&update.checked_at))
        .bind(prompt_id)
        .bind(auth.user_id())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            log_db_operation!(error, "update_memory_recall", error = "no matching prompt row");
            return Err(StoreError::RowNotFound(format!("memory prompt {}", prompt_id)));
        }
        Ok(())
    }

    async fn latest_memory_prompt(
        &self,
        auth: &AuthSession,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<MemoryPrompt>, StoreError> {
        let row = match since {
            Some(since) => {
                sqlx::query(
                    "SELECT * FROM memory_prompts WHERE user_id = ?1 AND created_at >= ?2 ORDER BY created_at DESC, id DESC LIMIT 1",
                )
                .bind(auth.user_id())
                .bind(to_db_timestamp(&since))
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM memory_prompts WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                )
                .bind(auth.user_id())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(Self::row_to_memory_prompt).transpose()
    }

    async fn display_name(&self, auth: &AuthSession) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT first_name FROM profiles WHERE user_id = ?1")
            .bind(auth.user_id())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|row| row.get::<Option<String>, _>("first_name")))
    }
}
