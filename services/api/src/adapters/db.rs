//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ForumStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forum_core::domain::{Answer, ProfileChanges, Question, User};
use forum_core::listing::{
    AnswerRow, AnswerRowQuery, CreatedCmp, QuestionOrderColumn, QuestionRow, QuestionRowQuery,
    ReplyRow, SortDirection,
};
use forum_core::ports::{ForumStore, PortError, PortResult};
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ForumStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn port_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        e => PortError::Unexpected(e.to_string()),
    }
}

fn sql_direction(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

fn sql_cmp(cmp: CreatedCmp) -> &'static str {
    match cmp {
        CreatedCmp::Gt => ">",
        CreatedCmp::Gte => ">=",
        CreatedCmp::Lt => "<",
        CreatedCmp::Lte => "<=",
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    profile_photo_url: String,
    answers_notifications: bool,
    replies_notifications: bool,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            profile_photo_url: self.profile_photo_url,
            answers_notifications: self.answers_notifications,
            replies_notifications: self.replies_notifications,
        }
    }
}

const USER_COLUMNS: &str =
    "id, name, email, profile_photo_url, answers_notifications, replies_notifications";

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    user_id: Uuid,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            id: self.id,
            text: self.text,
            created_at: self.created_at,
            closed_at: self.closed_at,
            author: self.user_id,
        }
    }
}

#[derive(FromRow)]
struct AnswerRecord {
    id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
    user_id: Uuid,
    question_id: Uuid,
    replying_to_id: Option<Uuid>,
}
impl AnswerRecord {
    fn to_domain(self) -> Answer {
        Answer {
            id: self.id,
            text: self.text,
            created_at: self.created_at,
            author: self.user_id,
            question: self.question_id,
            replying_to: self.replying_to_id,
        }
    }
}

#[derive(FromRow)]
struct QuestionRowRecord {
    id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    answer_count: i64,
    author_name: String,
    author_photo: String,
}
impl QuestionRowRecord {
    fn to_row(self) -> QuestionRow {
        QuestionRow {
            id: self.id,
            text: self.text,
            created_at: self.created_at,
            closed_at: self.closed_at,
            answer_count: self.answer_count,
            author_name: self.author_name,
            author_photo: self.author_photo,
        }
    }
}

#[derive(FromRow)]
struct AnswerRowRecord {
    id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
    author_name: String,
    author_photo: String,
    reply_id: Option<Uuid>,
    reply_text: Option<String>,
    reply_created_at: Option<DateTime<Utc>>,
    reply_author_name: Option<String>,
    reply_author_photo: Option<String>,
}
impl AnswerRowRecord {
    fn to_row(self) -> AnswerRow {
        // The reply columns come from a LEFT JOIN and are either all present
        // or all NULL.
        let replying_to = match (
            self.reply_id,
            self.reply_text,
            self.reply_created_at,
            self.reply_author_name,
            self.reply_author_photo,
        ) {
            (Some(id), Some(text), Some(created_at), Some(author_name), Some(author_photo)) => {
                Some(ReplyRow { id, text, created_at, author_name, author_photo })
            }
            _ => None,
        };
        AnswerRow {
            id: self.id,
            text: self.text,
            created_at: self.created_at,
            author_name: self.author_name,
            author_photo: self.author_photo,
            replying_to,
        }
    }
}

//=========================================================================================
// `ForumStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ForumStore for PgStore {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        profile_photo_url: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, name, email, profile_photo_url) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(profile_photo_url)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.to_domain())
    }

    async fn user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> PortResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::new("UPDATE users SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(name) = &changes.name {
                fields.push("name = ").push_bind_unseparated(name.as_str());
            }
            if let Some(on) = changes.answers_notifications {
                fields.push("answers_notifications = ").push_bind_unseparated(on);
            }
            if let Some(on) = changes.replies_notifications {
                fields.push("replies_notifications = ").push_bind_unseparated(on);
            }
            fields.push("updated_at = now()");
        }
        builder.push(" WHERE id = ");
        builder.push_bind(user_id);

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO sessions (id, user_id, token, expires_at) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn session_user(&self, token: &str, now: DateTime<Utc>) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.name, u.email, u.profile_photo_url, \
             u.answers_notifications, u.replies_notifications \
             FROM users u JOIN sessions s ON s.user_id = u.id \
             WHERE s.token = $1 AND s.expires_at > $2",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn delete_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn create_question(&self, author: Uuid, text: &str) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            "INSERT INTO questions (id, user_id, text) VALUES ($1, $2, $3) \
             RETURNING id, text, created_at, closed_at, user_id",
        )
        .bind(Uuid::new_v4())
        .bind(author)
        .bind(text)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.to_domain())
    }

    async fn question_by_id(&self, question_id: Uuid) -> PortResult<Option<Question>> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, text, created_at, closed_at, user_id FROM questions WHERE id = $1",
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.map(QuestionRecord::to_domain))
    }

    async fn close_question(
        &self,
        question_id: Uuid,
        closed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        // Already-closed questions keep their original closing time.
        sqlx::query(
            "UPDATE questions SET closed_at = $2, updated_at = now() \
             WHERE id = $1 AND closed_at IS NULL",
        )
        .bind(question_id)
        .bind(closed_at)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn question_rows(&self, query: &QuestionRowQuery) -> PortResult<Vec<QuestionRow>> {
        let mut builder = QueryBuilder::new(
            "SELECT q.id, q.text, q.created_at, q.closed_at, \
             (SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id) AS answer_count, \
             u.name AS author_name, u.profile_photo_url AS author_photo \
             FROM questions q JOIN users u ON u.id = q.user_id WHERE TRUE",
        );
        if let Some(author) = query.author {
            builder.push(" AND q.user_id = ");
            builder.push_bind(author);
        }
        if let Some(id) = query.id {
            builder.push(" AND q.id = ");
            builder.push_bind(id);
        }

        let column = match query.order_by {
            QuestionOrderColumn::CreatedAt => "q.created_at",
            QuestionOrderColumn::AnswerCount => "answer_count",
        };
        let direction = sql_direction(query.direction);
        builder.push(format!(" ORDER BY {column} {direction}, q.id {direction}"));
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);
        builder.push(" LIMIT ");
        builder.push_bind(query.limit);

        let records = builder
            .build_query_as::<QuestionRowRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(records.into_iter().map(QuestionRowRecord::to_row).collect())
    }

    async fn create_answer(
        &self,
        author: Uuid,
        question: Uuid,
        text: &str,
        replying_to: Option<Uuid>,
    ) -> PortResult<Answer> {
        let record = sqlx::query_as::<_, AnswerRecord>(
            "INSERT INTO answers (id, user_id, question_id, text, replying_to_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, text, created_at, user_id, question_id, replying_to_id",
        )
        .bind(Uuid::new_v4())
        .bind(author)
        .bind(question)
        .bind(text)
        .bind(replying_to)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.to_domain())
    }

    async fn answer_by_id(&self, answer_id: Uuid) -> PortResult<Option<Answer>> {
        let record = sqlx::query_as::<_, AnswerRecord>(
            "SELECT id, text, created_at, user_id, question_id, replying_to_id \
             FROM answers WHERE id = $1",
        )
        .bind(answer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.map(AnswerRecord::to_domain))
    }

    async fn answer_rows(&self, query: &AnswerRowQuery) -> PortResult<Vec<AnswerRow>> {
        let mut builder = QueryBuilder::new(
            "SELECT a.id, a.text, a.created_at, \
             u.name AS author_name, u.profile_photo_url AS author_photo, \
             r.id AS reply_id, r.text AS reply_text, r.created_at AS reply_created_at, \
             ru.name AS reply_author_name, ru.profile_photo_url AS reply_author_photo \
             FROM answers a \
             JOIN users u ON u.id = a.user_id \
             LEFT JOIN answers r ON r.id = a.replying_to_id \
             LEFT JOIN users ru ON ru.id = r.user_id \
             WHERE a.question_id = ",
        );
        builder.push_bind(query.question);

        // A missing reference makes the subquery NULL, so the comparison
        // matches no rows and the window comes back empty.
        if let Some((cmp, reference)) = query.created_cmp {
            builder.push(format!(
                " AND a.created_at {} (SELECT created_at FROM answers WHERE id = ",
                sql_cmp(cmp)
            ));
            builder.push_bind(reference);
            builder.push(")");
        }

        let direction = sql_direction(query.direction);
        builder.push(format!(" ORDER BY a.created_at {direction}, a.id {direction}"));
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);
        builder.push(" LIMIT ");
        builder.push_bind(query.limit);

        let records = builder
            .build_query_as::<AnswerRowRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(records.into_iter().map(AnswerRowRecord::to_row).collect())
    }
}
