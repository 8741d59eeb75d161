//! crates/forum_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Answer, Email, ProfileChanges, Question, User, VerifiedIdentity};
use crate::listing::{AnswerRow, AnswerRowQuery, QuestionRow, QuestionRowQuery};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence operations for the forum: users, sessions, questions and answers.
#[async_trait]
pub trait ForumStore: Send + Sync {
    // --- User Management ---
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        profile_photo_url: &str,
    ) -> PortResult<User>;

    async fn user_by_email(&self, email: &str) -> PortResult<Option<User>>;

    async fn user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>>;

    async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> PortResult<()>;

    // --- Auth Sessions ---
    async fn create_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a session token to its user, ignoring sessions that expired before `now`.
    async fn session_user(&self, token: &str, now: DateTime<Utc>) -> PortResult<Option<User>>;

    async fn delete_session(&self, token: &str) -> PortResult<()>;

    // --- Questions ---
    async fn create_question(&self, author: Uuid, text: &str) -> PortResult<Question>;

    async fn question_by_id(&self, question_id: Uuid) -> PortResult<Option<Question>>;

    /// Marks a question as closed. A no-op if the question is already closed.
    async fn close_question(&self, question_id: Uuid, closed_at: DateTime<Utc>)
        -> PortResult<()>;

    /// Fetches listing rows (question plus author and answer count) for the
    /// given window. Ordering, offset and limit come from the query.
    async fn question_rows(&self, query: &QuestionRowQuery) -> PortResult<Vec<QuestionRow>>;

    // --- Answers ---
    async fn create_answer(
        &self,
        author: Uuid,
        question: Uuid,
        text: &str,
        replying_to: Option<Uuid>,
    ) -> PortResult<Answer>;

    async fn answer_by_id(&self, answer_id: Uuid) -> PortResult<Option<Answer>>;

    /// Fetches listing rows (answer plus author and the replied-to answer, if
    /// any) for the given window.
    async fn answer_rows(&self, query: &AnswerRowQuery) -> PortResult<Vec<AnswerRow>>;
}

/// Verifies third-party ID tokens and extracts the identity they assert.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Returns `Ok(None)` for any token that fails verification. `Err` is
    /// reserved for infrastructure faults that should surface as 500s.
    async fn verify(&self, id_token: &str) -> PortResult<Option<VerifiedIdentity>>;
}

/// Delivers notification emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> PortResult<()>;
}
