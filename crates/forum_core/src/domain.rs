//! crates/forum_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A registered user account, created on first Google sign-in.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_photo_url: String,
    /// Whether the user wants an email when someone answers their question.
    pub answers_notifications: bool,
    /// Whether the user wants an email when someone replies to their answer.
    pub replies_notifications: bool,
}

/// A question posted to the forum.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Set once the author closes the question. Closed questions reject new answers.
    pub closed_at: Option<DateTime<Utc>>,
    pub author: Uuid,
}

impl Question {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// An answer under a question, optionally replying to an earlier answer.
#[derive(Debug, Clone)]
pub struct Answer {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Uuid,
    pub question: Uuid,
    pub replying_to: Option<Uuid>,
}

/// A partial update to a user's profile. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub answers_notifications: Option<bool>,
    pub replies_notifications: Option<bool>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.answers_notifications.is_none()
            && self.replies_notifications.is_none()
    }
}

/// Identity claims extracted from a verified Google ID token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub name: String,
    pub email: String,
    pub profile_photo_url: String,
}

/// An outbound notification email, ready for delivery.
#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}
