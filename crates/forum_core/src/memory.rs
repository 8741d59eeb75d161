//! crates/forum_core/src/memory.rs
//!
//! An in-memory [`ForumStore`] for tests. It mirrors the ordering and join
//! behavior of the SQL adapter so listing logic can be exercised without a
//! database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{Answer, ProfileChanges, Question, User};
use crate::listing::{
    AnswerRow, AnswerRowQuery, CreatedCmp, QuestionOrderColumn, QuestionRow, QuestionRowQuery,
    ReplyRow, SortDirection,
};
use crate::ports::{ForumStore, PortError, PortResult};

#[derive(Debug, Clone)]
struct StoredSession {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    users: Vec<User>,
    sessions: HashMap<String, StoredSession>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    last_created_at: Option<DateTime<Utc>>,
}

impl Inner {
    /// Returns a strictly increasing timestamp. Rows created within the same
    /// clock tick are nudged apart so ordering stays deterministic.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let mut stamp = Utc::now();
        if let Some(last) = self.last_created_at {
            if stamp <= last {
                stamp = last + Duration::microseconds(1);
            }
        }
        self.last_created_at = Some(stamp);
        stamp
    }
}

/// An in-memory store backed by a mutex. Cheap to construct per test.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| PortError::Unexpected("store mutex poisoned".to_string()))
    }
}

fn directed(ord: std::cmp::Ordering, direction: SortDirection) -> std::cmp::Ordering {
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn window<T>(rows: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl ForumStore for MemoryStore {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        profile_photo_url: &str,
    ) -> PortResult<User> {
        let mut inner = self.lock()?;
        if inner.users.iter().any(|u| u.email == email) {
            return Err(PortError::Unexpected(format!(
                "email already registered: {email}"
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            profile_photo_url: profile_photo_url.to_string(),
            answers_notifications: true,
            replies_notifications: true,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> PortResult<()> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) {
            if let Some(name) = &changes.name {
                user.name = name.clone();
            }
            if let Some(on) = changes.answers_notifications {
                user.answers_notifications = on;
            }
            if let Some(on) = changes.replies_notifications {
                user.replies_notifications = on;
            }
        }
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut inner = self.lock()?;
        inner
            .sessions
            .insert(token.to_string(), StoredSession { user_id, expires_at });
        Ok(())
    }

    async fn session_user(&self, token: &str, now: DateTime<Utc>) -> PortResult<Option<User>> {
        let inner = self.lock()?;
        let Some(session) = inner.sessions.get(token) else {
            return Ok(None);
        };
        if session.expires_at <= now {
            return Ok(None);
        }
        Ok(inner.users.iter().find(|u| u.id == session.user_id).cloned())
    }

    async fn delete_session(&self, token: &str) -> PortResult<()> {
        let mut inner = self.lock()?;
        inner.sessions.remove(token);
        Ok(())
    }

    async fn create_question(&self, author: Uuid, text: &str) -> PortResult<Question> {
        let mut inner = self.lock()?;
        let question = Question {
            id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: inner.next_stamp(),
            closed_at: None,
            author,
        };
        inner.questions.push(question.clone());
        Ok(question)
    }

    async fn question_by_id(&self, question_id: Uuid) -> PortResult<Option<Question>> {
        let inner = self.lock()?;
        Ok(inner.questions.iter().find(|q| q.id == question_id).cloned())
    }

    async fn close_question(
        &self,
        question_id: Uuid,
        closed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut inner = self.lock()?;
        if let Some(question) = inner.questions.iter_mut().find(|q| q.id == question_id) {
            if question.closed_at.is_none() {
                question.closed_at = Some(closed_at);
            }
        }
        Ok(())
    }

    async fn question_rows(&self, query: &QuestionRowQuery) -> PortResult<Vec<QuestionRow>> {
        let inner = self.lock()?;
        let mut rows: Vec<QuestionRow> = inner
            .questions
            .iter()
            .filter(|q| query.id.map_or(true, |id| q.id == id))
            .filter(|q| query.author.map_or(true, |author| q.author == author))
            .filter_map(|q| {
                let author = inner.users.iter().find(|u| u.id == q.author)?;
                let answer_count =
                    inner.answers.iter().filter(|a| a.question == q.id).count() as i64;
                Some(QuestionRow {
                    id: q.id,
                    text: q.text.clone(),
                    created_at: q.created_at,
                    closed_at: q.closed_at,
                    answer_count,
                    author_name: author.name.clone(),
                    author_photo: author.profile_photo_url.clone(),
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            let ord = match query.order_by {
                QuestionOrderColumn::CreatedAt => (a.created_at, a.id).cmp(&(b.created_at, b.id)),
                QuestionOrderColumn::AnswerCount => {
                    (a.answer_count, a.id).cmp(&(b.answer_count, b.id))
                }
            };
            directed(ord, query.direction)
        });
        Ok(window(rows, query.offset, query.limit))
    }

    async fn create_answer(
        &self,
        author: Uuid,
        question: Uuid,
        text: &str,
        replying_to: Option<Uuid>,
    ) -> PortResult<Answer> {
        let mut inner = self.lock()?;
        let answer = Answer {
            id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: inner.next_stamp(),
            author,
            question,
            replying_to,
        };
        inner.answers.push(answer.clone());
        Ok(answer)
    }

    async fn answer_by_id(&self, answer_id: Uuid) -> PortResult<Option<Answer>> {
        let inner = self.lock()?;
        Ok(inner.answers.iter().find(|a| a.id == answer_id).cloned())
    }

    async fn answer_rows(&self, query: &AnswerRowQuery) -> PortResult<Vec<AnswerRow>> {
        let inner = self.lock()?;

        // A comparison against a reference that no longer exists matches
        // nothing, like a SQL comparison against a NULL subquery.
        let created_bound = match query.created_cmp {
            Some((cmp, ref_id)) => {
                let Some(reference) = inner.answers.iter().find(|a| a.id == ref_id) else {
                    return Ok(Vec::new());
                };
                Some((cmp, reference.created_at))
            }
            None => None,
        };

        let mut rows: Vec<AnswerRow> = inner
            .answers
            .iter()
            .filter(|a| a.question == query.question)
            .filter(|a| match created_bound {
                Some((CreatedCmp::Gt, at)) => a.created_at > at,
                Some((CreatedCmp::Gte, at)) => a.created_at >= at,
                Some((CreatedCmp::Lt, at)) => a.created_at < at,
                Some((CreatedCmp::Lte, at)) => a.created_at <= at,
                None => true,
            })
            .filter_map(|a| {
                let author = inner.users.iter().find(|u| u.id == a.author)?;
                let replying_to = a.replying_to.and_then(|id| {
                    let replied = inner.answers.iter().find(|r| r.id == id)?;
                    let replied_author = inner.users.iter().find(|u| u.id == replied.author)?;
                    Some(ReplyRow {
                        id: replied.id,
                        text: replied.text.clone(),
                        created_at: replied.created_at,
                        author_name: replied_author.name.clone(),
                        author_photo: replied_author.profile_photo_url.clone(),
                    })
                });
                Some(AnswerRow {
                    id: a.id,
                    text: a.text.clone(),
                    created_at: a.created_at,
                    author_name: author.name.clone(),
                    author_photo: author.profile_photo_url.clone(),
                    replying_to,
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            directed((a.created_at, a.id).cmp(&(b.created_at, b.id)), query.direction)
        });
        Ok(window(rows, query.offset, query.limit))
    }
}
