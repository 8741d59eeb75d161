//! services/api/src/notify.rs
//!
//! This module contains the background notification pipeline. Handlers push
//! lightweight jobs onto an unbounded queue; a single worker task drains it,
//! loads the affected rows, applies the recipient's notification settings
//! and hands finished emails to the mailer.
//!
//! The worker is designed to be gracefully cancelled via a `CancellationToken`.

use std::sync::Arc;

use forum_core::domain::{Email, User};
use forum_core::listing::preview_text;
use forum_core::ports::{ForumStore, Mailer, PortResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;

/// A notification to be delivered asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationJob {
    /// A question received a new answer.
    NewAnswer { question_id: Uuid, answer_id: Uuid },
    /// An answer received a reply.
    NewReply {
        replying_to_answer_id: Uuid,
        answer_id: Uuid,
    },
}

/// The handler-side handle of the notification queue.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<NotificationJob>,
}

impl NotificationQueue {
    /// Creates the queue and the receiving end for the worker.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a job for the background worker. Delivery is best-effort: a
    /// request must never fail because the worker is gone.
    pub fn enqueue(&self, job: NotificationJob) {
        if self.tx.send(job).is_err() {
            warn!("Notification worker is not running; dropping job");
        }
    }
}

/// The background task that turns queued jobs into emails.
pub struct NotificationWorker {
    store: Arc<dyn ForumStore>,
    mailer: Arc<dyn Mailer>,
    config: Arc<Config>,
}

impl NotificationWorker {
    pub fn new(store: Arc<dyn ForumStore>, mailer: Arc<dyn Mailer>, config: Arc<Config>) -> Self {
        Self { store, mailer, config }
    }

    /// Spawns the worker onto the runtime.
    pub fn spawn(
        self,
        rx: mpsc::UnboundedReceiver<NotificationJob>,
        cancellation_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(rx, cancellation_token).await })
    }

    async fn run(
        &self,
        mut rx: mpsc::UnboundedReceiver<NotificationJob>,
        cancellation_token: CancellationToken,
    ) {
        info!("Notification worker started.");
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                job = rx.recv() => {
                    let Some(job) = job else { break };
                    if let Err(e) = self.handle(job).await {
                        warn!("Notification delivery failed: {e}");
                    }
                }
            }
        }
        info!("Notification worker stopped.");
    }

    /// Processes one job. Rows that disappeared since the job was queued,
    /// recipients who opted out and users acting on their own content all
    /// end the job without an email.
    pub async fn handle(&self, job: NotificationJob) -> PortResult<()> {
        match job {
            NotificationJob::NewAnswer { question_id, answer_id } => {
                let Some(question) = self.store.question_by_id(question_id).await? else {
                    return Ok(());
                };
                let Some(recipient) = self.store.user_by_id(question.author).await? else {
                    return Ok(());
                };
                if !recipient.answers_notifications {
                    return Ok(());
                }
                let Some(answer) = self.store.answer_by_id(answer_id).await? else {
                    return Ok(());
                };
                if answer.author == question.author {
                    return Ok(());
                }
                let Some(answer_author) = self.store.user_by_id(answer.author).await? else {
                    return Ok(());
                };

                let url = fill_link(
                    &self.config.new_answer_url_template,
                    &[
                        ("questionId", question.id.to_string()),
                        ("answerId", answer.id.to_string()),
                    ],
                );
                let preview =
                    preview_text(&question.text, self.config.question_preview_length);
                let email = Email {
                    to: recipient.email.clone(),
                    subject: "Someone answered your question!".to_string(),
                    html_body: new_answer_body(&recipient, &answer_author, &preview, &url),
                };
                self.mailer.send(&email).await
            }
            NotificationJob::NewReply { replying_to_answer_id, answer_id } => {
                let Some(replied_to) = self.store.answer_by_id(replying_to_answer_id).await?
                else {
                    return Ok(());
                };
                let Some(recipient) = self.store.user_by_id(replied_to.author).await? else {
                    return Ok(());
                };
                if !recipient.replies_notifications {
                    return Ok(());
                }
                let Some(reply) = self.store.answer_by_id(answer_id).await? else {
                    return Ok(());
                };
                if reply.author == replied_to.author {
                    return Ok(());
                }
                let Some(reply_author) = self.store.user_by_id(reply.author).await? else {
                    return Ok(());
                };

                let url = fill_link(
                    &self.config.new_reply_url_template,
                    &[
                        ("questionId", replied_to.question.to_string()),
                        ("answerId", reply.id.to_string()),
                        ("repliedToAnswerId", replied_to.id.to_string()),
                    ],
                );
                let preview =
                    preview_text(&replied_to.text, self.config.own_answer_preview_length);
                let email = Email {
                    to: recipient.email.clone(),
                    subject: "Someone replied to your answer!".to_string(),
                    html_body: new_reply_body(&recipient, &reply_author, &preview, &url),
                };
                self.mailer.send(&email).await
            }
        }
    }
}

/// Substitutes `{key}` placeholder segments in a link template.
fn fill_link(template: &str, pairs: &[(&str, String)]) -> String {
    let mut link = template.to_string();
    for (key, value) in pairs {
        link = link.replace(&format!("{{{key}}}"), value);
    }
    link
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn new_answer_body(recipient: &User, author: &User, preview: &str, url: &str) -> String {
    format!(
        "<p>Hi {},</p>\
         <p>{} answered your question:</p>\
         <blockquote>{}</blockquote>\
         <p><a href=\"{}\">Read the answer</a></p>",
        escape_html(&recipient.name),
        escape_html(&author.name),
        escape_html(preview),
        url,
    )
}

fn new_reply_body(recipient: &User, author: &User, preview: &str, url: &str) -> String {
    format!(
        "<p>Hi {},</p>\
         <p>{} replied to your answer:</p>\
         <blockquote>{}</blockquote>\
         <p><a href=\"{}\">Read the reply</a></p>",
        escape_html(&recipient.name),
        escape_html(&author.name),
        escape_html(preview),
        url,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forum_core::domain::{Answer, Question};
    use forum_core::memory::MemoryStore;
    use forum_core::ports::PortError;
    use forum_core::ProfileChanges;
    use std::sync::Mutex;
    use tracing::Level;

    struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
    }

    impl RecordingMailer {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()) }
        }

        fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &Email) -> PortResult<()> {
            self.sent
                .lock()
                .map_err(|_| PortError::Unexpected("mailer mutex poisoned".to_string()))?
                .push(email.clone());
            Ok(())
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: "postgres://unused".to_string(),
            log_level: Level::INFO,
            cors_origin: "http://localhost:3000".to_string(),
            google_client_id: "client-id".to_string(),
            page_size: 10,
            question_preview_length: 20,
            own_answer_preview_length: 20,
            frontend_oauth_response_url: "http://localhost:3000/oauth".parse().unwrap(),
            new_answer_url_template: "http://forum.test/q/{questionId}#{answerId}".to_string(),
            new_reply_url_template:
                "http://forum.test/q/{questionId}/a/{repliedToAnswerId}#{answerId}".to_string(),
            smtp: None,
        })
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        worker: NotificationWorker,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let worker = NotificationWorker::new(store.clone(), mailer.clone(), test_config());
        Fixture { store, mailer, worker }
    }

    async fn seed_user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(name, &format!("{name}@example.com"), "https://example.com/p.png")
            .await
            .unwrap()
    }

    async fn seed_question(store: &MemoryStore, author: &User, text: &str) -> Question {
        store.create_question(author.id, text).await.unwrap()
    }

    async fn seed_answer(
        store: &MemoryStore,
        author: &User,
        question: &Question,
        text: &str,
        replying_to: Option<Uuid>,
    ) -> Answer {
        store
            .create_answer(author.id, question.id, text, replying_to)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn new_answer_notifies_the_question_author() {
        let f = fixture();
        let asker = seed_user(&f.store, "asker").await;
        let helper = seed_user(&f.store, "helper").await;
        let question = seed_question(&f.store, &asker, "How do lifetimes work?").await;
        let answer = seed_answer(&f.store, &helper, &question, "Carefully.", None).await;

        f.worker
            .handle(NotificationJob::NewAnswer {
                question_id: question.id,
                answer_id: answer.id,
            })
            .await
            .unwrap();

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "asker@example.com");
        assert_eq!(sent[0].subject, "Someone answered your question!");
        assert!(sent[0].html_body.contains("helper"));
        assert!(sent[0]
            .html_body
            .contains(&format!("http://forum.test/q/{}#{}", question.id, answer.id)));
    }

    #[tokio::test]
    async fn new_answer_preview_is_truncated() {
        let f = fixture();
        let asker = seed_user(&f.store, "asker").await;
        let helper = seed_user(&f.store, "helper").await;
        let long_text = "z".repeat(40);
        let question = seed_question(&f.store, &asker, &long_text).await;
        let answer = seed_answer(&f.store, &helper, &question, "short", None).await;

        f.worker
            .handle(NotificationJob::NewAnswer {
                question_id: question.id,
                answer_id: answer.id,
            })
            .await
            .unwrap();

        let sent = f.mailer.sent();
        // question_preview_length is 20 in the test config
        assert!(sent[0].html_body.contains(&format!("{}...", "z".repeat(20))));
        assert!(!sent[0].html_body.contains(&long_text));
    }

    #[tokio::test]
    async fn answering_your_own_question_sends_nothing() {
        let f = fixture();
        let asker = seed_user(&f.store, "asker").await;
        let question = seed_question(&f.store, &asker, "q").await;
        let answer = seed_answer(&f.store, &asker, &question, "self answer", None).await;

        f.worker
            .handle(NotificationJob::NewAnswer {
                question_id: question.id,
                answer_id: answer.id,
            })
            .await
            .unwrap();

        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn muted_answer_notifications_send_nothing() {
        let f = fixture();
        let asker = seed_user(&f.store, "asker").await;
        let helper = seed_user(&f.store, "helper").await;
        f.store
            .update_profile(
                asker.id,
                &ProfileChanges {
                    answers_notifications: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let question = seed_question(&f.store, &asker, "q").await;
        let answer = seed_answer(&f.store, &helper, &question, "a", None).await;

        f.worker
            .handle(NotificationJob::NewAnswer {
                question_id: question.id,
                answer_id: answer.id,
            })
            .await
            .unwrap();

        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn new_reply_previews_the_replied_to_answer() {
        let f = fixture();
        let asker = seed_user(&f.store, "asker").await;
        let first = seed_user(&f.store, "first").await;
        let second = seed_user(&f.store, "second").await;
        let question = seed_question(&f.store, &asker, "the question text").await;
        let original =
            seed_answer(&f.store, &first, &question, "my original take", None).await;
        let reply = seed_answer(
            &f.store,
            &second,
            &question,
            "a counterpoint",
            Some(original.id),
        )
        .await;

        f.worker
            .handle(NotificationJob::NewReply {
                replying_to_answer_id: original.id,
                answer_id: reply.id,
            })
            .await
            .unwrap();

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "first@example.com");
        assert_eq!(sent[0].subject, "Someone replied to your answer!");
        // The recipient sees their own answer quoted, not the question.
        assert!(sent[0].html_body.contains("my original take"));
        assert!(!sent[0].html_body.contains("the question text"));
        assert!(sent[0].html_body.contains(&format!(
            "http://forum.test/q/{}/a/{}#{}",
            question.id, original.id, reply.id
        )));
    }

    #[tokio::test]
    async fn replying_to_your_own_answer_sends_nothing() {
        let f = fixture();
        let asker = seed_user(&f.store, "asker").await;
        let question = seed_question(&f.store, &asker, "q").await;
        let original = seed_answer(&f.store, &asker, &question, "first", None).await;
        let reply =
            seed_answer(&f.store, &asker, &question, "second", Some(original.id)).await;

        f.worker
            .handle(NotificationJob::NewReply {
                replying_to_answer_id: original.id,
                answer_id: reply.id,
            })
            .await
            .unwrap();

        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn muted_reply_notifications_send_nothing() {
        let f = fixture();
        let asker = seed_user(&f.store, "asker").await;
        let first = seed_user(&f.store, "first").await;
        let second = seed_user(&f.store, "second").await;
        f.store
            .update_profile(
                first.id,
                &ProfileChanges {
                    replies_notifications: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let question = seed_question(&f.store, &asker, "q").await;
        let original = seed_answer(&f.store, &first, &question, "a", None).await;
        let reply =
            seed_answer(&f.store, &second, &question, "r", Some(original.id)).await;

        f.worker
            .handle(NotificationJob::NewReply {
                replying_to_answer_id: original.id,
                answer_id: reply.id,
            })
            .await
            .unwrap();

        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn vanished_rows_end_the_job_quietly() {
        let f = fixture();
        f.worker
            .handle(NotificationJob::NewAnswer {
                question_id: Uuid::new_v4(),
                answer_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        assert!(f.mailer.sent().is_empty());
    }

    #[test]
    fn html_in_user_content_is_escaped() {
        let recipient = User {
            id: Uuid::new_v4(),
            name: "<script>alert(1)</script>".to_string(),
            email: "r@example.com".to_string(),
            profile_photo_url: String::new(),
            answers_notifications: true,
            replies_notifications: true,
        };
        let author = User {
            name: "a & b".to_string(),
            ..recipient.clone()
        };
        let body = new_answer_body(&recipient, &author, "x < y", "http://forum.test/q/1");
        assert!(body.contains("&lt;script&gt;"));
        assert!(body.contains("a &amp; b"));
        assert!(body.contains("x &lt; y"));
        assert!(!body.contains("<script>"));
    }
}
