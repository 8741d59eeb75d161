//! crates/forum_core/src/listing.rs
//!
//! Sorting and windowing rules for question and answer listings. The store
//! executes plain row queries; the policy for which window of rows to fetch,
//! and in which order, lives here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ports::{ForumStore, PortResult};

//=========================================================================================
// Sort Policy
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// The column a question listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOrderColumn {
    CreatedAt,
    AnswerCount,
}

/// User-facing sort options for question listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionsSort {
    Newest,
    Oldest,
    MostAnswered,
    LeastAnswered,
}

impl QuestionsSort {
    pub fn order(self) -> (QuestionOrderColumn, SortDirection) {
        match self {
            QuestionsSort::Newest => (QuestionOrderColumn::CreatedAt, SortDirection::Desc),
            QuestionsSort::Oldest => (QuestionOrderColumn::CreatedAt, SortDirection::Asc),
            QuestionsSort::MostAnswered => (QuestionOrderColumn::AnswerCount, SortDirection::Desc),
            QuestionsSort::LeastAnswered => (QuestionOrderColumn::AnswerCount, SortDirection::Asc),
        }
    }
}

/// User-facing sort options for answer listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswersSort {
    Newest,
    Oldest,
}

impl AnswersSort {
    pub fn direction(self) -> SortDirection {
        match self {
            AnswersSort::Newest => SortDirection::Desc,
            AnswersSort::Oldest => SortDirection::Asc,
        }
    }
}

/// Where a ref-based answer window sits relative to its reference answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswersLocation {
    AfterRef,
    StartingAtRef,
    BeforeRef,
    EndingAtRef,
}

/// A comparison against the reference answer's creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedCmp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl AnswersLocation {
    pub fn comparison(self) -> CreatedCmp {
        match self {
            AnswersLocation::AfterRef => CreatedCmp::Gt,
            AnswersLocation::StartingAtRef => CreatedCmp::Gte,
            AnswersLocation::BeforeRef => CreatedCmp::Lt,
            AnswersLocation::EndingAtRef => CreatedCmp::Lte,
        }
    }

    /// Whether the store query may order rows in the requested direction
    /// directly. `BeforeRef` and `EndingAtRef` must not: their window holds
    /// the rows nearest the reference, so the query walks newest-first and
    /// the requested order is restored in memory afterwards.
    pub fn sorts_in_query(self) -> bool {
        matches!(self, AnswersLocation::AfterRef | AnswersLocation::StartingAtRef)
    }
}

//=========================================================================================
// Row Queries and Rows
//=========================================================================================

/// A window of question listing rows for the store to fetch.
#[derive(Debug, Clone)]
pub struct QuestionRowQuery {
    /// Restrict to a single question.
    pub id: Option<Uuid>,
    /// Restrict to questions posted by this user.
    pub author: Option<Uuid>,
    pub order_by: QuestionOrderColumn,
    pub direction: SortDirection,
    pub offset: i64,
    pub limit: i64,
}

/// A window of answer listing rows for the store to fetch.
#[derive(Debug, Clone)]
pub struct AnswerRowQuery {
    pub question: Uuid,
    /// Compare answer creation times against the creation time of this
    /// reference answer. `None` fetches from the start of the listing.
    pub created_cmp: Option<(CreatedCmp, Uuid)>,
    pub direction: SortDirection,
    pub offset: i64,
    pub limit: i64,
}

/// A question joined with its author and answer count, ready for listing.
#[derive(Debug, Clone)]
pub struct QuestionRow {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub answer_count: i64,
    pub author_name: String,
    pub author_photo: String,
}

/// An answer joined with its author and the answer it replies to, if any.
#[derive(Debug, Clone)]
pub struct AnswerRow {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_name: String,
    pub author_photo: String,
    pub replying_to: Option<ReplyRow>,
}

/// The replied-to answer embedded in an [`AnswerRow`].
#[derive(Debug, Clone)]
pub struct ReplyRow {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_name: String,
    pub author_photo: String,
}

//=========================================================================================
// Listing Engine
//=========================================================================================

/// Tunables shared by all listings.
#[derive(Debug, Clone, Copy)]
pub struct ListingConfig {
    pub page_size: i64,
    /// Maximum characters of question text shown in listing previews.
    pub preview_length: usize,
}

/// One page of questions plus whether a further page exists.
#[derive(Debug, Clone)]
pub struct QuestionsPage {
    pub questions: Vec<QuestionRow>,
    pub next_page: bool,
}

/// How to select an answer window: by page number, or relative to a
/// reference answer within the same question.
#[derive(Debug, Clone)]
pub enum AnswersFilter {
    PageBased { page: i64 },
    RefBased { answer: Uuid, location: AnswersLocation },
}

/// Fetches one page of questions, newest/oldest/most- or least-answered
/// first. Fetches one row beyond the page to learn whether a next page
/// exists without a second count query.
pub async fn questions_page(
    store: &dyn ForumStore,
    config: &ListingConfig,
    sort: QuestionsSort,
    page: i64,
    author: Option<Uuid>,
) -> PortResult<QuestionsPage> {
    let (order_by, direction) = sort.order();
    let query = QuestionRowQuery {
        id: None,
        author,
        order_by,
        direction,
        offset: page.saturating_mul(config.page_size),
        limit: config.page_size + 1,
    };
    let mut questions = store.question_rows(&query).await?;

    let next_page = questions.len() as i64 > config.page_size;
    if next_page {
        questions.truncate(config.page_size as usize);
    }

    Ok(QuestionsPage { questions, next_page })
}

/// Fetches the listing row for a single question.
pub async fn question_row(
    store: &dyn ForumStore,
    question_id: Uuid,
) -> PortResult<Option<QuestionRow>> {
    let query = QuestionRowQuery {
        id: Some(question_id),
        author: None,
        order_by: QuestionOrderColumn::CreatedAt,
        direction: SortDirection::Desc,
        offset: 0,
        limit: 1,
    };
    let mut rows = store.question_rows(&query).await?;
    Ok(rows.pop())
}

/// Fetches one window of answers for a question.
///
/// Page-based windows, and ref-based windows located before or ending at the
/// reference, query newest-first and re-sort in memory; see
/// [`AnswersLocation::sorts_in_query`]. A reference answer that no longer
/// exists yields an empty window.
pub async fn answers_window(
    store: &dyn ForumStore,
    config: &ListingConfig,
    question: Uuid,
    sort: AnswersSort,
    filter: &AnswersFilter,
) -> PortResult<Vec<AnswerRow>> {
    let requested = sort.direction();
    let (created_cmp, offset, sort_in_query) = match filter {
        AnswersFilter::PageBased { page } => {
            (None, page.saturating_mul(config.page_size), false)
        }
        AnswersFilter::RefBased { answer, location } => (
            Some((location.comparison(), *answer)),
            0,
            location.sorts_in_query(),
        ),
    };

    let query = AnswerRowQuery {
        question,
        created_cmp,
        direction: if sort_in_query { requested } else { SortDirection::Desc },
        offset,
        limit: config.page_size,
    };
    let mut rows = store.answer_rows(&query).await?;

    if !sort_in_query {
        sort_answer_rows(&mut rows, requested);
    }
    Ok(rows)
}

/// Orders rows by creation time, with the id as a deterministic tie-break
/// that follows the same direction.
fn sort_answer_rows(rows: &mut [AnswerRow], direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ord = (a.created_at, a.id).cmp(&(b.created_at, b.id));
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

/// Shortens text for a listing preview. Text at or under the limit is kept
/// whole; longer text is cut at `max_chars` characters and suffixed with
/// `...`.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Answer, Question, User};
    use crate::memory::MemoryStore;

    async fn seed_user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(name, &format!("{name}@example.com"), "https://example.com/p.png")
            .await
            .unwrap()
    }

    async fn seed_question(store: &MemoryStore, author: &User, text: &str) -> Question {
        store.create_question(author.id, text).await.unwrap()
    }

    async fn seed_answer(store: &MemoryStore, author: &User, question: &Question) -> Answer {
        store
            .create_answer(author.id, question.id, "an answer", None)
            .await
            .unwrap()
    }

    fn config(page_size: i64) -> ListingConfig {
        ListingConfig { page_size, preview_length: 80 }
    }

    fn ids(rows: &[AnswerRow]) -> Vec<Uuid> {
        rows.iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn questions_page_reports_next_page_until_exhausted() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        for i in 0..5 {
            seed_question(&store, &user, &format!("question {i}")).await;
        }

        let cfg = config(2);
        let first = questions_page(&store, &cfg, QuestionsSort::Newest, 0, None)
            .await
            .unwrap();
        assert_eq!(first.questions.len(), 2);
        assert!(first.next_page);

        let last = questions_page(&store, &cfg, QuestionsSort::Newest, 2, None)
            .await
            .unwrap();
        assert_eq!(last.questions.len(), 1);
        assert!(!last.next_page);
    }

    #[tokio::test]
    async fn questions_sort_by_answer_count() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let quiet = seed_question(&store, &user, "quiet").await;
        let busy = seed_question(&store, &user, "busy").await;
        seed_answer(&store, &user, &busy).await;
        seed_answer(&store, &user, &busy).await;
        seed_answer(&store, &user, &quiet).await;

        let cfg = config(10);
        let page = questions_page(&store, &cfg, QuestionsSort::MostAnswered, 0, None)
            .await
            .unwrap();
        assert_eq!(page.questions[0].id, busy.id);
        assert_eq!(page.questions[0].answer_count, 2);
        assert_eq!(page.questions[1].id, quiet.id);
        assert_eq!(page.questions[1].answer_count, 1);
    }

    #[tokio::test]
    async fn questions_page_scopes_to_author() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let mine = seed_question(&store, &alice, "mine").await;
        seed_question(&store, &bob, "theirs").await;

        let cfg = config(10);
        let page = questions_page(&store, &cfg, QuestionsSort::Newest, 0, Some(alice.id))
            .await
            .unwrap();
        assert_eq!(page.questions.len(), 1);
        assert_eq!(page.questions[0].id, mine.id);
    }

    #[tokio::test]
    async fn question_row_finds_single_question() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "full text survives").await;

        let row = question_row(&store, question.id).await.unwrap();
        assert_eq!(row.as_ref().map(|r| r.id), Some(question.id));
        assert_eq!(row.as_ref().map(|r| r.text.as_str()), Some("full text survives"));

        let missing = question_row(&store, Uuid::new_v4()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn page_based_newest_walks_pages_newest_first() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "q").await;
        let answers: Vec<Answer> = {
            let mut v = Vec::new();
            for _ in 0..5 {
                v.push(seed_answer(&store, &user, &question).await);
            }
            v
        };

        let cfg = config(2);
        let page0 = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Newest,
            &AnswersFilter::PageBased { page: 0 },
        )
        .await
        .unwrap();
        assert_eq!(ids(&page0), vec![answers[4].id, answers[3].id]);

        let page1 = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Newest,
            &AnswersFilter::PageBased { page: 1 },
        )
        .await
        .unwrap();
        assert_eq!(ids(&page1), vec![answers[2].id, answers[1].id]);
    }

    #[tokio::test]
    async fn page_based_oldest_offsets_newest_first_then_resorts() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "q").await;
        let mut answers = Vec::new();
        for _ in 0..5 {
            answers.push(seed_answer(&store, &user, &question).await);
        }

        // Page offsets always apply to the newest-first ordering; the rows
        // are then returned ascending. Page 0 of "oldest" therefore holds
        // the two newest answers, oldest of the two first.
        let cfg = config(2);
        let page0 = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Oldest,
            &AnswersFilter::PageBased { page: 0 },
        )
        .await
        .unwrap();
        assert_eq!(ids(&page0), vec![answers[3].id, answers[4].id]);
    }

    #[tokio::test]
    async fn after_ref_excludes_reference() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "q").await;
        let mut answers = Vec::new();
        for _ in 0..4 {
            answers.push(seed_answer(&store, &user, &question).await);
        }

        let cfg = config(10);
        let window = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Oldest,
            &AnswersFilter::RefBased {
                answer: answers[1].id,
                location: AnswersLocation::AfterRef,
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&window), vec![answers[2].id, answers[3].id]);
    }

    #[tokio::test]
    async fn starting_at_ref_includes_reference() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "q").await;
        let mut answers = Vec::new();
        for _ in 0..4 {
            answers.push(seed_answer(&store, &user, &question).await);
        }

        let cfg = config(10);
        let window = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Oldest,
            &AnswersFilter::RefBased {
                answer: answers[1].id,
                location: AnswersLocation::StartingAtRef,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            ids(&window),
            vec![answers[1].id, answers[2].id, answers[3].id]
        );
    }

    #[tokio::test]
    async fn before_ref_keeps_rows_nearest_the_reference() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "q").await;
        let mut answers = Vec::new();
        for _ in 0..5 {
            answers.push(seed_answer(&store, &user, &question).await);
        }

        // Three answers precede the reference but only two fit the window.
        // The two adjacent to the reference must win, not the two oldest.
        let cfg = config(2);
        let window = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Oldest,
            &AnswersFilter::RefBased {
                answer: answers[3].id,
                location: AnswersLocation::BeforeRef,
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&window), vec![answers[1].id, answers[2].id]);
    }

    #[tokio::test]
    async fn ending_at_ref_includes_reference() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "q").await;
        let mut answers = Vec::new();
        for _ in 0..5 {
            answers.push(seed_answer(&store, &user, &question).await);
        }

        let cfg = config(2);
        let window = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Oldest,
            &AnswersFilter::RefBased {
                answer: answers[3].id,
                location: AnswersLocation::EndingAtRef,
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&window), vec![answers[2].id, answers[3].id]);
    }

    #[tokio::test]
    async fn missing_reference_yields_empty_window() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "alice").await;
        let question = seed_question(&store, &user, "q").await;
        seed_answer(&store, &user, &question).await;

        let cfg = config(10);
        let window = answers_window(
            &store,
            &cfg,
            question.id,
            AnswersSort::Newest,
            &AnswersFilter::RefBased {
                answer: Uuid::new_v4(),
                location: AnswersLocation::AfterRef,
            },
        )
        .await
        .unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn preview_text_keeps_short_text_whole() {
        assert_eq!(preview_text("short", 80), "short");
        let exactly = "x".repeat(80);
        assert_eq!(preview_text(&exactly, 80), exactly);
    }

    #[test]
    fn preview_text_truncates_long_text() {
        let long = "y".repeat(81);
        let preview = preview_text(&long, 80);
        assert_eq!(preview, format!("{}...", "y".repeat(80)));
    }

    #[test]
    fn preview_text_counts_characters_not_bytes() {
        let text = "é".repeat(5);
        assert_eq!(preview_text(&text, 4), format!("{}...", "é".repeat(4)));
        assert_eq!(preview_text(&text, 5), text);
    }
}
