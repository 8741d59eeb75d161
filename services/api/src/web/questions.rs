//! services/api/src/web/questions.rs
//!
//! Handlers for posting, listing, reading and closing questions.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::{parse_page_param, require_text_field, CurrentUser, EntityStash, JsonBody};
use crate::web::state::AppState;
use forum_core::listing::{self, preview_text, QuestionRow, QuestionsSort};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct PostQuestionReq {
    pub question: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostQuestionRes {
    pub question_id: Uuid,
}

/// One question in a listing. `preview` is the truncated question text.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListedQuestion {
    pub id: Uuid,
    pub preview: String,
    pub posted_at: DateTime<Utc>,
    pub closed: bool,
    /// Live count of answers under this question.
    pub answers: i64,
    pub author_name: String,
    pub author_photo: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsRes {
    pub questions: Vec<ListedQuestion>,
    pub next_page: bool,
}

/// A single question with its full text.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetailRes {
    pub id: Uuid,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    pub closed: bool,
    pub answers: i64,
    pub author_name: String,
    pub author_photo: String,
}

//=========================================================================================
// Query Parsing and Formatting
//=========================================================================================

fn parse_questions_sort(raw: Option<&str>) -> Result<QuestionsSort, String> {
    match raw {
        Some("newest") => Ok(QuestionsSort::Newest),
        Some("oldest") => Ok(QuestionsSort::Oldest),
        Some("mostAnswered") => Ok(QuestionsSort::MostAnswered),
        Some("leastAnswered") => Ok(QuestionsSort::LeastAnswered),
        _ => Err(
            "sort must be one of the following values: newest, oldest, mostAnswered, leastAnswered"
                .to_string(),
        ),
    }
}

/// Parses `page` and `sort`, reporting every invalid field at once.
fn parse_listing_params(
    query: &HashMap<String, String>,
) -> Result<(i64, QuestionsSort), ApiError> {
    let mut errors = BTreeMap::new();

    let page = match query.get("page") {
        Some(raw) => match parse_page_param(raw) {
            Ok(page) => Some(page),
            Err(message) => {
                errors.insert("page".to_string(), message);
                None
            }
        },
        None => {
            errors.insert("page".to_string(), "page must be an integer".to_string());
            None
        }
    };

    let sort = match parse_questions_sort(query.get("sort").map(String::as_str)) {
        Ok(sort) => Some(sort),
        Err(message) => {
            errors.insert("sort".to_string(), message);
            None
        }
    };

    match (page, sort) {
        (Some(page), Some(sort)) => Ok((page, sort)),
        _ => Err(ApiError::Validation(errors)),
    }
}

fn listed_question(row: QuestionRow, preview_length: usize) -> ListedQuestion {
    ListedQuestion {
        id: row.id,
        preview: preview_text(&row.text, preview_length),
        posted_at: row.created_at,
        closed: row.closed_at.is_some(),
        answers: row.answer_count,
        author_name: row.author_name,
        author_photo: row.author_photo,
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /v1/questions - Post a new question
#[utoipa::path(
    post,
    path = "/v1/questions",
    security(("bearer" = [])),
    request_body = PostQuestionReq,
    responses(
        (status = 200, description = "Question created", body = PostQuestionRes),
        (status = 401, description = "Not logged in"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn post_question(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: JsonBody,
) -> Result<Json<PostQuestionRes>, ApiError> {
    let text = require_text_field(&body.0, "question")?;
    let question = state.store.create_question(user.id, &text).await?;
    Ok(Json(PostQuestionRes { question_id: question.id }))
}

/// GET /v1/questions - List questions
#[utoipa::path(
    get,
    path = "/v1/questions",
    params(
        ("page" = i64, Query, description = "Zero-based page index"),
        ("sort" = String, Query, description = "newest, oldest, mostAnswered or leastAnswered")
    ),
    responses(
        (status = 200, description = "One page of questions", body = QuestionsRes),
        (status = 422, description = "Validation error")
    )
)]
pub async fn get_questions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<QuestionsRes>, ApiError> {
    let (page, sort) = parse_listing_params(&query)?;
    let result =
        listing::questions_page(state.store.as_ref(), &state.listing, sort, page, None).await?;

    Ok(Json(QuestionsRes {
        questions: result
            .questions
            .into_iter()
            .map(|row| listed_question(row, state.listing.preview_length))
            .collect(),
        next_page: result.next_page,
    }))
}

/// GET /v1/questions/own - List the authenticated user's questions
#[utoipa::path(
    get,
    path = "/v1/questions/own",
    security(("bearer" = [])),
    params(
        ("page" = i64, Query, description = "Zero-based page index"),
        ("sort" = String, Query, description = "newest, oldest, mostAnswered or leastAnswered")
    ),
    responses(
        (status = 200, description = "One page of the caller's questions", body = QuestionsRes),
        (status = 401, description = "Not logged in"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn get_own_questions(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<QuestionsRes>, ApiError> {
    let (page, sort) = parse_listing_params(&query)?;
    let result = listing::questions_page(
        state.store.as_ref(),
        &state.listing,
        sort,
        page,
        Some(user.id),
    )
    .await?;

    Ok(Json(QuestionsRes {
        questions: result
            .questions
            .into_iter()
            .map(|row| listed_question(row, state.listing.preview_length))
            .collect(),
        next_page: result.next_page,
    }))
}

/// GET /v1/questions/{questionId} - A single question with its full text
#[utoipa::path(
    get,
    path = "/v1/questions/{questionId}",
    params(
        ("questionId" = Uuid, Path, description = "The question to fetch")
    ),
    responses(
        (status = 200, description = "The question", body = QuestionDetailRes),
        (status = 400, description = "Unknown or malformed question id")
    )
)]
pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Extension(stash): Extension<EntityStash>,
) -> Result<Json<QuestionDetailRes>, ApiError> {
    let question = stash
        .question("question")
        .ok_or_else(|| ApiError::Internal("guard did not stash the question".to_string()))?;

    // The listing row carries the author join and the live answer count.
    let row = listing::question_row(state.store.as_ref(), question.id)
        .await?
        .ok_or_else(|| ApiError::EntityNotFound {
            field: "questionId".to_string(),
            kind: "Question",
        })?;

    Ok(Json(QuestionDetailRes {
        id: row.id,
        text: row.text,
        posted_at: row.created_at,
        closed: row.closed_at.is_some(),
        answers: row.answer_count,
        author_name: row.author_name,
        author_photo: row.author_photo,
    }))
}

/// PUT /v1/questions/{questionId}/close - Close a question to new answers
#[utoipa::path(
    put,
    path = "/v1/questions/{questionId}/close",
    security(("bearer" = [])),
    params(
        ("questionId" = Uuid, Path, description = "The question to close")
    ),
    responses(
        (status = 204, description = "Question closed (or already closed)"),
        (status = 400, description = "Unknown or malformed question id"),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "The caller does not own the question")
    )
)]
pub async fn close_question(
    State(state): State<Arc<AppState>>,
    Extension(stash): Extension<EntityStash>,
) -> Result<StatusCode, ApiError> {
    let question = stash
        .question("question")
        .ok_or_else(|| ApiError::Internal("guard did not stash the question".to_string()))?;

    state.store.close_question(question.id, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
