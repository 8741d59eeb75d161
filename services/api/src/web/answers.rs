//! services/api/src/web/answers.rs
//!
//! Handlers for listing and posting answers under a question. Listing is
//! dual-mode: by page number, or relative to a reference answer.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::notify::NotificationJob;
use crate::web::middleware::{parse_page_param, require_text_field, CurrentUser, EntityStash, JsonBody};
use crate::web::state::AppState;
use forum_core::listing::{self, AnswerRow, AnswersFilter, AnswersLocation, AnswersSort};

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// The answer another answer replies to, one level deep.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSnapshot {
    pub id: Uuid,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    pub author_name: String,
    pub author_photo: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListedAnswer {
    pub id: Uuid,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    pub author_name: String,
    pub author_photo: String,
    /// Omitted entirely when this answer does not reply to another one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replying_to_answer: Option<AnswerSnapshot>,
}

#[derive(Serialize, ToSchema)]
pub struct AnswersRes {
    pub answers: Vec<ListedAnswer>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostAnswerReq {
    pub text: String,
    /// The id of the answer this one replies to, if any.
    pub replying_to: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostAnswerRes {
    pub answer_id: Uuid,
    pub replying_to_id: Option<Uuid>,
}

//=========================================================================================
// Query Parsing and Formatting
//=========================================================================================

fn parse_answers_sort(raw: Option<&str>) -> Result<AnswersSort, String> {
    match raw {
        Some("newest") => Ok(AnswersSort::Newest),
        Some("oldest") => Ok(AnswersSort::Oldest),
        _ => Err("sort must be one of the following values: newest, oldest".to_string()),
    }
}

fn parse_answers_location(raw: Option<&str>) -> Result<AnswersLocation, String> {
    match raw {
        Some("afterRef") => Ok(AnswersLocation::AfterRef),
        Some("startingAtRef") => Ok(AnswersLocation::StartingAtRef),
        Some("beforeRef") => Ok(AnswersLocation::BeforeRef),
        Some("endingAtRef") => Ok(AnswersLocation::EndingAtRef),
        _ => Err(
            "answersLocation must be one of the following values: afterRef, startingAtRef, beforeRef, endingAtRef"
                .to_string(),
        ),
    }
}

/// The window selection before the reference answer is resolved.
enum WindowParams {
    Page(i64),
    Reference { raw_id: String, location: AnswersLocation },
}

/// Parses `sort` plus either `page` or `answerRef`/`answersLocation`,
/// reporting every invalid field at once. The presence of `page` selects
/// page mode; the reference fields are only required without it.
fn parse_window_params(
    query: &HashMap<String, String>,
) -> Result<(AnswersSort, WindowParams), ApiError> {
    let mut errors = BTreeMap::new();

    let sort = match parse_answers_sort(query.get("sort").map(String::as_str)) {
        Ok(sort) => Some(sort),
        Err(message) => {
            errors.insert("sort".to_string(), message);
            None
        }
    };

    let window = match query.get("page") {
        Some(raw) => match parse_page_param(raw) {
            Ok(page) => Some(WindowParams::Page(page)),
            Err(message) => {
                errors.insert("page".to_string(), message);
                None
            }
        },
        None => {
            let raw_id = match query.get("answerRef") {
                Some(raw) if !raw.is_empty() => Some(raw.clone()),
                _ => {
                    errors.insert(
                        "answerRef".to_string(),
                        "answerRef should not be empty".to_string(),
                    );
                    None
                }
            };
            let location =
                match parse_answers_location(query.get("answersLocation").map(String::as_str)) {
                    Ok(location) => Some(location),
                    Err(message) => {
                        errors.insert("answersLocation".to_string(), message);
                        None
                    }
                };
            match (raw_id, location) {
                (Some(raw_id), Some(location)) => {
                    Some(WindowParams::Reference { raw_id, location })
                }
                _ => None,
            }
        }
    };

    match (sort, window) {
        (Some(sort), Some(window)) => Ok((sort, window)),
        _ => Err(ApiError::Validation(errors)),
    }
}

fn listed_answer(row: AnswerRow) -> ListedAnswer {
    ListedAnswer {
        id: row.id,
        text: row.text,
        posted_at: row.created_at,
        author_name: row.author_name,
        author_photo: row.author_photo,
        replying_to_answer: row.replying_to.map(|reply| AnswerSnapshot {
            id: reply.id,
            text: reply.text,
            posted_at: reply.created_at,
            author_name: reply.author_name,
            author_photo: reply.author_photo,
        }),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /v1/questions/{questionId}/answers - List answers under a question
#[utoipa::path(
    get,
    path = "/v1/questions/{questionId}/answers",
    params(
        ("questionId" = Uuid, Path, description = "The question whose answers to list"),
        ("sort" = String, Query, description = "newest or oldest"),
        ("page" = Option<i64>, Query, description = "Zero-based page index; selects page mode"),
        ("answerRef" = Option<Uuid>, Query, description = "Reference answer id; required without `page`"),
        ("answersLocation" = Option<String>, Query,
         description = "afterRef, startingAtRef, beforeRef or endingAtRef; required without `page`")
    ),
    responses(
        (status = 200, description = "One window of answers", body = AnswersRes),
        (status = 400, description = "Unknown question or reference answer"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn get_answers(
    State(state): State<Arc<AppState>>,
    Extension(stash): Extension<EntityStash>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<AnswersRes>, ApiError> {
    let question = stash
        .question("question")
        .ok_or_else(|| ApiError::Internal("guard did not stash the question".to_string()))?;

    // 1. Validate the window parameters
    let (sort, window) = parse_window_params(&query)?;

    // 2. Resolve the reference answer in ref mode
    let filter = match window {
        WindowParams::Page(page) => AnswersFilter::PageBased { page },
        WindowParams::Reference { raw_id, location } => {
            let Ok(ref_id) = Uuid::parse_str(&raw_id) else {
                return Err(ApiError::AnswerRefNotFound);
            };
            let reference = state
                .store
                .answer_by_id(ref_id)
                .await?
                .ok_or(ApiError::AnswerRefNotFound)?;
            AnswersFilter::RefBased { answer: reference.id, location }
        }
    };

    // 3. Fetch and format the window
    let rows = listing::answers_window(
        state.store.as_ref(),
        &state.listing,
        question.id,
        sort,
        &filter,
    )
    .await?;

    Ok(Json(AnswersRes {
        answers: rows.into_iter().map(listed_answer).collect(),
    }))
}

/// POST /v1/questions/{questionId}/answers - Post an answer
#[utoipa::path(
    post,
    path = "/v1/questions/{questionId}/answers",
    security(("bearer" = [])),
    request_body = PostAnswerReq,
    params(
        ("questionId" = Uuid, Path, description = "The question to answer")
    ),
    responses(
        (status = 200, description = "Answer created", body = PostAnswerRes),
        (status = 400, description = "Unknown question, unknown replyingTo answer, or closed question"),
        (status = 401, description = "Not logged in"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn post_answer(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(stash): Extension<EntityStash>,
    body: JsonBody,
) -> Result<Json<PostAnswerRes>, ApiError> {
    let question = stash
        .question("question")
        .ok_or_else(|| ApiError::Internal("guard did not stash the question".to_string()))?;

    // 1. Validate the answer text
    let text = require_text_field(&body.0, "text")?;

    // 2. The question must still accept answers
    if question.is_closed() {
        return Err(ApiError::QuestionClosed);
    }

    // 3. The guard already resolved `replyingTo` if the body carried one
    let replying_to = stash.answer("replyingTo").map(|answer| answer.id);

    // 4. Create the answer and fan out notifications
    let answer = state
        .store
        .create_answer(user.id, question.id, &text, replying_to)
        .await?;
    state.notifications.enqueue(NotificationJob::NewAnswer {
        question_id: question.id,
        answer_id: answer.id,
    });
    if let Some(replying_to_answer_id) = replying_to {
        state.notifications.enqueue(NotificationJob::NewReply {
            replying_to_answer_id,
            answer_id: answer.id,
        });
    }

    Ok(Json(PostAnswerRes {
        answer_id: answer.id,
        replying_to_id: replying_to,
    }))
}
