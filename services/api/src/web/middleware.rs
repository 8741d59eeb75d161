//! services/api/src/web/middleware.rs
//!
//! Authentication and entity-resolution middleware for protecting routes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, FromRequestParts, Query, RawPathParams, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use forum_core::domain::{Answer, Question, User};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

/// The most a guarded or JSON request body may hold.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// The authenticated user, inserted into request extensions by [`require_auth`].
#[derive(Clone)]
pub struct CurrentUser(pub User);

/// The raw session token the request authenticated with.
#[derive(Clone)]
pub struct SessionToken(pub String);

/// Middleware that validates the bearer session token.
///
/// If valid, inserts the user and token into request extensions for handlers
/// to use. If invalid, missing or expired, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    // 2. Resolve the session, ignoring expired ones
    let user = state
        .store
        .session_user(&token, Utc::now())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // 3. Make the user and token available to handlers
    debug!("Request authenticated for user {}", user.id);
    req.extensions_mut().insert(CurrentUser(user));
    req.extensions_mut().insert(SessionToken(token));

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

//=========================================================================================
// Entity Guard
//=========================================================================================

/// The kind of entity a check resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Question,
    Answer,
}

impl EntityKind {
    /// The capitalized name used in "not found" validation messages.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Question => "Question",
            EntityKind::Answer => "Answer",
        }
    }
}

/// Where a check reads the entity id from. The inner value is the
/// path-parameter, query-parameter or body-field name, which doubles as the
/// field key in validation error responses.
#[derive(Debug, Clone, Copy)]
pub enum ReqLocation {
    Path(&'static str),
    Query(&'static str),
    Body(&'static str),
}

impl ReqLocation {
    pub fn key(self) -> &'static str {
        match self {
            ReqLocation::Path(key) | ReqLocation::Query(key) | ReqLocation::Body(key) => key,
        }
    }
}

/// One entity-resolution rule a route declares.
#[derive(Debug, Clone, Copy)]
pub struct EntityCheck {
    pub kind: EntityKind,
    pub location: ReqLocation,
    /// When set, the resolved entity is stored in the [`EntityStash`] under
    /// this key for the handler to pick up.
    pub stash_as: Option<&'static str>,
    /// Reject with 403 unless the authenticated user owns the entity.
    pub must_own: bool,
    /// Silently skip the check when the id is not present in the request.
    pub skip_if_absent: bool,
}

impl EntityCheck {
    pub fn question(location: ReqLocation) -> Self {
        Self {
            kind: EntityKind::Question,
            location,
            stash_as: None,
            must_own: false,
            skip_if_absent: false,
        }
    }

    pub fn answer(location: ReqLocation) -> Self {
        Self {
            kind: EntityKind::Answer,
            location,
            stash_as: None,
            must_own: false,
            skip_if_absent: false,
        }
    }

    pub fn stash_as(mut self, key: &'static str) -> Self {
        self.stash_as = Some(key);
        self
    }

    pub fn owned(mut self) -> Self {
        self.must_own = true;
        self
    }

    pub fn skip_if_absent(mut self) -> Self {
        self.skip_if_absent = true;
        self
    }
}

/// The check list attached to a route, shared with the guard middleware.
#[derive(Clone)]
pub struct EntityChecks(pub Arc<Vec<EntityCheck>>);

impl EntityChecks {
    pub fn new(checks: Vec<EntityCheck>) -> Self {
        Self(Arc::new(checks))
    }
}

/// An entity resolved by the guard.
#[derive(Clone)]
pub enum GuardedEntity {
    Question(Question),
    Answer(Answer),
}

/// Entities resolved by the guard, keyed by each check's `stash_as` name.
/// Inserted into request extensions for handlers.
#[derive(Clone, Default)]
pub struct EntityStash(pub Arc<HashMap<&'static str, GuardedEntity>>);

impl EntityStash {
    pub fn question(&self, key: &str) -> Option<&Question> {
        match self.0.get(key) {
            Some(GuardedEntity::Question(question)) => Some(question),
            _ => None,
        }
    }

    pub fn answer(&self, key: &str) -> Option<&Answer> {
        match self.0.get(key) {
            Some(GuardedEntity::Answer(answer)) => Some(answer),
            _ => None,
        }
    }
}

/// Middleware that resolves the entities a route's [`EntityChecks`] name,
/// rejecting the request when one is missing or owned by someone else.
///
/// Runs after [`require_auth`] on routes that enforce ownership, so the
/// authenticated user is already in the request extensions.
pub async fn entity_guard(
    State((state, checks)): State<(Arc<AppState>, EntityChecks)>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();

    // 1. Buffer the body only when a check reads from it, and hand the bytes
    //    back to the handler afterwards.
    let needs_body = checks
        .0
        .iter()
        .any(|check| matches!(check.location, ReqLocation::Body(_)));
    let (body_json, body) = if needs_body {
        let bytes = to_bytes(body, BODY_LIMIT)
            .await
            .map_err(|_| ApiError::validation("body", "request body could not be read"))?;
        let json = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);
        (json, Body::from(bytes))
    } else {
        (Value::Null, body)
    };

    // 2. Collect the raw id sources once
    let path_params = RawPathParams::from_request_parts(&mut parts, &()).await.ok();
    let query_params: HashMap<String, String> = Query::try_from_uri(&parts.uri)
        .map(|Query(params)| params)
        .unwrap_or_default();

    // 3. Run every check in order, stashing resolved entities for handlers
    let mut stash: HashMap<&'static str, GuardedEntity> = HashMap::new();
    for check in checks.0.iter() {
        let key = check.location.key();
        let raw = match check.location {
            ReqLocation::Path(_) => path_params.as_ref().and_then(|params| {
                params
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| value.to_string())
            }),
            ReqLocation::Query(_) => query_params.get(key).cloned(),
            ReqLocation::Body(_) => match body_json.get(key) {
                None | Some(Value::Null) => None,
                Some(Value::String(id)) => Some(id.clone()),
                // Non-string ids can never resolve; keep them so the check fails.
                Some(other) => Some(other.to_string()),
            },
        };

        let Some(raw) = raw else {
            if check.skip_if_absent {
                continue;
            }
            return Err(not_found(check, key));
        };

        let Ok(id) = Uuid::parse_str(&raw) else {
            return Err(not_found(check, key));
        };

        let (entity, owner) = match check.kind {
            EntityKind::Question => match state.store.question_by_id(id).await? {
                Some(question) => {
                    let owner = question.author;
                    (GuardedEntity::Question(question), owner)
                }
                None => return Err(not_found(check, key)),
            },
            EntityKind::Answer => match state.store.answer_by_id(id).await? {
                Some(answer) => {
                    let owner = answer.author;
                    (GuardedEntity::Answer(answer), owner)
                }
                None => return Err(not_found(check, key)),
            },
        };

        if check.must_own {
            let current = parts
                .extensions
                .get::<CurrentUser>()
                .ok_or(ApiError::Unauthorized)?;
            if current.0.id != owner {
                return Err(ApiError::Forbidden);
            }
        }

        if let Some(stash_key) = check.stash_as {
            stash.insert(stash_key, entity);
        }
    }

    parts.extensions.insert(EntityStash(Arc::new(stash)));
    let req = Request::from_parts(parts, body);
    Ok(next.run(req).await)
}

fn not_found(check: &EntityCheck, field: &str) -> ApiError {
    ApiError::EntityNotFound {
        field: field.to_string(),
        kind: check.kind.label(),
    }
}

//=========================================================================================
// JSON Body Extraction
//=========================================================================================

/// A lenient JSON body extractor whose rejection uses the shared error
/// envelope. An empty body reads as `null`, which field validation then
/// reports per missing field rather than as a parse failure.
pub struct JsonBody(pub Value);

/// Parses a zero-based page index from a raw query value. The error is the
/// constraint message to report for the `page` field.
pub fn parse_page_param(raw: &str) -> Result<i64, String> {
    let Ok(page) = raw.parse::<i64>() else {
        return Err("page must be an integer".to_string());
    };
    if page < 0 {
        return Err("page must not be less than 0".to_string());
    }
    Ok(page)
}

/// Extracts a required non-empty string field from a JSON body.
pub fn require_text_field(body: &Value, field: &str) -> Result<String, ApiError> {
    match body.get(field) {
        Some(Value::String(text)) if !text.is_empty() => Ok(text.clone()),
        None | Some(Value::Null) | Some(Value::String(_)) => Err(ApiError::validation(
            field,
            &format!("{field} should not be empty"),
        )),
        Some(_) => Err(ApiError::validation(
            field,
            &format!("{field} must be a string"),
        )),
    }
}

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = to_bytes(req.into_body(), BODY_LIMIT)
            .await
            .map_err(|_| ApiError::validation("body", "request body could not be read"))?;
        if bytes.is_empty() {
            return Ok(JsonBody(Value::Null));
        }
        let value = serde_json::from_slice(&bytes)
            .map_err(|_| ApiError::validation("body", "request body must be valid JSON"))?;
        Ok(JsonBody(value))
    }
}
