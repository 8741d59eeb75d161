//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for Google sign-in, logout, and the user profile.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::web::middleware::{CurrentUser, JsonBody, SessionToken};
use crate::web::state::AppState;
use forum_core::domain::ProfileChanges;

/// How long a login session stays valid.
const SESSION_LIFETIME_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// The Google ID token, under whichever field name the client used. The
/// Google sign-in widget posts `credential`; other clients send `idToken`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginReq {
    pub id_token: Option<String>,
    pub credential: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRes {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRes {
    pub name: String,
    pub email: String,
    pub photo: String,
    pub answers_notifications: bool,
    pub replies_notifications: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileReq {
    pub name: Option<String>,
    pub answers_notifications: Option<bool>,
    pub replies_notifications: Option<bool>,
}

/// How the auth endpoints deliver their result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResType {
    Json,
    Redirect,
}

fn parse_res_type(query: &HashMap<String, String>) -> Result<ResType, ApiError> {
    match query.get("resType").map(String::as_str) {
        None | Some("json") => Ok(ResType::Json),
        Some("redirect") => Ok(ResType::Redirect),
        Some(_) => Err(ApiError::validation(
            "resType",
            "resType must be one of the following values: json, redirect",
        )),
    }
}

/// Builds the 302 that carries a JSON payload back to the frontend in the
/// `oAuthRes` query parameter. Used for successes and failures alike, so
/// browser-based flows always land back on the frontend.
fn oauth_redirect(config: &Config, payload: &Value) -> Result<Response, ApiError> {
    let mut url = config.frontend_oauth_response_url.clone();
    let payload_json =
        serde_json::to_string(payload).map_err(|e| ApiError::Internal(e.to_string()))?;
    url.query_pairs_mut().append_pair("oAuthRes", &payload_json);
    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /v1/auth/google - Log in with a Google ID token
#[utoipa::path(
    post,
    path = "/v1/auth/google",
    request_body = GoogleLoginReq,
    params(
        ("resType" = Option<String>, Query,
         description = "`json` (default) answers with a JSON body; `redirect` sends a 302 to the frontend with the result in the `oAuthRes` query parameter.")
    ),
    responses(
        (status = 200, description = "Login successful", body = GoogleLoginRes),
        (status = 302, description = "Redirect to the frontend carrying the login result"),
        (status = 401, description = "The Google ID token could not be verified"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn google_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    body: JsonBody,
) -> Result<Response, ApiError> {
    let res_type = parse_res_type(&query)?;
    let result = login_flow(&state, &body.0).await;

    match res_type {
        ResType::Json => Ok(Json(result?).into_response()),
        ResType::Redirect => {
            let payload = match result {
                Ok(res) => {
                    let mut value = serde_json::to_value(&res)
                        .map_err(|e| ApiError::Internal(e.to_string()))?;
                    value["statusCode"] = json!(200);
                    value
                }
                Err(e) => e.status_and_body().1,
            };
            oauth_redirect(&state.config, &payload)
        }
    }
}

async fn login_flow(state: &AppState, body: &Value) -> Result<GoogleLoginRes, ApiError> {
    // 1. Pull the ID token out of the body
    let id_token = extract_id_token(body)?;

    // 2. Verify it against Google
    let identity = state
        .verifier
        .verify(&id_token)
        .await?
        .ok_or(ApiError::GoogleAuthFailed)?;

    // 3. Find the account for this email, creating it on first login
    let user = match state.store.user_by_email(&identity.email).await? {
        Some(user) => user,
        None => {
            state
                .store
                .create_user(&identity.name, &identity.email, &identity.profile_photo_url)
                .await?
        }
    };

    // 4. Mint a session token
    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_LIFETIME_DAYS);
    state.store.create_session(user.id, &token, expires_at).await?;
    debug!("User {} logged in", user.id);

    Ok(GoogleLoginRes { token, expires_at })
}

fn extract_id_token(body: &Value) -> Result<String, ApiError> {
    for key in ["idToken", "credential"] {
        match body.get(key) {
            None | Some(Value::Null) => continue,
            // An empty string is falsy input; fall through to the other key.
            Some(Value::String(token)) if token.is_empty() => continue,
            Some(Value::String(token)) => return Ok(token.clone()),
            Some(_) => {
                return Err(ApiError::validation(key, &format!("{key} must be a string")))
            }
        }
    }
    Err(ApiError::validation("idToken", "idToken should not be empty"))
}

/// POST /v1/auth/logout - Invalidate the current session
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    security(("bearer" = [])),
    params(
        ("resType" = Option<String>, Query,
         description = "`json` (default) answers 204; `redirect` sends a 302 to the frontend.")
    ),
    responses(
        (status = 204, description = "Session invalidated"),
        (status = 302, description = "Redirect to the frontend"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<Response, ApiError> {
    let res_type = parse_res_type(&query)?;
    state.store.delete_session(&token).await?;

    match res_type {
        ResType::Json => Ok(StatusCode::NO_CONTENT.into_response()),
        ResType::Redirect => oauth_redirect(&state.config, &json!({ "statusCode": 204 })),
    }
}

/// GET /v1/auth/profile - The authenticated user's profile
#[utoipa::path(
    get,
    path = "/v1/auth/profile",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The profile of the logged-in user", body = ProfileRes),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn get_profile(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<ProfileRes> {
    Json(ProfileRes {
        name: user.name,
        email: user.email,
        photo: user.profile_photo_url,
        answers_notifications: user.answers_notifications,
        replies_notifications: user.replies_notifications,
    })
}

/// PATCH /v1/auth/profile - Update profile fields
#[utoipa::path(
    patch,
    path = "/v1/auth/profile",
    security(("bearer" = [])),
    request_body = UpdateProfileReq,
    responses(
        (status = 204, description = "Profile updated"),
        (status = 401, description = "Not logged in"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: JsonBody,
) -> Result<StatusCode, ApiError> {
    // 1. Validate every provided field, collecting all failures
    let mut errors = BTreeMap::new();
    let mut changes = ProfileChanges::default();

    match body.0.get("name") {
        None | Some(Value::Null) => {}
        Some(Value::String(name)) if !name.is_empty() => changes.name = Some(name.clone()),
        Some(Value::String(_)) => {
            errors.insert("name".to_string(), "name should not be empty".to_string());
        }
        Some(_) => {
            errors.insert("name".to_string(), "name must be a string".to_string());
        }
    }

    for (key, slot) in [
        ("answersNotifications", &mut changes.answers_notifications),
        ("repliesNotifications", &mut changes.replies_notifications),
    ] {
        match body.0.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Bool(on)) => *slot = Some(*on),
            Some(_) => {
                errors.insert(key.to_string(), format!("{key} must be a boolean value"));
            }
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // 2. Apply whatever was provided
    state.store.update_profile(user.id, &changes).await?;
    Ok(StatusCode::NO_CONTENT)
}
