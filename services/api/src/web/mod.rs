//! services/api/src/web/mod.rs
//!
//! The HTTP surface: route table, per-route middleware wiring and the master
//! definition for the OpenAPI specification.

pub mod answers;
pub mod auth;
pub mod middleware;
pub mod questions;
pub mod state;

use std::sync::Arc;

use axum::handler::Handler;
use axum::middleware as axum_middleware;
use axum::routing::{get, post, put};
use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use middleware::{EntityCheck, EntityChecks, ReqLocation};
use state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Forum API",
        description = "The documentation of the Forum API"
    ),
    paths(
        auth::google_login,
        auth::logout,
        auth::get_profile,
        auth::update_profile,
        questions::post_question,
        questions::get_questions,
        questions::get_own_questions,
        questions::get_question,
        questions::close_question,
        answers::get_answers,
        answers::post_answer,
    ),
    components(
        schemas(
            auth::GoogleLoginReq,
            auth::GoogleLoginRes,
            auth::ProfileRes,
            auth::UpdateProfileReq,
            questions::PostQuestionReq,
            questions::PostQuestionRes,
            questions::ListedQuestion,
            questions::QuestionsRes,
            questions::QuestionDetailRes,
            answers::AnswerSnapshot,
            answers::ListedAnswer,
            answers::AnswersRes,
            answers::PostAnswerReq,
            answers::PostAnswerRes,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Forum API", description = "Questions, answers and accounts.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer-token security scheme the protected routes reference.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Router
//=========================================================================================

/// Builds the application router. Authentication and entity guards are
/// attached per handler: a guard list runs after `require_auth` wherever
/// both are present, so ownership checks can see the authenticated user.
pub fn router(state: Arc<AppState>) -> Router {
    let auth_layer = axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth);

    let question_guard = axum_middleware::from_fn_with_state(
        (
            state.clone(),
            EntityChecks::new(vec![
                EntityCheck::question(ReqLocation::Path("questionId")).stash_as("question")
            ]),
        ),
        middleware::entity_guard,
    );
    let own_question_guard = axum_middleware::from_fn_with_state(
        (
            state.clone(),
            EntityChecks::new(vec![EntityCheck::question(ReqLocation::Path("questionId"))
                .owned()
                .stash_as("question")]),
        ),
        middleware::entity_guard,
    );
    let post_answer_guard = axum_middleware::from_fn_with_state(
        (
            state.clone(),
            EntityChecks::new(vec![
                EntityCheck::question(ReqLocation::Path("questionId")).stash_as("question"),
                EntityCheck::answer(ReqLocation::Body("replyingTo"))
                    .skip_if_absent()
                    .stash_as("replyingTo"),
            ]),
        ),
        middleware::entity_guard,
    );

    Router::new()
        .route("/v1/auth/google", post(auth::google_login))
        .route("/v1/auth/logout", post(auth::logout.layer(auth_layer.clone())))
        .route(
            "/v1/auth/profile",
            get(auth::get_profile.layer(auth_layer.clone()))
                .patch(auth::update_profile.layer(auth_layer.clone())),
        )
        .route(
            "/v1/questions",
            get(questions::get_questions)
                .post(questions::post_question.layer(auth_layer.clone())),
        )
        .route(
            "/v1/questions/own",
            get(questions::get_own_questions.layer(auth_layer.clone())),
        )
        .route(
            "/v1/questions/{questionId}",
            get(questions::get_question.layer(question_guard.clone())),
        )
        .route(
            "/v1/questions/{questionId}/close",
            put(questions::close_question
                .layer(own_question_guard)
                .layer(auth_layer.clone())),
        )
        .route(
            "/v1/questions/{questionId}/answers",
            get(answers::get_answers.layer(question_guard))
                .post(answers::post_answer.layer(post_answer_guard).layer(auth_layer)),
        )
        .with_state(state)
}
