use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use super::domain::{CommissionSettings, EvaluationRequest, RuleDraft, RuleId};
use super::repository::{AuditSink, RepositoryError, RuleRepository, SettingsProvider};
use super::service::{CommissionError, CommissionRuleService};
use super::validation::ValidationError;

pub const ACTOR_HEADER: &str = "x-actor-id";
const ANONYMOUS_ACTOR: &str = "anonymous";

type SharedService<R, S, A> = Arc<CommissionRuleService<R, S, A>>;

/// Router builder exposing rule management, settings, and on-demand evaluation.
pub fn commission_router<R, S, A>(service: SharedService<R, S, A>) -> Router
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/commission/rules",
            get(list_handler::<R, S, A>).post(create_handler::<R, S, A>),
        )
        .route(
            "/api/v1/commission/rules/:rule_id",
            get(get_handler::<R, S, A>)
                .put(update_handler::<R, S, A>)
                .delete(delete_handler::<R, S, A>),
        )
        .route(
            "/api/v1/commission/rules/:rule_id/toggle",
            post(toggle_handler::<R, S, A>),
        )
        .route(
            "/api/v1/commission/evaluate",
            post(evaluate_handler::<R, S, A>),
        )
        .route(
            "/api/v1/commission/settings",
            get(settings_handler::<R, S, A>).put(replace_settings_handler::<R, S, A>),
        )
        .with_state(service)
}

pub fn actor_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_ACTOR)
        .to_string()
}

pub fn success_response<T: Serialize>(status: StatusCode, data: T) -> Response {
    let payload = json!({
        "success": true,
        "data": data,
    });
    (status, Json(payload)).into_response()
}

pub fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let payload = json!({
        "success": false,
        "error": {
            "code": code,
            "message": message,
        },
    });
    (status, Json(payload)).into_response()
}

fn failure(error: CommissionError) -> Response {
    let status = match &error {
        CommissionError::Validation(_) => StatusCode::BAD_REQUEST,
        CommissionError::NotFound(_) => StatusCode::NOT_FOUND,
        CommissionError::Computation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommissionError::Persistence(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        CommissionError::Persistence(RepositoryError::Conflict) => StatusCode::CONFLICT,
        CommissionError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, error.code(), error.to_string())
}

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, CommissionError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ValidationError::MalformedPayload(rejection.body_text()).into())
}

fn respond<T: Serialize>(status: StatusCode, outcome: Result<T, CommissionError>) -> Response {
    match outcome {
        Ok(data) => success_response(status, data),
        Err(error) => failure(error),
    }
}

pub(crate) async fn list_handler<R, S, A>(State(service): State<SharedService<R, S, A>>) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    respond(StatusCode::OK, service.list())
}

pub(crate) async fn create_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
    headers: HeaderMap,
    body: Result<Json<RuleDraft>, JsonRejection>,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    let actor = actor_from_headers(&headers);
    let outcome = payload(body).and_then(|draft| service.create(&actor, draft));
    respond(StatusCode::CREATED, outcome)
}

pub(crate) async fn get_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
    Path(rule_id): Path<String>,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    respond(StatusCode::OK, service.get(&RuleId(rule_id)))
}

pub(crate) async fn update_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
    Path(rule_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<RuleDraft>, JsonRejection>,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    let actor = actor_from_headers(&headers);
    let id = RuleId(rule_id);
    let outcome = payload(body).and_then(|draft| service.update(&actor, &id, draft));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn delete_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
    Path(rule_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    let actor = actor_from_headers(&headers);
    respond(StatusCode::OK, service.delete(&actor, &RuleId(rule_id)))
}

pub(crate) async fn toggle_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
    Path(rule_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    let actor = actor_from_headers(&headers);
    respond(StatusCode::OK, service.toggle(&actor, &RuleId(rule_id)))
}

pub(crate) async fn evaluate_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
    body: Result<Json<EvaluationRequest>, JsonRejection>,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    let outcome = payload(body).and_then(|request| service.evaluate(request));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn settings_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    respond(StatusCode::OK, service.settings())
}

pub(crate) async fn replace_settings_handler<R, S, A>(
    State(service): State<SharedService<R, S, A>>,
    headers: HeaderMap,
    body: Result<Json<CommissionSettings>, JsonRejection>,
) -> Response
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    let actor = actor_from_headers(&headers);
    let outcome = payload(body).and_then(|settings| service.replace_settings(&actor, settings));
    respond(StatusCode::OK, outcome)
}
