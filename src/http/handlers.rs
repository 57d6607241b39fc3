//! API endpoint handlers.
//!
//! Request bodies are taken at face value: absent fields become empty
//! strings and are forwarded as-is, except the username on login/logout.

use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::response::{ApiError, ApiResponse, ApiResult};
use crate::http::server::AppState;
use crate::observability::metrics;

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendMessageRequest {
    pub from: String,
    pub to: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendGroupMessageRequest {
    pub from: String,
    pub group: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateGroupRequest {
    pub group_name: String,
    pub creator: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JoinGroupRequest {
    pub group_name: String,
    pub username: String,
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub sessions: usize,
}

type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Record metrics and render the handler outcome.
fn finish(endpoint: &'static str, start: Instant, result: ApiResult) -> Response {
    let response = match result {
        Ok(body) => body.into_response(),
        Err(err) => {
            tracing::warn!(
                endpoint = endpoint,
                status = %err.status,
                error = %err.message,
                "Request failed"
            );
            err.into_response()
        }
    };
    metrics::record_request(endpoint, response.status().as_u16(), start);
    response
}

/// Unwrap a JSON body, turning extractor rejections into the error envelope.
fn json_body<T>(body: JsonBody<T>) -> Result<T, ApiError> {
    body.map(|Json(req)| req).map_err(ApiError::from)
}

/// Username from a login-style body; malformed or empty bodies count as missing.
fn required_username(body: JsonBody<LoginRequest>) -> Result<String, ApiError> {
    body.ok()
        .and_then(|Json(req)| req.username)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(ApiError::missing_username)
}

pub async fn login(State(state): State<AppState>, body: JsonBody<LoginRequest>) -> Response {
    let start = Instant::now();
    let result = login_user(&state, body).await;
    finish("login", start, result)
}

async fn login_user(state: &AppState, body: JsonBody<LoginRequest>) -> ApiResult {
    let username = required_username(body)?;
    state.dispatcher.login(&username).await?;
    Ok(ApiResponse::ok())
}

pub async fn logout(State(state): State<AppState>, body: JsonBody<LoginRequest>) -> Response {
    let start = Instant::now();
    let result = logout_user(&state, body).await;
    finish("logout", start, result)
}

async fn logout_user(state: &AppState, body: JsonBody<LoginRequest>) -> ApiResult {
    let username = required_username(body)?;
    state.dispatcher.logout(&username).await?;
    Ok(ApiResponse::ok())
}

pub async fn send_message(
    State(state): State<AppState>,
    body: JsonBody<SendMessageRequest>,
) -> Response {
    let start = Instant::now();
    let result = forward_message(&state, body).await;
    finish("send_message", start, result)
}

async fn forward_message(state: &AppState, body: JsonBody<SendMessageRequest>) -> ApiResult {
    let req = json_body(body)?;
    let reply = state
        .dispatcher
        .send_message(&req.from, &req.to, &req.content)
        .await?;
    Ok(ApiResponse::reply(reply))
}

pub async fn send_group_message(
    State(state): State<AppState>,
    body: JsonBody<SendGroupMessageRequest>,
) -> Response {
    let start = Instant::now();
    let result = forward_group_message(&state, body).await;
    finish("send_group_message", start, result)
}

async fn forward_group_message(
    state: &AppState,
    body: JsonBody<SendGroupMessageRequest>,
) -> ApiResult {
    let req = json_body(body)?;
    let reply = state
        .dispatcher
        .send_group_message(&req.from, &req.group, &req.content)
        .await?;
    Ok(ApiResponse::reply(reply))
}

pub async fn create_group(
    State(state): State<AppState>,
    body: JsonBody<CreateGroupRequest>,
) -> Response {
    let start = Instant::now();
    let result = forward_create_group(&state, body).await;
    finish("create_group", start, result)
}

async fn forward_create_group(state: &AppState, body: JsonBody<CreateGroupRequest>) -> ApiResult {
    let req = json_body(body)?;
    let reply = state
        .dispatcher
        .create_group(&req.group_name, &req.creator)
        .await?;
    Ok(ApiResponse::reply(reply))
}

pub async fn join_group(
    State(state): State<AppState>,
    body: JsonBody<JoinGroupRequest>,
) -> Response {
    let start = Instant::now();
    let result = forward_join_group(&state, body).await;
    finish("join_group", start, result)
}

async fn forward_join_group(state: &AppState, body: JsonBody<JoinGroupRequest>) -> ApiResult {
    let req = json_body(body)?;
    let reply = state
        .dispatcher
        .join_group(&req.group_name, &req.username)
        .await?;
    Ok(ApiResponse::reply(reply))
}

pub async fn get_groups(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    let start = Instant::now();
    let result = state
        .dispatcher
        .get_groups(&username)
        .await
        .map(ApiResponse::reply)
        .map_err(ApiError::from);
    finish("get_groups", start, result)
}

pub async fn get_online_users(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    let start = Instant::now();
    let result = state
        .dispatcher
        .get_online_users(&username)
        .await
        .map(ApiResponse::reply)
        .map_err(ApiError::from);
    finish("get_online_users", start, result)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        sessions: state.dispatcher.registry().len(),
    })
}
