/// REST API over axum.
///
/// Endpoints:
/// - POST   /api/chat/message            ask a question, get `{id, message, citations}`
/// - GET    /api/chat/history?limit=N    recent turns of the caller's session
/// - DELETE /api/chat/history            forget the caller's session
/// - GET    /api/rules/search?q=...      ranked rules for a query
/// - GET    /api/rules/categories        distinct categories
/// - GET    /api/rules/category/{name}   rules in one category
/// - GET    /api/rules/{id}              one rule
/// - GET    /health                      liveness and corpus size
///
/// The caller's session comes from the `X-Session-Id` header.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::{
    CategoriesResponse, CategoryRulesResponse, ChatRequest, ClearHistoryResponse, ErrorResponse,
    HealthResponse, HistoryQuery, HistoryResponse, SearchQuery, SearchRulesResponse,
};
use crate::error::AppError;
use crate::model::Rule;
use crate::session::{ConversationSession, DEFAULT_SESSION_ID};

pub const SESSION_HEADER: &str = "x-session-id";

/// Set to `unavailable` on a chat answer whose turns could not be recorded.
pub const HISTORY_STATUS_HEADER: &str = "x-history-status";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub session: Arc<ConversationSession>,
    /// Page size for history reads without `?limit=`.
    pub history_limit: usize,
}

pub fn build_router(state: Arc<HttpState>) -> Router {
    let api = Router::new()
        .route("/chat/message", post(send_message))
        .route("/chat/history", get(get_history).delete(clear_history))
        .route("/rules/search", get(search_rules))
        .route("/rules/categories", get(list_categories))
        .route("/rules/category/{category}", get(list_category))
        .route("/rules/{id}", get(get_rule));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
}

/// Serve until ctrl-c, then drain in-flight requests.
pub async fn serve(state: Arc<HttpState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::HistoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation(_) | AppError::Config(_) | AppError::Common(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_SESSION_ID)
        .to_string()
}

fn owned(rules: impl IntoIterator<Item = impl AsRef<Rule>>) -> Vec<Rule> {
    rules.into_iter().map(|r| r.as_ref().clone()).collect()
}

async fn send_message(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body.map_err(|e| AppError::InvalidArgument(e.body_text()))?;
    let session_id = session_id(&headers);
    let content = req.content.unwrap_or_default();
    let handled = state.session.handle_message(&session_id, &content).await?;

    let mut response = Json(handled.response).into_response();
    if handled.history_error.is_some() {
        response
            .headers_mut()
            .insert(HISTORY_STATUS_HEADER, HeaderValue::from_static("unavailable"));
    }
    Ok(response)
}

async fn get_history(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = query.limit.unwrap_or(state.history_limit);
    let messages = state.session.get_history(&session_id(&headers), limit).await?;
    Ok(Json(HistoryResponse { messages }))
}

async fn clear_history(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> Result<Json<ClearHistoryResponse>, AppError> {
    state.session.clear_history(&session_id(&headers)).await?;
    Ok(Json(ClearHistoryResponse::cleared()))
}

async fn search_rules(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchRulesResponse>, AppError> {
    let q = query
        .q
        .ok_or_else(|| AppError::InvalidArgument("query parameter 'q' is required".to_string()))?;
    let matches = state.session.matcher().search(&q, state.session.corpus());
    Ok(Json(SearchRulesResponse {
        results: owned(matches.iter().map(|m| &m.rule)),
    }))
}

async fn list_categories(State(state): State<Arc<HttpState>>) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: state.session.corpus().list_categories().to_vec(),
    })
}

async fn list_category(
    State(state): State<Arc<HttpState>>,
    Path(category): Path<String>,
) -> Json<CategoryRulesResponse> {
    let rules = owned(state.session.corpus().list_by_category(&category));
    Json(CategoryRulesResponse { category, rules })
}

async fn get_rule(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> Result<Json<Rule>, AppError> {
    let rule = state.session.corpus().get_by_id(&id)?;
    Ok(Json(rule.as_ref().clone()))
}

async fn health(State(state): State<Arc<HttpState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rules: state.session.corpus().len(),
    })
}
