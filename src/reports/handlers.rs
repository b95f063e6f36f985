use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::extractors::AuthUser,
    error::{AppError, Result},
    reports::{
        dto::{ReportListItem, ReportsResponse},
        services::{content_type_for, is_safe_key},
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/reports", get(list_reports))
}

pub fn file_routes() -> Router<AppState> {
    Router::new().route("/uploads/:filename", get(serve_upload))
}

#[instrument(skip(state, claims), fields(user_id = claims.id))]
pub async fn list_reports(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ReportsResponse>> {
    let reports = state.reports.list_by_user(claims.id).await?;
    Ok(Json(ReportsResponse {
        reports: reports.into_iter().map(ReportListItem::from).collect(),
    }))
}

#[instrument(skip(state))]
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse> {
    if !is_safe_key(&filename) {
        warn!(filename = %filename, "rejected upload key");
        return Err(AppError::NotFound);
    }
    let body = state
        .storage
        .get_object(&filename)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], body))
}
