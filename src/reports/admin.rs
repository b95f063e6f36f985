//! Admin upload: attach a report file to a user by email and/or phone.
//!
//! The caller is trusted by network origin (loopback peer) plus a shared
//! secret in `x-admin-secret`; no user token is involved. The origin check
//! looks only at the socket peer address, so a reverse proxy on the same host
//! makes every proxied request look local. Deploy behind such a proxy only if
//! it does not forward `/api/admin/*`.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        ConnectInfo, DefaultBodyLimit, Multipart, State,
    },
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use bytes::{Bytes, BytesMut};
use subtle::ConstantTimeEq;
use tracing::{instrument, warn};

use crate::{
    error::{AppError, Result},
    reports::{
        dto::{ReportListItem, UploadForm, UploadResponse, UploadedFile},
        services::store_report,
    },
    state::AppState,
};

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Room for part headers, boundaries and the text fields on top of the file cap.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// The file itself is capped at `max_upload_bytes` in [`read_form`]; the
/// request as a whole may exceed it by the multipart framing.
pub fn admin_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/admin/upload", post(admin_upload))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
        ))
}

pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

pub fn secret_matches(provided: Option<&str>, expected: &str) -> bool {
    match provided {
        Some(p) => p.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        warn!(error = %e, "malformed multipart body");
        AppError::Validation("Invalid multipart body".into())
    }
}

async fn read_file(mut field: Field<'_>, max_bytes: usize) -> Result<Bytes> {
    let mut body = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if body.len() + chunk.len() > max_bytes {
            warn!(max_bytes, "admin upload file over size cap");
            return Err(AppError::PayloadTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

async fn read_form(mut mp: Multipart, max_file_bytes: usize) -> Result<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("report") => {
                let original_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = read_file(field, max_file_bytes).await?;
                form.file = Some(UploadedFile {
                    original_name,
                    content_type,
                    body,
                });
            }
            Some("title") => form.title = Some(field.text().await.map_err(multipart_error)?),
            Some("userEmail") => {
                form.user_email = Some(field.text().await.map_err(multipart_error)?)
            }
            Some("userPhone") => {
                form.user_phone = Some(field.text().await.map_err(multipart_error)?)
            }
            _ => {}
        }
    }
    Ok(form)
}

#[instrument(skip(state, peer, headers, multipart), fields(peer = %peer))]
pub async fn admin_upload(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    if !is_loopback(peer.ip()) {
        warn!("admin upload from non-local origin");
        return Err(AppError::Forbidden(
            "Admin upload restricted to localhost".into(),
        ));
    }

    let provided = headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !secret_matches(provided, &state.config.admin.secret) {
        warn!("admin upload with invalid secret");
        return Err(AppError::Auth("Invalid admin secret".into()));
    }

    let multipart = multipart.map_err(|e| {
        warn!(error = %e, "admin upload without multipart body");
        AppError::Validation("Missing required fields".into())
    })?;
    let form = read_form(multipart, state.config.admin.max_upload_bytes).await?;
    let report = store_report(&state, form).await?;

    Ok(Json(UploadResponse {
        message: "Report uploaded".into(),
        report: ReportListItem::from(report),
    }))
}
