use serde::Serialize;
use time::OffsetDateTime;

use crate::reports::repo_types::Report;

/// Path prefix under which stored report files are served.
pub const UPLOADS_PREFIX: &str = "/uploads";

#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub id: i64,
    pub title: String,
    pub filename: String,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub url: String,
}

impl From<Report> for ReportListItem {
    fn from(r: Report) -> Self {
        let url = format!("{}/{}", UPLOADS_PREFIX, r.filename);
        Self {
            id: r.id,
            title: r.title,
            filename: r.filename,
            uploaded_at: r.uploaded_at,
            url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub reports: Vec<ReportListItem>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub report: ReportListItem,
}

/// Multipart fields collected from an admin upload.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub title: Option<String>,
    pub user_email: Option<String>,
    pub user_phone: Option<String>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub original_name: Option<String>,
    pub content_type: String,
    pub body: bytes::Bytes,
}
