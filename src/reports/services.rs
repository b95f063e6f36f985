use anyhow::Context;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    auth::{repo_types::Identity, services::find_or_create},
    error::{AppError, Result},
    reports::{dto::UploadForm, repo_types::Report},
    state::AppState,
};

/// Validate an admin upload, store the file, then bind a report to the
/// (possibly new) owning user. The stored file is removed if the report
/// cannot be recorded.
pub async fn store_report(st: &AppState, form: UploadForm) -> Result<Report> {
    let identity = Identity::new(form.user_email.as_deref(), form.user_phone.as_deref());
    let title = form
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let (Some(file), Some(title)) = (form.file.filter(|f| !f.body.is_empty()), title) else {
        return Err(AppError::Validation("Missing required fields".into()));
    };
    if identity.is_empty() {
        return Err(AppError::Validation("Missing required fields".into()));
    }

    let key = storage_key(file.original_name.as_deref(), &file.content_type);
    st.storage
        .put_object(&key, file.body, &file.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let recorded = async {
        let user = find_or_create(st.users.as_ref(), &identity).await?;
        let report = st.reports.create(user.id, &title, &key).await?;
        Ok::<_, AppError>(report)
    }
    .await;

    match recorded {
        Ok(report) => {
            info!(report_id = report.id, user_id = report.user_id, key = %key, "report uploaded");
            Ok(report)
        }
        Err(e) => {
            if let Err(cleanup) = st.storage.delete_object(&key).await {
                error!(error = %cleanup, key = %key, "failed to remove orphaned upload");
            }
            Err(e)
        }
    }
}

/// Unique key for a stored file, keeping a safe extension when one is known.
pub fn storage_key(original_name: Option<&str>, content_type: &str) -> String {
    let id = Uuid::new_v4().simple();
    match original_name
        .and_then(ext_from_filename)
        .or_else(|| ext_from_mime(content_type).map(str::to_string))
    {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

fn ext_from_filename(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ok = !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    ok.then(|| ext.to_ascii_lowercase())
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "application/pdf" => Some("pdf"),
        "text/csv" => Some("csv"),
        "text/plain" => Some("txt"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some("xlsx"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pdf") => "application/pdf",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// A key is servable only if it is one plain path segment.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_unique_and_safe() {
        let a = storage_key(Some("Quarterly Report.PDF"), "application/octet-stream");
        let b = storage_key(Some("Quarterly Report.PDF"), "application/octet-stream");
        assert_ne!(a, b);
        assert!(a.ends_with(".pdf"));
        assert!(is_safe_key(&a));
    }

    #[test]
    fn storage_key_falls_back_to_mime_then_bare() {
        assert!(storage_key(None, "text/csv").ends_with(".csv"));
        assert!(storage_key(Some("../../etc/passwd"), "whatever/else")
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
        assert!(storage_key(Some("x.ph p"), "application/pdf").ends_with(".pdf"));
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("application/pdf"), Some("pdf"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn unsafe_keys_are_rejected() {
        assert!(!is_safe_key(""));
        assert!(!is_safe_key(".."));
        assert!(!is_safe_key("../secret"));
        assert!(!is_safe_key("a/b.pdf"));
        assert!(!is_safe_key(".env"));
        assert!(is_safe_key("3f2a9c.pdf"));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("abc.pdf"), "application/pdf");
        assert_eq!(content_type_for("abc"), "application/octet-stream");
    }
}
