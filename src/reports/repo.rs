use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::reports::repo_types::Report;

#[async_trait]
pub trait ReportRepo: Send + Sync {
    async fn create(&self, user_id: i64, title: &str, filename: &str) -> anyhow::Result<Report>;

    /// Reports owned by `user_id`, newest first.
    async fn list_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Report>>;
}

#[derive(Clone)]
pub struct PgReportRepo {
    db: PgPool,
}

impl PgReportRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportRepo for PgReportRepo {
    async fn create(&self, user_id: i64, title: &str, filename: &str) -> anyhow::Result<Report> {
        let report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (user_id, title, filename)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, filename, uploaded_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(filename)
        .fetch_one(&self.db)
        .await
        .context("insert report")?;
        Ok(report)
    }

    async fn list_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Report>> {
        let rows = sqlx::query_as::<_, Report>(
            r#"
            SELECT id, user_id, title, filename, uploaded_at
            FROM reports
            WHERE user_id = $1
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list reports by user")?;
        Ok(rows)
    }
}

#[cfg(test)]
pub mod memory {
    use async_trait::async_trait;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;

    use super::ReportRepo;
    use crate::reports::repo_types::Report;

    #[derive(Default)]
    pub struct MemoryReportRepo {
        reports: Mutex<Vec<Report>>,
        fail_inserts: std::sync::atomic::AtomicBool,
    }

    impl MemoryReportRepo {
        pub fn fail_inserts(&self) {
            self.fail_inserts
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }

        pub async fn count(&self) -> usize {
            self.reports.lock().await.len()
        }
    }

    #[async_trait]
    impl ReportRepo for MemoryReportRepo {
        async fn create(&self, user_id: i64, title: &str, filename: &str) -> anyhow::Result<Report> {
            if self.fail_inserts.load(std::sync::atomic::Ordering::SeqCst) {
                anyhow::bail!("insert report: connection reset");
            }
            let mut reports = self.reports.lock().await;
            let report = Report {
                id: reports.len() as i64 + 1,
                user_id,
                title: title.to_string(),
                filename: filename.to_string(),
                uploaded_at: OffsetDateTime::now_utc(),
            };
            reports.push(report.clone());
            Ok(report)
        }

        async fn list_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Report>> {
            let reports = self.reports.lock().await;
            let mut owned: Vec<Report> = reports
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            owned.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
            Ok(owned)
        }
    }
}
