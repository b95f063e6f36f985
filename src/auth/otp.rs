//! One-time codes: issue, store with an expiry, verify once.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store `record` for `identifier`, replacing any previous one.
    async fn put(&self, identifier: &str, record: OtpRecord) -> anyhow::Result<()>;

    async fn get(&self, identifier: &str) -> anyhow::Result<Option<OtpRecord>>;

    /// Delete the record for `identifier` if it still holds `code`.
    /// Returns whether a record was removed.
    async fn consume(&self, identifier: &str, code: &str) -> anyhow::Result<bool>;
}

/// Process-local store. Starts empty and is lost on restart.
#[derive(Default)]
pub struct MemoryOtpStore {
    codes: Mutex<HashMap<String, OtpRecord>>,
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn put(&self, identifier: &str, record: OtpRecord) -> anyhow::Result<()> {
        self.codes.lock().await.insert(identifier.to_string(), record);
        Ok(())
    }

    async fn get(&self, identifier: &str) -> anyhow::Result<Option<OtpRecord>> {
        Ok(self.codes.lock().await.get(identifier).cloned())
    }

    async fn consume(&self, identifier: &str, code: &str) -> anyhow::Result<bool> {
        let mut codes = self.codes.lock().await;
        match codes.get(identifier) {
            Some(record) if record.code == code => {
                codes.remove(identifier);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Clone)]
pub struct PgOtpStore {
    db: PgPool,
}

impl PgOtpStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn put(&self, identifier: &str, record: OtpRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO one_time_codes (identifier, code, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (identifier)
            DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(identifier)
        .bind(&record.code)
        .bind(record.expires_at)
        .execute(&self.db)
        .await
        .context("upsert one-time code")?;
        Ok(())
    }

    async fn get(&self, identifier: &str) -> anyhow::Result<Option<OtpRecord>> {
        let row = sqlx::query_as::<_, (String, OffsetDateTime)>(
            r#"SELECT code, expires_at FROM one_time_codes WHERE identifier = $1"#,
        )
        .bind(identifier)
        .fetch_optional(&self.db)
        .await
        .context("select one-time code")?;
        Ok(row.map(|(code, expires_at)| OtpRecord { code, expires_at }))
    }

    async fn consume(&self, identifier: &str, code: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query(r#"DELETE FROM one_time_codes WHERE identifier = $1 AND code = $2"#)
                .bind(identifier)
                .bind(code)
                .execute(&self.db)
                .await
                .context("delete one-time code")?;
        Ok(result.rows_affected() > 0)
    }
}

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string()
}

#[derive(Clone)]
pub struct OtpIssuer {
    store: Arc<dyn OtpStore>,
    ttl: Duration,
}

impl OtpIssuer {
    pub fn new(store: Arc<dyn OtpStore>, ttl_minutes: i64) -> Self {
        Self {
            store,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub async fn request(&self, identifier: &str) -> Result<String> {
        self.request_at(identifier, OffsetDateTime::now_utc()).await
    }

    pub async fn request_at(&self, identifier: &str, now: OffsetDateTime) -> Result<String> {
        let code = generate_code();
        let record = OtpRecord {
            code: code.clone(),
            expires_at: now + self.ttl,
        };
        self.store.put(identifier, record).await?;
        debug!(identifier, "one-time code issued");
        Ok(code)
    }

    pub async fn verify(&self, identifier: &str, code: &str) -> Result<()> {
        self.verify_at(identifier, code, OffsetDateTime::now_utc()).await
    }

    pub async fn verify_at(&self, identifier: &str, code: &str, now: OffsetDateTime) -> Result<()> {
        let Some(record) = self.store.get(identifier).await? else {
            warn!(identifier, "no one-time code on record");
            return Err(AppError::Expired);
        };

        if record.expires_at < now {
            self.store.consume(identifier, &record.code).await?;
            warn!(identifier, "one-time code expired");
            return Err(AppError::Expired);
        }

        if record.code != code {
            warn!(identifier, "one-time code mismatch");
            return Err(AppError::InvalidCode);
        }

        // A concurrent verification may have used the code between get and consume.
        if !self.store.consume(identifier, code).await? {
            return Err(AppError::Expired);
        }
        debug!(identifier, "one-time code consumed");
        Ok(())
    }
}
