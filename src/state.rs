use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::otp::{MemoryOtpStore, OtpIssuer, OtpStore, PgOtpStore};
use crate::auth::repo::{PgUserRepo, UserRepo};
use crate::config::{AppConfig, OtpBackend, StorageConfig};
use crate::reports::repo::{PgReportRepo, ReportRepo};
use crate::storage::{LocalStorage, S3Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub reports: Arc<dyn ReportRepo>,
    pub otp: OtpIssuer,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn connect_db(config: &AppConfig) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")
    }

    pub async fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let otp_store: Arc<dyn OtpStore> = match config.otp_backend {
            OtpBackend::Memory => Arc::new(MemoryOtpStore::default()),
            OtpBackend::Postgres => Arc::new(PgOtpStore::new(db.clone())),
        };

        let storage: Arc<dyn StorageClient> = match &config.storage {
            StorageConfig::Local { dir } => Arc::new(LocalStorage::new(dir).await?),
            StorageConfig::S3 {
                endpoint,
                bucket,
                access_key,
                secret_key,
            } => Arc::new(
                S3Storage::new(endpoint, bucket, access_key, secret_key, "us-east-1").await?,
            ),
        };

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserRepo::new(db.clone())),
            Arc::new(PgReportRepo::new(db)),
            otp_store,
            storage,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        reports: Arc<dyn ReportRepo>,
        otp_store: Arc<dyn OtpStore>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        let otp = OtpIssuer::new(otp_store, config.otp_ttl_minutes);
        Self {
            config,
            users,
            reports,
            otp,
            storage,
        }
    }
}
