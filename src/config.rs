use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub secret: String,
    pub max_upload_bytes: usize,
}

/// Where one-time codes live between request and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        dir: PathBuf,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub admin: AdminConfig,
    pub otp_ttl_minutes: i64,
    pub otp_backend: OtpBackend,
    pub storage: StorageConfig,
}

pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 7;
pub const DEFAULT_OTP_TTL_MINUTES: i64 = 10;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Upper bound for token and code lifetimes: one year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 366;

fn parse_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .ok()
            .with_context(|| format!("{key} is not a number")),
        Err(_) => Ok(default),
    }
}

fn parse_minutes(key: &str, default: i64) -> anyhow::Result<i64> {
    let minutes = parse_or(key, default)?;
    if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
        anyhow::bail!("{key} must be between 1 and {MAX_TTL_MINUTES} minutes");
    }
    Ok(minutes)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "report-portal".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "report-portal-users".into()),
            ttl_minutes: parse_minutes("JWT_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES)?,
        };
        let admin = AdminConfig {
            secret: std::env::var("ADMIN_SECRET").context("ADMIN_SECRET is not set")?,
            max_upload_bytes: parse_or("ADMIN_UPLOAD_MAX_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        };

        let otp_backend = match std::env::var("OTP_STORE").as_deref() {
            Ok("memory") => OtpBackend::Memory,
            Ok("postgres") | Err(_) => OtpBackend::Postgres,
            Ok(other) => anyhow::bail!("unknown OTP_STORE {other:?}, expected memory or postgres"),
        };

        let storage = match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("local") | Err(_) => StorageConfig::Local {
                dir: std::env::var("UPLOAD_DIR")
                    .unwrap_or_else(|_| "./uploads".into())
                    .into(),
            },
            Ok("s3") => StorageConfig::S3 {
                endpoint: std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT is not set")?,
                bucket: std::env::var("MINIO_BUCKET").context("MINIO_BUCKET is not set")?,
                access_key: std::env::var("MINIO_ACCESS_KEY")
                    .context("MINIO_ACCESS_KEY is not set")?,
                secret_key: std::env::var("MINIO_SECRET_KEY")
                    .context("MINIO_SECRET_KEY is not set")?,
            },
            Ok(other) => anyhow::bail!("unknown STORAGE_BACKEND {other:?}, expected local or s3"),
        };

        Ok(Self {
            database_url,
            jwt,
            admin,
            otp_ttl_minutes: parse_minutes("OTP_TTL_MINUTES", DEFAULT_OTP_TTL_MINUTES)?,
            otp_backend,
            storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [(&str, Option<&str>); 3] = [
        ("DATABASE_URL", Some("postgres://localhost/portal")),
        ("JWT_SECRET", Some("jwt-secret")),
        ("ADMIN_SECRET", Some("admin-secret")),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let vars: Vec<(&str, Option<&str>)> = REQUIRED
            .into_iter()
            .chain([
                ("JWT_TTL_MINUTES", None),
                ("OTP_TTL_MINUTES", None),
                ("OTP_STORE", None),
                ("STORAGE_BACKEND", None),
                ("UPLOAD_DIR", None),
                ("ADMIN_UPLOAD_MAX_BYTES", None),
            ])
            .collect();
        temp_env::with_vars(vars, || {
            let cfg = AppConfig::from_env().expect("config loads");
            assert_eq!(cfg.jwt.ttl_minutes, 60 * 24 * 7);
            assert_eq!(cfg.jwt.issuer, "report-portal");
            assert_eq!(cfg.otp_ttl_minutes, 10);
            assert_eq!(cfg.otp_backend, OtpBackend::Postgres);
            assert_eq!(cfg.admin.max_upload_bytes, 25 * 1024 * 1024);
            assert_eq!(
                cfg.storage,
                StorageConfig::Local {
                    dir: PathBuf::from("./uploads")
                }
            );
        });
    }

    #[test]
    fn missing_admin_secret_is_an_error() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/portal")),
                ("JWT_SECRET", Some("jwt-secret")),
                ("ADMIN_SECRET", None),
            ],
            || {
                let err = AppConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("ADMIN_SECRET"));
            },
        );
    }

    #[test]
    fn s3_backend_requires_minio_settings() {
        let vars: Vec<(&str, Option<&str>)> = REQUIRED
            .into_iter()
            .chain([("STORAGE_BACKEND", Some("s3")), ("MINIO_ENDPOINT", None)])
            .collect();
        temp_env::with_vars(vars, || {
            let err = AppConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("MINIO_ENDPOINT"));
        });
    }

    #[test]
    fn memory_otp_store_can_be_selected() {
        let vars: Vec<(&str, Option<&str>)> = REQUIRED
            .into_iter()
            .chain([("OTP_STORE", Some("memory")), ("STORAGE_BACKEND", None)])
            .collect();
        temp_env::with_vars(vars, || {
            let cfg = AppConfig::from_env().expect("config loads");
            assert_eq!(cfg.otp_backend, OtpBackend::Memory);
        });
    }

    #[test]
    fn malformed_numbers_are_errors() {
        for (key, value) in [
            ("ADMIN_UPLOAD_MAX_BYTES", "25MB"),
            ("OTP_TTL_MINUTES", "ten"),
            ("JWT_TTL_MINUTES", "7d"),
        ] {
            let vars: Vec<(&str, Option<&str>)> =
                REQUIRED.into_iter().chain([(key, Some(value))]).collect();
            temp_env::with_vars(vars, || {
                let err = AppConfig::from_env().unwrap_err();
                assert!(err.to_string().contains(key), "{err}");
            });
        }
    }

    #[test]
    fn out_of_range_lifetimes_are_errors() {
        for (key, value) in [
            ("JWT_TTL_MINUTES", "9223372036854775807"),
            ("JWT_TTL_MINUTES", "0"),
            ("OTP_TTL_MINUTES", "-5"),
        ] {
            let vars: Vec<(&str, Option<&str>)> =
                REQUIRED.into_iter().chain([(key, Some(value))]).collect();
            temp_env::with_vars(vars, || {
                let err = AppConfig::from_env().unwrap_err();
                assert!(err.to_string().contains(key), "{err}");
            });
        }
    }
}
