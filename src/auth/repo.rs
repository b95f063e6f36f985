use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::{Identity, NewUser, User};
use crate::error::{AppError, Result};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// First user whose email equals `identity.email` or whose phone equals `identity.phone`.
    async fn find_matching(&self, identity: &Identity) -> Result<Option<User>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Insert a user. Fails with [`AppError::Conflict`] when the email or phone is taken.
    async fn create(&self, new_user: NewUser) -> Result<User>;

    /// Match an identifier against both email and phone.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let identifier = identifier.trim();
        let identity = Identity {
            email: Some(identifier.to_lowercase()),
            phone: Some(identifier.to_string()),
        };
        self.find_matching(&identity).await
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn conflict_message(err: &sqlx::Error) -> &'static str {
    let constraint = match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    };
    match constraint {
        Some(name) if name.contains("phone") => "Phone already exists",
        _ => "Email already exists",
    }
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, phone, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_matching(&self, identity: &Identity) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, phone, password_hash, created_at
            FROM users
            WHERE email = $1 OR phone = $2
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(identity.email.as_deref())
        .bind(identity.phone.as_deref())
        .fetch_optional(&self.db)
        .await
        .context("find user by identity")?;
        Ok(user)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, phone, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get user by id")?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, phone, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, phone, password_hash, created_at
            "#,
        )
        .bind(new_user.email)
        .bind(new_user.phone)
        .bind(new_user.password_hash)
        .fetch_one(&self.db)
        .await;

        match inserted {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(conflict_message(&e).into())),
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }
}
