use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::auth::{
    repo::UserRepo,
    repo_types::{Identity, NewUser, User},
};
use crate::error::{AppError, Result};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Look a user up by email or phone, creating a password-less account when
/// none matches. A concurrent insert that wins the uniqueness race is re-read.
pub async fn find_or_create(users: &dyn UserRepo, identity: &Identity) -> Result<User> {
    if identity.is_empty() {
        return Err(AppError::Validation("Email or phone required".into()));
    }

    if let Some(user) = users.find_matching(identity).await? {
        return Ok(user);
    }

    let created = users
        .create(NewUser {
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            password_hash: None,
        })
        .await;

    match created {
        Ok(user) => {
            info!(user_id = user.id, "user provisioned");
            Ok(user)
        }
        Err(AppError::Conflict(_)) => users.find_matching(identity).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("user missing after uniqueness conflict"))
        }),
        Err(e) => Err(e),
    }
}
