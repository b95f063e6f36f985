use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 PHC string, absent for OTP/admin-provisioned accounts
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields accepted when inserting a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
}

/// An email and/or phone used to look a user up or provision one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Identity {
    /// Build from optional raw inputs; blank values count as absent.
    pub fn new(email: Option<&str>, phone: Option<&str>) -> Self {
        Self {
            email: email
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            phone: phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        }
    }

    /// A single identifier is an email when it contains `@`, otherwise a phone number.
    pub fn from_identifier(identifier: &str) -> Self {
        if identifier.contains('@') {
            Self::new(Some(identifier), None)
        } else {
            Self::new(None, Some(identifier))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}
