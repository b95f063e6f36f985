use serde::{Deserialize, Serialize};

/// JWT payload carried by session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,               // user ID
    pub email: Option<String>, // user email, if any
    pub phone: Option<String>, // user phone, if any
    pub iat: usize,            // issued at (unix timestamp)
    pub exp: usize,            // expires at (unix timestamp)
    pub iss: String,           // issuer
    pub aud: String,           // audience
}
