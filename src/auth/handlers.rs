use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            present, AuthResponse, LoginRequest, MeResponse, OtpIssuedResponse, OtpRequest,
            OtpVerifyRequest, PublicUser, SignupRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
        repo_types::{Identity, NewUser, User},
        services::{find_or_create, is_valid_email},
    },
    error::{AppError, Result},
    extract::ApiJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/request-otp", post(request_otp))
        .route("/verify-otp", post(verify_otp))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn issue(state: &AppState, user: User) -> Result<Json<AuthResponse>> {
    let token = JwtKeys::from_ref(state).sign(&user)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<Json<AuthResponse>> {
    let (Some(email), Some(_)) = (present(&payload.email), present(&payload.password)) else {
        return Err(AppError::Validation("Email and password required".into()));
    };
    let email = email.to_lowercase();

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already exists".into()));
    }

    let password = payload.password.unwrap_or_default();
    let hash = hash_password_blocking(password).await?;

    let user = state
        .users
        .create(NewUser {
            email: Some(email),
            phone: present(&payload.phone).map(str::to_string),
            password_hash: Some(hash),
        })
        .await?;

    info!(user_id = user.id, "user registered");
    issue(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let (Some(email), Some(_)) = (present(&payload.email), present(&payload.password)) else {
        return Err(AppError::Validation("Email and password required".into()));
    };
    let email = email.to_lowercase();
    let invalid = || AppError::Auth("Invalid credentials".into());

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(invalid());
    };
    let Some(hash) = user.password_hash.clone() else {
        warn!(user_id = user.id, "login for account without password");
        return Err(invalid());
    };

    let password = payload.password.unwrap_or_default();
    if !verify_password_blocking(password, hash).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid());
    }

    info!(user_id = user.id, "user logged in");
    issue(&state, user)
}

/// The canonical OTP key: lowercased email or trimmed phone.
fn otp_key(identifier: &str) -> Option<(String, Identity)> {
    let identity = Identity::from_identifier(identifier);
    let key = identity.email.clone().or_else(|| identity.phone.clone())?;
    Some((key, identity))
}

#[instrument(skip(state, payload))]
pub async fn request_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpRequest>,
) -> Result<Json<OtpIssuedResponse>> {
    let Some((key, _)) = present(&payload.identifier).and_then(otp_key) else {
        return Err(AppError::Validation("Email or phone required".into()));
    };

    let code = state.otp.request(&key).await?;
    Ok(Json(OtpIssuedResponse {
        message: "OTP generated (mock).".into(),
        code,
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpVerifyRequest>,
) -> Result<Json<AuthResponse>> {
    // Codes are compared verbatim; only blank input counts as missing.
    let (Some((key, identity)), Some(code)) = (
        present(&payload.identifier).and_then(otp_key),
        payload.code.as_deref().filter(|c| !c.trim().is_empty()),
    ) else {
        return Err(AppError::Validation("Identifier and code required".into()));
    };

    state.otp.verify(&key, code).await?;
    let user = match state.users.find_by_identifier(&key).await? {
        Some(user) => user,
        None => find_or_create(state.users.as_ref(), &identity).await?,
    };

    info!(user_id = user.id, "user verified by one-time code");
    issue(&state, user)
}

#[instrument(skip(state, claims), fields(user_id = claims.id))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MeResponse>> {
    let user = state.users.get_by_id(claims.id).await?.ok_or_else(|| {
        warn!(user_id = claims.id, "token for unknown user");
        AppError::InvalidToken
    })?;

    Ok(Json(MeResponse {
        user: PublicUser::from(user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn otp_key_normalizes_identifier() {
        let (key, identity) = otp_key(" A@X.com").unwrap();
        assert_eq!(key, "a@x.com");
        assert_eq!(identity.email.as_deref(), Some("a@x.com"));

        let (key, identity) = otp_key("+1 555 0001").unwrap();
        assert_eq!(key, "+1 555 0001");
        assert_eq!(identity.phone.as_deref(), Some("+1 555 0001"));
    }

    #[test]
    fn me_response_serialization() {
        let response = MeResponse {
            user: PublicUser {
                id: 7,
                email: Some("test@example.com".into()),
                phone: None,
                created_at: OffsetDateTime::UNIX_EPOCH,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["user"]["email"], "test@example.com");
        assert_eq!(json["user"]["id"], 7);
        assert!(json["user"]["phone"].is_null());
    }
}
