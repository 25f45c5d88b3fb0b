use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use murmur_db::Database;
use murmur_db::queries::is_unique_violation;
use murmur_gateway::registry::ConnectionRegistry;
use murmur_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::blocking;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub registry: ConnectionRegistry,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    if !valid_username(&req.username) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !valid_email(&req.email) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if username or email is taken
    let username = req.username.clone();
    let email = req.email.clone();
    let (username_taken, email_taken) = blocking(&state, move |db| {
        Ok((db.get_user_by_username(&username)?.is_some(), db.email_exists(&email)?))
    })
    .await?;
    if username_taken || email_taken {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .to_string();

    let username = req.username.clone();
    let email = req.email.clone();
    // A concurrent registration can still win the UNIQUE race
    let created = blocking(&state, move |db| match db.create_user(&username, &email, &password_hash) {
        Ok(id) => Ok(Some(id)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e),
    })
    .await?;
    if created.is_none() {
        return Err(StatusCode::CONFLICT);
    }

    let token = create_token(&state.jwt_secret, &req.username, state.token_ttl).map_err(|e| {
        error!("Token creation failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!("Registered user {}", req.username);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: req.username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = req.username.clone();
    let user = blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("Stored hash for {} is unreadable: {}", user.username, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if !user.is_active {
        return Err(StatusCode::FORBIDDEN);
    }

    let token = create_token(&state.jwt_secret, &user.username, state.token_ttl).map_err(|e| {
        error!("Token creation failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(LoginResponse {
        username: user.username,
        token,
    }))
}

pub fn create_token(secret: &str, username: &str, ttl: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// 3-32 characters of ASCII letters, digits, `_`, `-` or `.`.
fn valid_username(username: &str) -> bool {
    (3..=32).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && email.len() <= 254 && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
