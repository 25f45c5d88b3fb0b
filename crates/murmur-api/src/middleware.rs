use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use murmur_types::api::Claims;

use crate::auth::AppState;

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = decode_token(&state.jwt_secret, token).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// `None` if the token is malformed, badly signed or expired.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_token;

    #[test]
    fn token_roundtrip_and_rejections() {
        let token = create_token("secret", "alice", chrono::Duration::hours(1)).unwrap();
        assert_eq!(decode_token("secret", &token).unwrap().sub, "alice");
        assert!(decode_token("other-secret", &token).is_none());
        assert!(decode_token("secret", "not-a-token").is_none());

        // Well past the default 60s leeway
        let expired = create_token("secret", "alice", chrono::Duration::hours(-1)).unwrap();
        assert!(decode_token("secret", &expired).is_none());
    }

    #[test]
    fn bearer_prefix_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
