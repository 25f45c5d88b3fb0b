use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use murmur_gateway::store::MessageStore;
use murmur_types::api::{Claims, UserSummary};

use crate::auth::AppState;
use crate::blocking;

/// GET /users: everyone except the caller, with live presence.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let caller = claims.sub.clone();
    let names = blocking(&state, move |db| db.list_usernames_except(&caller)).await?;

    let online = state.registry.online().await;
    let users: Vec<UserSummary> = names
        .into_iter()
        .map(|username| UserSummary {
            online: online.binary_search(&username).is_ok(),
            username,
        })
        .collect();

    Ok(Json(users))
}

/// GET /channels
pub async fn list_channels(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let channels = blocking(&state, |db| db.channels()).await?;
    Ok(Json(channels))
}
