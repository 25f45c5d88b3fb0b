use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use murmur_gateway::store::MessageStore;
use murmur_types::api::Claims;

use crate::auth::AppState;
use crate::blocking;

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: pass the `id` of the oldest message from
    /// the previous page to fetch older messages.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

/// GET /channels/{name}/messages, oldest first.
pub async fn channel_history(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.min(MAX_PAGE);
    let before = query.before;

    // Lenient routing can store messages for names that were never created,
    // so only report 404 when there is nothing stored either.
    let messages = blocking(&state, move |db| {
        let messages = db.channel_messages(&channel, limit, before)?;
        if messages.is_empty() && !db.channel_exists(&channel)? {
            return Ok(None);
        }
        Ok(Some(messages))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(messages))
}

/// GET /messages/{other_user}: the caller's conversation with `other_user`,
/// both directions merged, oldest first.
pub async fn direct_history(
    State(state): State<AppState>,
    Path(other_user): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.min(MAX_PAGE);
    let before = query.before;
    let caller = claims.sub;

    let messages = blocking(&state, move |db| {
        let messages = db.direct_messages(&caller, &other_user, limit, before)?;
        if messages.is_empty() && !db.user_exists(&other_user)? {
            return Ok(None);
        }
        Ok(Some(messages))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(messages))
}
