use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use murmur_api::auth::{AppState, AppStateInner};
use murmur_api::middleware::{bearer_token, decode_token};
use murmur_db::Database;
use murmur_gateway::connection;
use murmur_gateway::dispatcher::Dispatcher;
use murmur_gateway::registry::ConnectionRegistry;
use murmur_gateway::store::MessageStore;

use crate::config::Config;

#[derive(Clone)]
struct ServerState {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    jwt_secret: String,
}

/// A fully wired server: the HTTP router plus the dispatcher that owns the
/// live connection registry (needed again at shutdown).
pub struct Murmur {
    pub router: Router,
    pub dispatcher: Dispatcher,
}

pub fn build(db: Arc<Database>, config: &Config) -> Result<Murmur> {
    for name in &config.channels {
        if db.ensure_channel(name)? {
            info!("Created channel {}", name);
        }
    }

    let registry = ConnectionRegistry::new();
    let store: Arc<dyn MessageStore> = db.clone();
    let dispatcher = Dispatcher::new(
        registry.clone(),
        store,
        config.lobby.clone(),
        config.strict_targets,
    );

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
        registry,
    });

    let state = ServerState {
        db,
        dispatcher: dispatcher.clone(),
        jwt_secret: config.jwt_secret.clone(),
    };

    let ws_route = Router::new()
        .route("/ws/{username}", get(ws_upgrade))
        .with_state(state);

    let router = murmur_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    Ok(Murmur { router, dispatcher })
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// The path identity must be backed by a token issued for that same user,
/// and the account must still be active.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Path(username): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token.as_deref().or_else(|| bearer_token(&headers)) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let Some(claims) = decode_token(&state.jwt_secret, token) else {
        warn!("Rejected gateway connection for {}: invalid token", username);
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if claims.sub != username {
        warn!(
            "Rejected gateway connection: token for {} used on /ws/{}",
            claims.sub, username
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    let db = state.db.clone();
    let name = username.clone();
    match tokio::task::spawn_blocking(move || db.is_active_user(&name)).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            warn!("Rejected gateway connection for {}: account inactive", username);
            return StatusCode::FORBIDDEN.into_response();
        }
        Ok(Err(e)) => {
            error!("DB error checking {}: {:#}", username, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher, username))
}
