pub mod auth;
pub mod directory;
pub mod messages;
pub mod middleware;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use murmur_db::Database;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST routes: public auth endpoints plus the bearer-protected directory
/// and history endpoints.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/users", get(directory::list_users))
        .route("/channels", get(directory::list_channels))
        .route("/channels/{name}/messages", get(messages::channel_history))
        .route("/messages/{other_user}", get(messages::direct_history))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use murmur_gateway::registry::{ConnectionHandle, ConnectionRegistry};
    use murmur_types::models::{MessageTarget, NewMessage};

    use crate::auth::AppStateInner;

    struct TestApp {
        _dir: TempDir,
        state: AppState,
        app: Router,
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("api.db")).unwrap());
        db.ensure_channel("General").unwrap();
        db.ensure_channel("Random").unwrap();

        let state = Arc::new(AppStateInner {
            db,
            jwt_secret: "test-secret".into(),
            token_ttl: chrono::Duration::hours(1),
            registry: ConnectionRegistry::new(),
        });
        TestApp {
            _dir: dir,
            app: router(state.clone()),
            state,
        }
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register(app: &Router, username: &str) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "correct horse",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register {}", username);
        assert_eq!(body["username"], username);
        body["token"].as_str().unwrap().to_string()
    }

    fn store_message(state: &AppState, sender: &str, target: MessageTarget, content: &str) -> i64 {
        state
            .db
            .insert_message(&NewMessage {
                sender: sender.into(),
                target,
                content: content.into(),
                created_at: chrono::Utc::now(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn register_and_login() {
        let t = test_app();
        register(&t.app, "alice").await;

        let (status, body) = call(
            &t.app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        let token = body["token"].as_str().unwrap();
        let claims = middleware::decode_token("test-secret", token).unwrap();
        assert_eq!(claims.sub, "alice");

        let (status, _) = call(
            &t.app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &t.app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "nobody", "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_input() {
        let t = test_app();
        register(&t.app, "alice").await;

        let attempts = [
            // username taken
            (json!({ "username": "alice", "email": "new@example.com", "password": "correct horse" }), StatusCode::CONFLICT),
            // email taken
            (json!({ "username": "alice2", "email": "alice@example.com", "password": "correct horse" }), StatusCode::CONFLICT),
            (json!({ "username": "al", "email": "al@example.com", "password": "correct horse" }), StatusCode::BAD_REQUEST),
            (json!({ "username": "dave", "email": "dave", "password": "correct horse" }), StatusCode::BAD_REQUEST),
            (json!({ "username": "erin", "email": "erin@example.com", "password": "short" }), StatusCode::BAD_REQUEST),
        ];
        for (body, expected) in attempts {
            let (status, _) = call(&t.app, Method::POST, "/auth/register", None, Some(body.clone())).await;
            assert_eq!(status, expected, "{}", body);
        }
    }

    #[tokio::test]
    async fn failed_insert_is_a_server_error_not_a_conflict() {
        let t = test_app();
        t.state
            .db
            .with_conn_mut(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER users_frozen BEFORE INSERT ON users
                     BEGIN SELECT RAISE(ABORT, 'registrations frozen'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let (status, _) = call(
            &t.app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "alice", "email": "alice@example.com", "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn inactive_user_cannot_log_in() {
        let t = test_app();
        register(&t.app, "alice").await;
        assert!(t.state.db.set_user_active("alice", false).unwrap());

        let (status, _) = call(
            &t.app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn protected_routes_require_a_valid_token() {
        let t = test_app();
        let (status, _) = call(&t.app, Method::GET, "/channels", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&t.app, Method::GET, "/channels", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&t.app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null); // plain text
    }

    #[tokio::test]
    async fn users_excludes_caller_and_reports_presence() {
        let t = test_app();
        let token = register(&t.app, "alice").await;
        register(&t.app, "bob").await;
        register(&t.app, "carol").await;

        let (bob, _bob_rx) = ConnectionHandle::new("bob");
        t.state.registry.connect(bob).await;

        let (status, body) = call(&t.app, Method::GET, "/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                { "username": "bob", "online": true },
                { "username": "carol", "online": false },
            ])
        );
    }

    #[tokio::test]
    async fn lists_channels() {
        let t = test_app();
        let token = register(&t.app, "alice").await;

        let (status, body) = call(&t.app, Method::GET, "/channels", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["General", "Random"]);
    }

    #[tokio::test]
    async fn channel_history_is_oldest_first_and_pages_back() {
        let t = test_app();
        let token = register(&t.app, "alice").await;
        let ids: Vec<i64> = (0..4)
            .map(|i| store_message(&t.state, "alice", MessageTarget::channel("General"), &format!("m{}", i)))
            .collect();
        store_message(&t.state, "alice", MessageTarget::channel("Random"), "elsewhere");

        let (status, body) =
            call(&t.app, Method::GET, "/channels/General/messages?limit=2", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let page: Vec<i64> = body.as_array().unwrap().iter().map(|m| m["id"].as_i64().unwrap()).collect();
        assert_eq!(page, vec![ids[2], ids[3]]);
        assert_eq!(body[0]["channel_name"], "General");
        assert!(body[0].get("recipient").is_none());

        let uri = format!("/channels/General/messages?before={}", ids[2]);
        let (_, body) = call(&t.app, Method::GET, &uri, Some(&token), None).await;
        let older: Vec<i64> = body.as_array().unwrap().iter().map(|m| m["id"].as_i64().unwrap()).collect();
        assert_eq!(older, vec![ids[0], ids[1]]);

        let (status, _) = call(&t.app, Method::GET, "/channels/Nowhere/messages", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn direct_history_merges_both_directions() {
        let t = test_app();
        let token = register(&t.app, "alice").await;
        register(&t.app, "bob").await;
        register(&t.app, "carol").await;

        store_message(&t.state, "alice", MessageTarget::direct("bob"), "hi bob");
        store_message(&t.state, "bob", MessageTarget::direct("alice"), "hi alice");
        store_message(&t.state, "carol", MessageTarget::direct("bob"), "private to bob");
        store_message(&t.state, "bob", MessageTarget::channel("General"), "public");

        let (status, body) = call(&t.app, Method::GET, "/messages/bob", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let contents: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["hi bob", "hi alice"]);

        let (status, _) = call(&t.app, Method::GET, "/messages/nobody", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_stored_for_unregistered_names_is_readable() {
        let t = test_app();
        let token = register(&t.app, "alice").await;
        let dm = store_message(&t.state, "alice", MessageTarget::direct("ghost"), "boo");
        let post = store_message(&t.state, "alice", MessageTarget::channel("Attic"), "dusty");

        let (status, body) = call(&t.app, Method::GET, "/messages/ghost", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], dm);
        assert_eq!(body[0]["content"], "boo");

        let (status, body) =
            call(&t.app, Method::GET, "/channels/Attic/messages", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], post);

        // Known names with no history are an empty page, not a 404
        register(&t.app, "bob").await;
        let (status, body) = call(&t.app, Method::GET, "/messages/bob", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
