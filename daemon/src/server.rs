use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequestParts, Path, Query, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION,
};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::auth::{bearer_token, TokenVerifier};
use crate::config::ServerConfig;
use crate::protocol::{
    ActivityRecord, CompletionUpdate, ErrorResponse, MessageResponse, NewActivity,
    SuggestionItem, SuggestionQuery,
};
use crate::store::{ActivityStore, StoreError};
use crate::suggest::{Resolution, SuggestionResolver};

#[derive(Clone)]
pub struct AppState {
    suggestions: Arc<SuggestionResolver>,
    store: Arc<dyn ActivityStore>,
    verifier: Arc<dyn TokenVerifier>,
    allowed_origin: HeaderValue,
}

impl AppState {
    pub fn new(
        suggestions: SuggestionResolver,
        store: Arc<dyn ActivityStore>,
        verifier: Arc<dyn TokenVerifier>,
        allowed_origin: &str,
    ) -> Result<Self> {
        let allowed_origin = HeaderValue::from_str(allowed_origin)
            .with_context(|| format!("invalid server.allowed_origin {allowed_origin:?}"))?;
        Ok(Self {
            suggestions: Arc::new(suggestions),
            store,
            verifier,
            allowed_origin,
        })
    }
}

pub struct ActivityServer {
    config: ServerConfig,
    state: AppState,
}

impl ActivityServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.bind_addr))?;
        info!("autonomy daemon listening on {}", self.config.bind_addr);

        axum::serve(listener, build_router(self.state.clone()))
            .await
            .context("http server stopped with error")
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/api/suggestions", get(suggestions_handler))
        .route(
            "/api/activities",
            get(list_activities_handler).post(create_activity_handler),
        )
        .route(
            "/api/activities/:id",
            put(update_activity_handler).delete(delete_activity_handler),
        )
        .layer(from_fn_with_state(state.clone(), cors))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Token invalid")]
    Unauthorized,
    #[error("Not found")]
    NotFound,
    #[error("{0}")]
    Unprocessable(String),
    #[error("internal error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Backend(message) => {
                error!("activity store failure: {message}");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

pub struct Owner(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        authenticate(&parts.headers, state)
            .map(Owner)
            .ok_or(ApiError::Unauthorized)
    }
}

fn authenticate(headers: &HeaderMap, state: &AppState) -> Option<String> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = bearer_token(header).ok()?;
    match state.verifier.verify(token) {
        Ok(owner) => Some(owner),
        Err(error) => {
            debug!("rejected bearer token: {error}");
            None
        }
    }
}

async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, state.allowed_origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, content-type"),
    );
    // browsers reject credentials alongside a wildcard origin
    if state.allowed_origin != "*" {
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    response
}

async fn home_handler() -> Json<MessageResponse> {
    Json(MessageResponse::text("Autonomy API Ready"))
}

async fn suggestions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Option<Query<SuggestionQuery>>,
) -> Json<Vec<SuggestionItem>> {
    // an authenticated caller wins over the query parameter
    let owner = authenticate(&headers, &state)
        .or_else(|| query.and_then(|Query(query)| query.user_uid));
    let resolution = state.suggestions.resolve(owner.as_deref()).await;
    info!(
        route = "/api/suggestions",
        owner = owner.as_deref().unwrap_or("-"),
        generated = matches!(resolution, Resolution::Generated(_)),
        count = resolution.items().len(),
        "served suggestions"
    );
    Json(resolution.into_items())
}

async fn list_activities_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<Vec<ActivityRecord>>, ApiError> {
    let records = state.store.list_by_owner(&owner).await?;
    debug!(route = "/api/activities", %owner, count = records.len(), "listed activities");
    Ok(Json(records))
}

async fn create_activity_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    payload: Result<Json<NewActivity>, JsonRejection>,
) -> Result<Json<MessageResponse<ActivityRecord>>, ApiError> {
    let Json(activity) = payload?;
    let activity = activity.normalized();
    if activity.title.is_empty() {
        return Err(ApiError::Unprocessable("title must not be empty".to_string()));
    }
    let record = state.store.create(&owner, activity).await?;
    info!(route = "/api/activities", %owner, id = record.id, "created activity");
    Ok(Json(MessageResponse::with_data("Success", record)))
}

async fn update_activity_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CompletionUpdate>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    let Json(update) = payload?;
    state
        .store
        .set_completed(&owner, id, update.is_completed)
        .await?;
    info!(%owner, id, completed = update.is_completed, "updated activity");
    Ok(Json(MessageResponse::text("Updated")))
}

async fn delete_activity_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    state.store.delete(&owner, id).await?;
    info!(%owner, id, "deleted activity");
    Ok(Json(MessageResponse::text("Deleted")))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::Path as FsPath;
    use std::time::Duration;

    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::auth::HmacTokenVerifier;
    use crate::config::{ImageConfig, SuggestConfig};
    use crate::store::SqliteActivityStore;
    use crate::suggest::{ImageLinks, StaticCatalog};

    const SECRET: &str = "test-secret";

    async fn spawn_app() -> SocketAddr {
        spawn_app_with_origin("*").await
    }

    async fn spawn_app_with_origin(origin: &str) -> SocketAddr {
        let store: Arc<dyn ActivityStore> =
            Arc::new(SqliteActivityStore::open(FsPath::new(":memory:")).expect("open store"));
        let resolver = SuggestionResolver::new(
            SuggestConfig {
                seed: Some(5),
                ..SuggestConfig::default()
            },
            StaticCatalog::builtin(),
            ImageLinks::new(&ImageConfig::default()).expect("image links"),
            store.clone(),
            None,
            Duration::from_millis(100),
        )
        .expect("resolver");
        let verifier = Arc::new(HmacTokenVerifier::new(SECRET).expect("verifier"));
        let state = AppState::new(resolver, store, verifier, origin).expect("state");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let app = build_router(state);
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
        addr
    }

    fn token(owner: &str) -> String {
        let verifier = HmacTokenVerifier::new(SECRET).expect("verifier");
        format!("Bearer {}", verifier.sign(owner))
    }

    async fn send_raw(
        addr: SocketAddr,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> (u16, String, String) {
        let mut stream = tokio::net::TcpStream::connect(addr)
            .await
            .expect("connect server");
        let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
        for (k, v) in headers {
            req.push_str(&format!("{k}: {v}\r\n"));
        }
        if let Some(body) = body {
            req.push_str("Content-Type: application/json\r\n");
            req.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        req.push_str("\r\n");
        if let Some(body) = body {
            req.push_str(body);
        }
        stream
            .write_all(req.as_bytes())
            .await
            .expect("write request");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .expect("read response");
        let (head, body) = response
            .split_once("\r\n\r\n")
            .expect("http response must have separator");
        let status = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|s| s.parse::<u16>().ok())
            .expect("http status");
        (status, head.to_string(), body.to_string())
    }

    #[tokio::test]
    async fn home_reports_ready() {
        let addr = spawn_app().await;
        let (status, _, body) = send_raw(addr, "GET", "/", &[], None).await;
        assert_eq!(status, 200);
        let json: Value = serde_json::from_str(&body).expect("home json");
        assert_eq!(json["msg"], "Autonomy API Ready");
    }

    #[tokio::test]
    async fn suggestions_never_fail() {
        let addr = spawn_app().await;
        for headers in [
            vec![],
            vec![("Authorization", "Bearer forged.00")],
            vec![("Authorization", "nonsense")],
        ] {
            let (status, _, body) =
                send_raw(addr, "GET", "/api/suggestions?user_uid=alice", &headers, None).await;
            assert_eq!(status, 200);
            let items: Vec<SuggestionItem> = serde_json::from_str(&body).expect("suggestions");
            let ids: Vec<_> = items.iter().map(|i| i.id).collect();
            assert_eq!(ids, vec![1000, 1001, 1002, 1003, 1004]);
            assert!(items.iter().all(|i| !i.image_url.is_empty()));
        }

        // seeded: repeated calls agree
        let (_, _, first) = send_raw(addr, "GET", "/api/suggestions", &[], None).await;
        let (_, _, second) = send_raw(addr, "GET", "/api/suggestions", &[], None).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn activities_require_valid_token() {
        let addr = spawn_app().await;
        let (status, _, body) = send_raw(addr, "GET", "/api/activities", &[], None).await;
        assert_eq!(status, 401);
        let json: Value = serde_json::from_str(&body).expect("error json");
        assert_eq!(json["detail"], "Token invalid");

        let forged = HmacTokenVerifier::new("wrong").unwrap().sign("alice");
        let forged = format!("Bearer {forged}");
        let (status, _, _) = send_raw(
            addr,
            "GET",
            "/api/activities",
            &[("Authorization", forged.as_str())],
            None,
        )
        .await;
        assert_eq!(status, 401);
    }

    #[tokio::test]
    async fn activity_lifecycle_is_owner_scoped() {
        let addr = spawn_app().await;
        let alice = token("alice");
        let bob = token("bob");
        let alice_auth = [("Authorization", alice.as_str())];
        let bob_auth = [("Authorization", bob.as_str())];

        let (status, _, body) = send_raw(
            addr,
            "POST",
            "/api/activities",
            &alice_auth,
            Some(r#"{"title":"Evening run","priority":"High"}"#),
        )
        .await;
        assert_eq!(status, 200);
        let created: Value = serde_json::from_str(&body).expect("create json");
        assert_eq!(created["msg"], "Success");
        assert_eq!(created["data"]["user_uid"], "alice");
        assert_eq!(created["data"]["priority"], "High");
        assert_eq!(created["data"]["is_completed"], false);
        let id = created["data"]["id"].as_i64().expect("id");

        let (_, _, body) = send_raw(addr, "GET", "/api/activities", &bob_auth, None).await;
        assert_eq!(body, "[]");

        let path = format!("/api/activities/{id}");
        let (status, _, _) = send_raw(
            addr,
            "PUT",
            &path,
            &bob_auth,
            Some(r#"{"is_completed":true}"#),
        )
        .await;
        assert_eq!(status, 404);

        let (status, _, body) = send_raw(
            addr,
            "PUT",
            &path,
            &alice_auth,
            Some(r#"{"is_completed":true}"#),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body, r#"{"msg":"Updated"}"#);

        let (_, _, body) = send_raw(addr, "GET", "/api/activities", &alice_auth, None).await;
        let listed: Vec<ActivityRecord> = serde_json::from_str(&body).expect("list json");
        assert_eq!(listed.len(), 1);
        assert!(listed[0].completed);

        let (status, _, body) = send_raw(addr, "DELETE", &path, &alice_auth, None).await;
        assert_eq!(status, 200);
        assert_eq!(body, r#"{"msg":"Deleted"}"#);

        let (status, _, body) = send_raw(addr, "DELETE", &path, &alice_auth, None).await;
        assert_eq!(status, 404);
        let json: Value = serde_json::from_str(&body).expect("error json");
        assert_eq!(json["detail"], "Not found");
    }

    #[tokio::test]
    async fn rejects_bad_payloads() {
        let addr = spawn_app().await;
        let alice = token("alice");
        let auth = [("Authorization", alice.as_str())];

        let (status, _, _) =
            send_raw(addr, "POST", "/api/activities", &auth, Some(r#"{"title":"   "}"#)).await;
        assert_eq!(status, 422);

        let (status, _, _) =
            send_raw(addr, "POST", "/api/activities", &auth, Some(r#"{"desc":"x"}"#)).await;
        assert_eq!(status, 422);

        let (status, _, body) = send_raw(
            addr,
            "PUT",
            "/api/activities/abc",
            &auth,
            Some(r#"{"is_completed":true}"#),
        )
        .await;
        assert_eq!(status, 422);
        assert!(body.contains("detail"));
    }

    #[tokio::test]
    async fn answers_cors_preflight() {
        let addr = spawn_app().await;
        let (status, head, _) = send_raw(addr, "OPTIONS", "/api/activities", &[], None).await;
        assert_eq!(status, 204);
        let head = head.to_ascii_lowercase();
        assert!(head.contains("access-control-allow-origin: *"));
        assert!(head.contains("access-control-allow-headers: authorization, content-type"));

        let (_, head, _) = send_raw(addr, "GET", "/", &[], None).await;
        let head = head.to_ascii_lowercase();
        assert!(head.contains("access-control-allow-origin: *"));
        assert!(!head.contains("access-control-allow-credentials"));
    }

    #[tokio::test]
    async fn named_origin_allows_credentials() {
        let addr = spawn_app_with_origin("https://app.example").await;
        let (status, head, _) = send_raw(addr, "OPTIONS", "/api/activities", &[], None).await;
        assert_eq!(status, 204);
        let head = head.to_ascii_lowercase();
        assert!(head.contains("access-control-allow-origin: https://app.example"));
        assert!(head.contains("access-control-allow-credentials: true"));
    }
}
