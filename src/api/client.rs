//! HTTP API Client
//!
//! reqwest-based implementation of [`TelemetryApi`]. Attaches the bearer
//! token from the session, tags every request with an `X-Request-Id`, and
//! unwraps the `{"data": ...}` envelope.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

use super::{ApiError, ApiResult, AuthResponse, TelemetryApi};
use crate::config::ClientConfig;
use crate::model::{
    Channel, ChannelId, ChannelKeys, Envelope, Feed, FeedListPayload, FeedPage, FeedQuery,
    NewChannel, NewFeed, SignInRequest, SignUpRequest, User,
};
use crate::session::{AccessToken, Session};

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Telemetry REST API client
pub struct HttpApiClient {
    client: Client,
    base_url: String,
}

/// Successful raw response
struct Reply {
    status: StatusCode,
    body: String,
}

impl HttpApiClient {
    /// Create a client for the API root in `config`
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("iot-console/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Send one request and return the body of a 2xx response
    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&AccessToken>,
        body: Option<serde_json::Value>,
    ) -> ApiResult<Reply> {
        let request_id = Uuid::new_v4().to_string();

        let mut builder = self
            .client
            .request(method.clone(), self.url(path))
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        tracing::debug!(request_id = %request_id, method = %method, path = %path, "Sending API request");
        let started = Instant::now();

        let response = builder.send().await.map_err(|e| {
            let err = ApiError::from_transport(e);
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                error = %err,
                "API request failed"
            );
            err
        })?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::from_transport)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = status.as_u16(),
                elapsed_ms,
                "API request rejected"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms,
            "API request completed"
        );

        Ok(Reply { status, body: text })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, session: &Session) -> ApiResult<T> {
        let token = session.require_token()?;
        let reply = self.send(Method::GET, path, Some(token), None).await?;
        decode(&reply)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        session: &Session,
        body: serde_json::Value,
    ) -> ApiResult<T> {
        let token = session.require_token()?;
        let reply = self.send(Method::POST, path, Some(token), Some(body)).await?;
        decode(&reply)
    }

    async fn authenticate(&self, path: &str, body: serde_json::Value) -> ApiResult<AuthResponse> {
        let reply = self.send(Method::POST, path, None, Some(body)).await?;
        let envelope: AuthEnvelope = serde_json::from_str(&reply.body)?;

        Ok(AuthResponse {
            status: reply.status.as_u16(),
            access_token: envelope
                .data
                .and_then(|d| d.access_token)
                .filter(|t| !t.is_empty())
                .map(AccessToken::new),
        })
    }
}

#[derive(Deserialize)]
struct AuthEnvelope {
    #[serde(default)]
    data: Option<AuthPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    #[serde(default)]
    access_token: Option<String>,
}

fn decode<T: DeserializeOwned>(reply: &Reply) -> ApiResult<T> {
    let envelope: Envelope<T> = serde_json::from_str(&reply.body)?;
    Ok(envelope.data)
}

/// Best-effort human message from an error body
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    body.chars().take(200).collect()
}

fn channel_path(id: &ChannelId) -> String {
    format!("/channels/{}", urlencoding::encode(id.as_str()))
}

fn with_query(path: &str, pairs: &[(&str, String)]) -> String {
    if pairs.is_empty() {
        return path.to_string();
    }
    let query = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, query)
}

#[async_trait]
impl TelemetryApi for HttpApiClient {
    async fn sign_in(&self, credentials: &SignInRequest) -> ApiResult<AuthResponse> {
        self.authenticate("/auth/sign-in", serde_json::to_value(credentials)?)
            .await
    }

    async fn sign_up(&self, registration: &SignUpRequest) -> ApiResult<AuthResponse> {
        self.authenticate("/auth/sign-up", serde_json::to_value(registration)?)
            .await
    }

    async fn current_user(&self, session: &Session) -> ApiResult<User> {
        self.get("/users/my", session).await
    }

    async fn list_channels(&self, session: &Session) -> ApiResult<Vec<Channel>> {
        self.get("/channels", session).await
    }

    async fn create_channel(
        &self,
        session: &Session,
        channel: &NewChannel,
    ) -> ApiResult<Channel> {
        self.post("/channels", session, serde_json::to_value(channel)?)
            .await
    }

    async fn get_channel(&self, session: &Session, id: &ChannelId) -> ApiResult<Channel> {
        self.get(&channel_path(id), session).await
    }

    async fn rotate_keys(
        &self,
        session: &Session,
        id: &ChannelId,
        email: &str,
    ) -> ApiResult<ChannelKeys> {
        let path = with_query(
            &format!("{}/keys", channel_path(id)),
            &[("email", email.to_string())],
        );
        tracing::info!(channel_id = %id, "Regenerating channel keys");
        self.get(&path, session).await
    }

    async fn list_feeds(&self, session: &Session, query: &FeedQuery) -> ApiResult<FeedPage> {
        let path = with_query("/feeds", &query.query_pairs());
        let payload: FeedListPayload = self.get(&path, session).await?;
        Ok(payload.into_page(query))
    }

    async fn submit_feed(&self, session: &Session, feed: &NewFeed) -> ApiResult<Feed> {
        self.post("/feeds", session, serde_json::to_value(feed)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{channel_json, feed_json, serve};
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn client_for(base_url: &str) -> HttpApiClient {
        HttpApiClient::new(&ClientConfig::for_base_url(base_url)).unwrap()
    }

    fn signed_in() -> Session {
        Session::authenticated(AccessToken::new("tok-1"))
    }

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    #[test]
    fn test_with_query_encodes_values() {
        assert_eq!(
            with_query("/channels/c1/keys", &[("email", "a+b@example.com".to_string())]),
            "/channels/c1/keys?email=a%2Bb%40example.com"
        );
        assert_eq!(with_query("/feeds", &[]), "/feeds");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"Invalid credentials"}"#), "Invalid credentials");
        assert_eq!(error_message(r#"{"error":"Forbidden"}"#), "Forbidden");
        assert_eq!(error_message("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn test_sign_in_returns_token() {
        let seen = Arc::new(Mutex::new(None::<Value>));
        let seen_clone = Arc::clone(&seen);
        let router = Router::new().route(
            "/api/v1/auth/sign-in",
            post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
                assert!(bearer(&headers).is_none());
                *seen_clone.lock().unwrap() = Some(body);
                Json(json!({"data": {"accessToken": "fresh-token"}}))
            }),
        );
        let client = client_for(&serve(router).await);

        let response = client
            .sign_in(&SignInRequest {
                email: "ana@example.com".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.access_token.unwrap().as_str(), "fresh-token");
        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body, json!({"email": "ana@example.com", "password": "pw"}));
    }

    #[tokio::test]
    async fn test_sign_in_without_token_in_body() {
        let router = Router::new().route(
            "/api/v1/auth/sign-in",
            post(|| async { Json(json!({"data": {}})) }),
        );
        let client = client_for(&serve(router).await);

        let response = client
            .sign_in(&SignInRequest {
                email: "ana@example.com".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        assert!(response.access_token.is_none());
    }

    #[tokio::test]
    async fn test_sign_up_reports_created_status() {
        let router = Router::new().route(
            "/api/v1/auth/sign-up",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["fullName"], "Ana Lima");
                (
                    AxumStatus::CREATED,
                    Json(json!({"data": {"accessToken": "new-account"}})),
                )
            }),
        );
        let client = client_for(&serve(router).await);

        let response = client
            .sign_up(&SignUpRequest {
                full_name: "Ana Lima".into(),
                email: "ana@example.com".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.access_token.unwrap().as_str(), "new-account");
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let router = Router::new().route(
            "/api/v1/users/my",
            get(|headers: HeaderMap| async move {
                if bearer(&headers).as_deref() != Some("Bearer tok-1") {
                    return (AxumStatus::UNAUTHORIZED, Json(json!({"message": "no"})));
                }
                assert!(headers.get(REQUEST_ID_HEADER).is_some());
                (
                    AxumStatus::OK,
                    Json(json!({"data": {"email": "ana@example.com", "fullName": "Ana Lima"}})),
                )
            }),
        );
        let client = client_for(&serve(router).await);

        let user = client.current_user(&signed_in()).await.unwrap();
        assert_eq!(user.full_name, "Ana Lima");

        let wrong = Session::authenticated(AccessToken::new("other"));
        let err = client.current_user(&wrong).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "API error 401: no");
    }

    #[tokio::test]
    async fn test_anonymous_session_sends_nothing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let router = Router::new().route(
            "/api/v1/channels",
            get(move || async move {
                hits_clone.fetch_add(1, Ordering::SeqCst);
                Json(json!({"data": []}))
            }),
        );
        let client = client_for(&serve(router).await);

        let err = client.list_channels(&Session::anonymous()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthenticated));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_list_feeds_pagination_query() {
        let seen = Arc::new(Mutex::new(HashMap::new()));
        let seen_clone = Arc::clone(&seen);
        let router = Router::new().route(
            "/api/v1/feeds",
            get(move |Query(params): Query<HashMap<String, String>>| async move {
                *seen_clone.lock().unwrap() = params;
                Json(json!({"data": {
                    "feeds": [feed_json("f11", "2024-05-01T12:00:00Z")],
                    "total": 37,
                    "page": 2,
                    "size": 10
                }}))
            }),
        );
        let client = client_for(&serve(router).await);

        let page = client
            .list_feeds(&signed_in(), &FeedQuery::page("c1".into(), 2, 10))
            .await
            .unwrap();

        let params = seen.lock().unwrap().clone();
        assert_eq!(params.get("channelId").map(String::as_str), Some("c1"));
        assert_eq!(params.get("page").map(String::as_str), Some("2"));
        assert_eq!(params.get("size").map(String::as_str), Some("10"));
        assert_eq!(page.total, 37);
        assert_eq!(page.page, 2);
        assert_eq!(page.feeds.len(), 1);
    }

    #[tokio::test]
    async fn test_channel_and_key_rotation() {
        let router = Router::new()
            .route(
                "/api/v1/channels/:id",
                get(|Path(id): Path<String>| async move {
                    Json(json!({"data": channel_json(&id, "Greenhouse")}))
                }),
            )
            .route(
                "/api/v1/channels/:id/keys",
                get(
                    |headers: HeaderMap,
                     Path(id): Path<String>,
                     Query(params): Query<HashMap<String, String>>| async move {
                        assert_eq!(id, "c1");
                        assert_eq!(params["email"], "ana@example.com");
                        assert_eq!(bearer(&headers).as_deref(), Some("Bearer tok-1"));
                        Json(json!({"data": {"readKey": "r-new", "writeKey": "w-new"}}))
                    },
                ),
            );
        let client = client_for(&serve(router).await);

        let channel = client.get_channel(&signed_in(), &"c1".into()).await.unwrap();
        assert_eq!(channel.name, "Greenhouse");

        let keys = client
            .rotate_keys(&signed_in(), &"c1".into(), "ana@example.com")
            .await
            .unwrap();
        assert_eq!(keys.read_key, "r-new");
        assert_eq!(keys.write_key, "w-new");
    }

    #[tokio::test]
    async fn test_create_channel_and_submit_feed() {
        let router = Router::new()
            .route(
                "/api/v1/channels",
                post(|Json(body): Json<Value>| async move {
                    let name = body["name"].as_str().unwrap_or_default().to_string();
                    (
                        AxumStatus::CREATED,
                        Json(json!({"data": channel_json("c-new", &name)})),
                    )
                }),
            )
            .route(
                "/api/v1/feeds",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["channelId"], "c1");
                    assert_eq!(body["temperatureThreshold"], 28.0);
                    Json(json!({"data": feed_json("f-new", "2024-05-01T13:00:00Z")}))
                }),
            );
        let client = client_for(&serve(router).await);

        let channel = client
            .create_channel(
                &signed_in(),
                &NewChannel {
                    name: "Cellar".into(),
                    description: "Wine rack".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(channel.name, "Cellar");

        let feed = client
            .submit_feed(
                &signed_in(),
                &NewFeed {
                    channel_id: "c1".into(),
                    temperature: 20.0,
                    humidity: 45.0,
                    temperature_threshold: 28.0,
                    humidity_threshold: 60.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(feed.id, "f-new");
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let router = Router::new().route(
            "/api/v1/channels",
            get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "database down") }),
        );
        let client = client_for(&serve(router).await);

        let err = client.list_channels(&signed_in()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(!err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let router = Router::new().route(
            "/api/v1/users/my",
            get(|| async { Json(json!({"data": {"unexpected": true}})) }),
        );
        let client = client_for(&serve(router).await);

        let err = client.current_user(&signed_in()).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let router = Router::new().route(
            "/api/v1/users/my",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                Json(json!({"data": {"id": "u1"}}))
            }),
        );
        let mut config = ClientConfig::for_base_url(&serve(router).await);
        config.request_timeout = std::time::Duration::from_millis(200);
        let client = HttpApiClient::new(&config).unwrap();

        let err = client.current_user(&signed_in()).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));
        let err = client.current_user(&signed_in()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable | ApiError::Request(_)));
    }
}
