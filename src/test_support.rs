//! Test fixtures: stub HTTP servers and an in-memory API.

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::api::{ApiError, ApiResult, AuthResponse, TelemetryApi};
use crate::model::{
    sort_newest_first, Channel, ChannelId, ChannelKeys, Feed, FeedPage, FeedQuery, NewChannel,
    NewFeed, SignInRequest, SignUpRequest, User,
};
use crate::session::{AccessToken, Session};

/// Serve `router` on an ephemeral local port and return its base URL
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub(crate) fn channel_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": format!("{} sensors", name),
        "createdAt": "2024-04-01T08:00:00Z",
        "updatedAt": "2024-04-02T09:30:00Z",
        "readKey": format!("r-{}", id),
        "writeKey": format!("w-{}", id),
        "user": {"email": "owner@example.com", "fullName": "Grace Hopper"}
    })
}

pub(crate) fn feed_json(id: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "temperature": 21.5,
        "humidity": 48.0,
        "temperatureThreshold": 30.0,
        "humidityThreshold": 65.0,
        "createdAt": created_at,
        "updatedAt": created_at
    })
}

pub(crate) fn channel(id: &str, name: &str) -> Channel {
    serde_json::from_value(channel_json(id, name)).unwrap()
}

pub(crate) fn feed(id: &str, created_at: &str) -> Feed {
    serde_json::from_value(feed_json(id, created_at)).unwrap()
}

/// In-memory backend that records every call it receives.
///
/// Authenticated operations check the session first, like the HTTP client,
/// so a call is only recorded when a request would have been sent.
pub(crate) struct FakeApi {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    auth: Mutex<(u16, Option<String>)>,
    user: User,
    channels: Mutex<Vec<Channel>>,
    feeds: Mutex<Vec<Feed>>,
    last_query: Mutex<Option<FeedQuery>>,
    submitted: Mutex<Vec<NewFeed>>,
    rotated_for: Mutex<Option<String>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            auth: Mutex::new((200, Some("tok".to_string()))),
            user: User {
                email: "ada@example.com".to_string(),
                full_name: "Ada Lovelace".to_string(),
            },
            channels: Mutex::new(Vec::new()),
            feeds: Mutex::new(Vec::new()),
            last_query: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            rotated_for: Mutex::new(None),
        }
    }

    pub(crate) fn set_auth(&self, status: u16, token: Option<&str>) {
        *self.auth.lock().unwrap() = (status, token.map(str::to_string));
    }

    /// Make `operation` answer with a 500 from now on
    pub(crate) fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub(crate) fn set_channels(&self, channels: Vec<Channel>) {
        *self.channels.lock().unwrap() = channels;
    }

    pub(crate) fn set_feeds(&self, feeds: Vec<Feed>) {
        *self.feeds.lock().unwrap() = feeds;
    }

    /// Add a reading server-side without going through the API
    pub(crate) fn push_feed(&self, feed: Feed) {
        self.feeds.lock().unwrap().push(feed);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == operation)
            .count()
    }

    pub(crate) fn last_query(&self) -> Option<FeedQuery> {
        self.last_query.lock().unwrap().clone()
    }

    pub(crate) fn submitted(&self) -> Vec<NewFeed> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn rotated_for(&self) -> Option<String> {
        self.rotated_for.lock().unwrap().clone()
    }

    pub(crate) fn rotated_keys(&self) -> ChannelKeys {
        ChannelKeys {
            read_key: "r-rotated".to_string(),
            write_key: "w-rotated".to_string(),
        }
    }

    fn record(&self, operation: &'static str) -> ApiResult<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.lock().unwrap().contains(operation) {
            return Err(ApiError::Status {
                status: 500,
                message: format!("{} failed", operation),
            });
        }
        Ok(())
    }

    fn authorized(&self, session: &Session, operation: &'static str) -> ApiResult<()> {
        session.require_token()?;
        self.record(operation)
    }

    fn auth_response(&self) -> AuthResponse {
        let (status, token) = self.auth.lock().unwrap().clone();
        AuthResponse {
            status,
            access_token: token.map(AccessToken::new),
        }
    }
}

#[async_trait]
impl TelemetryApi for FakeApi {
    async fn sign_in(&self, _credentials: &SignInRequest) -> ApiResult<AuthResponse> {
        self.record("sign_in")?;
        Ok(self.auth_response())
    }

    async fn sign_up(&self, _registration: &SignUpRequest) -> ApiResult<AuthResponse> {
        self.record("sign_up")?;
        Ok(self.auth_response())
    }

    async fn current_user(&self, session: &Session) -> ApiResult<User> {
        self.authorized(session, "current_user")?;
        Ok(self.user.clone())
    }

    async fn list_channels(&self, session: &Session) -> ApiResult<Vec<Channel>> {
        self.authorized(session, "list_channels")?;
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn create_channel(&self, session: &Session, new: &NewChannel) -> ApiResult<Channel> {
        self.authorized(session, "create_channel")?;
        let mut channels = self.channels.lock().unwrap();
        let now = Utc::now();
        let created = Channel {
            id: ChannelId::new(format!("c{}", channels.len() + 1)),
            name: new.name.clone(),
            description: new.description.clone(),
            created_at: now,
            updated_at: now,
            write_key: None,
            read_key: None,
            owner: Some(self.user.clone()),
        };
        channels.push(created.clone());
        Ok(created)
    }

    async fn get_channel(&self, session: &Session, id: &ChannelId) -> ApiResult<Channel> {
        self.authorized(session, "get_channel")?;
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|channel| &channel.id == id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: "Channel not found".to_string(),
            })
    }

    async fn rotate_keys(
        &self,
        session: &Session,
        _id: &ChannelId,
        email: &str,
    ) -> ApiResult<ChannelKeys> {
        self.authorized(session, "rotate_keys")?;
        *self.rotated_for.lock().unwrap() = Some(email.to_string());
        Ok(self.rotated_keys())
    }

    async fn list_feeds(&self, session: &Session, query: &FeedQuery) -> ApiResult<FeedPage> {
        self.authorized(session, "list_feeds")?;
        *self.last_query.lock().unwrap() = Some(query.clone());

        let mut feeds: Vec<Feed> = self
            .feeds
            .lock()
            .unwrap()
            .iter()
            .filter(|feed| feed.belongs_to(&query.channel_id))
            .cloned()
            .collect();
        sort_newest_first(&mut feeds);

        let total = feeds.len() as u64;
        let page = query.page.unwrap_or(1).max(1);
        let size = query.size.unwrap_or(total as u32).max(1);
        let feeds = feeds
            .into_iter()
            .skip(((page - 1) * size) as usize)
            .take(size as usize)
            .collect();

        Ok(FeedPage {
            feeds,
            total,
            page,
            size,
        })
    }

    async fn submit_feed(&self, session: &Session, new: &NewFeed) -> ApiResult<Feed> {
        self.authorized(session, "submit_feed")?;
        self.submitted.lock().unwrap().push(new.clone());
        let now = Utc::now();
        let created = Feed {
            id: format!("f-new-{}", self.submitted.lock().unwrap().len()),
            temperature: new.temperature,
            humidity: new.humidity,
            temperature_threshold: new.temperature_threshold,
            humidity_threshold: new.humidity_threshold,
            created_at: now,
            updated_at: now,
            channel_id: Some(new.channel_id.clone()),
        };
        self.feeds.lock().unwrap().push(created.clone());
        Ok(created)
    }
}
