//! Domain Types
//!
//! Users, channels, feeds and the request/response payloads exchanged with
//! the telemetry API. All JSON is camelCase and every response body wraps
//! its payload in a `{"data": ...}` envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================
// Identifiers
// ============================================

/// Identifier of a channel, as issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================
// Entities
// ============================================

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    pub full_name: String,
}

/// A logical device stream owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Only present on the single-channel endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_key: Option<String>,
    /// Owning user
    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub owner: Option<User>,
}

impl Channel {
    /// Read/write key pair, when the backend included both
    pub fn keys(&self) -> Option<ChannelKeys> {
        match (&self.read_key, &self.write_key) {
            (Some(read_key), Some(write_key)) => Some(ChannelKeys {
                read_key: read_key.clone(),
                write_key: write_key.clone(),
            }),
            _ => None,
        }
    }
}

/// Channel-scoped credential pair used by devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelKeys {
    pub read_key: String,
    pub write_key: String,
}

/// A single sensor reading with the thresholds in effect when it was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub temperature_threshold: f64,
    pub humidity_threshold: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Pushed readings usually carry their channel; listed ones may not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
}

impl Feed {
    /// Whether this reading may be shown on `channel`.
    ///
    /// Readings without a channel reference are assumed to belong to the
    /// room they arrived on.
    pub fn belongs_to(&self, channel: &ChannelId) -> bool {
        self.channel_id.as_ref().map_or(true, |id| id == channel)
    }
}

/// Stable newest-first ordering by creation time.
///
/// Readings with equal timestamps keep their relative order, so sorting the
/// same input twice always yields the same list.
pub fn sort_newest_first(feeds: &mut [Feed]) {
    feeds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

// ============================================
// Request DTOs
// ============================================

/// Sign-in credentials
#[derive(Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Account registration payload
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// New channel payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewChannel {
    pub name: String,
    pub description: String,
}

/// A reading submission. Thresholds travel with a reading value rather than
/// being updated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeed {
    pub channel_id: ChannelId,
    pub temperature: f64,
    pub humidity: f64,
    pub temperature_threshold: f64,
    pub humidity_threshold: f64,
}

/// Parameters of a reading list request
#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery {
    pub channel_id: ChannelId,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl FeedQuery {
    /// Every reading of a channel, unpaged
    pub fn all(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            page: None,
            size: None,
        }
    }

    /// One page (1-based) of a channel's readings
    pub fn page(channel_id: ChannelId, page: u32, size: u32) -> Self {
        Self {
            channel_id,
            page: Some(page),
            size: Some(size),
        }
    }

    /// Query-string pairs in the order the backend documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("channelId", self.channel_id.to_string())];
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(size) = self.size {
            pairs.push(("size", size.to_string()));
        }
        pairs
    }
}

// ============================================
// Response DTOs
// ============================================

/// Standard response envelope
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// One page of readings as displayed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPage {
    pub feeds: Vec<Feed>,
    /// Server-reported total across all pages
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

/// The feeds endpoint answers with a bare array when unpaged and with a
/// page object otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FeedListPayload {
    Paged(PagedFeeds),
    Plain(Vec<Feed>),
}

#[derive(Debug, Deserialize)]
pub struct PagedFeeds {
    #[serde(alias = "items")]
    pub feeds: Vec<Feed>,
    pub total: u64,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
}

impl FeedListPayload {
    /// Normalize into a page, falling back to the requested page/size when
    /// the backend omits them.
    pub fn into_page(self, query: &FeedQuery) -> FeedPage {
        match self {
            FeedListPayload::Paged(paged) => {
                let size = paged
                    .size
                    .or(query.size)
                    .unwrap_or(paged.feeds.len() as u32);
                FeedPage {
                    page: paged.page.or(query.page).unwrap_or(1),
                    size,
                    total: paged.total,
                    feeds: paged.feeds,
                }
            }
            FeedListPayload::Plain(feeds) => FeedPage {
                page: query.page.unwrap_or(1),
                size: query.size.unwrap_or(feeds.len() as u32),
                total: feeds.len() as u64,
                feeds,
            },
        }
    }
}
