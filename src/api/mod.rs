//! Telemetry API Client
//!
//! Typed access to the telemetry REST API. Views depend on the
//! [`TelemetryApi`] trait; [`HttpApiClient`] is the production
//! implementation.
//!
//! ## Endpoints
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `/api/v1/auth/sign-in` | exchange credentials for an access token |
//! | POST | `/api/v1/auth/sign-up` | register an account (201 + access token) |
//! | GET | `/api/v1/users/my` | current user |
//! | GET | `/api/v1/channels` | channels of the current user |
//! | POST | `/api/v1/channels` | create a channel |
//! | GET | `/api/v1/channels/:id` | one channel, including keys and owner |
//! | GET | `/api/v1/channels/:id/keys?email=` | regenerate read/write keys |
//! | GET | `/api/v1/feeds?channelId=&page=&size=` | readings, optionally paged |
//! | POST | `/api/v1/feeds` | submit a reading with thresholds |
//!
//! Everything except sign-in and sign-up requires a bearer token taken from
//! the [`Session`] passed to the call.

mod client;
mod error;

pub use client::HttpApiClient;
pub use error::{ApiError, ApiResult};

use async_trait::async_trait;

use crate::model::{
    Channel, ChannelId, ChannelKeys, Feed, FeedPage, FeedQuery, NewChannel, NewFeed,
    SignInRequest, SignUpRequest, User,
};
use crate::session::{AccessToken, Session};

/// Outcome of a sign-in or sign-up call that reached the server
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResponse {
    /// HTTP status of the (successful) response
    pub status: u16,
    /// Absent when the server answered without a token
    pub access_token: Option<AccessToken>,
}

/// Operations the views need from the backend
#[async_trait]
pub trait TelemetryApi: Send + Sync {
    async fn sign_in(&self, credentials: &SignInRequest) -> ApiResult<AuthResponse>;

    async fn sign_up(&self, registration: &SignUpRequest) -> ApiResult<AuthResponse>;

    async fn current_user(&self, session: &Session) -> ApiResult<User>;

    async fn list_channels(&self, session: &Session) -> ApiResult<Vec<Channel>>;

    async fn create_channel(&self, session: &Session, channel: &NewChannel)
        -> ApiResult<Channel>;

    async fn get_channel(&self, session: &Session, id: &ChannelId) -> ApiResult<Channel>;

    /// Replace the channel's read/write keys with fresh ones
    async fn rotate_keys(
        &self,
        session: &Session,
        id: &ChannelId,
        email: &str,
    ) -> ApiResult<ChannelKeys>;

    async fn list_feeds(&self, session: &Session, query: &FeedQuery) -> ApiResult<FeedPage>;

    async fn submit_feed(&self, session: &Session, feed: &NewFeed) -> ApiResult<Feed>;
}
