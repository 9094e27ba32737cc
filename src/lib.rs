//! # IoT Console
//!
//! Client for an IoT telemetry service: sign in, manage channels (logical
//! device streams) and watch their temperature/humidity readings arrive in
//! near real time.
//!
//! ## Modules
//!
//! - [`api`]: typed REST client behind the [`TelemetryApi`] trait
//! - [`push`]: Socket.IO subscription to a channel's live readings
//! - [`views`]: session gate, channel list and feed view state machines
//! - [`session`]: access token context and persistence
//! - [`render`]: plain-text tables for the terminal front end
//! - [`config`], [`logging`]: ambient setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iot_console::{AccessToken, Config, FeedView, HttpApiClient, PushClient, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let client = config.client();
//!     let api = Arc::new(HttpApiClient::new(&client)?);
//!     let session = Session::authenticated(AccessToken::new("token"));
//!
//!     let mut view = FeedView::new(api, session.clone(), "c1".into(), config.feeds.page_size);
//!     view.load().await;
//!     let subscription = PushClient::new(&client).subscribe(&session, view.channel_id());
//!     view.attach(subscription);
//!
//!     while let Some(update) = view.next_push().await {
//!         println!("{:?}", update.outcome);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod logging;
pub mod model;
pub mod push;
pub mod render;
pub mod session;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiError, ApiResult, AuthResponse, HttpApiClient, TelemetryApi};

pub use config::{generate_default_config, ClientConfig, Config, ConfigError};

pub use model::{
    Channel, ChannelId, ChannelKeys, Feed, FeedPage, FeedQuery, NewChannel, NewFeed, User,
};

pub use push::{PushClient, PushError, PushEvent, PushResult, Subscription};

pub use session::{AccessToken, FileTokenStore, MemoryTokenStore, Session, SessionError, TokenStore};

pub use views::{
    ChannelListView, FeedView, GateOutcome, Notification, Route, SessionGate, ValidationError,
    ViewState,
};
