//! Feed View
//!
//! One channel's readings, paged and kept current by the push channel.
//!
//! ## Reconciliation
//!
//! A pushed reading is matched against the page on screen:
//!
//! 1. readings for another channel are ignored
//! 2. a reading whose id is already listed replaces that row; the total is
//!    unchanged
//! 3. on page 1 a new reading is inserted in newest-first position and the
//!    total grows by one; nothing is evicted
//! 4. on any other page it is only counted in `pending_newer`, and going
//!    back to page 1 refetches and resets the count

use std::sync::Arc;

use super::{Notification, Route, ValidationError, ViewState};
use crate::api::{ApiResult, TelemetryApi};
use crate::model::{
    sort_newest_first, Channel, ChannelId, ChannelKeys, Feed, FeedPage, FeedQuery, NewFeed,
};
use crate::push::{PushEvent, Subscription};
use crate::session::Session;

pub const KEYS_ROTATED: &str = "Keys regenerated";
pub const KEYS_ROTATE_FAILED: &str = "Failed to regenerate keys";
pub const THRESHOLDS_UPDATED: &str = "Thresholds updated";
pub const THRESHOLDS_UPDATE_FAILED: &str = "Failed to update thresholds";

/// What the view shows once loaded
#[derive(Debug, Clone, PartialEq)]
pub struct FeedData {
    pub channel: Channel,
    pub keys: Option<ChannelKeys>,
    /// Current page, newest first
    pub readings: Vec<Feed>,
    /// 1-based
    pub page: u32,
    pub size: u32,
    /// Server-reported count across all pages, plus readings pushed onto page 1
    pub total: u64,
    /// Readings pushed while an older page was on screen
    pub pending_newer: u32,
}

impl FeedData {
    pub fn page_count(&self) -> u32 {
        if self.size == 0 || self.total == 0 {
            return 1;
        }
        let pages = self.total.div_ceil(u64::from(self.size));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

/// New alert thresholds; both are required
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThresholdForm {
    pub temperature_threshold: Option<f64>,
    pub humidity_threshold: Option<f64>,
}

impl ThresholdForm {
    pub fn new(temperature_threshold: f64, humidity_threshold: f64) -> Self {
        Self {
            temperature_threshold: Some(temperature_threshold),
            humidity_threshold: Some(humidity_threshold),
        }
    }

    fn validate(&self) -> Result<(f64, f64), ValidationError> {
        let temperature = threshold(self.temperature_threshold, "Temperature threshold")?;
        let humidity = threshold(self.humidity_threshold, "Humidity threshold")?;
        Ok((temperature, humidity))
    }
}

fn threshold(value: Option<f64>, label: &str) -> Result<f64, ValidationError> {
    match value {
        None => Err(ValidationError(format!("{} is required", label))),
        Some(v) if !v.is_finite() => Err(ValidationError(format!("{} must be a number", label))),
        Some(v) => Ok(v),
    }
}

/// How a pushed reading was reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    Replaced,
    /// Counted towards `pending_newer`
    Deferred,
    Ignored,
}

/// One event taken from the subscription
#[derive(Debug, Clone, PartialEq)]
pub struct PushUpdate {
    pub event: PushEvent,
    /// Set for readings only
    pub outcome: Option<PushOutcome>,
}

pub struct FeedView {
    api: Arc<dyn TelemetryApi>,
    session: Session,
    channel_id: ChannelId,
    page_size: u32,
    state: ViewState<FeedData>,
    latest: Option<Feed>,
    subscription: Option<Subscription>,
    notification: Option<Notification>,
}

impl FeedView {
    pub fn new(
        api: Arc<dyn TelemetryApi>,
        session: Session,
        channel_id: ChannelId,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            session,
            channel_id,
            page_size: page_size.max(1),
            state: ViewState::Loading,
            latest: None,
            subscription: None,
            notification: None,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> &ViewState<FeedData> {
        &self.state
    }

    pub fn keys(&self) -> Option<&ChannelKeys> {
        self.state.data().and_then(|data| data.keys.as_ref())
    }

    /// Most recent reading seen so far, on any page or via push
    pub fn latest_reading(&self) -> Option<&Feed> {
        self.latest.as_ref()
    }

    /// Fetch the channel, then the first page of readings
    pub async fn load(&mut self) -> &ViewState<FeedData> {
        if !self.session.is_authenticated() {
            tracing::debug!(channel_id = %self.channel_id, "No access token, redirecting to sign-in");
            self.state = ViewState::Redirect(Route::SignIn);
            return &self.state;
        }

        self.state = ViewState::Loading;
        self.state = match self.fetch_initial().await {
            Ok((channel, page)) => {
                let keys = channel.keys();
                let data = self.page_data(channel, keys, 1, page, 0);
                tracing::debug!(
                    channel_id = %self.channel_id,
                    readings = data.readings.len(),
                    total = data.total,
                    "Feed view loaded"
                );
                ViewState::Ready(data)
            }
            Err(e) => {
                tracing::warn!(channel_id = %self.channel_id, error = %e, "Failed to load feed view");
                ViewState::Redirect(Route::SignIn)
            }
        };
        &self.state
    }

    /// Show page `page` (1-based) of the readings
    pub async fn change_page(&mut self, page: u32) -> Result<&ViewState<FeedData>, ValidationError> {
        if page == 0 {
            return Err(ValidationError::new("Page must be at least 1"));
        }

        if self.state.data().is_none() {
            self.load().await;
            if page == 1 || self.state.data().is_none() {
                return Ok(&self.state);
            }
        }

        if !self.session.is_authenticated() {
            self.state = ViewState::Redirect(Route::SignIn);
            return Ok(&self.state);
        }

        let current = self
            .state
            .data()
            .map(|data| (data.channel.clone(), data.keys.clone(), data.pending_newer));
        let Some((channel, keys, pending_newer)) = current else {
            return Ok(&self.state);
        };
        let pending = if page == 1 { 0 } else { pending_newer };

        match self.fetch_page(page).await {
            Ok(fetched) => {
                let data = self.page_data(channel, keys, page, fetched, pending);
                tracing::debug!(channel_id = %self.channel_id, page, total = data.total, "Feed page loaded");
                self.state = ViewState::Ready(data);
            }
            Err(e) => {
                tracing::warn!(channel_id = %self.channel_id, page, error = %e, "Failed to load feed page");
                self.state = ViewState::Redirect(Route::SignIn);
            }
        }
        Ok(&self.state)
    }

    async fn fetch_initial(&self) -> ApiResult<(Channel, FeedPage)> {
        let channel = self.api.get_channel(&self.session, &self.channel_id).await?;
        let page = self.fetch_page(1).await?;
        Ok((channel, page))
    }

    async fn fetch_page(&self, page: u32) -> ApiResult<FeedPage> {
        let query = FeedQuery::page(self.channel_id.clone(), page, self.page_size);
        self.api.list_feeds(&self.session, &query).await
    }

    fn page_data(
        &mut self,
        channel: Channel,
        keys: Option<ChannelKeys>,
        page: u32,
        fetched: FeedPage,
        pending_newer: u32,
    ) -> FeedData {
        let mut readings = fetched.feeds;
        sort_newest_first(&mut readings);
        if let Some(first) = readings.first() {
            self.note_latest(first);
        }

        FeedData {
            channel,
            keys,
            readings,
            page,
            size: self.page_size,
            total: fetched.total,
            pending_newer,
        }
    }

    fn note_latest(&mut self, feed: &Feed) {
        let newer = match &self.latest {
            None => true,
            Some(latest) => latest.id == feed.id || feed.created_at >= latest.created_at,
        };
        if newer {
            self.latest = Some(feed.clone());
        }
    }

    /// Reconcile one pushed reading with the page on screen
    pub fn apply_push(&mut self, feed: Feed) -> PushOutcome {
        if !feed.belongs_to(&self.channel_id) || self.state.data().is_none() {
            return PushOutcome::Ignored;
        }
        self.note_latest(&feed);

        let Some(data) = self.state.data_mut() else {
            return PushOutcome::Ignored;
        };

        if let Some(existing) = data.readings.iter_mut().find(|r| r.id == feed.id) {
            *existing = feed;
            sort_newest_first(&mut data.readings);
            return PushOutcome::Replaced;
        }

        if data.page == 1 {
            let position = data
                .readings
                .iter()
                .position(|r| r.created_at <= feed.created_at)
                .unwrap_or(data.readings.len());
            data.readings.insert(position, feed);
            data.total += 1;
            PushOutcome::Inserted
        } else {
            data.pending_newer += 1;
            PushOutcome::Deferred
        }
    }

    /// Bind a live subscription, closing the one already attached
    pub fn attach(&mut self, subscription: Subscription) {
        if subscription.channel_id() != &self.channel_id {
            tracing::warn!(
                channel_id = %self.channel_id,
                subscription = %subscription.channel_id(),
                "Attaching subscription for another channel"
            );
        }
        if let Some(previous) = self.subscription.replace(subscription) {
            tracing::debug!(channel_id = %self.channel_id, "Replacing push subscription");
            drop(previous);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|subscription| !subscription.is_closed())
    }

    /// Wait for the next push event and apply it.
    ///
    /// `None` when nothing is attached or the subscription has ended.
    pub async fn next_push(&mut self) -> Option<PushUpdate> {
        let event = self.subscription.as_mut()?.next().await?;

        let outcome = match &event {
            PushEvent::Reading(feed) => {
                let outcome = self.apply_push(feed.clone());
                tracing::debug!(channel_id = %self.channel_id, feed_id = %feed.id, outcome = ?outcome, "Pushed reading applied");
                Some(outcome)
            }
            PushEvent::Disconnected { reason } => {
                tracing::warn!(channel_id = %self.channel_id, reason = %reason, "Live updates stopped");
                None
            }
            _ => None,
        };

        Some(PushUpdate { event, outcome })
    }

    /// Regenerate the channel's read/write keys. Readings are untouched.
    pub async fn rotate_keys(&mut self) -> Option<ChannelKeys> {
        if !self.session.is_authenticated() {
            self.state = ViewState::Redirect(Route::SignIn);
            return None;
        }

        let owner_email = self
            .state
            .data()?
            .channel
            .owner
            .as_ref()
            .map(|owner| owner.email.clone());

        match self.request_rotation(owner_email).await {
            Ok(keys) => {
                tracing::info!(channel_id = %self.channel_id, "Channel keys regenerated");
                if let Some(data) = self.state.data_mut() {
                    data.keys = Some(keys.clone());
                }
                self.notification = Some(Notification::success(KEYS_ROTATED));
                Some(keys)
            }
            Err(e) => {
                tracing::warn!(channel_id = %self.channel_id, error = %e, "Failed to regenerate keys");
                self.notification = Some(Notification::error(KEYS_ROTATE_FAILED));
                None
            }
        }
    }

    async fn request_rotation(&self, owner_email: Option<String>) -> ApiResult<ChannelKeys> {
        let email = match owner_email {
            Some(email) => email,
            None => self.api.current_user(&self.session).await?.email,
        };
        self.api
            .rotate_keys(&self.session, &self.channel_id, &email)
            .await
    }

    /// Submit new thresholds alongside the latest reading's values.
    ///
    /// The backend only accepts thresholds as part of a reading, so the
    /// submission repeats the latest known temperature and humidity.
    pub async fn update_thresholds(
        &mut self,
        form: &ThresholdForm,
    ) -> Result<Option<Feed>, ValidationError> {
        let (temperature_threshold, humidity_threshold) = form.validate()?;
        let latest = self
            .latest
            .as_ref()
            .ok_or_else(|| ValidationError::new("No reading available to update thresholds"))?;

        if !self.session.is_authenticated() {
            self.state = ViewState::Redirect(Route::SignIn);
            return Ok(None);
        }

        let submission = NewFeed {
            channel_id: self.channel_id.clone(),
            temperature: latest.temperature,
            humidity: latest.humidity,
            temperature_threshold,
            humidity_threshold,
        };

        match self.api.submit_feed(&self.session, &submission).await {
            Ok(feed) => {
                tracing::info!(
                    channel_id = %self.channel_id,
                    temperature_threshold,
                    humidity_threshold,
                    "Thresholds updated"
                );
                self.notification = Some(Notification::success(THRESHOLDS_UPDATED));
                self.apply_push(feed.clone());
                Ok(Some(feed))
            }
            Err(e) => {
                tracing::warn!(channel_id = %self.channel_id, error = %e, "Failed to update thresholds");
                self.notification = Some(Notification::error(THRESHOLDS_UPDATE_FAILED));
                Ok(None)
            }
        }
    }

    /// The pending toast, cleared on read
    pub fn take_notification(&mut self) -> Option<Notification> {
        self.notification.take()
    }

    /// Tear down the live subscription and wait for it to finish
    pub async fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }
    }
}
