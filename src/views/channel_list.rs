//! Channel List View
//!
//! Shows the signed-in user and their channels, and hosts the "add
//! channel" dialog.

use std::sync::Arc;

use super::{required, Notification, Route, ValidationError, ViewState};
use crate::api::{ApiResult, TelemetryApi};
use crate::model::{Channel, NewChannel, User};
use crate::session::Session;

pub const CHANNEL_CREATED: &str = "Channel created successfully";
pub const CHANNEL_CREATE_FAILED: &str = "Failed to create channel";

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelListData {
    pub user: User,
    pub channels: Vec<Channel>,
}

/// Fields of the "add channel" dialog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewChannelForm {
    pub name: String,
    pub description: String,
}

impl NewChannelForm {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    fn validate(&self) -> Result<NewChannel, ValidationError> {
        required(&self.name, "Name")?;
        required(&self.description, "Description")?;
        Ok(NewChannel {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

pub struct ChannelListView {
    api: Arc<dyn TelemetryApi>,
    session: Session,
    state: ViewState<ChannelListData>,
    dialog_open: bool,
    notification: Option<Notification>,
}

impl ChannelListView {
    pub fn new(api: Arc<dyn TelemetryApi>, session: Session) -> Self {
        Self {
            api,
            session,
            state: ViewState::Loading,
            dialog_open: false,
            notification: None,
        }
    }

    pub fn state(&self) -> &ViewState<ChannelListData> {
        &self.state
    }

    /// Fetch the user, then their channels.
    ///
    /// Any failure, including a missing token, redirects to sign-in.
    pub async fn load(&mut self) -> &ViewState<ChannelListData> {
        if !self.session.is_authenticated() {
            tracing::debug!("No access token, redirecting to sign-in");
            self.state = ViewState::Redirect(Route::SignIn);
            return &self.state;
        }

        self.state = ViewState::Loading;
        self.state = match self.fetch().await {
            Ok(data) => {
                tracing::debug!(channels = data.channels.len(), "Channel list loaded");
                ViewState::Ready(data)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load channel list");
                ViewState::Redirect(Route::SignIn)
            }
        };
        &self.state
    }

    async fn fetch(&self) -> ApiResult<ChannelListData> {
        let user = self.api.current_user(&self.session).await?;
        let channels = self.api.list_channels(&self.session).await?;
        Ok(ChannelListData { user, channels })
    }

    /// Route of each listed channel's feed view, in list order
    pub fn channel_routes(&self) -> Vec<Route> {
        self.state
            .data()
            .map(|data| {
                data.channels
                    .iter()
                    .map(|channel| Route::Feed(channel.id.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn open_create_dialog(&mut self) {
        self.dialog_open = true;
    }

    pub fn close_create_dialog(&mut self) {
        self.dialog_open = false;
    }

    pub fn is_dialog_open(&self) -> bool {
        self.dialog_open
    }

    /// Submit the dialog.
    ///
    /// Blank fields are rejected without a request. On success the dialog
    /// closes and the list is reloaded; on failure it stays open.
    pub async fn create_channel(
        &mut self,
        form: &NewChannelForm,
    ) -> Result<Option<Channel>, ValidationError> {
        let new_channel = form.validate()?;

        if !self.session.is_authenticated() {
            self.state = ViewState::Redirect(Route::SignIn);
            return Ok(None);
        }

        match self.api.create_channel(&self.session, &new_channel).await {
            Ok(channel) => {
                tracing::info!(channel_id = %channel.id, name = %channel.name, "Channel created");
                self.dialog_open = false;
                self.notification = Some(Notification::success(CHANNEL_CREATED));
                self.load().await;
                Ok(Some(channel))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create channel");
                self.notification = Some(Notification::error(CHANNEL_CREATE_FAILED));
                Ok(None)
            }
        }
    }

    /// The pending toast, cleared on read
    pub fn take_notification(&mut self) -> Option<Notification> {
        self.notification.take()
    }
}
