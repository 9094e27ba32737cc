//! Views
//!
//! Screen state machines for the dashboard. Each view owns its state and is
//! driven through `&mut self` async methods; rendering lives in
//! [`crate::render`].
//!
//! - **session_gate**: sign-in, sign-up and sign-out
//! - **channel_list**: the user's channels and the "add channel" dialog
//! - **feed**: one channel's readings, keys, thresholds and live updates

pub mod channel_list;
pub mod feed;
pub mod session_gate;

pub use channel_list::{ChannelListData, ChannelListView, NewChannelForm};
pub use feed::{FeedData, FeedView, PushOutcome, PushUpdate, ThresholdForm};
pub use session_gate::{GateOutcome, SessionGate, SignInForm, SignUpForm};

use std::fmt;

use crate::model::ChannelId;

/// Navigation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    SignIn,
    SignUp,
    ChannelList,
    Feed(ChannelId),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::ChannelList => "/".to_string(),
            Route::SignIn => "/sign-in".to_string(),
            Route::SignUp => "/sign-up".to_string(),
            Route::Feed(id) => format!("/channel/{}", id),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Lifecycle of a data view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    /// The view cannot be shown; go elsewhere
    Redirect(Route),
}

impl<T> ViewState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            ViewState::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut T> {
        match self {
            ViewState::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn redirect(&self) -> Option<&Route> {
        match self {
            ViewState::Redirect(route) => Some(route),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// Transient toast message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == NotificationKind::Error
    }
}

/// Inline form error; nothing was sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Reject a blank form field with "<label> is required"
pub(crate) fn required(value: &str, label: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError(format!("{} is required", label)))
    } else {
        Ok(())
    }
}
