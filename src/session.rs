//! Session Context
//!
//! The access token that authorizes API calls, and the stores that keep it
//! between runs. A [`Session`] is created once at the composition root and
//! passed explicitly to every data-access call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::api::{ApiError, ApiResult};
use crate::config::SessionConfig;

/// Key under which the token is stored
pub const TOKEN_KEY: &str = "accessToken";

/// File name of the persisted session inside the data directory
pub const TOKEN_FILE_NAME: &str = "session.json";

/// Bearer credential issued at sign-in or sign-up
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Authentication state for one view's lifetime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    token: Option<AccessToken>,
}

impl Session {
    /// A session with no token; every authenticated call short-circuits
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn authenticated(token: AccessToken) -> Self {
        Self { token: Some(token) }
    }

    /// Restore whatever token the store holds
    pub fn load(store: &dyn TokenStore) -> Result<Self, SessionError> {
        Ok(Self {
            token: store.load()?,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    /// The token, or [`ApiError::NotAuthenticated`] before any request is made
    pub fn require_token(&self) -> ApiResult<&AccessToken> {
        self.token.as_ref().ok_or(ApiError::NotAuthenticated)
    }
}

/// Persistence for the single access token
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<AccessToken>, SessionError>;

    fn save(&self, token: &AccessToken) -> Result<(), SessionError>;

    fn clear(&self) -> Result<(), SessionError>;
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// Token persisted as JSON on disk
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/iot-console/session.json`
    pub fn default_location() -> PathBuf {
        dirs::data_local_dir()
            .map(|p| p.join("iot-console"))
            .unwrap_or_else(|| PathBuf::from(".iot-console"))
            .join(TOKEN_FILE_NAME)
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config
                .token_path
                .clone()
                .unwrap_or_else(Self::default_location),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<AccessToken>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let stored: StoredSession =
            serde_json::from_str(&content).map_err(|e| SessionError::Parse {
                path: self.path.clone(),
                error: e.to_string(),
            })?;

        if stored.access_token.is_empty() {
            return Ok(None);
        }
        Ok(Some(AccessToken::new(stored.access_token)))
    }

    fn save(&self, token: &AccessToken) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let stored = StoredSession {
            access_token: token.as_str().to_string(),
        };
        let content = serde_json::to_string_pretty(&stored).map_err(|e| SessionError::Parse {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(&self.path, content).map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }

        tracing::debug!(path = ?self.path, "Stored access token");
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Process-local token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<AccessToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: AccessToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<AccessToken>, SessionError> {
        let guard = self
            .token
            .lock()
            .map_err(|e| SessionError::Lock(e.to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, token: &AccessToken) -> Result<(), SessionError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| SessionError::Lock(e.to_string()))?;
        *guard = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| SessionError::Lock(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Token store errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to access session file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Invalid session file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Session store lock poisoned: {0}")]
    Lock(String),
}
