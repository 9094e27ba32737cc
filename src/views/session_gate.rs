//! Session Gate
//!
//! Sign-in and sign-up forms. A successful exchange persists the access
//! token and hands back the [`Session`] the rest of the app runs with.

use std::fmt;
use std::sync::Arc;

use super::{required, Route, ValidationError};
use crate::api::{AuthResponse, TelemetryApi};
use crate::model::{SignInRequest, SignUpRequest};
use crate::session::{Session, SessionError, TokenStore};

pub const SIGN_IN_ERROR: &str = "An error occurred. Please check your credentials and try again.";
pub const SIGN_IN_FAILED: &str = "Login failed. Please try again.";
pub const SIGN_UP_ERROR: &str = "An error occurred during sign-up. Please try again.";
pub const SIGN_UP_FAILED: &str = "Sign-up failed. Please try again.";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match";

#[derive(Clone, Default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    fn validate(&self) -> Result<SignInRequest, ValidationError> {
        required(&self.email, "Email")?;
        required(&self.password, "Password")?;
        Ok(SignInRequest {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

impl fmt::Debug for SignInForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInForm")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct SignUpForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirmation: String,
}

impl SignUpForm {
    fn validate(&self) -> Result<SignUpRequest, ValidationError> {
        required(&self.full_name, "Full name")?;
        required(&self.email, "Email")?;
        required(&self.password, "Password")?;
        if self.password != self.confirmation {
            return Err(ValidationError::new(PASSWORD_MISMATCH));
        }
        Ok(SignUpRequest {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

impl fmt::Debug for SignUpForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpForm")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Result of submitting a gate form
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    SignedIn { session: Session, next: Route },
    /// Rejected before any request
    Invalid(ValidationError),
    /// The request failed or the server refused; message is user-facing
    Failed(String),
}

impl GateOutcome {
    pub fn session(&self) -> Option<&Session> {
        match self {
            GateOutcome::SignedIn { session, .. } => Some(session),
            _ => None,
        }
    }
}

/// Authentication entry point
pub struct SessionGate {
    api: Arc<dyn TelemetryApi>,
    store: Arc<dyn TokenStore>,
}

impl SessionGate {
    pub fn new(api: Arc<dyn TelemetryApi>, store: Arc<dyn TokenStore>) -> Self {
        Self { api, store }
    }

    /// The session persisted by an earlier sign-in, if any.
    ///
    /// An unreadable token file counts as signed out.
    pub fn current_session(&self) -> Result<Session, SessionError> {
        match Session::load(self.store.as_ref()) {
            Err(SessionError::Parse { path, error }) => {
                tracing::warn!(path = ?path, error = %error, "Ignoring corrupt session file");
                Ok(Session::anonymous())
            }
            result => result,
        }
    }

    pub async fn sign_in(&self, form: &SignInForm) -> GateOutcome {
        let request = match form.validate() {
            Ok(request) => request,
            Err(e) => return GateOutcome::Invalid(e),
        };

        match self.api.sign_in(&request).await {
            Ok(response) => self.establish(response, false, SIGN_IN_FAILED),
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in request failed");
                GateOutcome::Failed(SIGN_IN_ERROR.to_string())
            }
        }
    }

    pub async fn sign_up(&self, form: &SignUpForm) -> GateOutcome {
        let request = match form.validate() {
            Ok(request) => request,
            Err(e) => return GateOutcome::Invalid(e),
        };

        match self.api.sign_up(&request).await {
            Ok(response) => self.establish(response, true, SIGN_UP_FAILED),
            Err(e) => {
                tracing::warn!(error = %e, "Sign-up request failed");
                GateOutcome::Failed(SIGN_UP_ERROR.to_string())
            }
        }
    }

    /// Forget the persisted token
    pub fn sign_out(&self) -> Result<(), SessionError> {
        self.store.clear()?;
        tracing::info!("Signed out");
        Ok(())
    }

    fn establish(&self, response: AuthResponse, require_created: bool, refused: &str) -> GateOutcome {
        if require_created && response.status != 201 {
            tracing::warn!(status = response.status, "Sign-up not acknowledged with 201");
            return GateOutcome::Failed(refused.to_string());
        }

        let Some(token) = response.access_token else {
            tracing::warn!(status = response.status, "Authentication response carried no token");
            return GateOutcome::Failed(refused.to_string());
        };

        if let Err(e) = self.store.save(&token) {
            tracing::error!(error = %e, "Failed to persist access token");
            return GateOutcome::Failed(format!("Could not save session: {}", e));
        }

        tracing::info!("Signed in");
        GateOutcome::SignedIn {
            session: Session::authenticated(token),
            next: Route::ChannelList,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AccessToken, FileTokenStore, MemoryTokenStore};
    use crate::test_support::FakeApi;

    fn gate(api: &Arc<FakeApi>, store: &Arc<MemoryTokenStore>) -> SessionGate {
        SessionGate::new(api.clone(), store.clone())
    }

    fn sign_up_form(password: &str, confirmation: &str) -> SignUpForm {
        SignUpForm {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            password: password.into(),
            confirmation: confirmation.into(),
        }
    }

    #[tokio::test]
    async fn test_sign_in_persists_token() {
        let api = Arc::new(FakeApi::new());
        api.set_auth(200, Some("tok-1"));
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_in(&SignInForm::new("ada@example.com", "secret"))
            .await;

        assert_eq!(
            outcome,
            GateOutcome::SignedIn {
                session: Session::authenticated(AccessToken::new("tok-1")),
                next: Route::ChannelList,
            }
        );
        assert_eq!(store.load().unwrap(), Some(AccessToken::new("tok-1")));
    }

    #[tokio::test]
    async fn test_sign_in_without_token_fails() {
        let api = Arc::new(FakeApi::new());
        api.set_auth(200, None);
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_in(&SignInForm::new("ada@example.com", "secret"))
            .await;

        assert_eq!(outcome, GateOutcome::Failed(SIGN_IN_FAILED.to_string()));
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_in_request_error() {
        let api = Arc::new(FakeApi::new());
        api.fail("sign_in");
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_in(&SignInForm::new("ada@example.com", "wrong"))
            .await;

        assert_eq!(outcome, GateOutcome::Failed(SIGN_IN_ERROR.to_string()));
    }

    #[tokio::test]
    async fn test_sign_in_blank_field_sends_nothing() {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_in(&SignInForm::new("", "secret"))
            .await;

        assert_eq!(
            outcome,
            GateOutcome::Invalid(ValidationError::new("Email is required"))
        );
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_password_mismatch_sends_nothing() {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_up(&sign_up_form("secret", "secre7"))
            .await;

        assert_eq!(
            outcome,
            GateOutcome::Invalid(ValidationError::new(PASSWORD_MISMATCH))
        );
        assert!(api.calls().is_empty());
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_up_requires_created() {
        let api = Arc::new(FakeApi::new());
        api.set_auth(200, Some("tok-2"));
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_up(&sign_up_form("secret", "secret"))
            .await;

        assert_eq!(outcome, GateOutcome::Failed(SIGN_UP_FAILED.to_string()));
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_up_success() {
        let api = Arc::new(FakeApi::new());
        api.set_auth(201, Some("tok-3"));
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_up(&sign_up_form("secret", "secret"))
            .await;

        assert!(outcome.session().is_some_and(Session::is_authenticated));
        assert_eq!(api.calls(), vec!["sign_up".to_string()]);
        assert_eq!(store.load().unwrap(), Some(AccessToken::new("tok-3")));
    }

    #[tokio::test]
    async fn test_sign_up_request_error() {
        let api = Arc::new(FakeApi::new());
        api.fail("sign_up");
        let store = Arc::new(MemoryTokenStore::new());

        let outcome = gate(&api, &store)
            .sign_up(&sign_up_form("secret", "secret"))
            .await;

        assert_eq!(outcome, GateOutcome::Failed(SIGN_UP_ERROR.to_string()));
    }

    #[test]
    fn test_sign_out_clears_token() {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(MemoryTokenStore::with_token(AccessToken::new("tok")));
        let gate = gate(&api, &store);

        assert!(gate.current_session().unwrap().is_authenticated());
        gate.sign_out().unwrap();
        assert!(!gate.current_session().unwrap().is_authenticated());
    }

    #[test]
    fn test_corrupt_session_file_is_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let gate = SessionGate::new(
            Arc::new(FakeApi::new()),
            Arc::new(FileTokenStore::new(&path)),
        );

        let session = gate.current_session().unwrap();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_form_debug_hides_password() {
        let form = SignInForm::new("ada@example.com", "hunter2");
        assert!(!format!("{:?}", form).contains("hunter2"));
    }
}
