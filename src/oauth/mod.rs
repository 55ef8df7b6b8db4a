//! Interactive OAuth authorization for GUI and browser-driven entry points.
//!
//! The PKCE and DPoP mechanics live behind [`OAuthClient`]; the browser
//! hand-off lives behind [`flow::BrowserSession`]. This module owns the
//! state machine between them and the parsing of the redirect callback.

use async_trait::async_trait;
use url::Url;

use crate::cancel::Cancelled;
use crate::client::{ClientError, SessionInfo};
use crate::error::ErrorKind;
use crate::identity::{IdentityError, Identifier};

pub mod callback;
pub mod flow;

pub use callback::{classify, parse_query, AuthorizationCode};
pub use flow::{
    AuthorizationFlow, AwaitingCallback, BrowserSession, CallbackSender, Exchanging, UrlGenerated,
};

/// Client metadata document published for this app.
pub const DEFAULT_CLIENT_METADATA_URL: &str = "https://drasticactions.vip/client-metadata.json";

/// Custom-scheme redirect target registered in the client metadata.
pub const DEFAULT_REDIRECT_URI: &str = "vip.drasticactions:/callback";

/// Base AT Protocol OAuth scope.
pub const ATPROTO_SCOPE: &str = "atproto";

/// Errors from the authorization flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    /// The login hint is not a handle or DID.
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentityError),

    /// Building the authorization URL failed.
    #[error("authorization request failed: {0}")]
    Transport(#[from] ClientError),

    /// The authorization server redirected back with an error.
    #[error("authorization denied: {error}")]
    OAuthDenied {
        /// OAuth error code, e.g. `access_denied`.
        error: String,
        /// Optional `error_description`.
        description: Option<String>,
    },

    /// The callback could not be interpreted.
    #[error("malformed callback: {0}")]
    MalformedCallback(String),

    /// The code could not be exchanged for a session.
    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),

    /// The browser session went away or the token fired.
    #[error("authorization cancelled")]
    Cancelled,
}

impl AuthorizationError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::OAuthDenied { .. } => ErrorKind::OAuthDenied,
            Self::MalformedCallback(_) => ErrorKind::MalformedCallback,
            Self::ExchangeFailed(_) => ErrorKind::ExchangeFailed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<Cancelled> for AuthorizationError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Static parameters of one app's OAuth registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// URL of the client metadata document.
    pub client_metadata_url: String,
    /// Redirect URI the browser session returns to.
    pub redirect_uri: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            client_metadata_url: DEFAULT_CLIENT_METADATA_URL.to_owned(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_owned(),
            scopes: vec![ATPROTO_SCOPE.to_owned()],
        }
    }
}

/// Everything needed to build an authorization URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// URL of the client metadata document.
    pub client_metadata_url: String,
    /// Redirect URI the browser session returns to.
    pub redirect_uri: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Account to log in as, when known.
    pub login_hint: Option<Identifier>,
}

/// OAuth client for the AT Protocol authorization server.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Build the authorization URL, starting a PKCE exchange.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if server discovery or the PAR request fails.
    async fn authorization_url(&self, request: &AuthorizationRequest) -> Result<Url, ClientError>;

    /// Exchange the full callback URL for a session. `Ok(None)` means the
    /// server answered without a session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the token request fails.
    async fn exchange_callback(&self, callback: &str) -> Result<Option<SessionInfo>, ClientError>;
}
