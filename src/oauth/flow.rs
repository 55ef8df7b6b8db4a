//! Authorization flow as a chain of single-use states.
//!
//! `Idle -> UrlGenerated -> AwaitingCallback -> Exchanging -> Authenticated`.
//! Each transition consumes the previous state, so a flow cannot be resumed
//! or replayed. Any failure ends the flow.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::callback::{classify, AuthorizationCode};
use super::{AuthorizationError, AuthorizationRequest, FlowConfig, OAuthClient};
use crate::cancel::cancellable;
use crate::client::SessionInfo;
use crate::identity::Identifier;

type Completion = Result<String, String>;

/// One-shot completion handle given to the browser session.
///
/// Consumed by [`complete`](Self::complete) or [`fail`](Self::fail).
/// Dropping it without either cancels the flow.
#[derive(Debug)]
pub struct CallbackSender(oneshot::Sender<Completion>);

impl CallbackSender {
    /// Report the final redirect URL.
    pub fn complete(self, callback_url: impl Into<String>) {
        let _ = self.0.send(Ok(callback_url.into()));
    }

    /// Report a platform failure.
    pub fn fail(self, error: impl Into<String>) {
        let _ = self.0.send(Err(error.into()));
    }
}

/// Host browser integration.
///
/// Must eventually call exactly one of [`CallbackSender::complete`] or
/// [`CallbackSender::fail`], or drop the sender.
pub trait BrowserSession: Send + Sync {
    /// Show `url` and watch for a navigation to `redirect_uri`.
    fn open(&self, url: &Url, redirect_uri: &str, completion: CallbackSender);
}

/// The idle state: nothing has happened yet.
pub struct AuthorizationFlow<'a, O: OAuthClient + ?Sized> {
    client: &'a O,
    config: FlowConfig,
    cancel: CancellationToken,
}

impl<'a, O: OAuthClient + ?Sized> AuthorizationFlow<'a, O> {
    /// Start a flow for one authentication attempt.
    pub fn new(client: &'a O, config: FlowConfig) -> Self {
        Self::with_cancellation(client, config, CancellationToken::new())
    }

    /// Start a flow that stops when `cancel` fires.
    pub fn with_cancellation(client: &'a O, config: FlowConfig, cancel: CancellationToken) -> Self {
        Self {
            client,
            config,
            cancel,
        }
    }

    /// Build the authorization URL, optionally hinting the account.
    ///
    /// # Errors
    ///
    /// [`AuthorizationError::InvalidIdentifier`] before any network call,
    /// [`AuthorizationError::Transport`] or
    /// [`AuthorizationError::Cancelled`].
    pub async fn generate_url(
        self,
        login_hint: Option<&str>,
    ) -> Result<UrlGenerated<'a, O>, AuthorizationError> {
        let login_hint = login_hint.map(Identifier::parse).transpose()?;
        let request = AuthorizationRequest {
            client_metadata_url: self.config.client_metadata_url,
            redirect_uri: self.config.redirect_uri,
            scopes: self.config.scopes,
            login_hint,
        };
        let url = cancellable(&self.cancel, self.client.authorization_url(&request)).await??;
        debug!(host = url.host_str().unwrap_or_default(), "authorization url generated");
        Ok(UrlGenerated {
            client: self.client,
            request,
            url,
            cancel: self.cancel,
        })
    }

    /// Drive the flow to completion through `browser`.
    ///
    /// # Errors
    ///
    /// The first failing transition's [`AuthorizationError`].
    pub async fn run(
        self,
        login_hint: Option<&str>,
        browser: &dyn BrowserSession,
    ) -> Result<SessionInfo, AuthorizationError> {
        self.generate_url(login_hint)
            .await?
            .open(browser)
            .wait()
            .await?
            .exchange()
            .await
    }
}

/// The authorization URL exists; the browser has not been opened.
pub struct UrlGenerated<'a, O: OAuthClient + ?Sized> {
    client: &'a O,
    request: AuthorizationRequest,
    url: Url,
    cancel: CancellationToken,
}

impl<'a, O: OAuthClient + ?Sized> UrlGenerated<'a, O> {
    /// The URL to show the user.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request the URL was built from.
    pub fn request(&self) -> &AuthorizationRequest {
        &self.request
    }

    /// Hand the URL to the browser with a fresh completion channel.
    pub fn open(self, browser: &dyn BrowserSession) -> AwaitingCallback<'a, O> {
        let (tx, rx) = oneshot::channel();
        browser.open(&self.url, &self.request.redirect_uri, CallbackSender(tx));
        debug!("browser session opened");
        AwaitingCallback {
            client: self.client,
            completion: rx,
            cancel: self.cancel,
        }
    }
}

/// The browser is showing the authorization page.
pub struct AwaitingCallback<'a, O: OAuthClient + ?Sized> {
    client: &'a O,
    completion: oneshot::Receiver<Completion>,
    cancel: CancellationToken,
}

impl<'a, O: OAuthClient + ?Sized> AwaitingCallback<'a, O> {
    /// Wait for the single completion. There is no timeout.
    ///
    /// # Errors
    ///
    /// [`AuthorizationError::OAuthDenied`] or
    /// [`AuthorizationError::MalformedCallback`] from the callback;
    /// [`AuthorizationError::MalformedCallback`] for a platform failure;
    /// [`AuthorizationError::Cancelled`] if the sender was dropped or the
    /// token fired.
    pub async fn wait(self) -> Result<Exchanging<'a, O>, AuthorizationError> {
        let completion = cancellable(&self.cancel, self.completion)
            .await?
            .map_err(|_| AuthorizationError::Cancelled)?;
        let callback_url = completion.map_err(AuthorizationError::MalformedCallback)?;
        let code = classify(&callback_url)?;
        debug!(has_state = code.state.is_some(), "callback carried a code");
        Ok(Exchanging {
            client: self.client,
            callback_url,
            code,
            cancel: self.cancel,
        })
    }
}

/// A code arrived and is ready to be exchanged.
pub struct Exchanging<'a, O: OAuthClient + ?Sized> {
    client: &'a O,
    callback_url: String,
    code: AuthorizationCode,
    cancel: CancellationToken,
}

impl<O: OAuthClient + ?Sized> Exchanging<'_, O> {
    /// The parsed callback.
    pub fn code(&self) -> &AuthorizationCode {
        &self.code
    }

    /// The callback URL as delivered by the browser.
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Exchange the code for a session.
    ///
    /// # Errors
    ///
    /// [`AuthorizationError::ExchangeFailed`] if the exchange errors or
    /// yields no session; [`AuthorizationError::Cancelled`].
    pub async fn exchange(self) -> Result<SessionInfo, AuthorizationError> {
        let session = cancellable(&self.cancel, self.client.exchange_callback(&self.callback_url))
            .await?
            .map_err(|e| AuthorizationError::ExchangeFailed(e.to_string()))?
            .ok_or_else(|| AuthorizationError::ExchangeFailed("no session returned".to_owned()))?;
        info!(did = %session.did, handle = %session.handle, "authenticated via oauth");
        Ok(session)
    }
}
