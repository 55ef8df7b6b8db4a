//! Delivery orchestration: one linear pipeline per command.
//!
//! Each pipeline runs its stages strictly in order and stops at the first
//! failure. Nothing remote is mutated before the final submit stage, and the
//! submit stage runs at most once. Every suspending step observes the
//! [`CancellationToken`] handed to [`Delivery`].

use std::fmt;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::{cancellable, Cancelled};
use crate::client::{AtpClient, ClientError, SessionInfo};
use crate::conversation::{ConversationError, ConvoId};
use crate::embed::{AtUri, EmbedError};
use crate::error::ErrorKind;
use crate::identity::IdentityError;
use crate::richtext::ParseError;

pub mod dm;
pub mod post;
pub mod random;

pub use dm::DirectMessage;
pub use random::{IndexSource, PostFile, RngIndex};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Terminal failure of a delivery pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// A recipient or mention could not be parsed or resolved.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The markdown is structurally broken.
    #[error("could not parse text: {0}")]
    Parse(#[from] ParseError),

    /// The embed arguments are unusable.
    #[error(transparent)]
    Embed(#[from] EmbedError),

    /// The conversation could not be located.
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// The session could not be created.
    #[error("authentication failed for {username:?}: {reason}")]
    AuthenticationFailed {
        /// The identifier that was used to log in.
        username: String,
        /// Why the session was refused.
        reason: String,
    },

    /// A client call failed.
    #[error(transparent)]
    Transport(#[from] ClientError),

    /// The post file is missing, unreadable or empty.
    #[error("post file {}: {reason}", path.display())]
    PostFile {
        /// The file that was read.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The reply target has no posts.
    #[error("{0} has no posts to reply to")]
    NoPosts(String),

    /// The cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl DeliveryError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Identity(e) => e.kind(),
            Self::Parse(_) => ErrorKind::ParseError,
            Self::Embed(e) => e.kind(),
            Self::Conversation(e) => e.kind(),
            Self::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::PostFile { .. } => ErrorKind::PostFile,
            Self::NoPosts(_) => ErrorKind::NoPosts,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<Cancelled> for DeliveryError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Account credentials for an app-password session.
#[derive(Clone)]
pub struct Credentials {
    /// Handle, DID or email of the sending account.
    pub username: String,
    /// App password.
    pub password: String,
}

impl Credentials {
    /// Bundle a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// What a successful pipeline produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    /// A direct message was accepted.
    MessageSent {
        /// Conversation the message went to.
        convo_id: ConvoId,
        /// Identifier assigned by the chat service.
        message_id: String,
    },
    /// A post record was created.
    PostCreated {
        /// Record URI.
        uri: AtUri,
        /// Record content hash.
        cid: String,
    },
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageSent {
                convo_id,
                message_id,
            } => write!(f, "Message {message_id} sent to {convo_id}."),
            Self::PostCreated { uri, cid } => write!(f, "Post created: {uri} - {cid}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage tracking
// ---------------------------------------------------------------------------

/// Pipeline progress markers, in the order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing done yet.
    Start,
    /// Embed arguments validated.
    EmbedResolved,
    /// Session established.
    Authenticated,
    /// Recipients resolved to DIDs.
    IdentitiesResolved,
    /// Reply target's latest post found.
    ReplyTargetLocated,
    /// Markdown compiled and mentions resolved.
    TextCompiled,
    /// Conversation found or created.
    ConversationLocated,
    /// Message or post submitted.
    Submitted,
}

impl Stage {
    /// Stable lowercase label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::EmbedResolved => "embed_resolved",
            Self::Authenticated => "authenticated",
            Self::IdentitiesResolved => "identities_resolved",
            Self::ReplyTargetLocated => "reply_target_located",
            Self::TextCompiled => "text_compiled",
            Self::ConversationLocated => "conversation_located",
            Self::Submitted => "submitted",
        }
    }
}

/// Records the last stage reached and logs every transition.
#[derive(Debug)]
pub(crate) struct StageTracker {
    pipeline: &'static str,
    stage: Stage,
}

impl StageTracker {
    pub(crate) fn new(pipeline: &'static str) -> Self {
        Self {
            pipeline,
            stage: Stage::Start,
        }
    }

    pub(crate) fn advance(&mut self, next: Stage) {
        debug!(pipeline = self.pipeline, from = self.stage.as_str(), to = next.as_str(), "stage");
        self.stage = next;
    }

    /// Log the terminal outcome and pass it through.
    pub(crate) fn finish<T>(self, result: Result<T, DeliveryError>) -> Result<T, DeliveryError> {
        match &result {
            Ok(_) => debug!(pipeline = self.pipeline, "done"),
            Err(e) => warn!(
                pipeline = self.pipeline,
                stage = self.stage.as_str(),
                kind = %e.kind(),
                error = %e,
                "failed"
            ),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs delivery pipelines against one client.
///
/// The client is expected to be fresh; each pipeline authenticates it.
pub struct Delivery<'a, C: AtpClient + ?Sized> {
    client: &'a C,
    cancel: CancellationToken,
}

impl<'a, C: AtpClient + ?Sized> Delivery<'a, C> {
    /// Create an orchestrator with its own cancellation token.
    pub fn new(client: &'a C) -> Self {
        Self::with_cancellation(client, CancellationToken::new())
    }

    /// Create an orchestrator that stops when `cancel` fires.
    pub fn with_cancellation(client: &'a C, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// The token observed by every suspending step.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn client(&self) -> &'a C {
        self.client
    }

    /// Await `fut` unless cancellation wins, converting its error.
    pub(crate) async fn step<F, T, E>(&self, fut: F) -> Result<T, DeliveryError>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: Into<DeliveryError>,
    {
        cancellable(&self.cancel, fut).await?.map_err(Into::into)
    }

    /// Create the session. Empty credentials fail without a network call.
    pub(crate) async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<SessionInfo, DeliveryError> {
        let username = credentials.username.trim();
        if username.is_empty() || credentials.password.is_empty() {
            return Err(DeliveryError::AuthenticationFailed {
                username: credentials.username.clone(),
                reason: "username and password are required".to_owned(),
            });
        }

        let session = cancellable(
            &self.cancel,
            self.client.authenticate(username, &credentials.password),
        )
        .await?
        .map_err(|e| DeliveryError::AuthenticationFailed {
            username: username.to_owned(),
            reason: e.to_string(),
        })?;
        info!(did = %session.did, handle = %session.handle, "authenticated");
        Ok(session)
    }
}
