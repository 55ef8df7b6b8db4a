//! AT Protocol session client seam.
//!
//! Defines the [`AtpClient`] trait every pipeline stage is handed, and the
//! request/response types that cross it. The production implementation is
//! [`xrpc::XrpcClient`]; tests substitute a scripted double.
//!
//! The client owns the authenticated session. Pipeline code never sees
//! tokens; it only calls operations on an already-authenticated client.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::conversation::ConvoId;
use crate::embed::{EmbedRecord, StrongRef};
use crate::identity::{Did, Handle, Identifier};
use crate::richtext::CompiledText;

pub mod xrpc;

/// Lexicon collection for feed posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by a session client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with an XRPC error body.
    #[error("{nsid} failed with status {status} ({error}): {message}")]
    Xrpc {
        /// Method that failed.
        nsid: String,
        /// HTTP status code.
        status: u16,
        /// XRPC error name, e.g. `InvalidRequest`.
        error: String,
        /// Human-readable detail from the server.
        message: String,
    },

    /// Response body did not match the expected schema.
    #[error("response parse error: {0}")]
    Parse(String),

    /// An operation that needs a session was called before authenticating.
    #[error("no authenticated session")]
    NotAuthenticated,
}

// ---------------------------------------------------------------------------
// Session and responses
// ---------------------------------------------------------------------------

/// The account a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionInfo {
    /// Account DID.
    pub did: Did,
    /// Account handle at session creation.
    pub handle: Handle,
}

/// A conversation returned by get-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvoView {
    /// Conversation identifier.
    pub id: ConvoId,
    /// Member DIDs, including the caller.
    pub members: Vec<Did>,
}

/// A message accepted by the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message identifier within the conversation.
    pub id: String,
    /// Conversation revision after the send.
    pub rev: String,
    /// Server timestamp, when reported.
    #[serde(default)]
    pub sent_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

/// A direct message ready for submission. Built once, sent once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInput {
    /// Compiled text with resolved mention facets.
    pub text: CompiledText,
    /// Optional record embed.
    pub embed: Option<EmbedRecord>,
}

impl Serialize for MessageInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MessageInput", 3)?;
        state.serialize_field("text", self.text.text())?;
        if self.text.facets().is_empty() {
            state.skip_field("facets")?;
        } else {
            state.serialize_field("facets", self.text.facets())?;
        }
        match &self.embed {
            Some(embed) => state.serialize_field("embed", embed)?,
            None => state.skip_field("embed")?,
        }
        state.end()
    }
}

/// Thread position of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRef {
    /// Top of the thread.
    pub root: StrongRef,
    /// Post being replied to.
    pub parent: StrongRef,
}

/// An `app.bsky.feed.post` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    /// Compiled text with resolved mention facets.
    pub text: CompiledText,
    /// Reply reference, if this post is a reply.
    pub reply: Option<ReplyRef>,
    /// Client-side creation time.
    pub created_at: DateTime<Utc>,
}

impl Serialize for PostRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PostRecord", 5)?;
        state.serialize_field("$type", POST_COLLECTION)?;
        state.serialize_field("text", self.text.text())?;
        if self.text.facets().is_empty() {
            state.skip_field("facets")?;
        } else {
            state.serialize_field("facets", self.text.facets())?;
        }
        match &self.reply {
            Some(reply) => state.serialize_field("reply", reply)?,
            None => state.skip_field("reply")?,
        }
        state.serialize_field(
            "createdAt",
            &self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Capability object for talking to an AT Protocol service.
///
/// Implementations must be `Send + Sync`. No method retries.
#[async_trait]
pub trait AtpClient: Send + Sync {
    /// Create a session with an app password and keep it for later calls.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the credentials are rejected or the call fails.
    async fn authenticate(&self, identifier: &str, password: &str)
        -> Result<SessionInfo, ClientError>;

    /// Resolve a handle to its DID.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failure or unknown handle.
    async fn resolve_handle(&self, handle: &Handle) -> Result<Did, ClientError>;

    /// Get the conversation for exactly `members`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or protocol failure.
    async fn get_convo_for_members(&self, members: &[Did]) -> Result<ConvoView, ClientError>;

    /// Send a message into a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or protocol failure.
    async fn send_message(
        &self,
        convo_id: &ConvoId,
        message: &MessageInput,
    ) -> Result<MessageView, ClientError>;

    /// Create a post record in the session's repository.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or protocol failure.
    async fn create_post(&self, post: &PostRecord) -> Result<StrongRef, ClientError>;

    /// List the most recent post records of `actor`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or protocol failure.
    async fn list_posts(&self, actor: &Identifier, limit: u32)
        -> Result<Vec<StrongRef>, ClientError>;
}
