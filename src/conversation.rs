//! Conversation lookup for direct messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{AtpClient, ClientError};
use crate::error::ErrorKind;
use crate::identity::{Did, ResolvedIdentity};

/// Opaque identifier of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConvoId(String);

impl ConvoId {
    /// Wrap a conversation id returned by the chat service.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConvoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from conversation lookup.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// No recipients to address.
    #[error("no recipients to message")]
    EmptyMembership,

    /// The get-or-create call failed.
    #[error("failed to get conversation: {0}")]
    Transport(#[from] ClientError),
}

impl ConversationError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyMembership => ErrorKind::EmptyMembership,
            Self::Transport(_) => ErrorKind::TransportError,
        }
    }
}

/// Get or create the conversation addressed to exactly `members`.
///
/// Duplicates are dropped, keeping first-seen order. Idempotence is the
/// chat service's guarantee; nothing is cached here.
///
/// # Errors
///
/// [`ConversationError::EmptyMembership`] before any network call, or
/// [`ConversationError::Transport`] unchanged from the client.
pub async fn locate<C>(members: &[ResolvedIdentity], client: &C) -> Result<ConvoId, ConversationError>
where
    C: AtpClient + ?Sized,
{
    let mut dids: Vec<Did> = Vec::with_capacity(members.len());
    for member in members {
        if !dids.contains(member.did()) {
            dids.push(member.did().clone());
        }
    }
    if dids.is_empty() {
        return Err(ConversationError::EmptyMembership);
    }

    let convo = client.get_convo_for_members(&dids).await?;
    debug!(convo_id = %convo.id, members = dids.len(), "conversation located");
    Ok(convo.id)
}
