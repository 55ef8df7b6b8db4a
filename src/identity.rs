//! Actor identifiers and their resolution to stable DIDs.
//!
//! Raw input is either a handle (`alice.bsky.social`) or a DID
//! (`did:plc:...`). Syntax is checked locally; only handles need a network
//! round-trip through [`AtpClient::resolve_handle`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{AtpClient, ClientError};
use crate::error::ErrorKind;

const MAX_HANDLE_LEN: usize = 253;
const MAX_DID_LEN: usize = 2048;

static HANDLE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$",
    )
    .ok()
});

static DID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^did:[a-z]+:[a-zA-Z0-9._:%-]*[a-zA-Z0-9._-]$").ok());

fn matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

/// Errors from identifier parsing and resolution.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The input is neither a handle nor a DID.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The handle resolution call failed.
    #[error("failed to resolve {identifier}: {source}")]
    ResolutionFailed {
        /// The handle that was being resolved.
        identifier: String,
        /// Underlying client failure.
        #[source]
        source: ClientError,
    },
}

impl IdentityError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
        }
    }
}

/// A human-readable, DNS-like actor name. Always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Parse a handle, normalizing it to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidIdentifier`] when the input violates
    /// handle syntax.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        if raw.len() > MAX_HANDLE_LEN || !matches(&HANDLE_PATTERN, raw) {
            return Err(IdentityError::InvalidIdentifier(raw.to_owned()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// The normalized handle text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Handle {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Handle> for String {
    fn from(value: Handle) -> Self {
        value.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A permanent decentralized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse a DID.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidIdentifier`] when the input violates
    /// DID syntax.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        if raw.len() > MAX_DID_LEN || !matches(&DID_PATTERN, raw) {
            return Err(IdentityError::InvalidIdentifier(raw.to_owned()));
        }
        Ok(Self(raw.to_owned()))
    }

    /// The DID text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Did {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Did> for String {
    fn from(value: Did) -> Self {
        value.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A syntactically valid actor identifier, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Human-readable name; needs resolution.
    Handle(Handle),
    /// Stable identifier; trusted as-is.
    Did(Did),
}

impl Identifier {
    /// Parse raw input as a DID or a handle. Surrounding whitespace and a
    /// single leading `@` on handles are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidIdentifier`] if neither form matches.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.starts_with("did:") {
            return Did::parse(trimmed).map(Self::Did);
        }
        let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);
        Handle::parse(handle)
            .map(Self::Handle)
            .map_err(|_| IdentityError::InvalidIdentifier(raw.to_owned()))
    }
}

impl FromStr for Identifier {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => handle.fmt(f),
            Self::Did(did) => did.fmt(f),
        }
    }
}

/// A DID known to address a live actor.
///
/// Only produced by [`resolve`], [`resolve_identifier`] and [`resolve_all`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedIdentity(Did);

impl ResolvedIdentity {
    /// The resolved DID.
    pub fn did(&self) -> &Did {
        &self.0
    }

    /// Consume into the resolved DID.
    pub fn into_did(self) -> Did {
        self.0
    }
}

impl fmt::Display for ResolvedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Parse and resolve one raw identifier.
///
/// # Errors
///
/// [`IdentityError::InvalidIdentifier`] without touching the network, or
/// [`IdentityError::ResolutionFailed`] if the handle lookup fails.
pub async fn resolve<C>(raw: &str, client: &C) -> Result<ResolvedIdentity, IdentityError>
where
    C: AtpClient + ?Sized,
{
    let identifier = Identifier::parse(raw)?;
    resolve_identifier(&identifier, client).await
}

/// Resolve an already-parsed identifier. DIDs return without a network call.
///
/// # Errors
///
/// Returns [`IdentityError::ResolutionFailed`] if the handle lookup fails.
pub async fn resolve_identifier<C>(
    identifier: &Identifier,
    client: &C,
) -> Result<ResolvedIdentity, IdentityError>
where
    C: AtpClient + ?Sized,
{
    match identifier {
        Identifier::Did(did) => Ok(ResolvedIdentity(did.clone())),
        Identifier::Handle(handle) => {
            let did = client.resolve_handle(handle).await.map_err(|source| {
                IdentityError::ResolutionFailed {
                    identifier: handle.to_string(),
                    source,
                }
            })?;
            debug!(%handle, %did, "resolved handle");
            Ok(ResolvedIdentity(did))
        }
    }
}

/// Resolve identifiers in order, stopping at the first failure.
///
/// Nothing is returned on failure; a caller never sees a partial list.
/// Repeated handles are looked up once.
///
/// # Errors
///
/// The first [`IdentityError`] encountered.
pub async fn resolve_all<C, I, S>(raws: I, client: &C) -> Result<Vec<ResolvedIdentity>, IdentityError>
where
    C: AtpClient + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut resolved = Vec::new();
    let mut seen: BTreeMap<Handle, ResolvedIdentity> = BTreeMap::new();
    for raw in raws {
        let identifier = Identifier::parse(raw.as_ref())?;
        let identity = match &identifier {
            Identifier::Handle(handle) => match seen.get(handle) {
                Some(identity) => identity.clone(),
                None => {
                    let identity = resolve_identifier(&identifier, client).await?;
                    seen.insert(handle.clone(), identity.clone());
                    identity
                }
            },
            Identifier::Did(_) => resolve_identifier(&identifier, client).await?,
        };
        resolved.push(identity);
    }
    Ok(resolved)
}
