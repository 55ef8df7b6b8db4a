//! Record embeds: AT-URIs, strong references, and the embed builder.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::identity::Identifier;

const AT_URI_SCHEME: &str = "at://";
const EMBED_RECORD_TYPE: &str = "app.bsky.embed.record";

static NSID_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9-]{0,62}(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?){2,}$").ok()
});

static RKEY_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:~-]{1,512}$").ok());

/// Errors from embed construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbedError {
    /// The record URI is not a valid AT-URI.
    #[error("invalid record URI for embedding: {0:?}")]
    InvalidUri(String),

    /// A record URI was supplied without its CID.
    #[error("CID is required for embedding record {0}")]
    MissingCid(String),
}

impl EmbedError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUri(_) => ErrorKind::InvalidUri,
            Self::MissingCid(_) => ErrorKind::MissingCid,
        }
    }
}

/// A parsed `at://authority[/collection[/rkey]]` locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AtUri {
    raw: String,
    authority: Identifier,
    collection: Option<String>,
    rkey: Option<String>,
}

impl AtUri {
    /// Parse an AT-URI.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::InvalidUri`] for anything outside AT-URI syntax,
    /// including query strings and fragments.
    pub fn parse(raw: &str) -> Result<Self, EmbedError> {
        let invalid = || EmbedError::InvalidUri(raw.to_owned());

        let rest = raw.strip_prefix(AT_URI_SCHEME).ok_or_else(invalid)?;
        if rest.contains(['?', '#']) {
            return Err(invalid());
        }

        let mut segments = rest.split('/');
        let authority_raw = segments.next().unwrap_or_default();
        if authority_raw.is_empty() || authority_raw.starts_with('@') {
            return Err(invalid());
        }
        let authority = Identifier::parse(authority_raw).map_err(|_| invalid())?;

        let collection = match segments.next() {
            Some(nsid) if is_match(&NSID_PATTERN, nsid) => Some(nsid.to_owned()),
            Some(_) => return Err(invalid()),
            None => None,
        };

        let rkey = match segments.next() {
            Some(key) if key != "." && key != ".." && is_match(&RKEY_PATTERN, key) => {
                Some(key.to_owned())
            }
            Some(_) => return Err(invalid()),
            None => None,
        };

        if segments.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            raw: raw.to_owned(),
            authority,
            collection,
            rkey,
        })
    }

    /// Repository the record lives in.
    pub fn authority(&self) -> &Identifier {
        &self.authority
    }

    /// Record collection NSID, if present.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Record key, if present.
    pub fn rkey(&self) -> Option<&str> {
        self.rkey.as_deref()
    }

    /// The URI exactly as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn is_match(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

impl FromStr for AtUri {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AtUri {
    type Error = EmbedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AtUri> for String {
    fn from(value: AtUri) -> Self {
        value.raw
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A reference to one version of a record: locator plus content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStrongRef")]
pub struct StrongRef {
    uri: AtUri,
    cid: String,
}

#[derive(Deserialize)]
struct RawStrongRef {
    uri: AtUri,
    cid: String,
}

impl TryFrom<RawStrongRef> for StrongRef {
    type Error = EmbedError;

    fn try_from(raw: RawStrongRef) -> Result<Self, Self::Error> {
        Self::new(raw.uri, raw.cid)
    }
}

impl StrongRef {
    /// Build a strong reference. The CID is mandatory.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::MissingCid`] if `cid` is blank.
    pub fn new(uri: AtUri, cid: impl Into<String>) -> Result<Self, EmbedError> {
        let cid = cid.into();
        if cid.trim().is_empty() {
            return Err(EmbedError::MissingCid(uri.to_string()));
        }
        Ok(Self {
            uri,
            cid: cid.trim().to_owned(),
        })
    }

    /// Record locator.
    pub fn uri(&self) -> &AtUri {
        &self.uri
    }

    /// Record content hash.
    pub fn cid(&self) -> &str {
        &self.cid
    }
}

/// An `app.bsky.embed.record` pointing at an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedRecord(StrongRef);

impl EmbedRecord {
    /// Wrap a strong reference.
    pub fn new(record: StrongRef) -> Self {
        Self(record)
    }

    /// The embedded record reference.
    pub fn record(&self) -> &StrongRef {
        &self.0
    }
}

impl Serialize for EmbedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EmbedRecord", 2)?;
        state.serialize_field("$type", EMBED_RECORD_TYPE)?;
        state.serialize_field("record", &self.0)?;
        state.end()
    }
}

/// Validate embed arguments and build the optional embed.
///
/// The URI is checked before the CID is looked at. A CID given without a
/// URI is ignored.
///
/// # Errors
///
/// [`EmbedError::InvalidUri`] or [`EmbedError::MissingCid`].
pub fn build(uri: Option<&str>, cid: Option<&str>) -> Result<Option<EmbedRecord>, EmbedError> {
    let Some(uri) = uri.map(str::trim).filter(|u| !u.is_empty()) else {
        if cid.is_some_and(|c| !c.trim().is_empty()) {
            warn!("embed CID given without a record URI; ignoring it");
        }
        return Ok(None);
    };

    let uri = AtUri::parse(uri)?;
    let cid = cid.unwrap_or_default();
    let record = StrongRef::new(uri, cid)?;
    debug!(uri = %record.uri(), "embedding record");
    Ok(Some(EmbedRecord::new(record)))
}
