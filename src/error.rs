//! Failure taxonomy shared by every pipeline stage.
//!
//! Each module owns its own `thiserror` enum; [`ErrorKind`] is the flat
//! classification they all map onto so callers and tests can match on the
//! kind of failure without caring which stage produced it.

use std::fmt;

/// Terminal failure classification for a delivery or authorization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Raw input is neither a valid handle nor a valid DID.
    InvalidIdentifier,
    /// A handle could not be resolved to a DID.
    ResolutionFailed,
    /// The embed record URI is not a valid AT-URI.
    InvalidUri,
    /// An embed record URI was given without a content hash.
    MissingCid,
    /// No recipients survived resolution.
    EmptyMembership,
    /// The markdown text contains structurally broken markup.
    ParseError,
    /// Credentials were missing or rejected.
    AuthenticationFailed,
    /// Any underlying network or protocol failure.
    TransportError,
    /// The authorization server reported an error in the callback.
    OAuthDenied,
    /// The callback carried neither a code nor an error.
    MalformedCallback,
    /// The authorization code could not be exchanged for a session.
    ExchangeFailed,
    /// The cancellation signal was observed.
    Cancelled,
    /// The post file is missing, unreadable, or empty.
    PostFile,
    /// The reply target has no posts.
    NoPosts,
}

impl ErrorKind {
    /// Stable name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "invalid_identifier",
            Self::ResolutionFailed => "resolution_failed",
            Self::InvalidUri => "invalid_uri",
            Self::MissingCid => "missing_cid",
            Self::EmptyMembership => "empty_membership",
            Self::ParseError => "parse_error",
            Self::AuthenticationFailed => "authentication_failed",
            Self::TransportError => "transport_error",
            Self::OAuthDenied => "oauth_denied",
            Self::MalformedCallback => "malformed_callback",
            Self::ExchangeFailed => "exchange_failed",
            Self::Cancelled => "cancelled",
            Self::PostFile => "post_file",
            Self::NoPosts => "no_posts",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
