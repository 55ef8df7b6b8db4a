//! Rich text: plain text plus byte-range facets.
//!
//! [`markdown::compile`] turns the supported markdown subset into a
//! [`CompiledText`]. Facet offsets are UTF-8 byte offsets into the compiled
//! text, which is what the protocol expects regardless of how a client
//! stores strings.
//!
//! Mentions are compiled lexically; [`mentions::resolve_mentions`] fills in
//! their DIDs before the text is submitted.

use serde::ser::{Error as _, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::identity::{Did, Handle};

pub mod markdown;
pub mod mentions;

pub use markdown::{compile, ParseError};

const FACET_TYPE: &str = "app.bsky.richtext.facet";

/// Compiled text and its facets.
///
/// Facets are sorted by start offset, do not overlap, and lie within the
/// text's byte length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledText {
    text: String,
    facets: Vec<Facet>,
}

impl CompiledText {
    /// The display text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Facets in ascending byte order.
    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    /// Mentions that still need a DID.
    pub fn unresolved_mentions(&self) -> impl Iterator<Item = &Handle> {
        self.facets.iter().filter_map(|facet| match &facet.feature {
            FacetFeature::Mention(mention) if mention.did.is_none() => Some(&mention.handle),
            _ => None,
        })
    }

    /// The text covered by `facet`.
    pub fn slice(&self, facet: &Facet) -> Option<&str> {
        self.text.get(facet.range())
    }
}

/// A byte-range annotation over compiled text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    byte_start: u32,
    byte_end: u32,
    feature: FacetFeature,
}

impl Facet {
    /// Inclusive start offset in bytes.
    pub fn byte_start(&self) -> u32 {
        self.byte_start
    }

    /// Exclusive end offset in bytes.
    pub fn byte_end(&self) -> u32 {
        self.byte_end
    }

    /// What the range denotes.
    pub fn feature(&self) -> &FacetFeature {
        &self.feature
    }

    /// The facet's range as `usize` offsets.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = usize::try_from(self.byte_start).unwrap_or(usize::MAX);
        let end = usize::try_from(self.byte_end).unwrap_or(usize::MAX);
        start..end
    }
}

/// The annotation carried by a facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetFeature {
    /// Hyperlink target, an absolute `http` or `https` URL as written.
    Link(String),
    /// Reference to an actor.
    Mention(Mention),
    /// Hashtag, without the leading `#`.
    Tag(String),
}

/// A mention as written, plus its DID once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    /// Handle as written in the text (normalized).
    pub handle: Handle,
    /// DID after resolution.
    pub did: Option<Did>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ByteSlice {
    byte_start: u32,
    byte_end: u32,
}

#[derive(Serialize)]
#[serde(tag = "$type")]
enum WireFeature<'a> {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: &'a str },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: &'a Did },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: &'a str },
}

impl Serialize for Facet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let feature = match &self.feature {
            FacetFeature::Link(uri) => WireFeature::Link { uri },
            FacetFeature::Mention(mention) => {
                let did = mention.did.as_ref().ok_or_else(|| {
                    S::Error::custom(format!("mention of {} is not resolved", mention.handle))
                })?;
                WireFeature::Mention { did }
            }
            FacetFeature::Tag(tag) => WireFeature::Tag { tag },
        };

        let mut state = serializer.serialize_struct("Facet", 3)?;
        state.serialize_field("$type", FACET_TYPE)?;
        state.serialize_field(
            "index",
            &ByteSlice {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
            },
        )?;
        state.serialize_field("features", &[feature])?;
        state.end()
    }
}
