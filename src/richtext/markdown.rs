//! Markdown subset compiler.
//!
//! Supported markup:
//! - `[label](https://example.com)` links; the label replaces the markup;
//! - `@alice.bsky.social` mentions at the start of text or after whitespace or `(`;
//! - `#tag` hashtags at the start of text or after whitespace;
//! - `\` escapes for `[`, `]`, `@`, `#` and `\`.
//!
//! Everything else passes through untouched. Only broken link markup is an
//! error.

use url::Url;

use super::{CompiledText, Facet, FacetFeature, Mention};
use crate::identity::Handle;

const ESCAPABLE: [char; 5] = ['[', ']', '@', '#', '\\'];
const MAX_TAG_CHARS: usize = 64;
const TAG_TERMINATORS: [char; 5] = ['[', ']', '(', ')', '\\'];

/// Structurally broken markup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// `[label](` without a closing `)` on the same line.
    #[error("unterminated link at byte {offset}")]
    UnterminatedLink {
        /// Source byte offset of the opening `[`.
        offset: usize,
    },

    /// `[](target)`.
    #[error("link at byte {offset} has an empty label")]
    EmptyLinkLabel {
        /// Source byte offset of the opening `[`.
        offset: usize,
    },

    /// Offsets would not fit the protocol's 32-bit facet indices.
    #[error("text of {len} bytes is too long")]
    TooLong {
        /// Byte length reached.
        len: usize,
    },
}

/// Compile markdown into display text and facets.
///
/// # Errors
///
/// Returns [`ParseError`] for broken link markup only; unsupported
/// markdown is never an error.
pub fn compile(markdown: &str) -> Result<CompiledText, ParseError> {
    let mut out = TextBuilder::with_capacity(markdown.len());
    let mut rest = markdown;

    while let Some(ch) = rest.chars().next() {
        let offset = markdown.len().saturating_sub(rest.len());
        let consumed = match ch {
            '\\' => out.escape(rest),
            '[' => match parse_link(rest, offset)? {
                Some(link) => {
                    out.push_facet(link.label, FacetFeature::Link(link.target.to_owned()))?;
                    link.consumed
                }
                None => out.literal(ch),
            },
            '@' if out.at_boundary(&['(']) => match scan_mention(rest) {
                Some((display, handle)) => {
                    out.push_facet(
                        display,
                        FacetFeature::Mention(Mention { handle, did: None }),
                    )?;
                    display.len()
                }
                None => out.literal(ch),
            },
            '#' if out.at_boundary(&[]) => match scan_tag(rest) {
                Some((display, tag)) => {
                    out.push_facet(display, FacetFeature::Tag(tag.to_owned()))?;
                    display.len()
                }
                None => out.literal(ch),
            },
            _ => out.literal(ch),
        };
        rest = rest.get(consumed..).unwrap_or_default();
    }

    Ok(out.finish())
}

struct TextBuilder {
    text: String,
    facets: Vec<Facet>,
}

impl TextBuilder {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            facets: Vec::new(),
        }
    }

    fn literal(&mut self, ch: char) -> usize {
        self.text.push(ch);
        ch.len_utf8()
    }

    /// Handle a backslash at the start of `rest`; returns source bytes used.
    fn escape(&mut self, rest: &str) -> usize {
        match rest.chars().nth(1) {
            Some(next) if ESCAPABLE.contains(&next) => {
                self.text.push(next);
                '\\'.len_utf8().saturating_add(next.len_utf8())
            }
            _ => self.literal('\\'),
        }
    }

    /// True at the start of the text or after whitespace or one of `extra`.
    fn at_boundary(&self, extra: &[char]) -> bool {
        match self.text.chars().next_back() {
            None => true,
            Some(prev) => prev.is_whitespace() || extra.contains(&prev),
        }
    }

    /// Append `display` and annotate exactly its bytes in the output.
    fn push_facet(&mut self, display: &str, feature: FacetFeature) -> Result<(), ParseError> {
        let start = self.text.len();
        self.text.push_str(display);
        let end = self.text.len();
        let too_long = || ParseError::TooLong { len: end };
        let byte_start = u32::try_from(start).map_err(|_| too_long())?;
        let byte_end = u32::try_from(end).map_err(|_| too_long())?;
        if byte_end > byte_start {
            self.facets.push(Facet {
                byte_start,
                byte_end,
                feature,
            });
        }
        Ok(())
    }

    fn finish(self) -> CompiledText {
        CompiledText {
            text: self.text,
            facets: self.facets,
        }
    }
}

struct Link<'a> {
    label: &'a str,
    target: &'a str,
    consumed: usize,
}

/// Parse `[label](target)` at the start of `rest`.
///
/// `Ok(None)` means the bracket is literal text: no `]` on the line, no `(`
/// right after it, or a target that is not an absolute http(s) URL. Once
/// `](` is seen the parentheses must close on the same line.
fn parse_link(rest: &str, offset: usize) -> Result<Option<Link<'_>>, ParseError> {
    let body = rest.get(1..).unwrap_or_default();
    let line = body.split('\n').next().unwrap_or_default();
    let Some(close) = line.find(']') else {
        return Ok(None);
    };
    let label = &line[..close];
    let Some(after) = body[close..].strip_prefix("](") else {
        return Ok(None);
    };

    let after_line = after.split('\n').next().unwrap_or_default();
    let Some(paren) = closing_paren(after_line) else {
        return Err(ParseError::UnterminatedLink { offset });
    };
    if label.trim().is_empty() {
        return Err(ParseError::EmptyLinkLabel { offset });
    }

    let Some(target) = link_destination(&after[..paren]) else {
        return Ok(None);
    };

    let remaining = after.get(paren.saturating_add(1)..).unwrap_or_default();
    Ok(Some(Link {
        label,
        target,
        consumed: rest.len().saturating_sub(remaining.len()),
    }))
}

/// Byte index of the `)` closing a link target, allowing balanced parens
/// inside the URL.
fn closing_paren(target: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in target.char_indices() {
        match ch {
            '(' => depth = depth.saturating_add(1),
            ')' if depth == 0 => return Some(index),
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// The web URL of a link target, with an optional quoted title dropped.
fn link_destination(target: &str) -> Option<&str> {
    let target = target.trim();
    let url = match target.split_once(char::is_whitespace) {
        Some((url, title)) if is_title(title.trim()) => url,
        Some(_) => return None,
        None => target,
    };
    is_web_url(url).then_some(url)
}

fn is_title(title: &str) -> bool {
    [('"', '"'), ('\'', '\''), ('(', ')')].iter().any(|&(open, close)| {
        title.len() >= 2 && title.starts_with(open) && title.ends_with(close)
    })
}

fn is_web_url(target: &str) -> bool {
    Url::parse(target)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// Scan `@handle` at the start of `rest`. Returns the covered text and the
/// parsed handle.
fn scan_mention(rest: &str) -> Option<(&str, Handle)> {
    let body = rest.get(1..)?;
    let end = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '-'))
        .unwrap_or(body.len());
    let candidate = body[..end].trim_end_matches(['.', '-']);
    let handle = Handle::parse(candidate).ok()?;
    rest.get(..candidate.len().saturating_add(1))
        .map(|display| (display, handle))
}

/// Scan `#tag` at the start of `rest`. Returns the covered text and the tag
/// without its `#`.
fn scan_tag(rest: &str) -> Option<(&str, &str)> {
    let body = rest.get(1..)?;
    let end = body
        .find(|c: char| c.is_whitespace() || TAG_TERMINATORS.contains(&c))
        .unwrap_or(body.len());
    let tag = body[..end].trim_end_matches(|c: char| c.is_ascii_punctuation());
    if tag.is_empty()
        || tag.starts_with('#')
        || tag.chars().all(|c| c.is_ascii_digit())
        || tag.chars().count() > MAX_TAG_CHARS
    {
        return None;
    }
    rest.get(..tag.len().saturating_add(1))
        .map(|display| (display, tag))
}
