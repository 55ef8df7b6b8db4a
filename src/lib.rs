//! Skybot — direct messages and posts for the AT Protocol.
//!
//! Single Rust binary. Compiles a small markdown subset into rich-text
//! facets, resolves recipients, and delivers one message or post per run.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;

pub mod conversation;
pub mod embed;
pub mod identity;
pub mod richtext;

pub mod delivery;
pub mod oauth;
