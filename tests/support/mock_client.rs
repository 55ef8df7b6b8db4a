//! Scripted [`AtpClient`] double that records every call.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use skybot::client::{
    AtpClient, ClientError, ConvoView, MessageInput, MessageView, PostRecord, SessionInfo,
};
use skybot::conversation::ConvoId;
use skybot::embed::{AtUri, StrongRef};
use skybot::identity::{Did, Handle, Identifier};

pub const SENDER_DID: &str = "did:plc:sender";
pub const SENDER_HANDLE: &str = "sender.test";
pub const CREATED_URI: &str = "at://did:plc:sender/app.bsky.feed.post/3kcreated";
pub const CREATED_CID: &str = "bafycreated";

/// One recorded client call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Authenticate(String),
    ResolveHandle(String),
    GetConvo(Vec<String>),
    SendMessage { convo_id: String, body: Value },
    CreatePost(Value),
    ListPosts { actor: String, limit: u32 },
}

#[derive(Default)]
pub struct MockClient {
    handles: BTreeMap<String, String>,
    posts: BTreeMap<String, Vec<StrongRef>>,
    reject_login: bool,
    fail_send: bool,
    cancel_on_resolve: Option<CancellationToken>,
    calls: Mutex<Vec<Call>>,
    authenticated: Mutex<bool>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` resolve to `did`.
    pub fn with_handle(mut self, handle: &str, did: &str) -> Self {
        self.handles.insert(handle.to_owned(), did.to_owned());
        self
    }

    /// Give `actor` a post history, newest first.
    pub fn with_posts(mut self, actor: &str, posts: Vec<StrongRef>) -> Self {
        self.posts.insert(actor.to_owned(), posts);
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Fire `token` from inside handle resolution and never answer.
    pub fn cancelling_on_resolve(mut self, token: CancellationToken) -> Self {
        self.cancel_on_resolve = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Calls other than `authenticate`.
    pub fn remote_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Authenticate(_)))
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendMessage { convo_id, body } => Some((convo_id, body)),
                _ => None,
            })
            .collect()
    }

    pub fn created_posts(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreatePost(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn require_session(&self) -> Result<(), ClientError> {
        if *self.authenticated.lock().unwrap_or_else(|e| e.into_inner()) {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }
}

pub fn did(raw: &str) -> Did {
    Did::parse(raw).expect("valid did")
}

pub fn strong_ref(uri: &str, cid: &str) -> StrongRef {
    StrongRef::new(AtUri::parse(uri).expect("valid uri"), cid).expect("valid ref")
}

fn xrpc_error(nsid: &str, status: u16, error: &str, message: &str) -> ClientError {
    ClientError::Xrpc {
        nsid: nsid.to_owned(),
        status,
        error: error.to_owned(),
        message: message.to_owned(),
    }
}

#[async_trait]
impl AtpClient for MockClient {
    async fn authenticate(
        &self,
        identifier: &str,
        _password: &str,
    ) -> Result<SessionInfo, ClientError> {
        self.record(Call::Authenticate(identifier.to_owned()));
        if self.reject_login {
            return Err(xrpc_error(
                "com.atproto.server.createSession",
                401,
                "AuthenticationRequired",
                "Invalid identifier or password",
            ));
        }
        *self.authenticated.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(SessionInfo {
            did: did(SENDER_DID),
            handle: Handle::parse(SENDER_HANDLE).expect("valid handle"),
        })
    }

    async fn resolve_handle(&self, handle: &Handle) -> Result<Did, ClientError> {
        self.record(Call::ResolveHandle(handle.to_string()));
        if let Some(token) = &self.cancel_on_resolve {
            token.cancel();
            std::future::pending::<()>().await;
        }
        self.handles
            .get(handle.as_str())
            .map(|raw| did(raw))
            .ok_or_else(|| {
                xrpc_error(
                    "com.atproto.identity.resolveHandle",
                    400,
                    "InvalidRequest",
                    "Unable to resolve handle",
                )
            })
    }

    async fn get_convo_for_members(&self, members: &[Did]) -> Result<ConvoView, ClientError> {
        let raw: Vec<String> = members.iter().map(ToString::to_string).collect();
        self.record(Call::GetConvo(raw.clone()));
        self.require_session()?;
        let mut sorted = raw;
        sorted.sort();
        Ok(ConvoView {
            id: ConvoId::new(format!("convo:{}", sorted.join("+"))),
            members: members.to_vec(),
        })
    }

    async fn send_message(
        &self,
        convo_id: &ConvoId,
        message: &MessageInput,
    ) -> Result<MessageView, ClientError> {
        let body = serde_json::to_value(message).map_err(|e| ClientError::Parse(e.to_string()))?;
        self.record(Call::SendMessage {
            convo_id: convo_id.to_string(),
            body,
        });
        self.require_session()?;
        if self.fail_send {
            return Err(xrpc_error(
                "chat.bsky.convo.sendMessage",
                500,
                "InternalServerError",
                "try again later",
            ));
        }
        Ok(MessageView {
            id: "msg-1".to_owned(),
            rev: "rev-1".to_owned(),
            sent_at: None,
        })
    }

    async fn create_post(&self, post: &PostRecord) -> Result<StrongRef, ClientError> {
        let body = serde_json::to_value(post).map_err(|e| ClientError::Parse(e.to_string()))?;
        self.record(Call::CreatePost(body));
        self.require_session()?;
        Ok(strong_ref(CREATED_URI, CREATED_CID))
    }

    async fn list_posts(
        &self,
        actor: &Identifier,
        limit: u32,
    ) -> Result<Vec<StrongRef>, ClientError> {
        self.record(Call::ListPosts {
            actor: actor.to_string(),
            limit,
        });
        let posts = self.posts.get(&actor.to_string()).cloned().unwrap_or_default();
        Ok(posts
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }
}
