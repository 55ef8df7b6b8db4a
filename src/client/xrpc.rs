//! XRPC-over-HTTPS implementation of [`AtpClient`].
//!
//! Talks to a PDS (or entryway) at `base_url`. Chat methods are forwarded by
//! the PDS to the chat service named in the `atproto-proxy` header.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::{
    AtpClient, ClientError, ConvoView, MessageInput, MessageView, PostRecord, SessionInfo,
    POST_COLLECTION,
};
use crate::config::HttpConfig;
use crate::conversation::ConvoId;
use crate::embed::StrongRef;
use crate::identity::{Did, Handle, Identifier};

/// Default PDS entryway.
pub const DEFAULT_INSTANCE_URL: &str = "https://bsky.social";

/// Default chat service proxy target.
pub const DEFAULT_CHAT_PROXY: &str = "did:web:api.bsky.chat#bsky_chat";

const PROXY_HEADER: &str = "atproto-proxy";

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const RESOLVE_HANDLE: &str = "com.atproto.identity.resolveHandle";
const GET_CONVO_FOR_MEMBERS: &str = "chat.bsky.convo.getConvoForMembers";
const SEND_MESSAGE: &str = "chat.bsky.convo.sendMessage";
const CREATE_RECORD: &str = "com.atproto.repo.createRecord";
const LIST_RECORDS: &str = "com.atproto.repo.listRecords";

/// HTTP client for one PDS and one session.
pub struct XrpcClient {
    http: reqwest::Client,
    base_url: String,
    chat_proxy: String,
    session: RwLock<Option<StoredSession>>,
}

struct StoredSession {
    info: SessionInfo,
    access_jwt: String,
}

impl fmt::Debug for XrpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrpcClient")
            .field("base_url", &self.base_url)
            .field("chat_proxy", &self.chat_proxy)
            .field("session", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateSessionInput<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionOutput {
    did: Did,
    handle: Handle,
    access_jwt: String,
}

#[derive(Deserialize)]
struct ResolveHandleOutput {
    did: Did,
}

#[derive(Deserialize)]
struct ConvoOutput {
    convo: ConvoWire,
}

#[derive(Deserialize)]
struct ConvoWire {
    id: ConvoId,
    #[serde(default)]
    members: Vec<MemberWire>,
}

#[derive(Deserialize)]
struct MemberWire {
    did: Did,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageInput<'a> {
    convo_id: &'a ConvoId,
    message: &'a MessageInput,
}

#[derive(Serialize)]
struct CreateRecordInput<'a> {
    repo: &'a Did,
    collection: &'static str,
    record: &'a PostRecord,
}

#[derive(Deserialize)]
struct ListRecordsOutput {
    #[serde(default)]
    records: Vec<StrongRef>,
}

#[derive(Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl XrpcClient {
    /// Create an unauthenticated client for the PDS at `base_url`.
    pub fn new(base_url: &Url, chat_proxy: impl Into<String>, http: &HttpConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .user_agent(concat!("skybot/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            http: client,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            chat_proxy: chat_proxy.into(),
            session: RwLock::new(None),
        }
    }

    /// The PDS base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The account of the current session, if authenticated.
    pub async fn session(&self) -> Option<SessionInfo> {
        self.session.read().await.as_ref().map(|s| s.info.clone())
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{nsid}", self.base_url)
    }

    async fn access(&self) -> Result<(String, Did), ClientError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| (s.access_jwt.clone(), s.info.did.clone()))
            .ok_or(ClientError::NotAuthenticated)
    }

    /// Attach the bearer token when a session exists.
    async fn with_optional_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.read().await.as_ref() {
            Some(session) => request.bearer_auth(&session.access_jwt),
            None => request,
        }
    }
}

/// Decode a successful XRPC body or turn an error body into [`ClientError::Xrpc`].
async fn decode<T: DeserializeOwned>(
    nsid: &str,
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let detail: XrpcErrorBody = serde_json::from_str(&body).unwrap_or_default();
        return Err(ClientError::Xrpc {
            nsid: nsid.to_owned(),
            status: status.as_u16(),
            error: detail
                .error
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_owned()),
            message: detail.message.unwrap_or_default(),
        });
    }
    serde_json::from_str(&body).map_err(|e| ClientError::Parse(format!("{nsid}: {e}")))
}

#[async_trait]
impl AtpClient for XrpcClient {
    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionInfo, ClientError> {
        let response = self
            .http
            .post(self.endpoint(CREATE_SESSION))
            .json(&CreateSessionInput {
                identifier,
                password,
            })
            .send()
            .await?;
        let output: CreateSessionOutput = decode(CREATE_SESSION, response).await?;
        let info = SessionInfo {
            did: output.did,
            handle: output.handle,
        };
        *self.session.write().await = Some(StoredSession {
            info: info.clone(),
            access_jwt: output.access_jwt,
        });
        debug!(did = %info.did, "session created");
        Ok(info)
    }

    async fn resolve_handle(&self, handle: &Handle) -> Result<Did, ClientError> {
        let request = self
            .http
            .get(self.endpoint(RESOLVE_HANDLE))
            .query(&[("handle", handle.as_str())]);
        let response = self.with_optional_auth(request).await.send().await?;
        let output: ResolveHandleOutput = decode(RESOLVE_HANDLE, response).await?;
        Ok(output.did)
    }

    async fn get_convo_for_members(&self, members: &[Did]) -> Result<ConvoView, ClientError> {
        let (token, _) = self.access().await?;
        let query: Vec<(&str, &str)> = members.iter().map(|did| ("members", did.as_str())).collect();
        let response = self
            .http
            .get(self.endpoint(GET_CONVO_FOR_MEMBERS))
            .header(PROXY_HEADER, &self.chat_proxy)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;
        let output: ConvoOutput = decode(GET_CONVO_FOR_MEMBERS, response).await?;
        Ok(ConvoView {
            id: output.convo.id,
            members: output.convo.members.into_iter().map(|m| m.did).collect(),
        })
    }

    async fn send_message(
        &self,
        convo_id: &ConvoId,
        message: &MessageInput,
    ) -> Result<MessageView, ClientError> {
        let (token, _) = self.access().await?;
        let response = self
            .http
            .post(self.endpoint(SEND_MESSAGE))
            .header(PROXY_HEADER, &self.chat_proxy)
            .bearer_auth(token)
            .json(&SendMessageInput { convo_id, message })
            .send()
            .await?;
        decode(SEND_MESSAGE, response).await
    }

    async fn create_post(&self, post: &PostRecord) -> Result<StrongRef, ClientError> {
        let (token, did) = self.access().await?;
        let response = self
            .http
            .post(self.endpoint(CREATE_RECORD))
            .bearer_auth(token)
            .json(&CreateRecordInput {
                repo: &did,
                collection: POST_COLLECTION,
                record: post,
            })
            .send()
            .await?;
        decode(CREATE_RECORD, response).await
    }

    async fn list_posts(
        &self,
        actor: &Identifier,
        limit: u32,
    ) -> Result<Vec<StrongRef>, ClientError> {
        let repo = actor.to_string();
        let limit = limit.to_string();
        let request = self.http.get(self.endpoint(LIST_RECORDS)).query(&[
            ("repo", repo.as_str()),
            ("collection", POST_COLLECTION),
            ("limit", limit.as_str()),
        ]);
        let response = self.with_optional_auth(request).await.send().await?;
        let output: ListRecordsOutput = decode(LIST_RECORDS, response).await?;
        Ok(output.records)
    }
}
