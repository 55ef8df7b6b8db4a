//! Tests for the HTTP XRPC client against a mock server.

use chrono::Utc;
use mockito::{Matcher, ServerGuard};
use serde_json::json;
use url::Url;

use skybot::client::xrpc::{XrpcClient, DEFAULT_CHAT_PROXY};
use skybot::client::{AtpClient, ClientError, MessageInput, PostRecord};
use skybot::config::HttpConfig;
use skybot::conversation::ConvoId;
use skybot::identity::{Did, Handle, Identifier};
use skybot::richtext::compile;

fn client_for(server: &ServerGuard) -> XrpcClient {
    let base = Url::parse(&format!("{}/", server.url())).expect("server url");
    XrpcClient::new(&base, DEFAULT_CHAT_PROXY, &HttpConfig::default())
}

async fn signed_in(server: &mut ServerGuard) -> XrpcClient {
    server
        .mock("POST", "/xrpc/com.atproto.server.createSession")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "did": "did:plc:me",
                "handle": "me.test",
                "accessJwt": "jwt-access",
                "refreshJwt": "jwt-refresh"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let client = client_for(server);
    client
        .authenticate("me.test", "app-password")
        .await
        .expect("login");
    client
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authenticate_stores_session() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/xrpc/com.atproto.server.createSession")
        .match_body(Matcher::Json(json!({
            "identifier": "me.test",
            "password": "app-password"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "did": "did:plc:me", "handle": "me.test", "accessJwt": "jwt-access" })
                .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    assert!(client.session().await.is_none());
    let info = client
        .authenticate("me.test", "app-password")
        .await
        .expect("login");

    assert_eq!(info.did.as_str(), "did:plc:me");
    assert_eq!(client.session().await, Some(info));
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_login_surfaces_xrpc_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/xrpc/com.atproto.server.createSession")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "error": "AuthenticationRequired", "message": "Invalid identifier or password" })
                .to_string(),
        )
        .create_async()
        .await;

    let err = client_for(&server)
        .authenticate("me.test", "wrong")
        .await
        .expect_err("rejected");

    assert!(matches!(
        err,
        ClientError::Xrpc { status: 401, ref error, .. } if error == "AuthenticationRequired"
    ));
}

#[tokio::test]
async fn chat_calls_require_session() {
    let server = mockito::Server::new_async().await;
    let client = client_for(&server);
    let err = client
        .get_convo_for_members(&[Did::parse("did:plc:a").expect("valid")])
        .await
        .expect_err("not signed in");
    assert!(matches!(err, ClientError::NotAuthenticated));
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolve_handle_queries_by_handle() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/xrpc/com.atproto.identity.resolveHandle")
        .match_query(Matcher::UrlEncoded("handle".into(), "alice.test".into()))
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "did": "did:plc:alice" }).to_string())
        .create_async()
        .await;

    let did = client_for(&server)
        .resolve_handle(&Handle::parse("alice.test").expect("valid"))
        .await
        .expect("resolves");

    assert_eq!(did.as_str(), "did:plc:alice");
    mock.assert_async().await;
}

#[tokio::test]
async fn error_without_json_body_uses_status_reason() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/xrpc/com.atproto.identity.resolveHandle")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("upstream down")
        .create_async()
        .await;

    let err = client_for(&server)
        .resolve_handle(&Handle::parse("alice.test").expect("valid"))
        .await
        .expect_err("bad gateway");

    assert!(matches!(
        err,
        ClientError::Xrpc { status: 502, ref error, ref message, .. }
            if error == "Bad Gateway" && message.is_empty()
    ));
}

#[tokio::test]
async fn invalid_did_in_response_is_parse_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/xrpc/com.atproto.identity.resolveHandle")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "did": "not-a-did" }).to_string())
        .create_async()
        .await;

    let err = client_for(&server)
        .resolve_handle(&Handle::parse("alice.test").expect("valid"))
        .await
        .expect_err("bad did");
    assert!(matches!(err, ClientError::Parse(_)));
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn convo_lookup_is_proxied_with_all_members() {
    let mut server = mockito::Server::new_async().await;
    let client = signed_in(&mut server).await;
    let mock = server
        .mock("GET", "/xrpc/chat.bsky.convo.getConvoForMembers")
        .match_header("atproto-proxy", DEFAULT_CHAT_PROXY)
        .match_header("authorization", "Bearer jwt-access")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("members".into(), "did:plc:a".into()),
            Matcher::UrlEncoded("members".into(), "did:plc:b".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "convo": {
                    "id": "3kconvo",
                    "rev": "1",
                    "members": [{ "did": "did:plc:me" }, { "did": "did:plc:a" }, { "did": "did:plc:b" }]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let members = [
        Did::parse("did:plc:a").expect("valid"),
        Did::parse("did:plc:b").expect("valid"),
    ];
    let convo = client.get_convo_for_members(&members).await.expect("convo");

    assert_eq!(convo.id, ConvoId::new("3kconvo"));
    assert_eq!(convo.members.len(), 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn send_message_posts_convo_and_message() {
    let mut server = mockito::Server::new_async().await;
    let client = signed_in(&mut server).await;
    let mock = server
        .mock("POST", "/xrpc/chat.bsky.convo.sendMessage")
        .match_header("atproto-proxy", DEFAULT_CHAT_PROXY)
        .match_body(Matcher::Json(json!({
            "convoId": "3kconvo",
            "message": { "text": "hi" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "3kmsg",
                "rev": "2",
                "text": "hi",
                "sender": { "did": "did:plc:me" },
                "sentAt": "2024-05-01T12:00:00.000Z"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let message = MessageInput {
        text: compile("hi").expect("compiles"),
        embed: None,
    };
    let sent = client
        .send_message(&ConvoId::new("3kconvo"), &message)
        .await
        .expect("sent");

    assert_eq!(sent.id, "3kmsg");
    assert_eq!(sent.sent_at.as_deref(), Some("2024-05-01T12:00:00.000Z"));
    mock.assert_async().await;
}

// ---------------------------------------------------------------------------
// Repo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_post_writes_to_own_repo() {
    let mut server = mockito::Server::new_async().await;
    let client = signed_in(&mut server).await;
    let mock = server
        .mock("POST", "/xrpc/com.atproto.repo.createRecord")
        .match_header("authorization", "Bearer jwt-access")
        .match_body(Matcher::PartialJson(json!({
            "repo": "did:plc:me",
            "collection": "app.bsky.feed.post",
            "record": { "$type": "app.bsky.feed.post", "text": "hello" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "uri": "at://did:plc:me/app.bsky.feed.post/3kpost",
                "cid": "bafypost",
                "validationStatus": "valid"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let record = PostRecord {
        text: compile("hello").expect("compiles"),
        reply: None,
        created_at: Utc::now(),
    };
    let created = client.create_post(&record).await.expect("created");

    assert_eq!(created.uri().as_str(), "at://did:plc:me/app.bsky.feed.post/3kpost");
    assert_eq!(created.cid(), "bafypost");
    mock.assert_async().await;
}

#[tokio::test]
async fn list_posts_reads_record_refs() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/xrpc/com.atproto.repo.listRecords")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("repo".into(), "bob.test".into()),
            Matcher::UrlEncoded("collection".into(), "app.bsky.feed.post".into()),
            Matcher::UrlEncoded("limit".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "cursor": "3klatest",
                "records": [{
                    "uri": "at://did:plc:bob/app.bsky.feed.post/3klatest",
                    "cid": "bafylatest",
                    "value": { "$type": "app.bsky.feed.post", "text": "gm" }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let actor = Identifier::parse("bob.test").expect("valid");
    let posts = client_for(&server)
        .list_posts(&actor, 1)
        .await
        .expect("listed");

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].cid(), "bafylatest");
    mock.assert_async().await;
}
