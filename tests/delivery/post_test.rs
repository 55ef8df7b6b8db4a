//! Tests for the random post and random reply pipelines.

use std::io::Write as _;
use std::path::Path;

use serde_json::json;
use tempfile::NamedTempFile;

use skybot::delivery::{Credentials, Delivery, DeliveryReport, IndexSource, PostFile, RngIndex};
use skybot::error::ErrorKind;

use crate::mock_client::{strong_ref, Call, MockClient, CREATED_CID, CREATED_URI};

const LATEST_URI: &str = "at://did:plc:bob/app.bsky.feed.post/3klatest";

fn credentials() -> Credentials {
    Credentials::new("sender.test", "app-password")
}

fn post_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write posts");
    file
}

/// Always picks the same index.
struct Fixed(usize);

impl IndexSource for Fixed {
    fn next_index(&mut self, _len: usize) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// random
// ---------------------------------------------------------------------------

#[tokio::test]
async fn seeded_selection_posts_that_line() {
    let file = post_file("good morning\n\nhave a nice day\nstay hydrated\n");
    let expected = PostFile::load(file.path())
        .expect("loads")
        .pick(&mut RngIndex::seeded(42))
        .to_owned();

    let client = MockClient::new();
    let report = Delivery::new(&client)
        .post_random(&credentials(), file.path(), &mut RngIndex::seeded(42))
        .await
        .expect("posted");

    let posts = client.created_posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["$type"], "app.bsky.feed.post");
    assert_eq!(posts[0]["text"], expected.as_str());
    assert!(posts[0].get("facets").is_none());
    assert!(posts[0].get("reply").is_none());
    assert!(posts[0]["createdAt"].as_str().is_some_and(|t| t.ends_with('Z')));
    assert!(matches!(report, DeliveryReport::PostCreated { .. }));
}

#[tokio::test]
async fn picked_line_is_compiled() {
    let file = post_file("plain\nread [this](https://example.com) #now\n");
    let client = MockClient::new();

    Delivery::new(&client)
        .post_random(&credentials(), file.path(), &mut Fixed(1))
        .await
        .expect("posted");

    let post = &client.created_posts()[0];
    assert_eq!(post["text"], "read this #now");
    assert_eq!(post["facets"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn report_names_record() {
    let file = post_file("hello\n");
    let client = MockClient::new();

    let report = Delivery::new(&client)
        .post_random(&credentials(), file.path(), &mut Fixed(0))
        .await
        .expect("posted");

    assert_eq!(
        report.to_string(),
        format!("Post created: {CREATED_URI} - {CREATED_CID}")
    );
}

#[tokio::test]
async fn missing_file_fails_before_login() {
    let client = MockClient::new();
    let err = Delivery::new(&client)
        .post_random(
            &credentials(),
            Path::new("/definitely/not/here/posts.txt"),
            &mut Fixed(0),
        )
        .await
        .expect_err("no file");

    assert_eq!(err.kind(), ErrorKind::PostFile);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn blank_file_is_post_file_error() {
    let file = post_file("\n   \n\n");
    let client = MockClient::new();
    let err = Delivery::new(&client)
        .post_random(&credentials(), file.path(), &mut Fixed(0))
        .await
        .expect_err("nothing to post");

    assert_eq!(err.kind(), ErrorKind::PostFile);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn rejected_login_posts_nothing() {
    let file = post_file("hello\n");
    let client = MockClient::new().rejecting_login();
    let err = Delivery::new(&client)
        .post_random(&credentials(), file.path(), &mut Fixed(0))
        .await
        .expect_err("login rejected");

    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert!(client.created_posts().is_empty());
}

// ---------------------------------------------------------------------------
// random reply
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reply_targets_latest_post_as_root_and_parent() {
    let file = post_file("nice post!\n");
    let client = MockClient::new().with_posts(
        "bob.test",
        vec![
            strong_ref(LATEST_URI, "bafylatest"),
            strong_ref("at://did:plc:bob/app.bsky.feed.post/3kolder", "bafyolder"),
        ],
    );

    Delivery::new(&client)
        .reply_random(&credentials(), file.path(), "@bob.test", &mut Fixed(0))
        .await
        .expect("replied");

    assert!(client.calls().contains(&Call::ListPosts {
        actor: "bob.test".to_owned(),
        limit: 1,
    }));
    let post = &client.created_posts()[0];
    let target = json!({ "uri": LATEST_URI, "cid": "bafylatest" });
    assert_eq!(post["reply"], json!({ "root": target, "parent": target }));
    assert_eq!(post["text"], "nice post!");
}

#[tokio::test]
async fn reply_to_silent_account_is_no_posts() {
    let file = post_file("hello\n");
    let client = MockClient::new();
    let err = Delivery::new(&client)
        .reply_random(&credentials(), file.path(), "quiet.test", &mut Fixed(0))
        .await
        .expect_err("nothing to reply to");

    assert_eq!(err.kind(), ErrorKind::NoPosts);
    assert!(client.created_posts().is_empty());
}

#[tokio::test]
async fn reply_target_syntax_checked_before_login() {
    let file = post_file("hello\n");
    let client = MockClient::new();
    let err = Delivery::new(&client)
        .reply_random(&credentials(), file.path(), "not a handle", &mut Fixed(0))
        .await
        .expect_err("invalid target");

    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    assert!(client.calls().is_empty());
}
