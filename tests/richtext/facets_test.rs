//! Tests for facet wire serialization.

use serde_json::json;

use skybot::richtext::compile;

#[test]
fn link_facet_wire_shape() {
    let text = compile("hello [world](https://example.com)").expect("compiles");
    let value = serde_json::to_value(&text.facets()[0]).expect("serializes");
    assert_eq!(
        value,
        json!({
            "$type": "app.bsky.richtext.facet",
            "index": { "byteStart": 6, "byteEnd": 11 },
            "features": [
                { "$type": "app.bsky.richtext.facet#link", "uri": "https://example.com" }
            ]
        })
    );
}

#[test]
fn tag_facet_wire_shape() {
    let text = compile("#rust").expect("compiles");
    let value = serde_json::to_value(text.facets()).expect("serializes");
    assert_eq!(
        value,
        json!([{
            "$type": "app.bsky.richtext.facet",
            "index": { "byteStart": 0, "byteEnd": 5 },
            "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": "rust" }]
        }])
    );
}

#[test]
fn unresolved_mention_does_not_serialize() {
    let text = compile("hi @alice.test").expect("compiles");
    let err = serde_json::to_value(text.facets()).expect_err("mention has no did");
    assert!(err.to_string().contains("alice.test"), "got: {err}");
}

#[test]
fn unresolved_mentions_lists_handles() {
    let text = compile("@a.test and @b.test and #tag").expect("compiles");
    let handles: Vec<&str> = text.unresolved_mentions().map(|h| h.as_str()).collect();
    assert_eq!(handles, vec!["a.test", "b.test"]);
}
