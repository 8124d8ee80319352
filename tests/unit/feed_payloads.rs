//! Unit tests for decoding and classifying feed documents

use chrono::{TimeZone, Utc};
use hn_ingest::feed::{classify, RawItem};
use hn_ingest::{Entity, ItemKind};

fn decode(json: &str) -> RawItem {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_story_document() {
    let raw = decode(
        r#"{"by":"dhouston","descendants":71,"id":8863,"kids":[9224,8917],
            "score":104,"time":1175714200,"title":"My YC app: Dropbox",
            "type":"story","url":"http://www.getdropbox.com/u/2/screencast.html"}"#,
    );
    let fetched_at = Utc::now();

    match classify(raw, fetched_at).unwrap() {
        Entity::Story(story) => {
            assert_eq!(story.header.id, 8863);
            assert_eq!(story.header.kind, ItemKind::Story);
            assert_eq!(story.header.author.as_deref(), Some("dhouston"));
            assert_eq!(
                story.header.created_at,
                Utc.timestamp_opt(1_175_714_200, 0).unwrap()
            );
            assert_eq!(story.header.children, vec![9224, 8917]);
            assert_eq!(story.header.fetched_at, fetched_at);
            assert_eq!(story.score, 104);
            assert_eq!(story.descendants, 71);
            assert_eq!(story.text, "");
            assert!(story.url.is_some());
        }
        other => panic!("expected story, got {other:?}"),
    }
}

#[test]
fn test_ask_and_job_documents_share_story_fields() {
    let ask = decode(
        r#"{"by":"tel","id":121003,"score":25,"text":"<i>or</i> HN: the Next Iteration",
            "time":1203647620,"title":"Ask HN: The Arc Effect","type":"story"}"#,
    );
    let job = decode(
        r#"{"by":"justin","id":192327,"score":6,"text":"Justin.tv is looking for a Lead Flash Engineer!",
            "time":1210981217,"title":"Justin.tv is looking for a Lead Flash Engineer!","type":"job","url":""}"#,
    );

    let Entity::Story(ask) = classify(ask, Utc::now()).unwrap() else {
        panic!("ask should classify as story");
    };
    assert_eq!(ask.descendants, 0);
    assert!(ask.text.contains("Next Iteration"));

    let Entity::Story(job) = classify(job, Utc::now()).unwrap() else {
        panic!("job should classify as story");
    };
    assert_eq!(job.header.kind, ItemKind::Job);
}

#[test]
fn test_poll_and_option_documents() {
    let poll = decode(
        r#"{"by":"pg","descendants":54,"id":126809,"kids":[126822,126823],
            "parts":[126810,126811,126812],"score":46,"text":"","time":1204403652,
            "title":"Poll: What would happen if News.YC had explicit support for polls?","type":"poll"}"#,
    );
    let option = decode(
        r#"{"by":"pg","id":160705,"poll":160704,"score":335,"text":"Yes, ban them; I'm tired of seeing Valleywag stories on News.YC.",
            "time":1207886576,"type":"pollopt"}"#,
    );

    let Entity::Story(poll) = classify(poll, Utc::now()).unwrap() else {
        panic!("poll should classify as story");
    };
    assert_eq!(poll.header.kind, ItemKind::Poll);
    assert_eq!(poll.header.children, vec![126822, 126823], "parts are not children");

    let Entity::PollOption(option) = classify(option, Utc::now()).unwrap() else {
        panic!("pollopt should classify as poll option");
    };
    assert_eq!(option.poll, 160704);
    assert_eq!(option.score, 335);
    assert!(option.header.children.is_empty());
}

#[test]
fn test_comment_document() {
    let raw = decode(
        r#"{"by":"norvig","id":2921983,"kids":[2922097,2922429],"parent":2921506,
            "text":"Aw shucks, guys ... you make me blush","time":1314211127,"type":"comment"}"#,
    );

    let Entity::Comment(comment) = classify(raw, Utc::now()).unwrap() else {
        panic!("expected comment");
    };
    assert_eq!(comment.parent, 2921506);
    assert_eq!(comment.header.children.len(), 2);
    assert!(!comment.dead);
    assert!(!comment.deleted);
}

#[test]
fn test_deleted_comment_keeps_defaults() {
    let raw = decode(r#"{"id":42,"deleted":true,"type":"comment","time":1314211127}"#);

    let Entity::Comment(comment) = classify(raw, Utc::now()).unwrap() else {
        panic!("expected comment");
    };
    assert!(comment.deleted);
    assert_eq!(comment.parent, 0);
    assert_eq!(comment.text, "");
    assert!(comment.header.author.is_none());
}

#[test]
fn test_unknown_kind_is_reported() {
    let raw = decode(r#"{"id":77,"type":"launch","time":1}"#);
    let err = classify(raw, Utc::now()).unwrap_err();
    assert_eq!(err.id, 77);
    assert_eq!(err.kind, "launch");
}

#[test]
fn test_null_document_is_not_an_item() {
    let raw: Option<RawItem> = serde_json::from_str("null").unwrap();
    assert!(raw.is_none());
}
