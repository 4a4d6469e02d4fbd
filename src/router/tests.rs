use serde_json::{Value, json};
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use super::topic::Topic;
use super::{Connection, ConnectionId, TopicRouter};

fn connect(router: &mut TopicRouter) -> (ConnectionId, mpsc::UnboundedReceiver<WsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection = Connection::new(tx);
    let id = connection.id.clone();
    router.register(connection);
    (id, rx)
}

fn frame_json(frame: WsMessage) -> Value {
    match frame {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected a text frame, got {other:?}"),
    }
}

#[test]
fn test_topic_join_and_leave() {
    let mut topic = Topic::new("all jobs");
    assert!(topic.join("c1".to_string()));
    assert!(!topic.join("c1".to_string()));
    assert!(topic.leave(&"c1".to_string()));
    assert!(!topic.leave(&"c1".to_string()));
    assert!(topic.is_empty());
}

#[test]
fn test_router_register_and_disconnect() {
    let mut router = TopicRouter::new();
    let (id, _rx) = connect(&mut router);
    assert!(router.is_registered(&id));
    assert_eq!(router.connection_count(), 1);

    router.disconnect(&id);
    assert!(!router.is_registered(&id));
    assert_eq!(router.connection_count(), 0);

    // second call is a no-op
    router.disconnect(&id);
}

#[test]
fn test_join_is_idempotent() {
    let mut router = TopicRouter::new();
    let (id, _rx) = connect(&mut router);

    assert!(router.join(&id, "all jobs"));
    assert!(!router.join(&id, "all jobs"));

    assert_eq!(router.members("all jobs"), vec![id.clone()]);
    assert_eq!(router.topics_of(&id), vec!["all jobs".to_string()]);
}

#[test]
fn test_leave_non_member_is_noop() {
    let mut router = TopicRouter::new();
    let (id, _rx) = connect(&mut router);
    let (other, _other_rx) = connect(&mut router);
    router.join(&other, "category:delivery");

    assert!(!router.leave(&id, "category:delivery"));
    assert!(!router.leave(&id, "never-created"));
    assert_eq!(router.members("category:delivery"), vec![other]);
}

#[test]
fn test_join_from_unregistered_connection_is_refused() {
    let mut router = TopicRouter::new();
    assert!(!router.join(&"ghost".to_string(), "all jobs"));
    assert!(router.members("all jobs").is_empty());
}

#[test]
fn test_empty_topic_is_dropped() {
    let mut router = TopicRouter::new();
    let (id, _rx) = connect(&mut router);
    router.join(&id, "user:7");
    router.leave(&id, "user:7");
    assert!(!router.topics.contains_key("user:7"));
}

#[test]
fn test_publish_reaches_every_member_once() {
    let mut router = TopicRouter::new();
    let (a, mut rx_a) = connect(&mut router);
    let (b, mut rx_b) = connect(&mut router);
    let (_c, mut rx_c) = connect(&mut router);
    router.join(&a, "all jobs");
    router.join(&b, "all jobs");

    let delivered = router.publish("all jobs", "job removed", &json!("job1"));
    assert_eq!(delivered, 2);

    for rx in [&mut rx_a, &mut rx_b] {
        let value = frame_json(rx.try_recv().unwrap());
        assert_eq!(value, json!({"event": "job removed", "data": "job1"}));
        assert!(rx.try_recv().is_err());
    }
    assert!(rx_c.try_recv().is_err());
}

#[test]
fn test_publish_preserves_order_per_topic() {
    let mut router = TopicRouter::new();
    let (id, mut rx) = connect(&mut router);
    router.join(&id, "category:delivery");

    router.publish("category:delivery", "job removed", &json!("first"));
    router.publish("category:delivery", "job removed", &json!("second"));

    assert_eq!(frame_json(rx.try_recv().unwrap())["data"], "first");
    assert_eq!(frame_json(rx.try_recv().unwrap())["data"], "second");
}

#[test]
fn test_publish_to_topic_without_members() {
    let router = TopicRouter::new();
    assert_eq!(router.publish("category:none", "new job", &json!({})), 0);
}

#[test]
fn test_late_joiner_gets_no_replay() {
    let mut router = TopicRouter::new();
    let (early, mut early_rx) = connect(&mut router);
    router.join(&early, "all jobs");
    router.publish("all jobs", "job expired", &json!("job1"));

    let (late, mut late_rx) = connect(&mut router);
    router.join(&late, "all jobs");

    assert!(early_rx.try_recv().is_ok());
    assert!(late_rx.try_recv().is_err());
}

#[test]
fn test_publish_to_closed_channel_is_dropped() {
    let mut router = TopicRouter::new();
    let (gone, gone_rx) = connect(&mut router);
    let (alive, mut alive_rx) = connect(&mut router);
    router.join(&gone, "all jobs");
    router.join(&alive, "all jobs");
    drop(gone_rx);

    assert_eq!(router.publish("all jobs", "job removed", &json!("x")), 1);
    assert!(alive_rx.try_recv().is_ok());
}

#[test]
fn test_disconnect_clears_every_membership() {
    let mut router = TopicRouter::new();
    let (id, mut rx) = connect(&mut router);
    let (other, _other_rx) = connect(&mut router);
    router.join(&id, "all jobs");
    router.join(&id, "category:delivery");
    router.join(&other, "all jobs");

    router.disconnect(&id);

    assert_eq!(router.members("all jobs"), vec![other]);
    assert!(router.members("category:delivery").is_empty());
    assert_eq!(router.publish("category:delivery", "new job", &json!({})), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_unsubscribed_connection_receives_nothing_further() {
    let mut router = TopicRouter::new();
    let (id, mut rx) = connect(&mut router);
    router.join(&id, "all jobs");
    router.join(&id, "category:delivery");

    router.leave(&id, "category:delivery");
    router.leave(&id, "all jobs");

    router.publish("all jobs", "job removed", &json!("a"));
    router.publish("category:delivery", "job removed", &json!("a"));
    assert!(rx.try_recv().is_err());
    assert!(router.topics_of(&id).is_empty());
}

#[test]
fn test_publish_to_several_topics_delivers_once_per_connection() {
    let mut router = TopicRouter::new();
    let (both, mut rx_both) = connect(&mut router);
    let (category_only, mut rx_category) = connect(&mut router);
    let (all_only, mut rx_all) = connect(&mut router);
    router.join(&both, "category:delivery");
    router.join(&both, "all jobs");
    router.join(&category_only, "category:delivery");
    router.join(&all_only, "all jobs");

    let delivered = router.publish_to(
        &["category:delivery", "all jobs"],
        "job expired",
        &json!("job1"),
    );
    assert_eq!(delivered, 3);

    for rx in [&mut rx_both, &mut rx_category, &mut rx_all] {
        assert_eq!(frame_json(rx.try_recv().unwrap())["data"], "job1");
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn test_publish_except_skips_members_of_excluded_topics() {
    let mut router = TopicRouter::new();
    let (old_only, mut rx_old) = connect(&mut router);
    let (old_and_all, mut rx_old_and_all) = connect(&mut router);
    router.join(&old_only, "category:delivery");
    router.join(&old_and_all, "category:delivery");
    router.join(&old_and_all, "all jobs");

    let delivered = router.publish_except(
        &["category:delivery"],
        &["category:cleaning", "all jobs"],
        "job removed",
        &json!("job1"),
    );
    assert_eq!(delivered, 1);

    assert_eq!(frame_json(rx_old.try_recv().unwrap())["event"], "job removed");
    assert!(rx_old_and_all.try_recv().is_err());
}
