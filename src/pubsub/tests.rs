use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};

use crate::{
    auth::{AccessToken, TokenProvider},
    error::{AuthError, PubSubError},
    net::tests::{EdgeOptions, MockEdge, WAIT, init_tracing},
    protocol::{messages::PubSubMessage, topic::TopicType},
    pubsub::PubSubClient,
};

const QUIET: Duration = Duration::from_millis(200);

/// Token provider whose validity and user can be flipped from the test.
struct FakeTokens {
    user_id: Mutex<String>,
    valid: AtomicBool,
    valid_after_refresh: bool,
    refreshable: bool,
    refreshes: AtomicUsize,
}

impl FakeTokens {
    fn valid(user_id: &str) -> Arc<Self> {
        Arc::new(Self {
            user_id: Mutex::new(user_id.to_string()),
            valid: AtomicBool::new(true),
            valid_after_refresh: true,
            refreshable: false,
            refreshes: AtomicUsize::new(0),
        })
    }

    fn expired(user_id: &str, refreshable: bool, valid_after_refresh: bool) -> Arc<Self> {
        Arc::new(Self {
            user_id: Mutex::new(user_id.to_string()),
            valid: AtomicBool::new(false),
            valid_after_refresh,
            refreshable,
            refreshes: AtomicUsize::new(0),
        })
    }

    fn switch_user(&self, user_id: &str) {
        *self.user_id.lock().unwrap() = user_id.to_string();
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn access_token(&self, _scope: Option<&str>) -> Result<AccessToken, AuthError> {
        let secret = if self.valid.load(Ordering::SeqCst) { "secret" } else { "" };
        Ok(AccessToken::new(secret, self.user_id.lock().unwrap().clone()))
    }

    fn supports_refresh(&self) -> bool {
        self.refreshable
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.valid.store(self.valid_after_refresh, Ordering::SeqCst);
        Ok(())
    }
}

fn bits_payload(bits: u64) -> Value {
    json!({
        "data": {
            "user_name": "viewer",
            "user_id": "7",
            "channel_id": "42",
            "channel_name": "streamer",
            "chat_message": format!("cheer{bits}"),
            "bits_used": bits,
            "total_bits_used": bits,
            "context": "cheer"
        },
        "version": "1.0",
        "message_type": "bits_event",
        "message_id": "m-1"
    })
}

async fn setup(tokens: Arc<FakeTokens>) -> (MockEdge, PubSubClient) {
    init_tracing();
    let edge = MockEdge::spawn(EdgeOptions::default()).await;
    let client = PubSubClient::new(edge.config(), tokens);
    (edge, client)
}

#[tokio::test]
async fn shared_topic_is_listened_once() {
    let (mut edge, client) = setup(FakeTokens::valid("42")).await;

    let first = client.on_bits(|_| {}).await.unwrap();
    let frame = edge.expect_packet("LISTEN").await;
    assert_eq!(frame.topics(), vec!["channel-bits-events-v1.42"]);
    assert_eq!(frame.packet["data"]["auth_token"], "secret");

    let second = client.on_bits(|_| {}).await.unwrap();
    sleep(QUIET).await;
    assert!(edge.drain_packets("LISTEN").is_empty());
    assert_eq!(client.listener_count(), 2);
    assert_eq!(first.topic(), second.topic());
    assert_eq!(first.user_id(), "42");
    assert_eq!(first.topic_type(), TopicType::Bits);
}

#[tokio::test]
async fn concurrent_first_listeners_listen_once() {
    let (mut edge, client) = setup(FakeTokens::valid("42")).await;

    let (a, b) = tokio::join!(client.on_whisper(|_| {}), client.on_whisper(|_| {}));
    a.unwrap();
    b.unwrap();

    edge.expect_packet("LISTEN").await;
    sleep(QUIET).await;
    assert!(edge.drain_packets("LISTEN").is_empty());
}

#[tokio::test]
async fn only_last_removal_unlistens() {
    let (mut edge, client) = setup(FakeTokens::valid("42")).await;
    let first = client.on_subscription(|_| {}).await.unwrap();
    let second = client.on_subscription(|_| {}).await.unwrap();

    client.remove_listener(&first).await.unwrap();
    assert!(first.is_removed());
    sleep(QUIET).await;
    assert!(edge.drain_packets("UNLISTEN").is_empty());
    assert_eq!(client.listener_count(), 1);

    client.remove_listener(&second).await.unwrap();
    let frame = edge.expect_packet("UNLISTEN").await;
    assert_eq!(frame.topics(), vec!["channel-subscribe-events-v1.42"]);
    assert_eq!(client.listener_count(), 0);
}

#[tokio::test]
async fn removing_twice_is_a_no_op() {
    let (mut edge, client) = setup(FakeTokens::valid("42")).await;
    let handle = client.on_commerce(|_| {}).await.unwrap();

    handle.remove().await.unwrap();
    handle.remove().await.unwrap();
    client.remove_listener(&handle).await.unwrap();

    edge.expect_packet("UNLISTEN").await;
    sleep(QUIET).await;
    assert!(edge.drain_packets("UNLISTEN").is_empty());
}

#[tokio::test]
async fn relisten_after_full_removal() {
    let (mut edge, client) = setup(FakeTokens::valid("42")).await;
    let handle = client.on_bits(|_| {}).await.unwrap();
    edge.expect_packet("LISTEN").await;
    handle.remove().await.unwrap();
    edge.expect_packet("UNLISTEN").await;

    client.on_bits(|_| {}).await.unwrap();
    assert_eq!(edge.expect_packet("LISTEN").await.topics(), vec!["channel-bits-events-v1.42"]);
}

#[tokio::test]
async fn foreign_handles_are_ignored() {
    let (mut edge, client) = setup(FakeTokens::valid("42")).await;
    let other = PubSubClient::new(edge.config(), FakeTokens::valid("42"));
    let handle = client.on_bits(|_| {}).await.unwrap();

    other.remove_listener(&handle).await.unwrap();
    assert!(!handle.is_removed());
    assert_eq!(client.listener_count(), 1);
    sleep(QUIET).await;
    assert!(edge.drain_packets("UNLISTEN").is_empty());
}

#[tokio::test]
async fn bits_message_reaches_typed_callback() {
    let (edge, client) = setup(FakeTokens::valid("42")).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .on_bits(move |m| {
            tx.send((m.channel_id().to_string(), m.bits(), m.user_name().map(str::to_string))).unwrap();
        })
        .await
        .unwrap();

    edge.send_message("channel-bits-events-v1.42", &bits_payload(300));

    let (channel, bits, user) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(channel, "42");
    assert_eq!(bits, 300);
    assert_eq!(user.as_deref(), Some("viewer"));
}

#[tokio::test]
async fn callbacks_run_in_registration_order() {
    let (edge, client) = setup(FakeTokens::valid("42")).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    for label in ["a", "b", "c"] {
        let seen = Arc::clone(&seen);
        let tx = tx.clone();
        client
            .add_listener(
                TopicType::Bits,
                move |message| {
                    assert!(matches!(message, PubSubMessage::Bits(_)));
                    seen.lock().unwrap().push(label);
                    let _ = tx.send(());
                },
                None,
            )
            .await
            .unwrap();
    }

    edge.send_message("channel-bits-events-v1.42", &bits_payload(1));
    for _ in 0..3 {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn removed_listener_stops_receiving() {
    let (edge, client) = setup(FakeTokens::valid("42")).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tx_gone = tx.clone();
    let gone = client.on_bits(move |_| tx_gone.send("gone").unwrap()).await.unwrap();
    client.on_bits(move |_| tx.send("kept").unwrap()).await.unwrap();
    gone.remove().await.unwrap();

    edge.send_message("channel-bits-events-v1.42", &bits_payload(5));
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some("kept"));
    sleep(QUIET).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unroutable_messages_are_dropped() {
    let (edge, client) = setup(FakeTokens::valid("42")).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_bits(move |m| tx.send(m.bits()).unwrap()).await.unwrap();

    // unknown prefix, no dot, unregistered type, other user, undecodable payload
    edge.send_message("video-playback.42", &json!({"type": "viewcount"}));
    edge.send_message("channel-bits-events-v1", &bits_payload(1));
    edge.send_message("whispers.42", &json!({"type": "whisper_received"}));
    edge.send_message("channel-bits-events-v1.99", &bits_payload(2));
    edge.send_message("channel-bits-events-v1.42", &json!({"data": {"bits_used": "lots"}}));
    edge.send_message("channel-bits-events-v1.42", &bits_payload(3));

    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(3));
    sleep(QUIET).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn different_users_get_separate_listens() {
    let tokens = FakeTokens::valid("1");
    let (mut edge, client) = setup(Arc::clone(&tokens)).await;

    let one = client.on_redemption(|_| {}).await.unwrap();
    tokens.switch_user("2");
    let two = client.on_redemption(|_| {}).await.unwrap();

    let mut topics: Vec<String> = vec![
        edge.expect_packet("LISTEN").await.topics().remove(0),
        edge.expect_packet("LISTEN").await.topics().remove(0),
    ];
    topics.sort();
    assert_eq!(topics, vec!["channel-points-channel-v1.1", "channel-points-channel-v1.2"]);
    assert_ne!(one.topic(), two.topic());
}

#[tokio::test]
async fn invalid_token_is_refreshed_once() {
    let tokens = FakeTokens::expired("42", true, true);
    let (mut edge, client) = setup(Arc::clone(&tokens)).await;

    client.on_bits(|_| {}).await.unwrap();
    assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    edge.expect_packet("LISTEN").await;
}

#[tokio::test]
async fn still_invalid_after_refresh_fails() {
    let tokens = FakeTokens::expired("42", true, false);
    let (mut edge, client) = setup(Arc::clone(&tokens)).await;

    let err = client.on_bits(|_| {}).await.unwrap_err();
    assert!(matches!(err, PubSubError::Auth(AuthError::InvalidToken { scope: Some(ref s) }) if s == "bits:read"));
    assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    sleep(QUIET).await;
    assert!(edge.drain_packets("LISTEN").is_empty());
    assert_eq!(client.listener_count(), 0);
}

#[tokio::test]
async fn invalid_token_without_refresh_support_fails() {
    let tokens = FakeTokens::expired("42", false, true);
    let (_edge, client) = setup(Arc::clone(&tokens)).await;

    let err = client.on_commerce(|_| {}).await.unwrap_err();
    assert!(matches!(err, PubSubError::Auth(AuthError::InvalidToken { scope: None })));
    assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_listen_registers_nothing() {
    init_tracing();
    let edge = MockEdge::spawn(EdgeOptions { reject_with: Some("ERR_BADAUTH".into()), ..EdgeOptions::default() }).await;
    let client = PubSubClient::new(edge.config(), FakeTokens::valid("42"));

    let err = client.on_whisper(|_| {}).await.unwrap_err();
    assert!(matches!(err, PubSubError::Rejected(ref e) if e == "ERR_BADAUTH"));
    assert_eq!(client.listener_count(), 0);
}

#[tokio::test]
async fn handle_outliving_client_removes_quietly() {
    let (_edge, client) = setup(FakeTokens::valid("42")).await;
    let handle = client.on_bits(|_| {}).await.unwrap();
    drop(client);

    handle.remove().await.unwrap();
    assert!(handle.is_removed());
}
