use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::{
    auth::{AccessToken, TokenProvider},
    config::Config,
    error::{AuthError, PubSubError},
    net::client::BasicClient,
    protocol::{
        messages::{
            BitsBadgeUnlockMessage, BitsMessage, CommerceMessage, PubSubMessage, RedemptionMessage,
            SubscriptionMessage, WhisperMessage,
        },
        topic::{TopicType, split_topic},
    },
    pubsub::listener::ListenerHandle,
};

/// Registry key: one wire subscription per topic type and user id.
pub type TopicKey = (TopicType, String);

type Callback = Arc<dyn Fn(&PubSubMessage) + Send + Sync>;
type Registry = DashMap<TopicKey, Vec<Registration>>;

struct Registration {
    id: u64,
    callback: Callback,
}

pub(crate) struct Shared {
    connection: BasicClient,
    tokens: Arc<dyn TokenProvider>,
    registry: Arc<Registry>,
    // held across the listen/unlisten that creates or empties a bucket
    subscribe_lock: Mutex<()>,
    next_registration: AtomicU64,
}

impl Shared {
    pub(crate) async fn remove(&self, key: &TopicKey, id: u64, removed: &AtomicBool) -> Result<(), PubSubError> {
        if removed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _gate = self.subscribe_lock.lock().await;
        let now_empty = match self.registry.get_mut(key) {
            Some(mut bucket) => {
                bucket.retain(|r| r.id != id);
                bucket.is_empty()
            }
            None => return Ok(()),
        };
        if now_empty {
            self.registry.remove(key);
            let (topic_type, user_id) = key;
            let topic = topic_type.topic(user_id);
            tracing::debug!(%topic, "Last listener removed, unlistening");
            // the connection drops the topic from its replay set even when this fails
            if let Err(error) = self.connection.unlisten(vec![topic.clone()]).await {
                tracing::warn!(%topic, %error, "Unlisten failed");
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Typed listener registry over one push connection. Cloning shares the
/// connection and the registry.
#[derive(Clone)]
pub struct PubSubClient {
    shared: Arc<Shared>,
}

impl fmt::Debug for PubSubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSubClient")
            .field("connection", &self.shared.connection)
            .field("topics", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl PubSubClient {
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config, tokens: Arc<dyn TokenProvider>) -> Self {
        let connection = BasicClient::new(config);
        let registry: Arc<Registry> = Arc::new(DashMap::new());

        // callbacks run on their own task so slow user code never stalls the connection
        let (tx, rx) = mpsc::unbounded_channel::<(String, Value)>();
        connection.on_message(move |topic, payload| {
            let _ = tx.send((topic.to_string(), payload.clone()));
        });
        tokio::spawn(route_loop(Arc::clone(&registry), rx));

        let shared = Shared {
            connection,
            tokens,
            registry,
            subscribe_lock: Mutex::new(()),
            next_registration: AtomicU64::new(0),
        };
        Self { shared: Arc::new(shared) }
    }

    pub async fn connect(&self) -> Result<(), PubSubError> {
        self.shared.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.shared.connection.disconnect().await;
    }

    pub fn connection(&self) -> &BasicClient {
        &self.shared.connection
    }

    /// Number of live registrations across all topics.
    pub fn listener_count(&self) -> usize {
        self.shared.registry.iter().map(|bucket| bucket.len()).sum()
    }

    /// Registers `callback` for `topic_type` messages of the token owner.
    /// Only the first registration for a (type, user) pair goes on the wire.
    pub async fn add_listener<F>(
        &self,
        topic_type: TopicType,
        callback: F,
        scope: Option<&str>,
    ) -> Result<ListenerHandle, PubSubError>
    where
        F: Fn(&PubSubMessage) + Send + Sync + 'static,
    {
        self.connect().await?;
        let token = self.resolve_token(scope).await?;
        let key: TopicKey = (topic_type, token.user_id.clone());
        let id = self.shared.next_registration.fetch_add(1, Ordering::Relaxed);
        let registration = Registration { id, callback: Arc::new(callback) };

        {
            let _gate = self.shared.subscribe_lock.lock().await;
            if !self.shared.registry.contains_key(&key) {
                let topic = topic_type.topic(&token.user_id);
                tracing::debug!(%topic, "First listener, listening");
                self.shared.connection.listen(vec![topic], Some(token.access_token)).await?;
            }
            self.shared.registry.entry(key.clone()).or_default().push(registration);
        }

        Ok(ListenerHandle::new(Arc::downgrade(&self.shared), key, id))
    }

    /// Idempotent. Handles issued by another client are ignored.
    pub async fn remove_listener(&self, handle: &ListenerHandle) -> Result<(), PubSubError> {
        if !handle.belongs_to(&self.shared) {
            tracing::debug!(topic = %handle.topic(), "Ignoring handle from another client");
            return Ok(());
        }
        handle.remove().await
    }

    pub async fn on_bits<F>(&self, callback: F) -> Result<ListenerHandle, PubSubError>
    where
        F: Fn(&BitsMessage) + Send + Sync + 'static,
    {
        let topic_type = TopicType::Bits;
        self.add_listener(
            topic_type,
            move |message| {
                if let PubSubMessage::Bits(m) = message {
                    callback(m);
                }
            },
            topic_type.required_scope(),
        )
        .await
    }

    pub async fn on_bits_badge_unlock<F>(&self, callback: F) -> Result<ListenerHandle, PubSubError>
    where
        F: Fn(&BitsBadgeUnlockMessage) + Send + Sync + 'static,
    {
        let topic_type = TopicType::BitsBadgeUnlock;
        self.add_listener(
            topic_type,
            move |message| {
                if let PubSubMessage::BitsBadgeUnlock(m) = message {
                    callback(m);
                }
            },
            topic_type.required_scope(),
        )
        .await
    }

    pub async fn on_subscription<F>(&self, callback: F) -> Result<ListenerHandle, PubSubError>
    where
        F: Fn(&SubscriptionMessage) + Send + Sync + 'static,
    {
        let topic_type = TopicType::Subscription;
        self.add_listener(
            topic_type,
            move |message| {
                if let PubSubMessage::Subscription(m) = message {
                    callback(m);
                }
            },
            topic_type.required_scope(),
        )
        .await
    }

    pub async fn on_commerce<F>(&self, callback: F) -> Result<ListenerHandle, PubSubError>
    where
        F: Fn(&CommerceMessage) + Send + Sync + 'static,
    {
        let topic_type = TopicType::Commerce;
        self.add_listener(
            topic_type,
            move |message| {
                if let PubSubMessage::Commerce(m) = message {
                    callback(m);
                }
            },
            topic_type.required_scope(),
        )
        .await
    }

    pub async fn on_whisper<F>(&self, callback: F) -> Result<ListenerHandle, PubSubError>
    where
        F: Fn(&WhisperMessage) + Send + Sync + 'static,
    {
        let topic_type = TopicType::Whisper;
        self.add_listener(
            topic_type,
            move |message| {
                if let PubSubMessage::Whisper(m) = message {
                    callback(m);
                }
            },
            topic_type.required_scope(),
        )
        .await
    }

    pub async fn on_redemption<F>(&self, callback: F) -> Result<ListenerHandle, PubSubError>
    where
        F: Fn(&RedemptionMessage) + Send + Sync + 'static,
    {
        let topic_type = TopicType::Redemption;
        self.add_listener(
            topic_type,
            move |message| {
                if let PubSubMessage::Redemption(m) = message {
                    callback(m);
                }
            },
            topic_type.required_scope(),
        )
        .await
    }

    /// An invalid token is refreshed at most once, and only if the provider supports it.
    async fn resolve_token(&self, scope: Option<&str>) -> Result<AccessToken, PubSubError> {
        let tokens = &self.shared.tokens;
        let token = tokens.access_token(scope).await?;
        if token.is_valid() {
            return Ok(token);
        }
        let invalid = || AuthError::InvalidToken { scope: scope.map(str::to_string) };
        if !tokens.supports_refresh() {
            return Err(invalid().into());
        }

        tracing::info!(?scope, "Access token invalid, refreshing");
        tokens.refresh().await?;
        let token = tokens.access_token(scope).await?;
        if token.is_valid() { Ok(token) } else { Err(invalid().into()) }
    }
}

async fn route_loop(registry: Arc<Registry>, mut rx: mpsc::UnboundedReceiver<(String, Value)>) {
    while let Some((topic, payload)) = rx.recv().await {
        route(&registry, &topic, payload);
    }
    tracing::debug!("Message router stopped");
}

fn route(registry: &Registry, topic: &str, payload: Value) {
    let Some((prefix, user_id)) = split_topic(topic) else {
        tracing::debug!(%topic, "Malformed topic, dropping message");
        return;
    };
    let Some(topic_type) = TopicType::from_prefix(prefix) else {
        tracing::debug!(%topic, "Unknown topic type, dropping message");
        return;
    };
    // snapshot so no map guard is held while user code runs
    let callbacks: Vec<Callback> = match registry.get(&(topic_type, user_id.to_string())) {
        Some(bucket) => bucket.iter().map(|r| Arc::clone(&r.callback)).collect(),
        None => {
            tracing::debug!(%topic, "No listener registered, dropping message");
            return;
        }
    };
    let message = match PubSubMessage::decode(topic_type, payload) {
        Ok(message) => message,
        Err(error) => {
            tracing::debug!(%topic, %error, "Could not decode message, dropping");
            return;
        }
    };
    for callback in &callbacks {
        callback(&message);
    }
}
