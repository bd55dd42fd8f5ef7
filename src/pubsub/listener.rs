use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    error::PubSubError,
    protocol::topic::TopicType,
    pubsub::client::{Shared, TopicKey},
};

/// Returned by [`crate::pubsub::PubSubClient::add_listener`]; removes its
/// registration on [`ListenerHandle::remove`]. Clones share the removed flag.
#[derive(Clone)]
pub struct ListenerHandle {
    client: Weak<Shared>,
    key: TopicKey,
    id: u64,
    removed: Arc<AtomicBool>,
}

impl ListenerHandle {
    pub(crate) fn new(client: Weak<Shared>, key: TopicKey, id: u64) -> Self {
        Self { client, key, id, removed: Arc::new(AtomicBool::new(false)) }
    }

    pub fn topic_type(&self) -> TopicType {
        self.key.0
    }

    pub fn user_id(&self) -> &str {
        &self.key.1
    }

    pub fn topic(&self) -> String {
        self.key.0.topic(&self.key.1)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Second and later calls are no-ops. A handle that outlived its client
    /// only flips its flag.
    pub async fn remove(&self) -> Result<(), PubSubError> {
        match self.client.upgrade() {
            Some(shared) => shared.remove(&self.key, self.id, &self.removed).await,
            None => {
                self.removed.store(true, Ordering::Release);
                Ok(())
            }
        }
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
        std::ptr::eq(self.client.as_ptr(), Arc::as_ptr(shared))
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("topic", &self.topic())
            .field("id", &self.id)
            .field("removed", &self.is_removed())
            .finish()
    }
}
