use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, PartialEq, Eq, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingPacket {
    Ping,
    Listen { nonce: String, data: ListenData },
    Unlisten { nonce: String, data: UnlistenData },
}

#[derive(Clone, Serialize, PartialEq, Eq, Debug)]
pub struct ListenData {
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Clone, Serialize, PartialEq, Eq, Debug)]
pub struct UnlistenData {
    pub topics: Vec<String>,
}

impl OutgoingPacket {
    pub fn mk_listen(nonce: String, topics: Vec<String>, auth_token: Option<String>) -> Self {
        Self::Listen { nonce, data: ListenData { topics, auth_token } }
    }

    pub fn mk_unlisten(nonce: String, topics: Vec<String>) -> Self {
        Self::Unlisten { nonce, data: UnlistenData { topics } }
    }

    pub fn nonce(&self) -> Option<&str> {
        match self {
            Self::Ping => None,
            Self::Listen { nonce, .. } | Self::Unlisten { nonce, .. } => Some(nonce),
        }
    }
}

#[derive(Clone, Deserialize, PartialEq, Eq, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingPacket {
    Pong,
    Reconnect,
    Response {
        #[serde(default)]
        nonce: String,
        // absent or empty on success
        #[serde(default)]
        error: String,
    },
    Message { data: MessageData },
    #[serde(other)]
    Unknown,
}

/// `message` is itself a JSON document encoded as a string.
#[derive(Clone, Deserialize, PartialEq, Eq, Debug)]
pub struct MessageData {
    pub topic: String,
    pub message: String,
}
