use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WhisperMessage {
    /// `whisper_received` or `whisper_sent`.
    #[serde(rename = "type")]
    pub kind: String,
    pub data_object: WhisperData,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WhisperData {
    pub id: u64,
    pub message_id: String,
    pub thread_id: String,
    pub body: String,
    pub sent_ts: u64,
    pub from_id: u64,
    pub tags: WhisperTags,
    pub recipient: WhisperRecipient,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WhisperTags {
    pub login: String,
    pub display_name: String,
    pub color: String,
    pub badges: Vec<WhisperBadge>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct WhisperBadge {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WhisperRecipient {
    pub id: u64,
    pub username: String,
    pub display_name: String,
    pub color: String,
}

impl WhisperMessage {
    pub fn text(&self) -> &str {
        &self.data_object.body
    }

    pub fn sender_id(&self) -> String {
        self.data_object.from_id.to_string()
    }

    pub fn sender_login(&self) -> &str {
        &self.data_object.tags.login
    }

    pub fn is_received(&self) -> bool {
        self.kind == "whisper_received"
    }
}
