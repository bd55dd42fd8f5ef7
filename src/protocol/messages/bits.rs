use serde::Deserialize;

/// A cheer on `channel-bits-events-v1`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BitsMessage {
    pub data: BitsEventData,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BitsEventData {
    // both absent for anonymous cheers
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub chat_message: String,
    pub bits_used: u64,
    #[serde(default)]
    pub total_bits_used: u64,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub badge_entitlement: Option<BadgeEntitlement>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BadgeEntitlement {
    pub new_version: u64,
    pub previous_version: u64,
}

impl BitsMessage {
    pub fn user_id(&self) -> Option<&str> {
        self.data.user_id.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.data.user_name.as_deref()
    }

    pub fn channel_id(&self) -> &str {
        &self.data.channel_id
    }

    pub fn bits(&self) -> u64 {
        self.data.bits_used
    }

    pub fn total_bits(&self) -> u64 {
        self.data.total_bits_used
    }

    pub fn message(&self) -> &str {
        &self.data.chat_message
    }

    pub fn is_anonymous(&self) -> bool {
        self.data.user_id.is_none()
    }
}

/// A new bits badge tier reached on `channel-bits-badge-unlocks`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BitsBadgeUnlockMessage {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    pub badge_tier: u64,
    #[serde(default)]
    pub chat_message: Option<String>,
    #[serde(default)]
    pub time: String,
}
