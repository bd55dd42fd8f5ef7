use std::fmt;

/// Known topic families. A wire topic is `"{prefix}.{user_id}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicType {
    Bits,
    BitsBadgeUnlock,
    Subscription,
    Commerce,
    Whisper,
    Redemption,
}

impl TopicType {
    pub const ALL: [TopicType; 6] = [
        TopicType::Bits,
        TopicType::BitsBadgeUnlock,
        TopicType::Subscription,
        TopicType::Commerce,
        TopicType::Whisper,
        TopicType::Redemption,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            TopicType::Bits => "channel-bits-events-v1",
            TopicType::BitsBadgeUnlock => "channel-bits-badge-unlocks",
            TopicType::Subscription => "channel-subscribe-events-v1",
            TopicType::Commerce => "channel-commerce-events-v1",
            TopicType::Whisper => "whispers",
            TopicType::Redemption => "channel-points-channel-v1",
        }
    }

    /// OAuth scope the listening token must carry.
    pub fn required_scope(self) -> Option<&'static str> {
        match self {
            TopicType::Bits | TopicType::BitsBadgeUnlock => Some("bits:read"),
            TopicType::Subscription => Some("channel_subscriptions"),
            TopicType::Commerce => None,
            TopicType::Whisper => Some("whispers:read"),
            TopicType::Redemption => Some("channel:read:redemptions"),
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.prefix() == prefix)
    }

    pub fn topic(self, user_id: &str) -> String {
        format!("{}.{}", self.prefix(), user_id)
    }
}

impl fmt::Display for TopicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Splits a wire topic at its first `.` into (type prefix, user id).
pub fn split_topic(topic: &str) -> Option<(&str, &str)> {
    topic.split_once('.')
}
