//! Typed payloads for every known topic family.
//!
//! The edge service wraps each notification as a JSON string inside a MESSAGE
//! frame; [`PubSubMessage::decode`] turns the parsed inner document into the
//! variant selected by the topic's type prefix.

mod bits;
mod commerce;
mod redemption;
mod subscription;
mod whisper;

pub use bits::{BadgeEntitlement, BitsBadgeUnlockMessage, BitsEventData, BitsMessage};
pub use commerce::CommerceMessage;
pub use redemption::{RedemptionData, RedemptionMessage, Reward, RewardRedemption, RedeemingUser};
pub use subscription::SubscriptionMessage;
pub use whisper::{WhisperBadge, WhisperData, WhisperMessage, WhisperRecipient, WhisperTags};

use serde::Deserialize;
use serde_json::Value;

use crate::protocol::topic::TopicType;

#[derive(Debug, Clone, PartialEq)]
pub enum PubSubMessage {
    Bits(BitsMessage),
    BitsBadgeUnlock(BitsBadgeUnlockMessage),
    Subscription(SubscriptionMessage),
    Commerce(CommerceMessage),
    Whisper(WhisperMessage),
    Redemption(RedemptionMessage),
}

impl PubSubMessage {
    pub fn decode(topic_type: TopicType, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match topic_type {
            TopicType::Bits => Self::Bits(serde_json::from_value(payload)?),
            TopicType::BitsBadgeUnlock => Self::BitsBadgeUnlock(serde_json::from_value(payload)?),
            TopicType::Subscription => Self::Subscription(serde_json::from_value(payload)?),
            TopicType::Commerce => Self::Commerce(serde_json::from_value(payload)?),
            TopicType::Whisper => Self::Whisper(serde_json::from_value(payload)?),
            TopicType::Redemption => Self::Redemption(serde_json::from_value(payload)?),
        })
    }

    pub fn topic_type(&self) -> TopicType {
        match self {
            Self::Bits(_) => TopicType::Bits,
            Self::BitsBadgeUnlock(_) => TopicType::BitsBadgeUnlock,
            Self::Subscription(_) => TopicType::Subscription,
            Self::Commerce(_) => TopicType::Commerce,
            Self::Whisper(_) => TopicType::Whisper,
            Self::Redemption(_) => TopicType::Redemption,
        }
    }
}

/// Chat text attached to a subscription or purchase, with emote positions.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MessageFragment {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub emotes: Option<Vec<EmoteRange>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EmoteRange {
    pub start: u32,
    pub end: u32,
    pub id: EmoteId,
}

// the service sends numeric ids in some payloads and strings in others
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum EmoteId {
    Numeric(u64),
    Text(String),
}
