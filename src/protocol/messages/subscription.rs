use serde::Deserialize;

use super::MessageFragment;

/// A subscription, resubscription or gift on `channel-subscribe-events-v1`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SubscriptionMessage {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub time: String,
    /// `Prime`, `1000`, `2000` or `3000`.
    pub sub_plan: String,
    #[serde(default)]
    pub sub_plan_name: String,
    #[serde(default)]
    pub cumulative_months: Option<u32>,
    #[serde(default)]
    pub streak_months: Option<u32>,
    #[serde(default)]
    pub months: Option<u32>,
    /// `sub`, `resub`, `subgift`, `anonsubgift`, ...
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub sub_message: MessageFragment,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub recipient_user_name: Option<String>,
    #[serde(default)]
    pub recipient_display_name: Option<String>,
}

impl SubscriptionMessage {
    /// Months subscribed in total; gifts report `months` instead of `cumulative_months`.
    pub fn total_months(&self) -> u32 {
        self.cumulative_months.or(self.months).unwrap_or(1)
    }

    pub fn is_prime(&self) -> bool {
        self.sub_plan == "Prime"
    }

    pub fn is_resub(&self) -> bool {
        self.context == "resub"
    }
}
