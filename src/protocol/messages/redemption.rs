use serde::Deserialize;

/// A channel-points reward redemption on `channel-points-channel-v1`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RedemptionMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: RedemptionData,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RedemptionData {
    #[serde(default)]
    pub timestamp: String,
    pub redemption: RewardRedemption,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RewardRedemption {
    pub id: String,
    pub user: RedeemingUser,
    pub channel_id: String,
    #[serde(default)]
    pub redeemed_at: String,
    pub reward: Reward,
    #[serde(default)]
    pub user_input: Option<String>,
    /// `FULFILLED` or `UNFULFILLED`.
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RedeemingUser {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Reward {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    pub cost: u64,
    #[serde(default)]
    pub is_user_input_required: bool,
    #[serde(default)]
    pub is_sub_only: bool,
}

impl RedemptionMessage {
    pub fn reward_title(&self) -> &str {
        &self.data.redemption.reward.title
    }

    pub fn cost(&self) -> u64 {
        self.data.redemption.reward.cost
    }

    pub fn user_login(&self) -> &str {
        &self.data.redemption.user.login
    }

    pub fn user_input(&self) -> Option<&str> {
        self.data.redemption.user_input.as_deref()
    }
}
