use serde::Deserialize;

use super::MessageFragment;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CommerceMessage {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub display_name: String,
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub item_image_url: String,
    #[serde(default)]
    pub item_description: String,
    #[serde(default)]
    pub supports_channel: bool,
    #[serde(default)]
    pub purchase_message: MessageFragment,
}
