use std::{process::ExitCode, sync::Arc};

use pubsub_edge::{AccessToken, Config, PubSubClient, PubSubError, StaticTokenProvider, util::logging::init_logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let (Ok(token), Ok(user_id)) = (std::env::var("PUBSUB_TOKEN"), std::env::var("PUBSUB_USER_ID")) else {
        error!("PUBSUB_TOKEN and PUBSUB_USER_ID must be set");
        return ExitCode::FAILURE;
    };

    let config = Config::from_env();
    info!(endpoint = %config.endpoint, %user_id, "pubsub-tail starting up");
    let tokens = Arc::new(StaticTokenProvider::new(AccessToken::new(token, user_id)));
    let client = PubSubClient::new(config, tokens);

    if let Err(e) = subscribe(&client).await {
        error!(error = %e, "Subscribing failed");
        client.disconnect().await;
        return ExitCode::FAILURE;
    }
    info!(listeners = client.listener_count(), "Listening, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not wait for Ctrl-C");
    }
    client.disconnect().await;
    ExitCode::SUCCESS
}

async fn subscribe(client: &PubSubClient) -> Result<(), PubSubError> {
    client
        .on_bits(|m| {
            info!(
                user = m.user_name().unwrap_or("anonymous"),
                bits = m.bits(),
                message = m.message(),
                "Cheer"
            );
        })
        .await?;
    client
        .on_subscription(|m| {
            info!(
                user = m.user_name.as_deref().unwrap_or("anonymous"),
                plan = %m.sub_plan,
                months = m.total_months(),
                gift = m.is_gift,
                "Subscription"
            );
        })
        .await?;
    client
        .on_redemption(|m| {
            info!(
                user = m.user_login(),
                reward = m.reward_title(),
                cost = m.cost(),
                input = m.user_input().unwrap_or_default(),
                "Redemption"
            );
        })
        .await?;
    Ok(())
}
