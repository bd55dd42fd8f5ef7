use std::sync::Once;

use futures_util::{
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use crate::error::PubSubError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

static CRYPTO_PROVIDER: Once = Once::new();

/// Installs ring as the process-wide rustls provider unless the application already chose one.
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

/// Performs the WebSocket handshake (TLS for `wss://`) and splits the stream.
pub async fn open(endpoint: &str) -> Result<(WsSink, WsSource), PubSubError> {
    install_crypto_provider();
    tracing::debug!(%endpoint, "Opening websocket");
    let (stream, response) = tokio_tungstenite::connect_async(endpoint).await?;
    tracing::debug!(status = %response.status(), "Websocket handshake OK");
    Ok(stream.split())
}
