use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    error::PubSubError,
    net::connection::{WsSink, WsSource},
    protocol::packet::{IncomingPacket, OutgoingPacket},
    util::logging::FRAME_TARGET,
};

pub fn decode_packet(text: &str) -> Result<IncomingPacket, PubSubError> {
    Ok(serde_json::from_str(text)?)
}

/// Reads until one JSON text frame decodes. Undecodable text frames and
/// websocket control frames are skipped; close/EOF/errors end the link.
///
/// Cancel safe: the only await point is the stream's `next()`.
pub async fn read_packet(source: &mut WsSource) -> Result<IncomingPacket, PubSubError> {
    loop {
        let frame = match source.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(PubSubError::ConnectionClosed),
        };

        match frame {
            Message::Text(text) => {
                tracing::trace!(target: FRAME_TARGET, direction = "in", %text);
                match decode_packet(&text) {
                    Ok(packet) => return Ok(packet),
                    Err(error) => {
                        tracing::debug!(%error, "Dropping undecodable frame");
                    }
                }
            }
            Message::Close(close) => {
                let (code, reason) =
                    close.map(|cf| (cf.code.into(), cf.reason.to_string())).unwrap_or((1005, String::new()));
                return Err(PubSubError::ClosedByPeer { code, reason });
            }
            // pings are answered by tungstenite itself
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
}

pub async fn write_packet(sink: &mut WsSink, packet: &OutgoingPacket) -> Result<(), PubSubError> {
    let text = serde_json::to_string(packet)?;
    tracing::trace!(target: FRAME_TARGET, direction = "out", %text);
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}
