//! Listener multiplexer on top of [`crate::net::client::BasicClient`].
//!
//! Many callbacks may watch the same `(topic type, user id)` pair while the
//! server only ever sees one LISTEN for it; the last removal sends the UNLISTEN.

pub mod client;
pub mod listener;

#[cfg(test)]
mod tests;

pub use client::{PubSubClient, TopicKey};
pub use listener::ListenerHandle;
