#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

//! Client for a real-time push-notification edge service: one websocket,
//! nonce-correlated LISTEN/UNLISTEN, heartbeat and reconnect handling, and a
//! typed listener multiplexer on top.

pub mod auth;
pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod pubsub;
pub mod state;
pub mod util;

pub use auth::{AccessToken, StaticTokenProvider, TokenProvider};
pub use config::Config;
pub use error::{AuthError, PubSubError};
pub use net::client::BasicClient;
pub use protocol::{messages::PubSubMessage, topic::TopicType};
pub use pubsub::{ListenerHandle, PubSubClient};
pub use state::connection::ConnectionState;
