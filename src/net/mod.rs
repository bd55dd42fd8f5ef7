pub mod client;
pub mod connection;
pub mod framing;
