pub mod logging;
pub mod nonce;
