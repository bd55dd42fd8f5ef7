use rand::Rng;

const NONCE_BYTES: usize = 15;

/// Random correlation token echoed back by the server in RESPONSE frames.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
