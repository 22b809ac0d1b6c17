//! Single-use account keys
//!
//! Random keys stored on the account row for email verification, password
//! reset, and invites. Each is cleared atomically when consumed.

use rand::rngs::OsRng;
use rand::RngCore;

/// Generate a URL-safe random key (20 bytes, hex encoded)
pub fn generate_key() -> String {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a short numeric key, used as the verification key on invited
/// stub accounts
pub fn generate_numeric_key() -> String {
    format!("{:08}", OsRng.next_u32() % 100_000_000)
}
