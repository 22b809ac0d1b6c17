//! Authentication module for Huddle

pub mod jwt;
pub mod keys;
pub mod middleware;
pub mod password;
pub mod totp;

pub use jwt::{Claims, TokenError, TokenService};
pub use middleware::{require_auth, AuthUser};
pub use password::{
    generate_unusable_hash, hash_password, validate_password_strength, verify_password,
};
pub use totp::TotpError;
