//! Persistence models and queries

pub mod account;
pub mod group;

pub use account::{InternalAccountRecord, PublicAccountView};
pub use group::{Group, Membership};
