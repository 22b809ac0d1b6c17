//! Huddle API Library
//!
//! This crate contains the API server components for Huddle.

pub mod access;
pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
