//! API Middleware Module
//!
//! Bearer credential extraction and enforcement, plus caller network info.

pub mod auth;
pub mod client_info;
pub mod service;

pub use auth::{extract_bearer_token, token_fingerprint, BearerTokenExt};
pub use client_info::extract_client_ip;
pub use service::BearerAuth;
