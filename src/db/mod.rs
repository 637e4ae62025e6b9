//! Usage store module
//!
//! Talks to the PostgREST `image_usage` table and enforces the daily ceiling on top of it.

pub mod client;
pub mod models;
pub mod usage;

pub use client::{StoreClient, StoreError};
pub use usage::{today_local, RecordStore, UsageError, UsageLedger};
