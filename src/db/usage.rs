//! Daily usage ledger
//!
//! Enforces the per-user daily generation ceiling on top of an external
//! record store. The increment is a compare-and-set against the count that
//! was read, so concurrent requests from one user cannot push the counter
//! past the ceiling: the loser of a race re-reads and decides again.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::client::StoreError;
use super::models::{NewUsageRecord, RecordId, UsageRecord};

/// Result of inserting the first record of the day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record for the same (user, day) already exists
    Conflict,
}

/// Storage operations the ledger needs
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records for `user_id` on `date` (zero or one expected)
    async fn find_daily(&self, user_id: &str, date: NaiveDate) -> Result<Vec<UsageRecord>, StoreError>;

    /// Insert a new record
    async fn insert(&self, record: &NewUsageRecord) -> Result<InsertOutcome, StoreError>;

    /// Set `count = new` on record `id` only if it still holds `expected`.
    /// Returns whether a row was updated.
    async fn compare_and_set_count(
        &self,
        id: &RecordId,
        expected: u32,
        new: u32,
    ) -> Result<bool, StoreError>;
}

/// Ledger errors
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Daily image generation limit of {limit} reached")]
    LimitReached { limit: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Calendar day used for the ledger key, in server local time
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Per-user daily counter with a fixed ceiling
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn RecordStore>,
    daily_limit: u32,
    max_attempts: u32,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn RecordStore>, daily_limit: u32, max_attempts: u32) -> Self {
        Self {
            store,
            daily_limit,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Count one generation attempt for `user_id` on `today`.
    ///
    /// Returns the new count, or `LimitReached` without touching the store
    /// when the user is already at the ceiling.
    pub async fn check_and_increment(
        &self,
        user_id: &str,
        ip_address: &str,
        today: NaiveDate,
    ) -> Result<u32, UsageError> {
        for attempt in 1..=self.max_attempts {
            let records = self.store.find_daily(user_id, today).await?;

            match records.as_slice() {
                [] => {
                    let record = NewUsageRecord::first_of_day(user_id, ip_address, today);
                    match self.store.insert(&record).await? {
                        InsertOutcome::Inserted => {
                            info!(user_id = %user_id, date = %today, count = 1, "Usage record created");
                            return Ok(1);
                        }
                        InsertOutcome::Conflict => {
                            debug!(user_id = %user_id, attempt, "Concurrent first use, re-reading");
                        }
                    }
                }
                [record] => {
                    if record.count >= self.daily_limit {
                        warn!(
                            user_id = %user_id,
                            date = %today,
                            count = record.count,
                            limit = self.daily_limit,
                            "Daily limit reached"
                        );
                        return Err(UsageError::LimitReached { limit: self.daily_limit });
                    }

                    let next = record.count + 1;
                    if self.store.compare_and_set_count(&record.id, record.count, next).await? {
                        info!(user_id = %user_id, date = %today, count = next, "Usage incremented");
                        return Ok(next);
                    }
                    debug!(user_id = %user_id, attempt, "Usage changed underneath, re-reading");
                }
                many => {
                    error!(
                        user_id = %user_id,
                        date = %today,
                        records = many.len(),
                        "Multiple usage records for one user and day"
                    );
                    return Err(StoreError::DuplicateRecords {
                        user_id: user_id.to_string(),
                        date: today,
                        count: many.len(),
                    }
                    .into());
                }
            }
        }

        warn!(user_id = %user_id, attempts = self.max_attempts, "Usage increment gave up");
        Err(StoreError::Contention {
            user_id: user_id.to_string(),
            attempts: self.max_attempts,
        }
        .into())
    }
}
