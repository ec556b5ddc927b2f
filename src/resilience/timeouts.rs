//! Timeout enforcement for store operations.
//!
//! # Responsibilities
//! - Wrap every store call with a deadline
//! - Turn an elapsed deadline into `StoreError::Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the timed-out future is dropped
//! - Timeouts are distinct from other store errors but share the
//!   unavailability policy in the engine

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::store::{StoreError, StoreResult};

/// Run a store operation under `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
