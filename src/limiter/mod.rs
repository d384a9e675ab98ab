//! Admission control for solver processes.
//!
//! A fixed pool of slots backed by [`tokio::sync::Semaphore`]. Waiters are
//! woken in FIFO order. A slot is released when its [`ExecutionSlot`] is
//! dropped, so every exit path (early return, `?`, panic unwinding, future
//! cancellation) gives the slot back exactly once.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("execution limiter is closed")]
    Closed,
}

/// Counting gate shared by all requests.
#[derive(Debug, Clone)]
pub struct ExecutionLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of solver capacity. Dropping it frees the slot.
#[derive(Debug)]
pub struct ExecutionSlot {
    _permit: OwnedSemaphorePermit,
}

impl ExecutionLimiter {
    /// Create a limiter with `capacity` slots. Zero is rejected by
    /// configuration validation; here it would simply never admit anyone.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait until a slot is free.
    pub async fn acquire(&self) -> Result<ExecutionSlot, LimiterError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterError::Closed)?;
        Ok(ExecutionSlot { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free at this instant.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Stop admitting. Pending and future `acquire` calls fail with
    /// [`LimiterError::Closed`]; held slots stay valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
