//! Admission control for in-flight lookups.
//!
//! The gate is a counting semaphore. A permit is held for the whole
//! classifier call and released when it is dropped, so release happens on
//! every exit path of the call.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::KnowMeError;

/// Bounds the number of simultaneously executing lookups.
///
/// Cloning is cheap and every clone shares the same permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

/// Scoped admission; dropping it frees the slot.
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `max_concurrent` holders at once.
    ///
    /// A zero limit is raised to one so the gate can always make progress.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait until a slot is free and take it.
    ///
    /// Waiters are woken in FIFO order as slots are released.
    pub async fn admit(&self) -> Result<Admission, KnowMeError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| KnowMeError::internal("concurrency gate closed"))?;
        Ok(Admission { _permit: permit })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of slots currently taken.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_admission_waits_when_full() {
        let gate = ConcurrencyGate::new(1);
        let first = gate.admit().await.unwrap();
        assert_eq!(gate.in_flight(), 1);

        let mut second = task::spawn(gate.admit());
        assert_pending!(second.poll());

        drop(first);
        assert!(second.is_woken());
        let admission = assert_ready!(second.poll());
        assert!(admission.is_ok());
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let gate = ConcurrencyGate::new(3);
        {
            let _a = gate.admit().await.unwrap();
            let _b = gate.admit().await.unwrap();
            assert_eq!(gate.in_flight(), 2);
        }
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_zero_limit_is_raised_to_one() {
        let gate = ConcurrencyGate::new(0);
        assert_eq!(gate.max_concurrent(), 1);
    }
}
