use crate::domain::LedgerResult;
use std::future::Future;
use tokio::sync::{Mutex, MutexGuard};

/// Sequential nonces for the single sending account
///
/// The next nonce is seeded from the node's pending count on first use and
/// after a rejected send, then advanced locally. A lease holds the lock
/// until it is dropped, so submissions from concurrent settlement tasks are
/// signed one after another with distinct nonces.
#[derive(Debug, Default)]
pub(crate) struct NonceManager {
    next: Mutex<Option<u64>>,
}

/// Exclusive right to sign with one nonce
///
/// Dropping a lease without `commit` or `invalidate` leaves the manager as
/// it was, e.g. when signing fails before anything reaches the node.
pub(crate) struct NonceLease<'a> {
    guard: MutexGuard<'a, Option<u64>>,
    nonce: u64,
}

impl NonceManager {
    pub(crate) async fn lease<F, Fut>(&self, fetch_pending: F) -> LedgerResult<NonceLease<'_>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LedgerResult<u64>>,
    {
        let guard = self.next.lock().await;
        let nonce = match *guard {
            Some(nonce) => nonce,
            None => fetch_pending().await?,
        };

        Ok(NonceLease { guard, nonce })
    }
}

impl NonceLease<'_> {
    pub(crate) fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The node accepted the transaction
    pub(crate) fn commit(mut self) {
        *self.guard = Some(self.nonce.saturating_add(1));
    }

    /// The node rejected the transaction; the next lease asks the node again
    pub(crate) fn invalidate(mut self) {
        *self.guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LedgerError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn fetch_seven(fetches: &AtomicUsize) -> LedgerResult<u64> {
        fetches.fetch_add(1, Ordering::SeqCst);
        Ok(7)
    }

    async fn sign_with_lease(manager: &NonceManager, fetches: &AtomicUsize) -> u64 {
        let lease = manager.lease(|| fetch_seven(fetches)).await.unwrap();
        let nonce = lease.nonce();
        tokio::task::yield_now().await;
        lease.commit();
        nonce
    }

    #[tokio::test]
    async fn test_commit_advances_without_refetch() {
        // Arrange
        let manager = NonceManager::default();
        let fetches = AtomicUsize::new(0);

        // Act
        let first = manager.lease(|| fetch_seven(&fetches)).await.unwrap();
        let first_nonce = first.nonce();
        first.commit();
        let second = manager.lease(|| fetch_seven(&fetches)).await.unwrap();

        // Assert
        assert_eq!(first_nonce, 7);
        assert_eq!(second.nonce(), 8);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_leases_get_distinct_nonces() {
        // Arrange
        let manager = NonceManager::default();
        let fetches = AtomicUsize::new(0);

        // Act
        let (a, b) = tokio::join!(
            sign_with_lease(&manager, &fetches),
            sign_with_lease(&manager, &fetches)
        );

        // Assert
        let mut nonces = vec![a, b];
        nonces.sort_unstable();
        assert_eq!(nonces, vec![7, 8]);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_resyncs_from_node() {
        // Arrange
        let manager = NonceManager::default();
        let fetches = AtomicUsize::new(0);

        // Act
        manager
            .lease(|| fetch_seven(&fetches))
            .await
            .unwrap()
            .invalidate();
        let next = manager.lease(|| fetch_seven(&fetches)).await.unwrap();

        // Assert
        assert_eq!(next.nonce(), 7);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_lease_keeps_committed_nonce() {
        // Arrange
        let manager = NonceManager::default();
        let fetches = AtomicUsize::new(0);
        manager.lease(|| fetch_seven(&fetches)).await.unwrap().commit();

        // Act
        drop(manager.lease(|| fetch_seven(&fetches)).await.unwrap());
        let next = manager.lease(|| fetch_seven(&fetches)).await.unwrap();

        // Assert
        assert_eq!(next.nonce(), 8);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_is_returned_and_nothing_cached() {
        // Arrange
        let manager = NonceManager::default();
        let fetches = AtomicUsize::new(0);

        // Act
        let failed = manager
            .lease(|| async { Err(LedgerError::Transport("connection refused".to_string())) })
            .await;
        let next = manager.lease(|| fetch_seven(&fetches)).await.unwrap();

        // Assert
        assert!(matches!(failed, Err(LedgerError::Transport(_))));
        assert_eq!(next.nonce(), 7);
    }
}
