//! Transaction ID allocation.
//!
//! The store has no atomic counters, so the next position is kept in a single
//! counter record and advanced with compare-and-swap writes. Concurrent
//! allocators, in this process or any other, race on that record; exactly one
//! of them wins each step and the others back off and retry.
//!
//! The value written by a successful swap is the position handed out. A fresh
//! log therefore allocates `(0, 0)` through the bootstrap write that creates
//! the counter, and `(0, 1)` next.

use common::{ConditionalWrite, RetryPolicy};

use crate::error::{Error, Result};
use crate::serde::CounterValue;
use crate::storage::TxStorage;
use crate::txid::{MAX_PARTITION, TxId};

/// Hands out strictly increasing, unique transaction IDs.
pub(crate) struct TxIdAllocator {
    storage: TxStorage,
    retry_policy: RetryPolicy,
}

impl TxIdAllocator {
    pub(crate) fn new(storage: TxStorage, retry_policy: RetryPolicy) -> Self {
        Self {
            storage,
            retry_policy,
        }
    }

    /// Allocates the next transaction ID.
    ///
    /// Collisions on the counter record are retried according to the
    /// configured policy; once it is exhausted the call fails with
    /// [`Error::Contention`]. Any other store failure is returned as-is.
    pub(crate) async fn allocate_next(&self) -> Result<TxId> {
        let read = self.storage.as_read();
        let mut delays = self.retry_policy.iter();

        loop {
            let Some(observed) = read.get_counter().await? else {
                match self.storage.create_counter(CounterValue::default()).await? {
                    ConditionalWrite::Applied => {
                        tracing::debug!("created counter record");
                        return Ok(TxId::new(0, 0));
                    }
                    // Another allocator created it; read what it wrote.
                    ConditionalWrite::ConditionFailed => continue,
                }
            };

            let next = observed.value.successor();
            if next.partition > MAX_PARTITION {
                return Err(Error::Internal(format!(
                    "transaction id space exhausted at partition {}",
                    observed.value.partition
                )));
            }

            match self.storage.swap_counter(&observed, next).await? {
                ConditionalWrite::Applied => {
                    if next.partition != observed.value.partition {
                        tracing::debug!(
                            partition = next.partition,
                            "counter entered new partition"
                        );
                    }
                    return Ok(next.tx_id());
                }
                ConditionalWrite::ConditionFailed => match delays.next() {
                    Some(delay) => {
                        tracing::debug!(
                            attempt = delays.attempts(),
                            ?delay,
                            "lost race on counter record, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(Error::Contention(format!(
                            "counter record still contended after {} attempts",
                            delays.attempts()
                        )));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use common::storage::in_memory::InMemoryStorage;
    use common::{
        ItemKey, Precondition, Record, ScanPage, ScanRequest, Storage, StorageRead, StorageResult,
    };

    use super::*;
    use crate::txid::MAX_TX_INDEX;

    fn allocator(storage: TxStorage) -> TxIdAllocator {
        TxIdAllocator::new(
            storage,
            RetryPolicy::fixed_delay(Duration::from_millis(1), None),
        )
    }

    #[tokio::test]
    async fn should_bootstrap_counter_then_allocate_post_increment() {
        // given
        let storage = TxStorage::in_memory();
        let allocator = allocator(storage.clone());

        // when
        let first = allocator.allocate_next().await.unwrap();
        let second = allocator.allocate_next().await.unwrap();
        let third = allocator.allocate_next().await.unwrap();

        // then
        assert_eq!(first.decode(), (0, 0));
        assert_eq!(second.decode(), (0, 1));
        assert_eq!(third.decode(), (0, 2));
        let counter = storage.as_read().get_counter().await.unwrap().unwrap();
        assert_eq!(counter.value, CounterValue::new(0, 2));
    }

    #[tokio::test]
    async fn should_roll_over_to_next_partition() {
        // given
        let storage = TxStorage::in_memory();
        storage
            .create_counter(CounterValue::new(4, MAX_TX_INDEX))
            .await
            .unwrap();
        let allocator = allocator(storage);

        // when
        let id = allocator.allocate_next().await.unwrap();

        // then
        assert_eq!(id.decode(), (5, 0));
    }

    #[tokio::test]
    async fn should_fail_when_counter_is_at_last_position() {
        // given
        let storage = TxStorage::in_memory();
        storage
            .create_counter(CounterValue::new(MAX_PARTITION, MAX_TX_INDEX))
            .await
            .unwrap();
        let allocator = allocator(storage);

        // when
        let result = allocator.allocate_next().await;

        // then
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_allocate_distinct_gap_free_ids_concurrently() {
        // given
        let storage = TxStorage::in_memory();
        let allocator = Arc::new(allocator(storage));
        let n = 64;

        // when
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                tokio::spawn(async move { allocator.allocate_next().await })
            })
            .collect();
        let mut ids = Vec::with_capacity(n);
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().as_u64());
        }

        // then
        let distinct: HashSet<u64> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), n);
        ids.sort_unstable();
        let expected: Vec<u64> = (0..n as u64).collect();
        assert_eq!(ids, expected);
    }

    /// Store whose compare-and-swap on an existing item always loses.
    struct AlwaysContended {
        inner: InMemoryStorage,
        swaps: AtomicUsize,
    }

    #[async_trait]
    impl StorageRead for AlwaysContended {
        async fn get(&self, key: ItemKey) -> StorageResult<Option<Record>> {
            self.inner.get(key).await
        }

        async fn scan(&self, request: ScanRequest) -> StorageResult<ScanPage> {
            self.inner.scan(request).await
        }
    }

    #[async_trait]
    impl Storage for AlwaysContended {
        async fn put_if(
            &self,
            record: Record,
            precondition: Precondition,
        ) -> StorageResult<ConditionalWrite> {
            if let Precondition::ValueEquals(_) = precondition {
                self.swaps.fetch_add(1, Ordering::SeqCst);
                return Ok(ConditionalWrite::ConditionFailed);
            }
            self.inner.put_if(record, precondition).await
        }

        async fn write_batch(&self, records: Vec<Record>) -> StorageResult<()> {
            self.inner.write_batch(records).await
        }
    }

    #[tokio::test]
    async fn should_give_up_when_retry_policy_is_exhausted() {
        // given
        let store = Arc::new(AlwaysContended {
            inner: InMemoryStorage::new(),
            swaps: AtomicUsize::new(0),
        });
        let storage = TxStorage::new(store.clone());
        storage
            .create_counter(CounterValue::new(0, 0))
            .await
            .unwrap();
        let allocator = TxIdAllocator::new(
            storage,
            RetryPolicy::fixed_delay(Duration::from_millis(1), Some(3)),
        );

        // when
        let result = allocator.allocate_next().await;

        // then
        assert!(matches!(result, Err(Error::Contention(_))));
        assert_eq!(store.swaps.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn should_propagate_corrupt_counter_without_retrying() {
        // given
        let store = Arc::new(InMemoryStorage::new());
        store
            .put_if(
                Record::new(
                    ItemKey::new(crate::txid::COUNTER_PARTITION, 0),
                    Bytes::from_static(b"garbage"),
                ),
                Precondition::None,
            )
            .await
            .unwrap();
        let allocator = allocator(TxStorage::new(store));

        // when
        let result = allocator.allocate_next().await;

        // then
        assert!(matches!(result, Err(Error::Encoding(_))));
    }
}
