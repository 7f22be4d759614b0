//! Chunked batch reads and writes with retry of unprocessed items
//!
//! The store caps the item count of every batch call and may leave part of a batch
//! unprocessed when throttled. Work is split into chunks that are sent concurrently;
//! whatever comes back unprocessed is retried with exponential backoff until it clears
//! or the backoff passes its ceiling.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cleanse::cleanse;
use crate::error::{StorageError, StorageResult, Unprocessed};
use crate::store::{BatchGetOutput, BatchWriteOutput, Item, KeyValueStore, WriteOperation};

/// Chunking and backoff settings for batch operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Keys per batch get call
    pub read_chunk_size: usize,
    /// Operations per batch write call
    pub write_chunk_size: usize,
    /// Sleep before the first retry
    pub initial_backoff: Duration,
    /// Largest backoff still retried; a larger one fails the batch
    pub max_backoff: Duration,
}

impl BatchConfig {
    /// Store limit on keys per batch get call
    pub const MAX_READ_CHUNK_SIZE: usize = 100;
    /// Store limit on operations per batch write call
    pub const MAX_WRITE_CHUNK_SIZE: usize = 25;
    /// Default sleep before the first retry
    pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
    /// Default backoff ceiling
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(800);
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: Self::MAX_READ_CHUNK_SIZE,
            write_chunk_size: Self::MAX_WRITE_CHUNK_SIZE,
            initial_backoff: Self::DEFAULT_INITIAL_BACKOFF,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Reads every key, retrying unprocessed keys, and returns the cleansed items
///
/// Item order is not related to key order. Keys with no stored item are absent from
/// the result.
///
/// # Errors
///
/// Returns `StorageError::BatchRetryExhausted` with the remaining keys if the store
/// keeps throttling past the backoff ceiling, or the first store error of a round
pub async fn batch_get(
    store: &dyn KeyValueStore,
    table: &str,
    keys: Vec<Item>,
    config: &BatchConfig,
) -> StorageResult<Vec<Item>> {
    let chunk_size = config
        .read_chunk_size
        .clamp(1, BatchConfig::MAX_READ_CHUNK_SIZE);
    let mut items = Vec::new();

    execute(
        "batch_get",
        table,
        keys,
        chunk_size,
        config,
        |chunk| store.batch_get_items(table, chunk),
        |output: BatchGetOutput| {
            items.extend(output.items);
            output.unprocessed_keys
        },
        Unprocessed::Keys,
    )
    .await?;

    Ok(items.into_iter().map(cleanse).collect())
}

/// Applies every put/delete, retrying unprocessed operations
///
/// # Errors
///
/// Returns `StorageError::BatchRetryExhausted` with the remaining operations if the
/// store keeps throttling past the backoff ceiling, or the first store error of a round
pub async fn batch_write(
    store: &dyn KeyValueStore,
    table: &str,
    operations: Vec<WriteOperation>,
    config: &BatchConfig,
) -> StorageResult<()> {
    let chunk_size = config
        .write_chunk_size
        .clamp(1, BatchConfig::MAX_WRITE_CHUNK_SIZE);

    execute(
        "batch_write",
        table,
        operations,
        chunk_size,
        config,
        |chunk| store.batch_write_items(table, chunk),
        |output: BatchWriteOutput| output.unprocessed,
        Unprocessed::Writes,
    )
    .await
}

/// Runs rounds of concurrent chunk calls until nothing is left unprocessed
///
/// Every chunk call of a round settles before the round is judged, so one failing
/// chunk never cuts its siblings short.
#[allow(clippy::too_many_arguments)]
async fn execute<T, O, F, Fut, A>(
    operation: &'static str,
    table: &str,
    work: Vec<T>,
    chunk_size: usize,
    config: &BatchConfig,
    call: F,
    mut absorb: A,
    into_unprocessed: fn(Vec<T>) -> Unprocessed,
) -> StorageResult<()>
where
    T: Clone,
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = StorageResult<O>>,
    A: FnMut(O) -> Vec<T>,
{
    let mut pending = work;
    let mut backoff = config.initial_backoff;
    let mut round = 1_u32;

    while !pending.is_empty() {
        debug!(
            operation,
            table,
            round,
            items = pending.len(),
            "Sending batch round"
        );

        let outputs = join_all(pending.chunks(chunk_size).map(|chunk| call(chunk.to_vec()))).await;
        let outputs = outputs.into_iter().collect::<StorageResult<Vec<O>>>()?;

        let unprocessed: Vec<T> = outputs.into_iter().flat_map(&mut absorb).collect();
        if unprocessed.is_empty() {
            break;
        }

        if backoff > config.max_backoff {
            warn!(
                operation,
                table,
                round,
                unprocessed = unprocessed.len(),
                backoff = ?backoff,
                "Batch backoff ceiling exceeded"
            );
            return Err(StorageError::BatchRetryExhausted {
                backoff,
                unprocessed: into_unprocessed(unprocessed),
            });
        }

        warn!(
            operation,
            table,
            round,
            unprocessed = unprocessed.len(),
            backoff = ?backoff,
            "Batch left items unprocessed, retrying"
        );
        sleep(backoff).await;

        backoff = backoff.saturating_mul(2);
        round += 1;
        pending = unprocessed;
    }

    Ok(())
}
