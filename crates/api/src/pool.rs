//! Bounded-concurrency fan-out for bulk API work.
//!
//! A fixed number of in-flight futures pull from the item list; results come
//! back in input order regardless of completion order, so callers can zip
//! them straight back onto their inputs.

use std::future::Future;

use futures::StreamExt;

/// Default concurrency for bulk operations.
pub const DEFAULT_CONCURRENCY: usize = 5;

pub async fn fan_out<T, R, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    futures::stream::iter(items.into_iter().map(f))
        .buffered(limit.max(1))
        .collect()
        .await
}
