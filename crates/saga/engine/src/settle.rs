//! Collect-all combinator for best-effort fan-out
//!
//! Every future runs to completion; failures are collected alongside
//! successes instead of short-circuiting the batch.

use futures::future::join_all;
use std::future::Future;

/// Outcomes of a settled batch, in input order within each list.
#[derive(Debug)]
pub struct Settled<T, E> {
    pub succeeded: Vec<T>,
    pub failed: Vec<E>,
}

impl<T, E> Settled<T, E> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Await every future and partition the results.
pub async fn settle_all<I, F, T, E>(futures: I) -> Settled<T, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let (succeeded, failed) = join_all(futures).await.into_iter().fold(
        (Vec::new(), Vec::new()),
        |(mut ok, mut err), result| {
            match result {
                Ok(value) => ok.push(value),
                Err(error) => err.push(error),
            }
            (ok, err)
        },
    );
    Settled { succeeded, failed }
}
