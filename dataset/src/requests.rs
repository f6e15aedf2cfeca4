//! Manages outstanding fetch requests

use crate::{Fetched, Page};
use futures::{stream::FuturesUnordered, StreamExt};
use std::{future::Future, pin::Pin, sync::Arc};

/// A finished fetch, tagged with the page it was issued against.
pub(crate) struct Completion<T, E> {
    pub page: Arc<Page<T, E>>,
    pub fetched: Fetched<T, E>,
}

/// Manages outstanding fetch requests
pub(crate) struct Requests<T, E> {
    /// Futures that will resolve to completed fetches
    #[allow(clippy::type_complexity)]
    futures: FuturesUnordered<Pin<Box<dyn Future<Output = Completion<T, E>>>>>,
}

impl<T: 'static, E: 'static> Requests<T, E> {
    /// Create a new empty set of outstanding requests
    pub fn new() -> Self {
        Self {
            futures: FuturesUnordered::new(),
        }
    }

    /// Add a new outstanding request for `page`
    pub fn add(
        &mut self,
        page: Arc<Page<T, E>>,
        fetch: impl Future<Output = Fetched<T, E>> + 'static,
    ) {
        self.futures.push(Box::pin(async move {
            Completion {
                page,
                fetched: fetch.await,
            }
        }));
    }

    /// Wait for the next request to complete (in completion order)
    ///
    /// Returns `None` if no request is outstanding.
    pub async fn next(&mut self) -> Option<Completion<T, E>> {
        self.futures.next().await
    }

    /// Get the number of outstanding requests
    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }
}

impl<T: 'static, E: 'static> Default for Requests<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stats;
    use futures::{channel::oneshot, executor::block_on};

    #[test]
    fn test_requests_complete_in_arrival_order() {
        let mut requests: Requests<u64, ()> = Requests::new();
        assert!(requests.is_empty());

        let first = Arc::new(Page::new(0, 1)).request();
        let second = Arc::new(Page::new(1, 1)).request();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        requests.add(first.clone(), async move {
            first_rx.await.unwrap_or(Fetched::rejected((), Stats::default()))
        });
        requests.add(second.clone(), async move {
            second_rx.await.unwrap_or(Fetched::rejected((), Stats::default()))
        });
        assert_eq!(requests.len(), 2);

        second_tx
            .send(Fetched::resolved(vec![1], Stats::default()))
            .unwrap();
        let completion = block_on(requests.next()).unwrap();
        assert!(Arc::ptr_eq(&completion.page, &second));
        assert_eq!(completion.fetched.result, Ok(vec![1]));

        drop(first_tx);
        let completion = block_on(requests.next()).unwrap();
        assert!(Arc::ptr_eq(&completion.page, &first));
        assert!(completion.fetched.result.is_err());

        assert!(block_on(requests.next()).is_none());
        assert!(requests.is_empty());
    }
}
