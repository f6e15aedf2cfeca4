//! Collaborators injected into a [crate::Dataset].

use crate::State;
use std::{future::Future, sync::Arc};

/// Facts about the sequence reported by a [Source].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// The number of pages in the sequence, if known.
    pub total_pages: Option<u64>,
}

/// The outcome of a [Source::fetch].
#[derive(Debug)]
pub struct Fetched<T, E> {
    /// The content of the page or the reason it could not be retrieved.
    pub result: Result<Vec<T>, E>,
    /// Updated stats, applied in the same transition as `result`.
    pub stats: Stats,
}

impl<T, E> Fetched<T, E> {
    pub const fn resolved(records: Vec<T>, stats: Stats) -> Self {
        Self {
            result: Ok(records),
            stats,
        }
    }

    pub const fn rejected(error: E, stats: Stats) -> Self {
        Self {
            result: Err(error),
            stats,
        }
    }
}

/// Source is the interface responsible for retrieving (and releasing) the content of pages.
pub trait Source {
    /// The type of each record.
    type Record;

    /// The reason a page could not be retrieved.
    type Error;

    /// Retrieve up to `page_size` records of the page at `offset`.
    ///
    /// `stats` holds what the dataset currently knows about the sequence. Retry and backoff (if
    /// any) are the responsibility of the implementation.
    fn fetch(
        &mut self,
        offset: u64,
        page_size: usize,
        stats: Stats,
    ) -> impl Future<Output = Fetched<Self::Record, Self::Error>> + 'static;

    /// Release the records of a resolved page that was evicted.
    ///
    /// Notifications are not acknowledged. The default implementation does nothing.
    fn unfetch(&mut self, _records: &[Self::Record], _offset: u64) {}
}

/// Observer is notified of every [State] published by a [crate::Dataset].
pub trait Observer<T, E> {
    fn observe(&mut self, state: &Arc<State<T, E>>);
}

impl<T, E> Observer<T, E> for () {
    fn observe(&mut self, _: &Arc<State<T, E>>) {}
}

impl<T, E, F> Observer<T, E> for F
where
    F: FnMut(&Arc<State<T, E>>),
{
    fn observe(&mut self, state: &Arc<State<T, E>>) {
        self(state)
    }
}
