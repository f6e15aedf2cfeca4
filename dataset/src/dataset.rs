//! Drive [State] transitions against a [Source] and publish them to an [Observer].

use crate::{
    requests::{Completion, Requests},
    Config, Error, Fetched, Filter, Observer, Source, State, Transition,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a completed fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The page was resolved (or rejected) and a new state was published.
    Applied { offset: u64 },
    /// The page was evicted or replaced before the fetch completed, so its result was discarded.
    Stale { offset: u64 },
}

/// A windowed cache over the records of a [Source].
///
/// Every operation that changes the state issues the fetches and release notifications it
/// implies and then publishes the new state to the observer exactly once. Fetches run
/// concurrently and are applied (in completion order) by [Dataset::next].
pub struct Dataset<S: Source, O> {
    source: S,
    observer: O,
    state: Arc<State<S::Record, S::Error>>,
    requests: Requests<S::Record, S::Error>,
}

impl<S, O> Dataset<S, O>
where
    S: Source,
    S::Record: 'static,
    S::Error: 'static,
    O: Observer<S::Record, S::Error>,
{
    /// Create a new dataset.
    ///
    /// If `config.initial_read_offset` is set, the pages around it are requested (and the
    /// resulting state observed) before returning.
    pub fn new(source: S, observer: O, config: Config<S::Record>) -> Result<Self, Error> {
        let state = Arc::new(State::new(&config)?);
        let mut dataset = Self {
            source,
            observer,
            state,
            requests: Requests::new(),
        };
        if let Some(offset) = config.initial_read_offset {
            dataset.set_read_offset(offset);
        }
        Ok(dataset)
    }

    /// The current state.
    pub fn state(&self) -> Arc<State<S::Record, S::Error>> {
        self.state.clone()
    }

    /// The number of fetches that have not completed (including those that will be stale).
    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }

    /// Move the read cursor to `offset`.
    ///
    /// Does nothing (and observes nothing) if the cursor is already at `offset`.
    pub fn set_read_offset(&mut self, offset: u64) {
        let transition = self.state.set_read_offset(offset);
        if Arc::ptr_eq(&transition.state, &self.state) {
            return;
        }
        self.apply(transition);
    }

    /// Replace the filter (or re-apply the current one if `None`) without re-fetching.
    pub fn refilter(&mut self, filter: Option<Filter<S::Record>>) {
        let transition = self.state.refilter(filter);
        self.apply(transition);
    }

    /// Release every resolved page, discard every page, and request the pages around `offset`
    /// (or the current read cursor, if `None`).
    pub fn reload(&mut self, offset: Option<u64>) {
        for page in self.state.resolved() {
            if let Some(records) = page.buffer() {
                debug!(offset = page.offset(), "unfetching page");
                self.source.unfetch(records, page.offset());
            }
        }
        self.restart(offset);
    }

    /// Discard every page (without releasing any) and request the pages around `offset` (or the
    /// current read cursor, if `None`).
    pub fn reset(&mut self, offset: Option<u64>) {
        self.restart(offset);
    }

    /// Insert `record` before the record at `index` (or the read cursor, if `None`).
    pub fn post(&mut self, record: S::Record, index: Option<u64>) -> Result<(), Error>
    where
        S::Record: Clone,
    {
        let index = index.or(self.state.read_offset()).unwrap_or(0);
        self.splice(index, 0, vec![record])
    }

    /// Replace the record at `index` with `record`.
    pub fn put(&mut self, record: S::Record, index: u64) -> Result<(), Error>
    where
        S::Record: Clone,
    {
        self.splice(index, 1, vec![record])
    }

    /// Remove the record at `index`.
    pub fn delete(&mut self, index: u64) -> Result<(), Error>
    where
        S::Record: Clone,
    {
        self.splice(index, 1, Vec::new())
    }

    /// Wait for the next fetch to complete and apply it.
    ///
    /// Returns `None` if no fetch is outstanding.
    pub async fn next(&mut self) -> Option<Outcome> {
        let Completion { page, fetched } = self.requests.next().await?;
        let offset = page.offset();
        let Fetched { result, stats } = fetched;
        let transition = match result {
            Ok(records) => self.state.resolve(&page, records, stats),
            Err(error) => self.state.reject(&page, error, stats),
        };
        let Some(transition) = transition else {
            debug!(offset, "discarded stale result");
            return Some(Outcome::Stale { offset });
        };
        self.apply(transition);
        Some(Outcome::Applied { offset })
    }

    /// Wait for every outstanding fetch (including any they cause) to complete.
    pub async fn settle(&mut self) {
        while !self.requests.is_empty() {
            self.next().await;
        }
    }

    fn splice(
        &mut self,
        index: u64,
        delete: usize,
        items: Vec<S::Record>,
    ) -> Result<(), Error>
    where
        S::Record: Clone,
    {
        match self.state.splice(index, delete, items) {
            Ok(transition) => {
                self.apply(transition);
                Ok(())
            }
            Err(err) => {
                warn!(index, ?err, "mutation failed");
                self.observer.observe(&self.state);
                Err(err)
            }
        }
    }

    fn restart(&mut self, offset: Option<u64>) {
        let offset = offset.or(self.state.read_offset());
        self.state = Arc::new(self.state.cleared());
        match offset {
            Some(offset) => {
                let transition = self.state.set_read_offset(offset);
                self.apply(transition);
            }
            None => self.observer.observe(&self.state),
        }
    }

    /// Release evicted pages, install the new state, issue fetches, and publish the state.
    fn apply(&mut self, transition: Transition<S::Record, S::Error>) {
        let Transition {
            state,
            fetch,
            unfetch,
        } = transition;
        for page in unfetch {
            if let Some(records) = page.buffer() {
                self.source.unfetch(records, page.offset());
            }
        }
        self.state = state;
        let page_size = self.state.page_size();
        let stats = self.state.stats();
        for page in fetch {
            let future = self.source.fetch(page.offset(), page_size, stats);
            self.requests.add(page, future);
        }
        self.observer.observe(&self.state);
    }
}
