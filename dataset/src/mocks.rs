//! A controllable [Source] for tests.
//!
//! Every fetch is parked until the test answers it, so completions can be delivered in any order.

use crate::{Fetched, Observer, Source, State, Stats};
use futures::channel::oneshot;
use std::{
    future::Future,
    sync::{Arc, Mutex},
};
use thiserror::Error;

/// Reasons a [Server] fails a fetch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Failure {
    #[error("rejected by server")]
    Rejected,
    #[error("request dropped")]
    Dropped,
}

struct Request {
    offset: u64,
    page_size: usize,
    stats: Stats,
    sender: Option<oneshot::Sender<Fetched<u64, Failure>>>,
}

#[derive(Default)]
struct Inner {
    requests: Vec<Request>,
    unfetched: Vec<(u64, Vec<u64>)>,
}

/// A [Source] of `u64` records where page `o` holds `o * page_size..(o + 1) * page_size`.
#[derive(Clone, Default)]
pub struct Server {
    inner: Arc<Mutex<Inner>>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offsets of every request received, in order.
    pub fn offsets(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner.requests.iter().map(|request| request.offset).collect()
    }

    /// Offsets of every request not yet answered, in order.
    pub fn outstanding(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .requests
            .iter()
            .filter(|request| request.sender.is_some())
            .map(|request| request.offset)
            .collect()
    }

    /// The stats sent with the `i`-th request.
    pub fn stats(&self, i: usize) -> Stats {
        self.inner.lock().unwrap().requests[i].stats
    }

    /// Answer the `i`-th request with the full content of its page.
    pub fn resolve(&self, i: usize) {
        let (offset, page_size) = {
            let inner = self.inner.lock().unwrap();
            let request = &inner.requests[i];
            (request.offset, request.page_size as u64)
        };
        let records = (offset * page_size..(offset + 1) * page_size).collect();
        self.resolve_with(i, records, Stats::default());
    }

    /// Answer the `i`-th request with `records` and `stats`.
    pub fn resolve_with(&self, i: usize, records: Vec<u64>, stats: Stats) {
        self.answer(i, Fetched::resolved(records, stats));
    }

    /// Fail the `i`-th request.
    pub fn reject(&self, i: usize, stats: Stats) {
        self.answer(i, Fetched::rejected(Failure::Rejected, stats));
    }

    /// Drop the `i`-th request without answering it.
    pub fn drop_request(&self, i: usize) {
        let sender = self.inner.lock().unwrap().requests[i].sender.take();
        assert!(sender.is_some(), "request {i} already answered");
    }

    /// Answer every outstanding request with the full content of its page.
    pub fn resolve_all(&self) {
        let outstanding = {
            let inner = self.inner.lock().unwrap();
            (0..inner.requests.len())
                .filter(|&i| inner.requests[i].sender.is_some())
                .collect::<Vec<_>>()
        };
        for i in outstanding {
            self.resolve(i);
        }
    }

    /// Every release notification received, in order.
    pub fn unfetched(&self) -> Vec<(u64, Vec<u64>)> {
        self.inner.lock().unwrap().unfetched.clone()
    }

    fn answer(&self, i: usize, fetched: Fetched<u64, Failure>) {
        let sender = self.inner.lock().unwrap().requests[i]
            .sender
            .take()
            .expect("request already answered");
        let _ = sender.send(fetched);
    }
}

impl Source for Server {
    type Record = u64;
    type Error = Failure;

    fn fetch(
        &mut self,
        offset: u64,
        page_size: usize,
        stats: Stats,
    ) -> impl Future<Output = Fetched<u64, Failure>> + 'static {
        let (sender, receiver) = oneshot::channel();
        self.inner.lock().unwrap().requests.push(Request {
            offset,
            page_size,
            stats,
            sender: Some(sender),
        });
        async move {
            receiver
                .await
                .unwrap_or_else(|_| Fetched::rejected(Failure::Dropped, Stats::default()))
        }
    }

    fn unfetch(&mut self, records: &[u64], offset: u64) {
        self.inner
            .lock()
            .unwrap()
            .unfetched
            .push((offset, records.to_vec()));
    }
}

/// An [Observer] that keeps every published state.
#[derive(Clone, Default)]
pub struct Recorder {
    states: Arc<Mutex<Vec<Arc<State<u64, Failure>>>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of states observed.
    pub fn len(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    /// The most recently observed state.
    pub fn last(&self) -> Option<Arc<State<u64, Failure>>> {
        self.states.lock().unwrap().last().cloned()
    }
}

impl Observer<u64, Failure> for Recorder {
    fn observe(&mut self, state: &Arc<State<u64, Failure>>) {
        self.states.lock().unwrap().push(state.clone());
    }
}
