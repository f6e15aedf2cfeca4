//! Cache a windowed, lazily-populated sequence of records.
//!
//! A [Dataset] presents a conceptually unbounded (or server-declared-length) sequence of records
//! that is partitioned into fixed-capacity pages. As the read cursor moves, the dataset decides
//! which pages must be fetched from a [Source], which pages must be released, and publishes an
//! immutable [State] snapshot to an [Observer] after every transition.
//!
//! # Horizons
//!
//! Two symmetric windows (measured in records) surround the read cursor:
//!
//! - The _load horizon_ determines which pages are requested from the [Source].
//! - The _unload horizon_ (never smaller than the load horizon) determines which pages are
//!   retained. Resolved pages that fall outside of it are handed back to [Source::unfetch].
//!
//! # Snapshots
//!
//! Every transition produces a new [State] that shares all unaffected pages with its predecessor.
//! Fetches are tagged with the exact [Page] value they were issued against. When a fetch completes
//! after the cursor has moved on (and the page was evicted or replaced), the result is discarded
//! without touching the current snapshot.
//!
//! # Filtering
//!
//! Resolved pages may hold fewer visible records than their capacity because a [Filter] hides
//! some of them. Record positions are resolved through a [PageIndex] that tracks the cumulative
//! number of visible records before each page, so lookups stay logarithmic even though page sizes
//! shift. Changing the filter ([Dataset::refilter]) never re-fetches content.
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use horizon_dataset::{Config, Dataset, Fetched, Source, Stats};
//! use std::future::{ready, Future};
//!
//! struct Numbers;
//!
//! impl Source for Numbers {
//!     type Record = u64;
//!     type Error = ();
//!
//!     fn fetch(
//!         &mut self,
//!         offset: u64,
//!         page_size: usize,
//!         _stats: Stats,
//!     ) -> impl Future<Output = Fetched<u64, ()>> + 'static {
//!         let start = offset * page_size as u64;
//!         let records = (start..start + page_size as u64).collect();
//!         ready(Fetched::resolved(records, Stats { total_pages: Some(3) }))
//!     }
//! }
//!
//! let mut dataset = Dataset::new(Numbers, (), Config::new(10)).unwrap();
//! dataset.set_read_offset(0);
//! block_on(dataset.settle());
//!
//! let state = dataset.state();
//! assert_eq!(state.length(), 30);
//! assert_eq!(state.get_record(3).content(), Some(&3));
//! ```

use std::sync::Arc;
use thiserror::Error;

mod config;
pub use config::Config;
mod dataset;
pub use dataset::{Dataset, Outcome};
mod horizon;
pub use horizon::Horizons;
mod index;
pub use index::PageIndex;
#[cfg(test)]
pub(crate) mod mocks;
mod page;
pub use page::Page;
mod record;
pub use record::Record;
mod requests;
mod source;
pub use source::{Fetched, Observer, Source, Stats};
mod state;
pub use state::{State, Summary, Transition};

/// Predicate deciding whether a fetched record is visible.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Returns a [Filter] that accepts every record.
pub fn accept_all<T: 'static>() -> Filter<T> {
    Arc::new(|_: &T| true)
}

/// Errors that can occur when interacting with a [Dataset].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("page size must be greater than zero")]
    InvalidPageSize,
    #[error("unload horizon ({unload}) is less than load horizon ({load})")]
    InvalidHorizons { load: u64, unload: u64 },
    #[error("no resolved page holds record {0}")]
    Unresolved(u64),
    #[error("page {0} is not pending")]
    NotPending(u64),
    #[error("page {0} is not resolved")]
    NotResolved(u64),
}
