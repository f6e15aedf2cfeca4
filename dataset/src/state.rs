//! Immutable snapshots of a dataset and the transitions between them.
//!
//! A [State] is never mutated once published. Every operation returns a [Transition] holding the
//! next state (which shares every unaffected page with its predecessor) and the pages the caller
//! must hand to the [crate::Source]: `fetch` holds newly requested pages and `unfetch` holds
//! resolved pages that were evicted.
//!
//! Every transition re-plans the horizons around the read cursor (if one is set), so a resolution
//! that shifts record positions (or grows the declared number of pages) requests whatever entered
//! the load horizon in the same step.

use crate::{Config, Error, Filter, Horizons, Page, PageIndex, Record, Stats};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of pages in each status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Pages that were never requested, including pages that are not materialized.
    pub unrequested: usize,
    pub pending: usize,
    pub resolved: usize,
    pub rejected: usize,
}

impl Summary {
    /// Number of pages that were requested (pending, resolved, or rejected).
    pub const fn requested(&self) -> usize {
        self.pending + self.resolved + self.rejected
    }

    /// Number of pages.
    pub const fn total(&self) -> usize {
        self.unrequested.saturating_add(self.requested())
    }
}

/// The result of applying an operation to a [State].
pub struct Transition<T, E> {
    /// The state after the operation.
    pub state: Arc<State<T, E>>,
    /// Pages that must be fetched (each is pending in `state`).
    pub fetch: Vec<Arc<Page<T, E>>>,
    /// Resolved pages that were evicted and must be released.
    pub unfetch: Vec<Arc<Page<T, E>>>,
}

impl<T, E> Transition<T, E> {
    /// A transition that changes nothing.
    pub const fn unchanged(state: Arc<State<T, E>>) -> Self {
        Self {
            state,
            fetch: Vec::new(),
            unfetch: Vec::new(),
        }
    }
}

/// A snapshot of the cached pages around a read cursor.
pub struct State<T, E> {
    index: PageIndex<T, E>,
    load_horizon: u64,
    unload_horizon: Option<u64>,
    read_offset: Option<u64>,
    horizons: Option<Horizons>,
    stats: Stats,
    filter: Filter<T>,

    // Derived
    page_count: u64,
    length: u64,
    summary: Summary,
}

impl<T, E> State<T, E> {
    /// Create an empty state without a read cursor.
    pub fn new(config: &Config<T>) -> Result<Self, Error>
    where
        T: 'static,
    {
        config.validate()?;
        let mut state = Self {
            index: PageIndex::new(config.page_size),
            load_horizon: config.load_horizon(),
            unload_horizon: config.unload_horizon,
            read_offset: None,
            horizons: None,
            stats: config.stats,
            filter: config.filter(),
            page_count: 0,
            length: 0,
            summary: Summary::default(),
        };
        state.derive();
        Ok(state)
    }

    pub const fn page_size(&self) -> usize {
        self.index.page_size()
    }

    pub const fn load_horizon(&self) -> u64 {
        self.load_horizon
    }

    /// The unload horizon (`None` if unbounded).
    pub const fn unload_horizon(&self) -> Option<u64> {
        self.unload_horizon
    }

    /// The read cursor, if it was ever set.
    pub const fn read_offset(&self) -> Option<u64> {
        self.read_offset
    }

    /// The boundaries planned around the read cursor, if it was ever set.
    pub const fn horizons(&self) -> Option<Horizons> {
        self.horizons
    }

    pub const fn stats(&self) -> Stats {
        self.stats
    }

    pub const fn filter(&self) -> &Filter<T> {
        &self.filter
    }

    /// The number of pages the sequence spans: the highest materialized offset plus one, or the
    /// declared total if larger.
    pub const fn page_count(&self) -> u64 {
        self.page_count
    }

    /// The number of records in the sequence.
    ///
    /// Pages that are not resolved count as full, except rejected pages which count as empty.
    pub const fn length(&self) -> u64 {
        self.length
    }

    pub const fn summary(&self) -> Summary {
        self.summary
    }

    /// The index backing this snapshot.
    pub const fn index(&self) -> &PageIndex<T, E> {
        &self.index
    }

    /// Iterate over the materialized pages in offset order.
    pub fn pages(&self) -> impl Iterator<Item = &Arc<Page<T, E>>> + '_ {
        self.index.pages()
    }

    /// Iterate over the pages in `0..page_count` that were never requested.
    ///
    /// Most of these pages are not materialized, so they are synthesized as they are visited.
    pub fn unrequested(&self) -> impl Iterator<Item = Arc<Page<T, E>>> + '_ {
        (0..self.page_count)
            .map(move |offset| self.index.get_page(offset))
            .filter(|page| page.is_unrequested())
    }

    pub fn requested(&self) -> impl Iterator<Item = &Arc<Page<T, E>>> + '_ {
        self.pages().filter(|page| page.is_requested())
    }

    pub fn pending(&self) -> impl Iterator<Item = &Arc<Page<T, E>>> + '_ {
        self.pages().filter(|page| page.is_pending())
    }

    pub fn resolved(&self) -> impl Iterator<Item = &Arc<Page<T, E>>> + '_ {
        self.pages().filter(|page| page.is_resolved())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &Arc<Page<T, E>>> + '_ {
        self.pages().filter(|page| page.is_rejected())
    }

    pub const fn has_unrequested(&self) -> bool {
        self.summary.unrequested > 0
    }

    pub const fn has_requested(&self) -> bool {
        self.summary.requested() > 0
    }

    pub const fn has_pending(&self) -> bool {
        self.summary.pending > 0
    }

    pub const fn has_resolved(&self) -> bool {
        self.summary.resolved > 0
    }

    pub const fn has_rejected(&self) -> bool {
        self.summary.rejected > 0
    }

    /// Returns `true` if any page is awaiting a response.
    pub const fn is_pending(&self) -> bool {
        self.has_pending()
    }

    /// Returns `true` if any page was rejected.
    pub const fn is_rejected(&self) -> bool {
        self.has_rejected()
    }

    /// Returns `true` if no page is awaiting a response.
    pub const fn is_settled(&self) -> bool {
        !self.has_pending()
    }

    /// Returns `true` if no page is awaiting a response and none was rejected.
    pub const fn is_resolved(&self) -> bool {
        self.is_settled() && !self.has_rejected()
    }

    /// The page at `offset` (synthesized as unrequested if it is not materialized).
    pub fn get_page(&self, offset: u64) -> Arc<Page<T, E>> {
        self.index.get_page(offset)
    }

    /// The record at `position`.
    ///
    /// Positions below [State::length] that are not covered by a materialized page yield an
    /// unrequested record. Positions past the end yield an empty record.
    pub fn get_record(&self, position: u64) -> Record<T, E> {
        let end = self.index.end();
        if position < end || position >= self.length {
            return self.index.get_record(position);
        }

        // Pages declared by the source but never materialized are assumed full
        let page_size = self.page_size() as u64;
        let first = self.index.last_offset().map_or(0, |offset| offset.saturating_add(1));
        let distance = position - end;
        let page = self.index.get_page(first + distance / page_size);
        Record::new(page, (distance % page_size) as usize)
    }

    /// Iterate over the records at positions `0..length`.
    ///
    /// A rejected page counts as empty in [State::length] but still occupies `capacity` positions
    /// in the index, so records on resolved pages above a rejected page can sit at or beyond
    /// `length`. They stay reachable through [State::get_record] and [State::pages], but this
    /// iterator stops before them.
    pub fn records(&self) -> impl Iterator<Item = Record<T, E>> + '_ {
        (0..self.length).map(|position| self.get_record(position))
    }

    /// Move the read cursor to `offset`.
    ///
    /// Moving the cursor to its current position returns the same state.
    pub fn set_read_offset(self: &Arc<Self>, offset: u64) -> Transition<T, E> {
        if self.read_offset == Some(offset) {
            return Transition::unchanged(self.clone());
        }
        let mut next = self.successor();
        next.read_offset = Some(offset);
        let transition = next.finish();
        let length = transition.state.length;
        if offset >= length {
            warn!(offset, length, "read offset beyond length");
        }
        transition
    }

    /// Resolve `page` with `records` and fold in `stats`.
    ///
    /// Returns `None` (and leaves the state untouched) if `page` is no longer the pending page
    /// at its offset.
    pub fn resolve(
        self: &Arc<Self>,
        page: &Arc<Page<T, E>>,
        records: Vec<T>,
        stats: Stats,
    ) -> Option<Transition<T, E>> {
        let offset = self.current(page)?;
        let resolved = page.resolve(records, &self.filter).ok()?;
        debug!(offset, records = resolved.len(), "resolved page");

        let mut next = self.successor();
        next.index.insert(Arc::new(resolved));
        next.update_stats(stats);
        Some(next.finish())
    }

    /// Reject `page` with `error` and fold in `stats`.
    ///
    /// Returns `None` (and leaves the state untouched) if `page` is no longer the pending page
    /// at its offset.
    pub fn reject(
        self: &Arc<Self>,
        page: &Arc<Page<T, E>>,
        error: E,
        stats: Stats,
    ) -> Option<Transition<T, E>> {
        let offset = self.current(page)?;
        let rejected = page.reject(error).ok()?;
        debug!(offset, "rejected page");

        let mut next = self.successor();
        next.index.insert(Arc::new(rejected));
        next.update_stats(stats);
        Some(next.finish())
    }

    /// Re-apply `filter` (or the current filter, if `None`) to every resolved page.
    ///
    /// Content is never re-fetched.
    pub fn refilter(self: &Arc<Self>, filter: Option<Filter<T>>) -> Transition<T, E> {
        let mut next = self.successor();
        if let Some(filter) = filter {
            next.filter = filter;
        }
        next.reapply();
        next.finish()
    }

    /// Replace `delete` records starting at `start` with `items`.
    ///
    /// `start` is clamped to the last record. The record at `start` must be on a resolved page.
    pub fn splice(
        self: &Arc<Self>,
        start: u64,
        delete: usize,
        items: Vec<T>,
    ) -> Result<Transition<T, E>, Error>
    where
        T: Clone,
    {
        let start = start.min(self.length.saturating_sub(1));
        let record = self.get_record(start);
        let page = record
            .page()
            .filter(|page| page.is_resolved())
            .ok_or(Error::Unresolved(start))?;
        let spliced = page.splice(record.index(), delete, items, &self.filter)?;
        debug!(
            offset = page.offset(),
            slot = record.index(),
            delete,
            "spliced page"
        );

        let mut next = self.successor();
        next.index.insert(Arc::new(spliced));
        next.reapply();
        Ok(next.finish())
    }

    /// An empty state with the same configuration, filter, and stats.
    pub fn cleared(&self) -> Self {
        let mut state = Self {
            index: PageIndex::new(self.page_size()),
            load_horizon: self.load_horizon,
            unload_horizon: self.unload_horizon,
            read_offset: None,
            horizons: None,
            stats: self.stats,
            filter: self.filter.clone(),
            page_count: 0,
            length: 0,
            summary: Summary::default(),
        };
        state.derive();
        state
    }

    /// The offset of `page` if it is the pending page currently stored at its offset.
    fn current(&self, page: &Arc<Page<T, E>>) -> Option<u64> {
        let offset = page.offset();
        let current = self.index.get(offset)?;
        (Arc::ptr_eq(current, page) && page.is_pending()).then_some(offset)
    }

    fn successor(&self) -> Self {
        Self {
            index: self.index.clone(),
            load_horizon: self.load_horizon,
            unload_horizon: self.unload_horizon,
            read_offset: self.read_offset,
            horizons: self.horizons,
            stats: self.stats,
            filter: self.filter.clone(),
            page_count: self.page_count,
            length: self.length,
            summary: self.summary,
        }
    }

    fn reapply(&mut self) {
        let filter = self.filter.clone();
        self.index.map(|page| page.refilter(&filter));
    }

    /// Fold `stats` reported by the source into the state.
    ///
    /// Pages at or beyond a declared total are dropped without being released.
    fn update_stats(&mut self, stats: Stats) {
        let Some(total_pages) = stats.total_pages else {
            return;
        };
        let previous = self.stats.total_pages;
        if previous != Some(total_pages) {
            debug!(?previous, total_pages, "updated total pages");
        }
        self.stats = stats;
        let removed = self.index.truncate(total_pages);
        if removed > 0 {
            debug!(total_pages, removed, "dropped pages beyond total");
        }
    }

    /// Re-plan the horizons and derive the published state.
    fn finish(mut self) -> Transition<T, E> {
        let (fetch, unfetch) = self.plan();
        self.derive();
        Transition {
            state: Arc::new(self),
            fetch,
            unfetch,
        }
    }

    /// Map the read cursor to a position that is stable under filtering.
    ///
    /// If the record under the cursor is on a resolved page, the cursor is placed where that record
    /// would be if no page were filtered.
    fn virtual_offset(&self, offset: u64) -> u64 {
        let record = self.index.get_record(offset);
        match record.page() {
            Some(page) if page.is_resolved() => {
                page.offset()
                    .saturating_mul(self.page_size() as u64)
                    .saturating_add(record.index() as u64)
            }
            _ => offset,
        }
    }

    /// Evict pages outside of the horizons and request pages within them.
    #[allow(clippy::type_complexity)]
    fn plan(&mut self) -> (Vec<Arc<Page<T, E>>>, Vec<Arc<Page<T, E>>>) {
        let Some(offset) = self.read_offset else {
            return (Vec::new(), Vec::new());
        };
        let horizons = Horizons::plan(
            self.virtual_offset(offset),
            self.load_horizon,
            self.unload_horizon,
            self.page_size(),
            self.stats.total_pages,
            self.index.last_offset(),
        );
        self.horizons = Some(horizons);

        // Evict every page outside of the unload horizon
        let mut unfetch = Vec::new();
        for page in self.index.retain_range(horizons.unload()) {
            if page.is_resolved() {
                debug!(offset = page.offset(), "unfetching page");
                unfetch.push(page);
            } else {
                debug!(offset = page.offset(), "evicted page");
            }
        }

        // Evict unsettled pages between the load and unload horizons
        let load = horizons.load();
        let unsettled = self
            .index
            .unsettled()
            .filter(|page| !page.is_settled() && !load.contains(&page.offset()))
            .map(|page| page.offset())
            .collect::<Vec<_>>();
        for offset in unsettled {
            self.index.remove(offset);
            debug!(offset, "evicted page");
        }

        // Request every page within the load horizon
        let mut fetch = Vec::new();
        self.index.fill(load.clone());
        self.index.update(load, |page| {
            if page.is_requested() {
                return None;
            }
            let pending = page.request();
            debug!(offset = pending.offset(), "requested page");
            fetch.push(pending.clone());
            Some(pending)
        });
        (fetch, unfetch)
    }

    /// Recompute the page count, the summary, and the length.
    fn derive(&mut self) {
        let (mut summary, visible) = self.index.tally();

        let known = self.index.last_offset().map_or(0, |offset| offset.saturating_add(1));
        let total = known.max(self.stats.total_pages.unwrap_or(0));
        let settled = (summary.resolved + summary.rejected) as u64;
        self.length = total
            .saturating_sub(settled)
            .saturating_mul(self.page_size() as u64)
            .saturating_add(visible);

        // Pages that are not materialized were never requested
        let requested = summary.requested() as u64;
        summary.unrequested =
            usize::try_from(total.saturating_sub(requested)).unwrap_or(usize::MAX);
        self.page_count = total;
        self.summary = summary;
    }
}
