//! A sparse, ordered index of pages that resolves record positions to pages.
//!
//! Pages are kept sorted by offset. Each page is tagged with the position of its first record
//! (its _base_), equal to the number of records held by every lower page. Pages that are not
//! materialized are assumed to hold a full page of records, so the base of the lowest page at
//! offset `o` is `o * page_size`.
//!
//! Because filtering lets resolved pages hold fewer records than their capacity, the base of a
//! page cannot be derived from its offset. Pages are therefore grouped into chunks of at most
//! [CHUNK_PAGES] pages. Each chunk stores bases relative to its first page along with its record
//! span and status counts, and the index stores the base of every chunk. Chunks are shared
//! between clones of the index: a change rebuilds only the chunks it touches plus the per-chunk
//! bases, and lookups by record position remain two binary searches.
//!
//! Positions saturate at `u64::MAX`.

use crate::{Page, Record, Summary};
use std::{ops::Range, sync::Arc};

/// Maximum number of pages held by a chunk.
const CHUNK_PAGES: usize = 32;

/// Position reached after skipping `pages` unmaterialized (full) pages from `end`.
const fn skip(end: u64, pages: u64, page_size: u64) -> u64 {
    end.saturating_add(pages.saturating_mul(page_size))
}

/// A non-empty run of pages in offset order.
struct Chunk<T, E> {
    pages: Vec<Arc<Page<T, E>>>,
    /// Base of each page, relative to the base of the first page.
    bases: Vec<u64>,
    /// Records from the first record of the first page to the end of the last page.
    span: u64,
    summary: Summary,
    /// Visible records on resolved pages.
    visible: u64,
}

impl<T, E> Chunk<T, E> {
    fn new(pages: Vec<Arc<Page<T, E>>>, page_size: u64) -> Self {
        let mut bases = Vec::with_capacity(pages.len());
        let mut summary = Summary::default();
        let mut visible = 0u64;
        let mut previous: Option<(u64, u64)> = None; // (offset, end)
        for page in &pages {
            let offset = page.offset();
            let base = match previous {
                None => 0,
                Some((previous_offset, end)) => skip(end, offset - previous_offset - 1, page_size),
            };
            bases.push(base);
            previous = Some((offset, base.saturating_add(page.len() as u64)));

            if page.is_unrequested() {
                summary.unrequested += 1;
            } else if page.is_pending() {
                summary.pending += 1;
            } else if page.is_resolved() {
                summary.resolved += 1;
                visible = visible.saturating_add(page.len() as u64);
            } else {
                summary.rejected += 1;
            }
        }
        Self {
            pages,
            bases,
            span: previous.map_or(0, |(_, end)| end),
            summary,
            visible,
        }
    }

    fn first_offset(&self) -> u64 {
        self.pages[0].offset()
    }

    fn last_offset(&self) -> u64 {
        self.pages[self.pages.len() - 1].offset()
    }

    fn search(&self, offset: u64) -> Result<usize, usize> {
        self.pages.binary_search_by_key(&offset, |page| page.offset())
    }
}

/// Where a record position lands in a [PageIndex].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Location {
    /// The `position`-th record of the `entry`-th page of the `chunk`-th chunk.
    Page {
        chunk: usize,
        entry: usize,
        position: usize,
    },
    /// A slot of a page at `offset` that is not materialized.
    Gap { offset: u64, slot: usize },
}

/// An ordered map from page offset to [Page], augmented with record positions.
///
/// Cloning an index shares every page (and every chunk of pages) with the original.
pub struct PageIndex<T, E> {
    page_size: usize,
    chunks: Vec<Arc<Chunk<T, E>>>,
    /// Base of the first page of each chunk.
    bases: Vec<u64>,
}

impl<T, E> PageIndex<T, E> {
    /// Create an empty index of pages holding `page_size` records.
    pub const fn new(page_size: usize) -> Self {
        Self {
            page_size,
            chunks: Vec::new(),
            bases: Vec::new(),
        }
    }

    /// The capacity of pages synthesized by the index.
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// The number of materialized pages.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.pages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The lowest materialized offset.
    pub fn first_offset(&self) -> Option<u64> {
        self.chunks.first().map(|chunk| chunk.first_offset())
    }

    /// The highest materialized offset.
    pub fn last_offset(&self) -> Option<u64> {
        self.chunks.last().map(|chunk| chunk.last_offset())
    }

    /// The position just past the last record of the highest materialized page.
    pub fn end(&self) -> u64 {
        match (self.chunks.last(), self.bases.last()) {
            (Some(chunk), Some(base)) => base.saturating_add(chunk.span),
            _ => 0,
        }
    }

    /// Iterate over the materialized pages in offset order.
    pub fn pages(&self) -> impl DoubleEndedIterator<Item = &Arc<Page<T, E>>> + '_ {
        self.chunks.iter().flat_map(|chunk| chunk.pages.iter())
    }

    /// The materialized page at `offset`.
    pub fn get(&self, offset: u64) -> Option<&Arc<Page<T, E>>> {
        let (chunk, entry) = self.find(offset)?;
        Some(&self.chunks[chunk].pages[entry])
    }

    /// The page at `offset`, synthesizing an unrequested page if none is materialized.
    ///
    /// Synthesized pages are not added to the index.
    pub fn get_page(&self, offset: u64) -> Arc<Page<T, E>> {
        self.get(offset)
            .cloned()
            .unwrap_or_else(|| Arc::new(Page::new(offset, self.page_size)))
    }

    /// The position of the first record of the materialized page at `offset`.
    pub fn base(&self, offset: u64) -> Option<u64> {
        let (chunk, entry) = self.find(offset)?;
        Some(self.bases[chunk].saturating_add(self.chunks[chunk].bases[entry]))
    }

    /// The record at `position`.
    ///
    /// Positions that fall between materialized pages yield a record on a synthesized unrequested
    /// page. Positions past the last materialized page yield an empty record.
    pub fn get_record(&self, position: u64) -> Record<T, E> {
        match self.locate(position) {
            Some(Location::Page {
                chunk,
                entry,
                position,
            }) => {
                let page = &self.chunks[chunk].pages[entry];
                match page.slot(position) {
                    Some(slot) => Record::new(page.clone(), slot),
                    None => Record::empty(),
                }
            }
            Some(Location::Gap { offset, slot }) => {
                Record::new(Arc::new(Page::new(offset, self.page_size)), slot)
            }
            None => Record::empty(),
        }
    }

    /// Find where the record at `position` lives.
    ///
    /// Returns `None` if `position` lies past the last materialized page.
    pub(crate) fn locate(&self, position: u64) -> Option<Location> {
        let page_size = self.page_size as u64;
        let first = *self.bases.first()?;

        // Positions below the lowest page belong to full, unmaterialized pages
        if position < first {
            return Some(Location::Gap {
                offset: position / page_size,
                slot: (position % page_size) as usize,
            });
        }

        // Find the last page starting at or before the position (pages that hold no records share
        // the base of their successor, so the last candidate is the only one that can hold it)
        let chunk = self.bases.partition_point(|&base| base <= position) - 1;
        let relative = position - self.bases[chunk];
        let pages = &self.chunks[chunk];
        let entry = pages.bases.partition_point(|&base| base <= relative) - 1;
        let base = pages.bases[entry];
        let page = &pages.pages[entry];
        let end = base.saturating_add(page.len() as u64);
        if relative < end {
            return Some(Location::Page {
                chunk,
                entry,
                position: (relative - base) as usize,
            });
        }

        // Positions between two pages belong to the unmaterialized pages separating them
        if chunk + 1 == self.chunks.len() && entry + 1 == pages.pages.len() {
            return None;
        }
        let distance = relative - end;
        Some(Location::Gap {
            offset: page.offset() + 1 + distance / page_size,
            slot: (distance % page_size) as usize,
        })
    }

    /// Status counts of the materialized pages and the number of visible resolved records.
    pub(crate) fn tally(&self) -> (Summary, u64) {
        let mut summary = Summary::default();
        let mut visible = 0u64;
        for chunk in &self.chunks {
            summary.unrequested += chunk.summary.unrequested;
            summary.pending += chunk.summary.pending;
            summary.resolved += chunk.summary.resolved;
            summary.rejected += chunk.summary.rejected;
            visible = visible.saturating_add(chunk.visible);
        }
        (summary, visible)
    }

    /// Iterate over the materialized pages that are not settled, skipping settled chunks.
    pub(crate) fn unsettled(&self) -> impl Iterator<Item = &Arc<Page<T, E>>> + '_ {
        self.chunks
            .iter()
            .filter(|chunk| chunk.summary.unrequested + chunk.summary.pending > 0)
            .flat_map(|chunk| chunk.pages.iter())
            .filter(|page| !page.is_settled())
    }

    /// Insert `page`, replacing any page at the same offset.
    pub(crate) fn insert(&mut self, page: Arc<Page<T, E>>) -> Option<Arc<Page<T, E>>> {
        if self.chunks.is_empty() {
            self.replace(0..0, vec![page]);
            return None;
        }
        let offset = page.offset();
        let chunk = self
            .chunks
            .partition_point(|chunk| chunk.last_offset() < offset)
            .min(self.chunks.len() - 1);
        let mut pages = self.chunks[chunk].pages.clone();
        let replaced = match pages.binary_search_by_key(&offset, |page| page.offset()) {
            Ok(i) => Some(std::mem::replace(&mut pages[i], page)),
            Err(i) => {
                pages.insert(i, page);
                None
            }
        };
        self.replace(chunk..chunk + 1, pages);
        replaced
    }

    /// Remove the page at `offset`.
    pub(crate) fn remove(&mut self, offset: u64) -> Option<Arc<Page<T, E>>> {
        let (chunk, entry) = self.find(offset)?;
        let mut pages = self.chunks[chunk].pages.clone();
        let page = pages.remove(entry);
        self.replace(chunk..chunk + 1, pages);
        Some(page)
    }

    /// Remove every page outside of `range`, returning the removed pages in offset order.
    pub(crate) fn retain_range(&mut self, range: Range<u64>) -> Vec<Arc<Page<T, E>>> {
        let page_size = self.page_size as u64;
        let mut removed = Vec::new();
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for chunk in std::mem::take(&mut self.chunks) {
            if range.start <= chunk.first_offset() && chunk.last_offset() < range.end {
                chunks.push(chunk);
                continue;
            }
            let (kept, evicted): (Vec<_>, Vec<_>) = chunk
                .pages
                .iter()
                .cloned()
                .partition(|page| range.contains(&page.offset()));
            removed.extend(evicted);
            if !kept.is_empty() {
                chunks.push(Arc::new(Chunk::new(kept, page_size)));
            }
        }
        self.chunks = chunks;
        self.reindex();
        removed
    }

    /// Remove every page at or above `pages`, returning how many were removed.
    pub(crate) fn truncate(&mut self, pages: u64) -> usize {
        if self.last_offset().map_or(true, |offset| offset < pages) {
            return 0;
        }
        self.retain_range(0..pages).len()
    }

    /// Materialize an unrequested page at every offset in `range` that has none.
    pub(crate) fn fill(&mut self, range: Range<u64>) {
        if range.clone().all(|offset| self.get(offset).is_some()) {
            return;
        }
        let (start, end) = self.overlapping(&range);
        let mut existing = self.chunks[start..end]
            .iter()
            .flat_map(|chunk| chunk.pages.iter())
            .cloned()
            .peekable();
        let mut pages = Vec::new();
        while let Some(page) = existing.next_if(|page| page.offset() < range.start) {
            pages.push(page);
        }
        for offset in range {
            match existing.next_if(|page| page.offset() == offset) {
                Some(page) => pages.push(page),
                None => pages.push(Arc::new(Page::new(offset, self.page_size))),
            }
        }
        pages.extend(existing);
        self.replace(start..end, pages);
    }

    /// Replace pages with offsets in `range` for which `f` returns a new page.
    pub(crate) fn update(
        &mut self,
        range: Range<u64>,
        mut f: impl FnMut(&Arc<Page<T, E>>) -> Option<Arc<Page<T, E>>>,
    ) {
        let page_size = self.page_size as u64;
        let (start, end) = self.overlapping(&range);
        let mut changed = false;
        for i in start..end {
            let chunk = &self.chunks[i];
            let mut pages: Option<Vec<Arc<Page<T, E>>>> = None;
            for (entry, page) in chunk.pages.iter().enumerate() {
                if !range.contains(&page.offset()) {
                    continue;
                }
                if let Some(page) = f(page) {
                    pages.get_or_insert_with(|| chunk.pages.clone())[entry] = page;
                }
            }
            if let Some(pages) = pages {
                self.chunks[i] = Arc::new(Chunk::new(pages, page_size));
                changed = true;
            }
        }
        if changed {
            self.reindex();
        }
    }

    /// Replace every page with the result of `f`.
    pub(crate) fn map(&mut self, mut f: impl FnMut(&Arc<Page<T, E>>) -> Arc<Page<T, E>>) {
        let page_size = self.page_size as u64;
        for i in 0..self.chunks.len() {
            let chunk = &self.chunks[i];
            let pages = chunk.pages.iter().map(&mut f).collect::<Vec<_>>();
            if pages
                .iter()
                .zip(&chunk.pages)
                .all(|(new, old)| Arc::ptr_eq(new, old))
            {
                continue;
            }
            self.chunks[i] = Arc::new(Chunk::new(pages, page_size));
        }
        self.reindex();
    }

    /// The chunk and entry holding the page at `offset`.
    fn find(&self, offset: u64) -> Option<(usize, usize)> {
        let chunk = self
            .chunks
            .partition_point(|chunk| chunk.last_offset() < offset);
        let entry = self.chunks.get(chunk)?.search(offset).ok()?;
        Some((chunk, entry))
    }

    /// The chunks holding any page that sorts within `range`.
    fn overlapping(&self, range: &Range<u64>) -> (usize, usize) {
        let start = self
            .chunks
            .partition_point(|chunk| chunk.last_offset() < range.start);
        let end = self
            .chunks
            .partition_point(|chunk| chunk.first_offset() < range.end)
            .max(start);
        (start, end)
    }

    /// Replace the chunks in `chunks` with evenly sized chunks holding `pages`.
    fn replace(&mut self, chunks: Range<usize>, pages: Vec<Arc<Page<T, E>>>) {
        let page_size = self.page_size as u64;
        let mut replacement = Vec::new();
        if !pages.is_empty() {
            let size = pages.len().div_ceil(pages.len().div_ceil(CHUNK_PAGES));
            for run in pages.chunks(size) {
                replacement.push(Arc::new(Chunk::new(run.to_vec(), page_size)));
            }
        }
        self.chunks.splice(chunks, replacement);
        self.reindex();
    }

    /// Merge neighboring chunks that fit in one and recompute the base of every chunk.
    fn reindex(&mut self) {
        let page_size = self.page_size as u64;
        let mut i = 1;
        while i < self.chunks.len() {
            let (left, right) = (&self.chunks[i - 1], &self.chunks[i]);
            if left.pages.len() + right.pages.len() > CHUNK_PAGES {
                i += 1;
                continue;
            }
            let pages = left.pages.iter().chain(&right.pages).cloned().collect();
            self.chunks[i - 1] = Arc::new(Chunk::new(pages, page_size));
            self.chunks.remove(i);
        }

        self.bases.clear();
        let mut previous: Option<(u64, u64)> = None; // (last offset, end)
        for chunk in &self.chunks {
            let base = match previous {
                None => chunk.first_offset().saturating_mul(page_size),
                Some((last, end)) => skip(end, chunk.first_offset() - last - 1, page_size),
            };
            self.bases.push(base);
            previous = Some((chunk.last_offset(), base.saturating_add(chunk.span)));
        }
    }
}

impl<T, E> Clone for PageIndex<T, E> {
    fn clone(&self) -> Self {
        Self {
            page_size: self.page_size,
            chunks: self.chunks.clone(),
            bases: self.bases.clone(),
        }
    }
}
