//! Plan which pages to request and which to retain around a read cursor.

use std::ops::Range;

/// Page-offset boundaries derived from a read cursor.
///
/// Pages in `[min_load, max_load)` should be requested. Pages outside of
/// `[min_unload, max_unload)` should be evicted.
///
/// # Invariants
///
/// `min_unload <= min_load <= max_load <= max_unload`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Horizons {
    pub min_load: u64,
    pub max_load: u64,
    pub min_unload: u64,
    pub max_unload: u64,
}

impl Horizons {
    /// Compute the boundaries around `cursor`.
    ///
    /// # Arguments
    ///
    /// * `cursor` - The (virtual) record position of the read cursor
    /// * `load` - Record distance around the cursor to request
    /// * `unload` - Record distance around the cursor to retain (`None` retains everything)
    /// * `page_size` - Capacity of each page (must be greater than zero)
    /// * `total_pages` - The number of pages declared by the source, if known
    /// * `max_offset` - The highest page offset currently materialized, if any
    ///
    /// Retention never extends past the highest materialized page unless the load range does, so
    /// an unbounded unload horizon does not admit pages that were never seen.
    pub fn plan(
        cursor: u64,
        load: u64,
        unload: Option<u64>,
        page_size: usize,
        total_pages: Option<u64>,
        max_offset: Option<u64>,
    ) -> Self {
        let page_size = page_size as u64;
        let total = total_pages.unwrap_or(u64::MAX);

        let max_load = cursor.saturating_add(load).div_ceil(page_size).min(total);
        let min_load = (cursor.saturating_sub(load) / page_size).min(max_load);
        let (min_unload, max_unload) = match unload {
            Some(unload) => (
                cursor.saturating_sub(unload) / page_size,
                cursor.saturating_add(unload).div_ceil(page_size),
            ),
            None => (0, u64::MAX),
        };
        let max_unload = max_unload
            .min(total)
            .min(max_offset.map_or(0, |offset| offset.saturating_add(1)));

        Self {
            min_load,
            max_load,
            min_unload: min_unload.min(min_load),
            max_unload: max_unload.max(max_load),
        }
    }

    /// The page offsets to request.
    pub const fn load(&self) -> Range<u64> {
        self.min_load..self.max_load
    }

    /// The page offsets to retain.
    pub const fn unload(&self) -> Range<u64> {
        self.min_unload..self.max_unload
    }
}
