//! A fixed-capacity slice of the record sequence and its fetch lifecycle.
//!
//! Pages move through `Unrequested -> Pending -> (Resolved | Rejected)`. Every transition returns
//! a new value: a [Page] is never mutated once it is published in a [crate::State]. The only
//! backward transition is [Page::unload], which returns a fresh unrequested page at the same offset.

use crate::{Error, Filter};
use std::sync::Arc;

/// Lifecycle of a [Page].
#[derive(Debug)]
enum Status<T, E> {
    /// Not yet requested from the source.
    Unrequested,
    /// Requested and awaiting a response.
    Pending,
    /// Fetched successfully.
    ///
    /// `view` holds the positions (in `buffer`) of the records accepted by the filter.
    Resolved { buffer: Arc<Vec<T>>, view: Vec<usize> },
    /// Fetch failed.
    Rejected(E),
}

/// One page of records.
#[derive(Debug)]
pub struct Page<T, E> {
    offset: u64,
    capacity: usize,
    status: Status<T, E>,
}

impl<T, E> Page<T, E> {
    /// Create an unrequested page at `offset` that holds up to `capacity` records.
    pub const fn new(offset: u64, capacity: usize) -> Self {
        Self {
            offset,
            capacity,
            status: Status::Unrequested,
        }
    }

    /// The index of the page in the sequence of pages.
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// The number of records the page was created to hold.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn is_unrequested(&self) -> bool {
        matches!(self.status, Status::Unrequested)
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.status, Status::Pending)
    }

    pub const fn is_resolved(&self) -> bool {
        matches!(self.status, Status::Resolved { .. })
    }

    pub const fn is_rejected(&self) -> bool {
        matches!(self.status, Status::Rejected(_))
    }

    /// Returns `true` if the page is pending, resolved, or rejected.
    pub const fn is_requested(&self) -> bool {
        !self.is_unrequested()
    }

    /// Returns `true` if the page reached a terminal fetch outcome (resolved or rejected).
    pub const fn is_settled(&self) -> bool {
        self.is_resolved() || self.is_rejected()
    }

    /// The error the page was rejected with, if any.
    pub fn error(&self) -> Option<&E> {
        match &self.status {
            Status::Rejected(error) => Some(error),
            _ => None,
        }
    }

    /// The raw content returned by the source (including filtered records), if resolved.
    pub fn buffer(&self) -> Option<&[T]> {
        match &self.status {
            Status::Resolved { buffer, .. } => Some(buffer.as_slice()),
            _ => None,
        }
    }

    /// The number of records the page contributes to the sequence.
    ///
    /// Resolved pages contribute their visible records, all other pages their capacity.
    pub fn len(&self) -> usize {
        match &self.status {
            Status::Resolved { view, .. } => view.len(),
            _ => self.capacity,
        }
    }

    /// Returns `true` if the page contributes no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the visible records of a resolved page.
    pub fn records(&self) -> impl Iterator<Item = &T> + '_ {
        let (buffer, view): (&[T], &[usize]) = match &self.status {
            Status::Resolved { buffer, view } => (buffer.as_slice(), view.as_slice()),
            _ => (&[], &[]),
        };
        view.iter().map(move |&slot| &buffer[slot])
    }

    /// Map the `position`-th visible record to its slot in the page.
    ///
    /// Before resolution every slot is visible, so the slot equals the position.
    pub(crate) fn slot(&self, position: usize) -> Option<usize> {
        match &self.status {
            Status::Resolved { view, .. } => view.get(position).copied(),
            _ => (position < self.capacity).then_some(position),
        }
    }

    /// The content stored at `slot`, if the page is resolved.
    pub fn content(&self, slot: usize) -> Option<&T> {
        self.buffer().and_then(|buffer| buffer.get(slot))
    }

    /// Mark the page as requested.
    ///
    /// Requesting a page that was already requested returns the same page.
    pub fn request(self: &Arc<Self>) -> Arc<Self> {
        match self.status {
            Status::Unrequested => Arc::new(Self {
                offset: self.offset,
                capacity: self.capacity,
                status: Status::Pending,
            }),
            _ => self.clone(),
        }
    }

    /// Resolve a pending page with the records returned by the source.
    pub fn resolve(&self, records: Vec<T>, filter: &Filter<T>) -> Result<Self, Error> {
        if !self.is_pending() {
            return Err(Error::NotPending(self.offset));
        }
        Ok(self.with_buffer(Arc::new(records), filter))
    }

    /// Reject a pending page with the error returned by the source.
    pub fn reject(&self, error: E) -> Result<Self, Error> {
        if !self.is_pending() {
            return Err(Error::NotPending(self.offset));
        }
        Ok(Self {
            offset: self.offset,
            capacity: self.capacity,
            status: Status::Rejected(error),
        })
    }

    /// Return the page to its unrequested state, discarding any content or error.
    pub const fn unload(&self) -> Self {
        Self::new(self.offset, self.capacity)
    }

    /// Re-apply `filter` to the content of a resolved page.
    ///
    /// Pages without content are returned unchanged.
    pub fn refilter(self: &Arc<Self>, filter: &Filter<T>) -> Arc<Self> {
        match &self.status {
            Status::Resolved { buffer, .. } => Arc::new(self.with_buffer(buffer.clone(), filter)),
            _ => self.clone(),
        }
    }

    /// Replace `delete` records starting at `slot` with `items` and re-apply `filter`.
    ///
    /// `slot` and `delete` are clamped to the content of the page.
    pub fn splice(
        &self,
        slot: usize,
        delete: usize,
        items: Vec<T>,
        filter: &Filter<T>,
    ) -> Result<Self, Error>
    where
        T: Clone,
    {
        let Status::Resolved { buffer, .. } = &self.status else {
            return Err(Error::NotResolved(self.offset));
        };
        let mut buffer = Vec::clone(buffer);
        let start = slot.min(buffer.len());
        let end = start.saturating_add(delete).min(buffer.len());
        buffer.splice(start..end, items);
        Ok(self.with_buffer(Arc::new(buffer), filter))
    }

    fn with_buffer(&self, buffer: Arc<Vec<T>>, filter: &Filter<T>) -> Self {
        let view = buffer
            .iter()
            .enumerate()
            .filter(|(_, record)| filter(record))
            .map(|(slot, _)| slot)
            .collect();
        Self {
            offset: self.offset,
            capacity: self.capacity,
            status: Status::Resolved { buffer, view },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accept_all;

    fn evens() -> Filter<u64> {
        Arc::new(|record: &u64| record % 2 == 0)
    }

    #[test]
    fn test_page_lifecycle() {
        let page: Arc<Page<u64, &str>> = Arc::new(Page::new(3, 10));
        assert!(page.is_unrequested());
        assert!(!page.is_requested());
        assert!(!page.is_settled());
        assert_eq!(page.len(), 10);
        assert!(page.buffer().is_none());

        let pending = page.request();
        assert!(pending.is_pending());
        assert!(pending.is_requested());
        assert!(!pending.is_settled());
        assert_eq!(pending.offset(), 3);
        assert_eq!(pending.capacity(), 10);

        let resolved = pending.resolve((30..40).collect(), &accept_all()).unwrap();
        assert!(resolved.is_resolved());
        assert!(resolved.is_settled());
        assert_eq!(resolved.len(), 10);
        assert_eq!(resolved.content(0), Some(&30));
        assert_eq!(resolved.records().copied().collect::<Vec<_>>(), (30..40).collect::<Vec<_>>());

        let unloaded = resolved.unload();
        assert!(unloaded.is_unrequested());
        assert!(unloaded.buffer().is_none());
        assert_eq!(unloaded.offset(), 3);
    }

    #[test]
    fn test_page_request_is_idempotent() {
        let page: Arc<Page<u64, ()>> = Arc::new(Page::new(0, 5));
        let pending = page.request();
        let again = pending.request();
        assert!(Arc::ptr_eq(&pending, &again));
    }

    #[test]
    fn test_page_reject() {
        let page: Arc<Page<u64, &str>> = Arc::new(Page::new(1, 4));
        let rejected = page.request().reject("unavailable").unwrap();
        assert!(rejected.is_rejected());
        assert!(rejected.is_settled());
        assert_eq!(rejected.error(), Some(&"unavailable"));
        assert_eq!(rejected.len(), 4);
        assert!(rejected.unload().error().is_none());
    }

    #[test]
    fn test_page_invalid_transitions() {
        let page: Arc<Page<u64, ()>> = Arc::new(Page::new(2, 4));
        assert_eq!(
            page.resolve(vec![1], &accept_all()).unwrap_err(),
            Error::NotPending(2)
        );
        assert_eq!(page.reject(()).unwrap_err(), Error::NotPending(2));
        assert_eq!(
            page.splice(0, 0, vec![1], &accept_all()).unwrap_err(),
            Error::NotResolved(2)
        );

        let resolved = page.request().resolve(vec![1, 2], &accept_all()).unwrap();
        assert_eq!(resolved.reject(()).unwrap_err(), Error::NotPending(2));
    }

    #[test]
    fn test_page_filter_and_refilter() {
        let page: Arc<Page<u64, ()>> = Arc::new(Page::new(0, 10));
        let resolved = Arc::new(page.request().resolve((0..10).collect(), &evens()).unwrap());
        assert_eq!(resolved.len(), 5);
        assert_eq!(resolved.buffer().unwrap().len(), 10);
        assert_eq!(resolved.slot(1), Some(2));
        assert_eq!(resolved.slot(5), None);

        // Refiltering keeps the content
        let refiltered = resolved.refilter(&accept_all());
        assert_eq!(refiltered.len(), 10);
        assert!(std::ptr::eq(
            refiltered.buffer().unwrap().as_ptr(),
            resolved.buffer().unwrap().as_ptr()
        ));

        // Pages without content are untouched
        let pending = page.request();
        assert!(Arc::ptr_eq(&pending.refilter(&evens()), &pending));
    }

    #[test]
    fn test_page_slot_before_resolution() {
        let page: Page<u64, ()> = Page::new(0, 3);
        assert_eq!(page.slot(2), Some(2));
        assert_eq!(page.slot(3), None);
        assert_eq!(page.content(0), None);
        assert_eq!(page.records().count(), 0);
    }

    #[test]
    fn test_page_splice() {
        let page: Arc<Page<u64, ()>> = Arc::new(Page::new(0, 4));
        let resolved = page.request().resolve(vec![0, 1, 2, 3], &accept_all()).unwrap();

        // Insert
        let inserted = resolved.splice(1, 0, vec![9], &accept_all()).unwrap();
        assert_eq!(inserted.buffer().unwrap(), &[0, 9, 1, 2, 3]);
        assert_eq!(inserted.len(), 5);

        // Replace
        let replaced = resolved.splice(2, 1, vec![7], &accept_all()).unwrap();
        assert_eq!(replaced.buffer().unwrap(), &[0, 1, 7, 3]);

        // Delete past the end is clamped
        let deleted = resolved.splice(3, 5, vec![], &accept_all()).unwrap();
        assert_eq!(deleted.buffer().unwrap(), &[0, 1, 2]);

        // The original page is untouched
        assert_eq!(resolved.buffer().unwrap(), &[0, 1, 2, 3]);

        // Filters are re-applied
        let filtered = resolved.splice(0, 0, vec![10], &evens()).unwrap();
        assert_eq!(filtered.records().copied().collect::<Vec<_>>(), vec![10, 0, 2]);
    }
}
