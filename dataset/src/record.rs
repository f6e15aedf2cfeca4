//! A read-only view of one record.

use crate::Page;
use std::{fmt, sync::Arc};

/// One record of the sequence, derived from the [Page] that holds it.
///
/// Records are recomputed on every lookup and never outlive the snapshot they were read from.
/// All lifecycle flags delegate to the owning page. A record that could not be located (for
/// example because its index lies beyond the known length) has no page and reports every flag as
/// `false`.
pub struct Record<T, E> {
    page: Option<Arc<Page<T, E>>>,
    slot: usize,
}

impl<T, E> Record<T, E> {
    pub(crate) const fn new(page: Arc<Page<T, E>>, slot: usize) -> Self {
        Self {
            page: Some(page),
            slot,
        }
    }

    /// A record that does not belong to any page.
    pub const fn empty() -> Self {
        Self {
            page: None,
            slot: 0,
        }
    }

    /// Returns `true` if the record does not belong to any page.
    pub const fn is_empty(&self) -> bool {
        self.page.is_none()
    }

    /// The page that holds the record.
    pub fn page(&self) -> Option<&Arc<Page<T, E>>> {
        self.page.as_ref()
    }

    /// The slot of the record within its page.
    ///
    /// The slot refers to the content returned by the source, so it is unaffected by filtering.
    pub const fn index(&self) -> usize {
        self.slot
    }

    /// The content of the record, if its page is resolved.
    pub fn content(&self) -> Option<&T> {
        self.page.as_ref()?.content(self.slot)
    }

    /// The error of the owning page, if it was rejected.
    pub fn error(&self) -> Option<&E> {
        self.page.as_ref()?.error()
    }

    pub fn is_requested(&self) -> bool {
        self.page.as_ref().is_some_and(|page| page.is_requested())
    }

    pub fn is_pending(&self) -> bool {
        self.page.as_ref().is_some_and(|page| page.is_pending())
    }

    pub fn is_resolved(&self) -> bool {
        self.page.as_ref().is_some_and(|page| page.is_resolved())
    }

    pub fn is_rejected(&self) -> bool {
        self.page.as_ref().is_some_and(|page| page.is_rejected())
    }

    pub fn is_settled(&self) -> bool {
        self.page.as_ref().is_some_and(|page| page.is_settled())
    }
}

impl<T, E> Clone for Record<T, E> {
    fn clone(&self) -> Self {
        Self {
            page: self.page.clone(),
            slot: self.slot,
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Record<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("page", &self.page.as_ref().map(|page| page.offset()))
            .field("index", &self.slot)
            .field("content", &self.content())
            .field("error", &self.error())
            .finish()
    }
}
