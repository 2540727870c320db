use crate::error::Result;
use crate::storage::{Database, FileRecord};
use std::collections::VecDeque;
use tracing::{debug, error};

/// Lazy, finite sequence of Pending records in ascending (size, id) order.
///
/// Pages are keyset-paginated: every page is a fresh query for Pending
/// records that sort after the last record already paged over. Records that
/// leave Pending while the queue is being drained are simply absent from
/// later pages, and nothing already paged over is ever returned twice.
/// Iteration ends at the first empty page, or after yielding a query error.
pub struct PendingFiles<'a> {
    db: &'a Database,
    page_size: usize,
    cursor: Option<(u64, String)>,
    buffer: VecDeque<FileRecord>,
    pages_fetched: usize,
    exhausted: bool,
}

impl<'a> PendingFiles<'a> {
    pub fn new(db: &'a Database, page_size: usize) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Number of non-empty pages read so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fetch_page(&mut self) -> Result<()> {
        let after = self
            .cursor
            .as_ref()
            .map(|(size, id)| (*size, id.as_str()));
        let page = self.db.fetch_pending_page(after, self.page_size)?;
        if page.is_empty() {
            self.exhausted = true;
            return Ok(());
        }

        if let Some(last) = page.last() {
            self.cursor = Some((last.size, last.id.clone()));
        }
        debug!(
            "Fetched work queue page {} with {} records",
            self.pages_fetched,
            page.len()
        );
        self.pages_fetched += 1;
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for PendingFiles<'_> {
    type Item = Result<FileRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                error!("Error fetching work queue page: {}", e);
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
