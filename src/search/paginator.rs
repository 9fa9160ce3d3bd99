//! Page windows computed from (total, start, limit).

use crate::error::InvalidArgument;
use serde::Serialize;

/// One navigable page: 1-based number plus the row offset and size it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: u64,
    pub start: u64,
    pub limit: u64,
}

/// Immutable pagination state for one search response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paginator {
    total: u64,
    start: u64,
    limit: u64,
    pages: u64,
}

impl Paginator {
    pub fn new(total: u64, start: u64, limit: u64) -> Result<Self, InvalidArgument> {
        if limit == 0 {
            return Err(InvalidArgument("paginator limit must be greater than zero"));
        }
        Ok(Paginator {
            total,
            start,
            limit,
            pages: total.div_ceil(limit),
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// `ceil(start / limit) + 1`. An offset that is not a page boundary rounds up.
    pub fn page_for_start(&self, start: u64) -> u64 {
        start.div_ceil(self.limit).saturating_add(1)
    }

    /// Offset of page `n`; page numbers below 1 clamp to page 1.
    pub fn start_for_page(&self, n: u64) -> u64 {
        n.saturating_sub(1).saturating_mul(self.limit)
    }

    fn page_at(&self, start: u64) -> Page {
        Page {
            number: self.page_for_start(start),
            start,
            limit: self.limit,
        }
    }

    pub fn first(&self) -> Page {
        Page {
            number: 1,
            start: 0,
            limit: self.limit,
        }
    }

    pub fn previous(&self) -> Page {
        self.page_at(self.start.saturating_sub(self.limit))
    }

    pub fn current(&self) -> Page {
        self.page_at(self.start)
    }

    pub fn next(&self) -> Page {
        let mut start = self.start.saturating_add(self.limit);
        if start >= self.total {
            start = self.start_for_page(self.pages);
        }
        self.page_at(start)
    }

    pub fn last(&self) -> Page {
        self.page_at(self.start_for_page(self.pages))
    }

    /// Pages around the current one. A non-negative `length` walks forward up to
    /// `min(current + length, pages)`; a negative one walks back to `max(current + length, 1)`.
    /// The current page is left out unless `include_current` is set.
    pub fn windowed_pages(&self, length: i64, include_current: bool) -> WindowedPages {
        let pages = i128::from(self.pages);
        let current = i128::from(self.page_for_start(self.start));
        let mut last = current + i128::from(length);
        if length > 0 && last > pages {
            last = pages;
        } else if length < 0 && last < 1 {
            last = 1;
        }
        let (from, to) = if current <= last { (current, last) } else { (last, current) };
        // Pages outside [1, pages] are never yielded, so the walk is bounded to that range.
        WindowedPages {
            next: from.max(1),
            to: to.min(pages),
            current,
            limit: self.limit,
            include_current,
        }
    }

    pub fn meta(&self, window: i64) -> PaginationMeta {
        PaginationMeta {
            total: self.total,
            start: self.start,
            limit: self.limit,
            pages: self.pages,
            first: self.first(),
            previous: self.previous(),
            current: self.current(),
            next: self.next(),
            last: self.last(),
            window: self.windowed_pages(window, true).collect(),
        }
    }
}

/// Lazy page window; clone it to walk the same window again.
#[derive(Clone, Debug)]
pub struct WindowedPages {
    next: i128,
    to: i128,
    current: i128,
    limit: u64,
    include_current: bool,
}

impl Iterator for WindowedPages {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        while self.next <= self.to {
            let n = self.next;
            self.next += 1;
            if !self.include_current && n == self.current {
                continue;
            }
            let number = u64::try_from(n).ok()?;
            return Some(Page {
                number,
                start: (number - 1).saturating_mul(self.limit),
                limit: self.limit,
            });
        }
        None
    }
}

/// Serialized navigation block attached to search responses.
#[derive(Clone, Debug, Serialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub start: u64,
    pub limit: u64,
    pub pages: u64,
    pub first: Page,
    pub previous: Page,
    pub current: Page,
    pub next: Page,
    pub last: Page,
    pub window: Vec<Page>,
}
