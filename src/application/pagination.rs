//! Page-number pagination over ordered collections.
//!
//! Page numbers come straight from the `page` query parameter and are never
//! rejected: anything unparsable means page 1, anything past the end means
//! the last page.

use serde::Serialize;

/// Pages shown on either side of the current one before eliding.
const WINDOW_RADIUS: u32 = 2;

/// A requested, not yet clamped, 1-based page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber(u32);

impl PageNumber {
    pub const FIRST: Self = Self(1);

    pub fn new(value: u32) -> Self {
        Self(value.max(1))
    }

    /// Parse a raw query value. Non-numeric input yields page 1 and values
    /// below 1 are raised to 1.
    pub fn parse(raw: Option<&str>) -> Self {
        let value = raw
            .map(str::trim)
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(1)
            .clamp(1, i64::from(u32::MAX));
        Self(u32::try_from(value).unwrap_or(u32::MAX))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Offset and limit of a clamped page, ready for a repository query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PageWindow {
    pub fn resolve(requested: PageNumber, per_page: u32, total_items: u64) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total_items.div_ceil(u64::from(per_page)).max(1);
        let total_pages = u32::try_from(total_pages).unwrap_or(u32::MAX);
        Self {
            number: requested.get().min(total_pages),
            per_page,
            total_items,
            total_pages,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }
}

/// One page of items plus the metadata templates need for a paginator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        Self {
            items,
            number: window.number,
            per_page: window.per_page,
            total_items: window.total_items,
            total_pages: window.total_pages,
        }
    }

    /// Slice an in-memory ordered collection.
    pub fn from_vec(all: Vec<T>, requested: PageNumber, per_page: u32) -> Self {
        let window = PageWindow::resolve(requested, per_page, all.len() as u64);
        let offset = usize::try_from(window.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(offset)
            .take(window.limit() as usize)
            .collect();
        Self::new(items, window)
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.total_pages > 1
    }

    pub fn next_page_number(&self) -> Option<u32> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<u32> {
        self.has_previous().then(|| self.number - 1)
    }

    /// Page links around the current page, always including the first and
    /// last page. `None` marks an elided gap.
    pub fn page_links(&self) -> Vec<Option<u32>> {
        let start = self.number.saturating_sub(WINDOW_RADIUS).max(1);
        let end = self.number.saturating_add(WINDOW_RADIUS).min(self.total_pages);

        let mut links = Vec::new();
        if start > 1 {
            links.push(Some(1));
            if start > 2 {
                links.push(None);
            }
        }
        links.extend((start..=end).map(Some));
        if end < self.total_pages {
            if end + 1 < self.total_pages {
                links.push(None);
            }
            links.push(Some(self.total_pages));
        }
        links
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}
