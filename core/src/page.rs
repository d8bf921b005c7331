//! Page arithmetic for table browsing.
//!
//! Pages are 1-indexed. A request outside `[1, total_pages]` is clamped
//! rather than rejected, and an empty table still has one (empty) page.
//!
//! # Examples
//!
//! ```
//! use litebrowse_core::{PageRequest, Pagination};
//!
//! let page = Pagination::resolve(125, 50, PageRequest::Last);
//! assert_eq!(page.page, 3);
//! assert_eq!(page.total_pages, 3);
//! assert_eq!(page.offset(), 100);
//!
//! let page = Pagination::resolve(125, 50, PageRequest::parse("0"));
//! assert_eq!(page.page, 1);
//! ```

use serde::Serialize;

/// A requested page as submitted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageRequest {
    /// A specific page number; out-of-range values are clamped.
    Number(i64),
    /// Whatever the final page turns out to be.
    Last,
    #[default]
    First,
}

impl PageRequest {
    /// Parses a page parameter.
    ///
    /// `last` selects the final page, plain digits select that page, and
    /// anything else (including negatives) falls back to the first page.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("last") {
            return Self::Last;
        }
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            // Digit strings too long for i64 are still "past the end".
            return Self::Number(raw.parse().unwrap_or(i64::MAX));
        }
        Self::First
    }
}

/// Resolved page bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Current page, always within `1..=total_pages`.
    pub page: u64,
    pub page_size: u64,
    pub total_rows: u64,
    pub total_pages: u64,
    pub previous_page: Option<u64>,
    pub next_page: Option<u64>,
}

impl Pagination {
    /// Resolves `request` against `total_rows` rows split into pages of
    /// `page_size` (a zero page size is treated as one).
    pub fn resolve(total_rows: u64, page_size: u64, request: PageRequest) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_rows.div_ceil(page_size).max(1);
        let page = match request {
            PageRequest::First => 1,
            PageRequest::Last => total_pages,
            PageRequest::Number(n) => u64::try_from(n).unwrap_or(0).clamp(1, total_pages),
        };

        Self {
            page,
            page_size,
            total_rows,
            total_pages,
            previous_page: (page > 1).then(|| page - 1),
            next_page: (page < total_pages).then(|| page + 1),
        }
    }

    /// Number of rows before the current page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}
