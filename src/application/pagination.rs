//! Page-number pagination shared by every feed.
//!
//! The raw `?page=` value is forgiving by contract: anything that is not a
//! number selects page 1, while numeric values outside the valid range snap
//! to the last page instead of erroring. Requesting page 99 of a 2-page feed
//! yields page 2, and an empty feed still has exactly one (empty) page.

use serde::Serialize;

/// Fixed page size used by every feed in the application.
pub const PAGE_SIZE: u32 = 10;

/// The window a resolved page occupies within the ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u32,
}

/// A clamped page selection derived from the total item count and the raw
/// request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPage {
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

impl ResolvedPage {
    pub fn window(&self) -> PageWindow {
        PageWindow {
            offset: u64::from(self.number - 1) * u64::from(PAGE_SIZE),
            limit: PAGE_SIZE,
        }
    }
}

/// Resolve the raw `?page=` parameter against the total item count.
///
/// Absent or non-numeric input selects page 1. Numeric input below 1 or past
/// the final page selects the final page.
pub fn resolve_page(total_items: u64, raw_page: Option<&str>) -> ResolvedPage {
    let total_pages = total_pages(total_items);

    let number = match raw_page.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => 1,
        Some(raw) => match raw.parse::<i64>() {
            Err(_) => 1,
            Ok(requested) if (1..=i64::from(total_pages)).contains(&requested) => requested as u32,
            Ok(_) => total_pages,
        },
    };

    ResolvedPage {
        number,
        total_pages,
        total_items,
    }
}

fn total_pages(total_items: u64) -> u32 {
    let pages = total_items.div_ceil(u64::from(PAGE_SIZE));
    u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
}

/// One page of an ordered feed plus navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, resolved: ResolvedPage) -> Self {
        Self {
            items,
            number: resolved.number,
            total_pages: resolved.total_pages,
            total_items: resolved.total_items,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            number: 1,
            total_pages: 1,
            total_items: 0,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_page_selects_first() {
        let resolved = resolve_page(25, None);
        assert_eq!(resolved.number, 1);
        assert_eq!(resolved.total_pages, 3);
        assert_eq!(resolved.window(), PageWindow { offset: 0, limit: 10 });
    }

    #[test]
    fn non_numeric_page_selects_first() {
        for raw in ["garbage", "2.5", "1e3", ""] {
            let resolved = resolve_page(25, Some(raw));
            assert_eq!(resolved.number, 1, "input {raw:?}");
        }
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let resolved = resolve_page(25, Some(" 2 "));
        assert_eq!(resolved.number, 2);
    }

    #[test]
    fn in_range_page_is_honored() {
        let resolved = resolve_page(25, Some("3"));
        assert_eq!(resolved.number, 3);
        assert_eq!(resolved.window().offset, 20);
    }

    #[test]
    fn past_the_end_clamps_to_last_page() {
        let resolved = resolve_page(25, Some("99"));
        assert_eq!(resolved.number, 3);
    }

    #[test]
    fn below_one_clamps_to_last_page() {
        for raw in ["0", "-4"] {
            let resolved = resolve_page(25, Some(raw));
            assert_eq!(resolved.number, 3, "input {raw:?}");
        }
    }

    #[test]
    fn empty_feed_has_a_single_empty_page() {
        let resolved = resolve_page(0, Some("7"));
        assert_eq!(resolved.number, 1);
        assert_eq!(resolved.total_pages, 1);
    }

    #[test]
    fn thirteen_items_split_ten_then_three() {
        let first = resolve_page(13, Some("1"));
        let second = resolve_page(13, Some("2"));
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.window(), PageWindow { offset: 0, limit: 10 });
        assert_eq!(second.window(), PageWindow { offset: 10, limit: 10 });
    }

    #[test]
    fn exact_multiple_has_no_phantom_page() {
        let resolved = resolve_page(20, Some("3"));
        assert_eq!(resolved.total_pages, 2);
        assert_eq!(resolved.number, 2);
    }

    #[test]
    fn page_navigation_flags() {
        let page = Page::new(vec![1, 2, 3], resolve_page(23, Some("2")));
        assert!(page.has_previous());
        assert!(page.has_next());

        let last = Page::<i32>::new(Vec::new(), resolve_page(23, Some("3")));
        assert!(last.has_previous());
        assert!(!last.has_next());

        let only = Page::<i32>::empty();
        assert!(!only.has_previous());
        assert!(!only.has_next());
    }
}
