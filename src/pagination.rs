//! Page-number pagination shared by every list endpoint. For the
//! nearby search the page is cut after distance sorting, never before,
//! so page 1 is always the nearest results.

use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageParams {
    /// Resolved (page, page_size), 1-based and clamped.
    pub fn resolve(&self, default_size: i64) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let size = self
            .page_size
            .unwrap_or(default_size)
            .clamp(1, MAX_PAGE_SIZE);
        (page, size)
    }

    pub fn offset(&self, default_size: i64) -> i64 {
        let (page, size) = self.resolve(default_size);
        (page - 1) * size
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(count: i64, page: i64, page_size: i64, results: Vec<T>) -> Self {
        Self {
            count,
            page,
            page_size,
            results,
        }
    }
}

/// Cuts one page out of an already-sorted in-memory result set.
pub fn slice_page<T>(items: Vec<T>, page: i64, page_size: i64) -> (i64, Vec<T>) {
    let count = items.len() as i64;
    let start = ((page - 1) * page_size).min(count) as usize;
    let end = (start + page_size as usize).min(items.len());
    let page_items = items.into_iter().skip(start).take(end - start).collect();
    (count, page_items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let params = PageParams::default();
        assert_eq!(params.resolve(20), (1, 20));
        assert_eq!(params.offset(20), 0);
    }

    #[test]
    fn test_resolve_clamps() {
        let params = PageParams {
            page: Some(0),
            page_size: Some(500),
        };
        assert_eq!(params.resolve(20), (1, MAX_PAGE_SIZE));

        let params = PageParams {
            page: Some(3),
            page_size: Some(10),
        };
        assert_eq!(params.offset(20), 20);
    }

    #[test]
    fn test_slice_page() {
        let items: Vec<i64> = (1..=25).collect();
        let (count, page) = slice_page(items.clone(), 2, 10);
        assert_eq!(count, 25);
        assert_eq!(page, (11..=20).collect::<Vec<i64>>());

        let (count, page) = slice_page(items.clone(), 3, 10);
        assert_eq!(count, 25);
        assert_eq!(page, (21..=25).collect::<Vec<i64>>());

        // Past the end: empty page, count intact.
        let (count, page) = slice_page(items, 9, 10);
        assert_eq!(count, 25);
        assert!(page.is_empty());
    }
}
