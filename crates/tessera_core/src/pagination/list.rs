//! Immutable page snapshots.

use serde::{Deserialize, Serialize};

/// One page of results plus the totals needed to page further.
///
/// Pages are 1-based. The list is immutable: appending a page produces a
/// new list via [`concat`](Self::concat).
///
/// Serializes as `{"items": [...], "page": n, "pageSize": m, "totalItems": t}`,
/// which is also the collection envelope the remote repository reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPage<T>")]
pub struct PaginatedList<T> {
    items: Vec<T>,
    page: u32,
    page_size: u32,
    total_items: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage<T> {
    items: Vec<T>,
    page: u32,
    page_size: u32,
    total_items: u64,
}

impl<T> From<RawPage<T>> for PaginatedList<T> {
    fn from(raw: RawPage<T>) -> Self {
        Self::new(raw.items, raw.page, raw.page_size, raw.total_items)
    }
}

impl<T> PaginatedList<T> {
    /// Creates a page.
    ///
    /// `page` and `page_size` below 1 are raised to 1.
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total_items: u64) -> Self {
        Self {
            items,
            page: page.max(1),
            page_size: page_size.max(1),
            total_items,
        }
    }

    /// Creates the first page of an empty collection.
    pub fn empty(page_size: u32) -> Self {
        Self::new(Vec::new(), 1, page_size, 0)
    }

    /// Items on this page (or on all pages so far, after `concat`).
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consumes the list, returning its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// The 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Items per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Total items in the collection across all pages.
    pub fn total_items(&self) -> u64 {
        self.total_items
    }

    /// Number of items held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no items are held.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `ceil(total_items / page_size)`.
    pub fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(u64::from(self.page_size))
    }

    /// Whether pages exist beyond this one.
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total_items
    }

    /// Appends `next` to this list.
    ///
    /// Items keep their order; `page` and `total_items` are taken from
    /// `next`, so the result reflects the latest known totals.
    #[must_use]
    pub fn concat(self, next: PaginatedList<T>) -> Self {
        let mut items = self.items;
        items.extend(next.items);
        Self {
            items,
            page: next.page,
            page_size: next.page_size,
            total_items: next.total_items,
        }
    }

    /// Converts every item.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedList<U> {
        PaginatedList {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_items: self.total_items,
        }
    }

    /// Converts every item, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PaginatedList<U>, E> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(PaginatedList {
            items,
            page: self.page,
            page_size: self.page_size,
            total_items: self.total_items,
        })
    }
}

impl<T: Clone> PaginatedList<T> {
    /// Cuts page `page` out of a complete, already ordered collection.
    ///
    /// Out-of-range pages are empty but still report the full total.
    pub fn from_slice(all: &[T], page: u32, page_size: u32) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let start = (page as usize - 1).saturating_mul(page_size as usize);
        let items = all
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Self::new(items, page, page_size, all.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_first_page() {
        let list: PaginatedList<u8> = PaginatedList::empty(20);
        assert_eq!(list.page(), 1);
        assert_eq!(list.total_pages(), 0);
        assert!(!list.has_more());
        assert!(list.is_empty());
    }

    #[test]
    fn out_of_range_page_keeps_total() {
        let all: Vec<u32> = (0..7).collect();
        let page = PaginatedList::from_slice(&all, 5, 3);
        assert!(page.is_empty());
        assert_eq!(page.total_items(), 7);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn envelope_wire_format() {
        let list = PaginatedList::new(vec!["a", "b"], 2, 2, 5);
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"items": ["a", "b"], "page": 2, "pageSize": 2, "totalItems": 5})
        );

        let raw = r#"{"items":[1,2],"page":0,"pageSize":0,"totalItems":2}"#;
        let parsed: PaginatedList<u8> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.page(), 1);
        assert_eq!(parsed.page_size(), 1);
    }

    #[test]
    fn try_map_stops_on_error() {
        let list = PaginatedList::new(vec![1, 2, 3], 1, 3, 3);
        let result: Result<PaginatedList<i32>, &str> =
            list.try_map(|x| if x == 2 { Err("two") } else { Ok(x) });
        assert_eq!(result, Err("two"));
    }

    proptest! {
        #[test]
        fn has_more_and_total_pages(page in 1u32..1000, page_size in 1u32..500, total in 0u64..1_000_000) {
            let list: PaginatedList<()> = PaginatedList::new(Vec::new(), page, page_size, total);
            let seen = u64::from(page) * u64::from(page_size);
            prop_assert_eq!(list.has_more(), seen < total);
            prop_assert!(list.total_pages() * u64::from(page_size) >= total);
            if total > 0 {
                prop_assert!((list.total_pages() - 1) * u64::from(page_size) < total);
            }
        }

        #[test]
        fn concat_adjacent_pages(total in 0usize..200, page_size in 1u32..20, page in 1u32..12) {
            let all: Vec<usize> = (0..total).collect();
            let first = PaginatedList::from_slice(&all, page, page_size);
            let second = PaginatedList::from_slice(&all, page + 1, page_size);
            let mut expected = first.items().to_vec();
            expected.extend_from_slice(second.items());

            let joined = first.concat(second);
            prop_assert_eq!(joined.page(), page + 1);
            prop_assert_eq!(joined.items(), expected.as_slice());
            prop_assert_eq!(joined.total_items(), total as u64);
        }
    }
}
