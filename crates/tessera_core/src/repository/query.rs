//! Page queries: page window, equality filter and sort order.

use serde_json::Value;
use std::cmp::Ordering;

/// Default page size for [`PageQuery::default`].
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// Wire name (`"asc"` / `"desc"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Sort order on one field of the wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Field name.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending sort on `field`.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending sort on `field`.
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Compares two wire values on the sort field.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ord = compare_values(a.get(&self.field), b.get(&self.field));
        match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Field-equality filter. All conditions must hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// A filter requiring `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    /// Adds another equality condition.
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// The conditions, in insertion order.
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Returns true if `wire` satisfies every condition.
    pub fn matches(&self, wire: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| wire.get(field) == Some(expected))
    }
}

/// Which page to fetch and how to shape it.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
    /// Optional filter.
    pub filter: Option<Filter>,
    /// Optional sort order.
    pub sort: Option<Sort>,
}

impl PageQuery {
    /// Query for `page` with `page_size` items. Both are raised to at least 1.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
            filter: None,
            sort: None,
        }
    }

    /// Query for the first page.
    pub fn first(page_size: u32) -> Self {
        Self::new(1, page_size)
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Same query for another page.
    #[must_use]
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// Query parameters for the remote envelope, in a stable order.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
        ];
        if let Some(sort) = &self.sort {
            params.push(("sort".to_string(), sort.field.clone()));
            params.push(("order".to_string(), sort.direction.as_str().to_string()));
        }
        if let Some(filter) = &self.filter {
            for (field, value) in filter.conditions() {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                params.push((field.clone(), rendered));
            }
        }
        params
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over optional JSON values: missing/null first, then
/// booleans, numbers, strings. Arrays and objects compare equal within
/// their type.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.total_cmp(&y)
                }
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_requires_all_conditions() {
        let filter = Filter::eq("folder", "work").and("pinned", true);
        assert!(filter.matches(&json!({"folder": "work", "pinned": true, "title": "x"})));
        assert!(!filter.matches(&json!({"folder": "work", "pinned": false})));
        assert!(!filter.matches(&json!({"pinned": true})));
    }

    #[test]
    fn sort_orders_missing_first() {
        let mut rows = vec![
            json!({"n": 3}),
            json!({}),
            json!({"n": 1}),
            json!({"n": 2.5}),
        ];
        let sort = Sort::ascending("n");
        rows.sort_by(|a, b| sort.compare(a, b));
        assert_eq!(rows, vec![json!({}), json!({"n": 1}), json!({"n": 2.5}), json!({"n": 3})]);

        let sort = Sort::descending("n");
        rows.sort_by(|a, b| sort.compare(a, b));
        assert_eq!(rows[0], json!({"n": 3}));
    }

    #[test]
    fn query_params() {
        let query = PageQuery::new(2, 10)
            .with_sort(Sort::descending("updatedAt"))
            .with_filter(Filter::eq("folder", "work"));
        let params = query.to_params();
        assert_eq!(
            params,
            vec![
                ("page".to_string(), "2".to_string()),
                ("pageSize".to_string(), "10".to_string()),
                ("sort".to_string(), "updatedAt".to_string()),
                ("order".to_string(), "desc".to_string()),
                ("folder".to_string(), "work".to_string()),
            ]
        );
    }

    #[test]
    fn page_numbers_start_at_one() {
        assert_eq!(PageQuery::new(0, 0).page, 1);
        assert_eq!(PageQuery::default().with_page(0).page, 1);
    }
}
