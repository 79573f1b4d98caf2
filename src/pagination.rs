//! Limit/offset pagination for list endpoints.

use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

/// `?limit=&offset=` query parameters.
#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct PaginationQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl PaginationQuery {
    /// Requested page size, clamped to 1..=100 (default 50).
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Wrap a page of results fetched with this query's limit and offset.
    pub fn page<T>(&self, items: Vec<T>, total: i64) -> Paginated<T> {
        Paginated {
            items,
            total,
            limit: self.limit(),
            offset: self.offset(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Total matching items across all pages.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Paginated<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        let q = PaginationQuery {
            limit: Some(1000),
            offset: Some(-5),
        };
        assert_eq!(q.limit(), MAX_LIMIT);
        assert_eq!(q.offset(), 0);
        assert_eq!(PaginationQuery::default().limit(), DEFAULT_LIMIT);
        assert_eq!(
            PaginationQuery {
                limit: Some(0),
                offset: None
            }
            .limit(),
            1
        );
    }
}
