use serde::{Deserialize, Serialize};

use crate::constants::MAX_PAGE_SIZE;

/// Page-number pagination; `page` is 1-based. Only built through `new`, so
/// `page >= 1` and `1 <= limit <= MAX_PAGE_SIZE` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    limit: i64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    pub fn from_rows(results: Vec<T>, total_rows: i64, request: PageRequest) -> Self {
        if results.is_empty() && request.page == 1 {
            return Self::no_rows();
        }
        let limit = request.limit.max(1);
        let page_count = (total_rows + limit - 1) / limit;

        let next = if request.page < page_count {
            Some(request.page + 1)
        } else {
            None
        };
        let previous = if request.page > 1 {
            Some((request.page - 1).min(page_count.max(1)))
        } else {
            None
        };

        Self {
            count: total_rows,
            next,
            previous,
            results,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}
