//! Pagination for list endpoints
//!
//! `?page=` is 1-indexed; `?per_page=` defaults to [`DEFAULT_PAGE_SIZE`]
//! and is capped at [`MAX_PAGE_SIZE`].

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Requested page after sanitizing query values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub per_page: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Clamp raw query values into a usable page
pub fn calculate_pagination(requested_page: Option<i64>, requested_size: Option<i64>) -> Pagination {
    let per_page = requested_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = requested_page.unwrap_or(1).max(1);
    Pagination {
        page,
        per_page,
        // Past-the-end pages just come back empty
        offset: (page - 1).saturating_mul(per_page),
    }
}

pub fn total_pages(total_results: i64, per_page: i64) -> i64 {
    (total_results + per_page - 1) / per_page
}

/// List response body
#[derive(Debug, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total,
            total_pages: total_pages(total, pagination.per_page),
        }
    }
}
