use serde::{Deserialize, Serialize};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Paging and ordering directive for list endpoints, built from untrusted
/// query parameters and checked by [`super::validate_filters`].
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safe_list: Vec<String>,
}

impl Filters {
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Pagination summary returned alongside list results. Every field is zero
/// (and omitted from JSON) when the result set is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub current_page: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub page_size: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub total_pages: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub total_records: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_next: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_prev: bool,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records <= 0 || page_size <= 0 {
            return Metadata::default();
        }

        let total_pages = (total_records + page_size - 1) / page_size;

        Metadata {
            current_page: page,
            page_size,
            total_pages,
            total_records,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}
