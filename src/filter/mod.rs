pub mod types;
pub mod filter_order;
pub mod error;

pub use error::FilterError;
pub use types::*;

use crate::validator::{permitted_value, Validator};

/// Checks page bounds and sort membership before anything reaches storage.
pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page > 0, "page", "must be greater than zero");
    v.check(f.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(f.page_size > 0, "page_size", "must be greater than zero");
    v.check(f.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");

    v.check(permitted_value(&f.sort, &f.sort_safe_list), "sort", "invalid sort value");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safe_list: ["id", "title", "year", "-id", "-title", "-year"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    #[test]
    fn accepts_in_range_directive() {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters(1, 20, "-year"));
        assert!(v.valid(), "unexpected errors: {:?}", v.errors());
    }

    #[test]
    fn rejects_out_of_range_page_and_page_size() {
        for (page, size, field) in [
            (0, 20, "page"),
            (10_000_001, 20, "page"),
            (1, 0, "page_size"),
            (1, 101, "page_size"),
            (1, -5, "page_size"),
        ] {
            let mut v = Validator::new();
            validate_filters(&mut v, &filters(page, size, "id"));
            assert!(v.errors().contains_key(field), "page={} size={} should fail on {}", page, size, field);
        }

        let mut v = Validator::new();
        validate_filters(&mut v, &filters(10_000_000, 100, "id"));
        assert!(v.valid());
    }

    #[test]
    fn rejects_sort_keys_outside_safe_list() {
        for sort in ["runtime", "ye", "year; DROP TABLE movies", "--year", ""] {
            let mut v = Validator::new();
            validate_filters(&mut v, &filters(1, 20, sort));
            assert_eq!(v.errors().get("sort").map(String::as_str), Some("invalid sort value"));
        }
    }

    #[test]
    fn descending_keys_resolve_without_prefix() {
        let f = filters(1, 20, "-year");
        assert_eq!(f.sort_column().unwrap(), "year");
        assert_eq!(f.sort_direction(), SortDirection::Desc);

        let f = filters(1, 20, "title");
        assert_eq!(f.sort_column().unwrap(), "title");
        assert_eq!(f.sort_direction(), SortDirection::Asc);
    }

    #[test]
    fn unvalidated_sort_is_an_invariant_violation() {
        let f = filters(1, 20, "runtime");
        assert!(matches!(f.sort_column(), Err(FilterError::UnsafeSortParameter(s)) if s == "runtime"));
        assert!(f.order_by_sql().is_err());
    }

    #[test]
    fn order_by_adds_id_tiebreaker() {
        assert_eq!(filters(1, 5, "-year").order_by_sql().unwrap(), "ORDER BY \"year\" DESC, \"id\" ASC");
        assert_eq!(filters(1, 5, "-id").order_by_sql().unwrap(), "ORDER BY \"id\" DESC");
    }

    #[test]
    fn limit_and_offset() {
        let f = filters(3, 25, "id");
        assert_eq!(f.limit(), 25);
        assert_eq!(f.offset(), 50);
        assert_eq!(filters(1, 100, "id").offset(), 0);
    }

    #[test]
    fn metadata_matches_ceiling_division() {
        for page_size in 1..=100i64 {
            for total in [0i64, 1, 2, 99, 100, 101, 250, 1000] {
                let pages = if total == 0 { 0 } else { (total + page_size - 1) / page_size };
                for page in [1i64, 2, pages.max(1), pages + 1] {
                    let m = Metadata::calculate(total, page, page_size);
                    if total == 0 {
                        assert_eq!(m, Metadata::default());
                        continue;
                    }
                    assert_eq!(m.total_pages, pages);
                    assert_eq!(m.total_records, total);
                    assert_eq!(m.has_next, page < pages);
                    assert_eq!(m.has_prev, page > 1);
                }
            }
        }
    }

    #[test]
    fn empty_metadata_serializes_to_empty_object() {
        let json = serde_json::to_value(Metadata::calculate(0, 1, 20)).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let json = serde_json::to_value(Metadata::calculate(45, 2, 20)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "current_page": 2,
                "page_size": 20,
                "total_pages": 3,
                "total_records": 45,
                "has_next": true,
                "has_prev": true
            })
        );
    }
}
