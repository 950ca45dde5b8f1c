use super::error::FilterError;
use super::types::{Filters, SortDirection};

impl Filters {
    /// Column to order by, with any leading "-" removed.
    ///
    /// Only safe-listed keys resolve. Validation is expected to have rejected
    /// anything else already, so a miss here is reported as an invariant
    /// violation rather than a client error.
    pub fn sort_column(&self) -> Result<&str, FilterError> {
        self.sort_safe_list
            .iter()
            .find(|safe| **safe == self.sort)
            .map(|safe| safe.strip_prefix('-').unwrap_or(safe))
            .ok_or_else(|| FilterError::UnsafeSortParameter(self.sort.clone()))
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    /// `ORDER BY` clause with `id` as the tiebreaker so pages stay stable.
    pub fn order_by_sql(&self) -> Result<String, FilterError> {
        let column = self.sort_column()?;
        let direction = self.sort_direction().to_sql();
        if column == "id" {
            Ok(format!("ORDER BY \"id\" {}", direction))
        } else {
            Ok(format!("ORDER BY \"{}\" {}, \"id\" ASC", column, direction))
        }
    }
}
