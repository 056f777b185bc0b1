//! Identifier removal and duplicate-row cleaning.

use polars::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::utils::require_columns;

/// Drop `id_columns`, then drop exact duplicate rows keeping the first
/// occurrence. Row order is preserved.
///
/// # Errors
///
/// Returns [`PipelineError::ColumnNotFound`](crate::PipelineError::ColumnNotFound)
/// if any of `id_columns` is absent.
pub fn clean(df: DataFrame, id_columns: &[String]) -> Result<DataFrame> {
    require_columns(&df, id_columns)?;
    let rows_before = df.height();

    let df = df.drop_many(id_columns.iter().map(|c| PlSmallStr::from(c.as_str())));
    let df = df.unique_stable(None, UniqueKeepStrategy::First, None)?;

    info!(
        dropped_columns = id_columns.len(),
        duplicates_removed = rows_before - df.height(),
        rows = df.height(),
        "Cleaned table"
    );
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::column_names;
    use pretty_assertions::assert_eq;

    fn ids() -> Vec<String> {
        vec!["Unnamed: 0".to_string(), "Booking_ID".to_string()]
    }

    #[test]
    fn test_drops_ids_then_duplicates() {
        // Rows 0 and 2 differ only by their identifiers.
        let df = df! {
            "Unnamed: 0" => [0i64, 1, 2, 3],
            "Booking_ID" => ["INN1", "INN2", "INN3", "INN4"],
            "lead_time" => [10i64, 20, 10, 30],
            "room_type_reserved" => ["Room_Type 1", "Room_Type 2", "Room_Type 1", "Room_Type 1"],
        }
        .unwrap();

        let cleaned = clean(df, &ids()).unwrap();
        assert_eq!(column_names(&cleaned), vec!["lead_time", "room_type_reserved"]);
        assert_eq!(cleaned.height(), 3);

        let lead: Vec<i64> = cleaned
            .column("lead_time")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(lead, vec![10, 20, 30]);
    }

    #[test]
    fn test_missing_id_column_is_schema_error() {
        let df = df! { "Booking_ID" => ["INN1"], "lead_time" => [1i64] }.unwrap();
        let err = clean(df, &ids()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }
}
