use itertools::Itertools;
use thiserror::Error;

use super::raw_table::RawTable;

pub const POST_DATE: &str = "Post Date";
pub const EFFECTIVE_DATE: &str = "Effective Date";

/// Columns the report must carry, as named by the portal.  `Post Date` and
/// `Effective Date` are stamped by the pipeline before validation.
pub const REQUIRED_COLUMNS: [&str; 17] = [
    POST_DATE,
    EFFECTIVE_DATE,
    "Loc",
    "Loc Zn",
    "Loc Name",
    "Loc Purp Desc",
    "Loc/QTI",
    "Flow Ind",
    "DC",
    "OPC",
    "TSQ",
    "OAC",
    "IT",
    "Auth Overrun Ind",
    "Nom Cap Exceed Ind",
    "All Qty Avail",
    "Qty Reason",
];

/// A null in any of these fails the whole day.
pub const CRITICAL_COLUMNS: [&str; 5] = [POST_DATE, EFFECTIVE_DATE, "Loc", "Loc Zn", "Loc/QTI"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("report has no rows")]
    Empty,
    #[error("null value in critical column {column:?} on row {row}")]
    NullCritical { row: usize, column: String },
}

/// Check the table is fit for loading.  The check is for the whole batch,
/// one bad row rejects the day.
pub fn validate(table: &RawTable) -> Result<(), ValidationFailure> {
    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|&&name| !table.has_column(name))
        .map(|name| name.to_string())
        .collect_vec();
    if !missing.is_empty() {
        return Err(ValidationFailure::MissingColumns(missing));
    }

    if table.is_empty() {
        return Err(ValidationFailure::Empty);
    }

    for (row, record) in table.records.iter().enumerate() {
        for column in CRITICAL_COLUMNS {
            if record.get(column).map_or(true, |v| v.is_none()) {
                return Err(ValidationFailure::NullCritical {
                    row,
                    column: column.to_string(),
                });
            }
        }
    }
    Ok(())
}
