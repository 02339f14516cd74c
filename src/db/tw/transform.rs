use jiff::civil::{Date, DateTime};
use thiserror::Error;

use super::raw_table::{RawRecord, RawTable};

/// Portal column name to storage column name.
pub const COLUMN_MAPPING: [(&str, &str); 17] = [
    ("Post Date", "post_date"),
    ("Effective Date", "effective_date"),
    ("Loc", "loc"),
    ("Loc Zn", "loc_zn"),
    ("Loc Name", "loc_name"),
    ("Loc Purp Desc", "loc_purp_desc"),
    ("Loc/QTI", "loc_qti"),
    ("Flow Ind", "flow_ind"),
    ("DC", "dc"),
    ("OPC", "opc"),
    ("TSQ", "tsq"),
    ("OAC", "oac"),
    ("IT", "it"),
    ("Auth Overrun Ind", "auth_overrun_ind"),
    ("Nom Cap Exceed Ind", "nom_cap_exceed_ind"),
    ("All Qty Avail", "all_qty_avail"),
    ("Qty Reason", "qty_reason"),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("invalid date {value:?} in column {column} on row {row}")]
    InvalidDate {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("missing value in column {column} on row {row}")]
    MissingValue { row: usize, column: &'static str },
}

/// One row of the `operational_capacity` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub post_date: Date,
    pub effective_date: Date,
    pub loc: String,
    pub loc_zn: String,
    pub loc_name: Option<String>,
    pub loc_purp_desc: Option<String>,
    pub loc_qti: Option<f64>,
    pub flow_ind: Option<String>,
    pub dc: Option<String>,
    pub opc: Option<String>,
    pub tsq: Option<f64>,
    pub oac: Option<f64>,
    pub it: Option<String>,
    pub auth_overrun_ind: Option<String>,
    pub nom_cap_exceed_ind: Option<String>,
    pub all_qty_avail: Option<String>,
    pub qty_reason: Option<String>,
}

/// Storage name for a portal column.  Names that aren't portal names are
/// returned as is, so renaming an already renamed column is a no-op.
pub fn canonical_name(name: &str) -> &str {
    COLUMN_MAPPING
        .iter()
        .find(|(source, _)| *source == name)
        .map_or(name, |(_, canonical)| *canonical)
}

pub fn rename_headers(headers: &[String]) -> Vec<String> {
    headers.iter().map(|h| canonical_name(h).to_string()).collect()
}

fn rename_record(record: &RawRecord) -> RawRecord {
    record
        .iter()
        .map(|(k, v)| (canonical_name(k).to_string(), v.clone()))
        .collect()
}

/// Parse a number, anything that isn't a finite number becomes `None`.
pub fn coerce_number(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|x| x.is_finite())
}

/// Parse a date, dropping the time of day if there is one.
pub fn coerce_date(value: &str) -> Option<Date> {
    let value = value.trim();
    if let Ok(dt) = value.parse::<DateTime>() {
        return Some(dt.date());
    }
    if let Ok(date) = value.parse::<Date>() {
        return Some(date);
    }
    Date::strptime("%m/%d/%Y", value).ok()
}

/// Turn a validated table into storage rows.
pub fn transform(table: &RawTable) -> Result<Vec<Row>, TransformError> {
    table
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| to_row(i, &rename_record(record)))
        .collect()
}

fn to_row(row: usize, record: &RawRecord) -> Result<Row, TransformError> {
    let text = |column: &str| record.get(column).cloned().flatten();
    let required = |column: &'static str| {
        text(column).ok_or(TransformError::MissingValue { row, column })
    };
    let date = |column: &'static str| {
        let value = required(column)?;
        coerce_date(&value).ok_or(TransformError::InvalidDate { row, column, value })
    };
    let number = |column: &str| coerce_number(record.get(column).and_then(|v| v.as_deref()));

    Ok(Row {
        post_date: date("post_date")?,
        effective_date: date("effective_date")?,
        loc: required("loc")?,
        loc_zn: required("loc_zn")?,
        loc_name: text("loc_name"),
        loc_purp_desc: text("loc_purp_desc"),
        loc_qti: number("loc_qti"),
        flow_ind: text("flow_ind"),
        dc: text("dc"),
        opc: text("opc"),
        tsq: number("tsq"),
        oac: number("oac"),
        it: text("it"),
        auth_overrun_ind: text("auth_overrun_ind"),
        nom_cap_exceed_ind: text("nom_cap_exceed_ind"),
        all_qty_avail: text("all_qty_avail"),
        qty_reason: text("qty_reason"),
    })
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use jiff::civil::date;

    use crate::db::tw::raw_table::parse_csv;

    use super::*;

    #[test]
    fn rename_is_idempotent() {
        let headers: Vec<String> = COLUMN_MAPPING
            .iter()
            .map(|(source, _)| source.to_string())
            .chain(["Extra".to_string()])
            .collect();
        let once = rename_headers(&headers);
        let twice = rename_headers(&once);
        assert_eq!(once, twice);
        assert_eq!(once[6], "loc_qti");
        assert_eq!(once[17], "Extra");
    }

    #[test]
    fn mapping_is_one_to_one() {
        let mut canonical: Vec<&str> = COLUMN_MAPPING.iter().map(|(_, c)| *c).collect();
        canonical.sort();
        canonical.dedup();
        assert_eq!(canonical.len(), 17);
        assert!(COLUMN_MAPPING
            .iter()
            .all(|(source, _)| !canonical.contains(source)));
    }

    #[test]
    fn coerce_number_test() {
        assert_eq!(coerce_number(Some("12.5")), Some(12.5));
        assert_eq!(coerce_number(Some(" 300 ")), Some(300.0));
        assert_eq!(coerce_number(Some("-4")), Some(-4.0));
        assert_eq!(coerce_number(Some("abc")), None);
        assert_eq!(coerce_number(Some("")), None);
        assert_eq!(coerce_number(Some("NaN")), None);
        assert_eq!(coerce_number(None), None);
    }

    #[test]
    fn coerce_date_test() {
        assert_eq!(coerce_date("2024-03-07T08:15:30"), Some(date(2024, 3, 7)));
        assert_eq!(coerce_date("2024-03-07"), Some(date(2024, 3, 7)));
        assert_eq!(coerce_date("03/07/2024"), Some(date(2024, 3, 7)));
        assert_eq!(coerce_date("yesterday"), None);
    }

    #[test]
    fn transform_rows() -> Result<(), Box<dyn Error>> {
        let data = "Loc,Loc Zn,Loc Name,Loc Purp Desc,Loc/QTI,Flow Ind,DC,OPC,TSQ,OAC,IT,\
                    Auth Overrun Ind,Nom Cap Exceed Ind,All Qty Avail,Qty Reason\n\
                    500001,Z1,WAHA,Receipt,abc,R,100,200,150.5,,Y,N,N,Y,\n";
        let mut table = parse_csv(data.as_bytes())?;
        table.stamp("Post Date", "2024-03-08T06:30:00");
        table.stamp("Effective Date", "2024-03-07");
        let rows = transform(&table)?;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.post_date, date(2024, 3, 8));
        assert_eq!(row.effective_date, date(2024, 3, 7));
        assert_eq!(row.loc, "500001");
        assert_eq!(row.loc_zn, "Z1");
        assert_eq!(row.loc_name.as_deref(), Some("WAHA"));
        assert_eq!(row.loc_qti, None);
        assert_eq!(row.dc.as_deref(), Some("100"));
        assert_eq!(row.tsq, Some(150.5));
        assert_eq!(row.oac, None);
        assert_eq!(row.qty_reason, None);
        Ok(())
    }

    #[test]
    fn transform_bad_date() -> Result<(), Box<dyn Error>> {
        let mut table = parse_csv(b"Loc,Loc Zn\n500001,Z1\n")?;
        table.stamp("Post Date", "not a date");
        table.stamp("Effective Date", "2024-03-07");
        let res = transform(&table);
        assert_eq!(
            res,
            Err(TransformError::InvalidDate {
                row: 0,
                column: "post_date",
                value: "not a date".to_string()
            })
        );
        Ok(())
    }
}
