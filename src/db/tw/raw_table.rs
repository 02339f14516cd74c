use std::collections::HashMap;

use log::debug;
use thiserror::Error;

/// Tokens read as a missing value: the usual spreadsheet/dataframe null
/// spellings plus the portal's own `missing`.  Blank cells are null too.
pub const NULL_MARKERS: [&str; 19] = [
    "#N/A",
    "#N/A N/A",
    "#NA",
    "-1.#IND",
    "-1.#QNAN",
    "-NaN",
    "-nan",
    "1.#IND",
    "1.#QNAN",
    "<NA>",
    "N/A",
    "NA",
    "NULL",
    "NaN",
    "None",
    "n/a",
    "nan",
    "null",
    "missing",
];

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("report is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("report has no header row")]
    NoHeader,
    #[error("failed to read the header row: {0}")]
    Header(#[from] csv::Error),
}

/// One CSV row keyed by column name, `None` for a null value.
pub type RawRecord = HashMap<String, Option<String>>;

/// The parsed report, columns in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
    /// Number of malformed lines that were dropped
    pub skipped: usize,
}

impl RawTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Set `column` to `value` on every record, adding the column if needed.
    pub fn stamp(&mut self, column: &str, value: &str) {
        if !self.has_column(column) {
            self.headers.push(column.to_string());
        }
        for record in self.records.iter_mut() {
            record.insert(column.to_string(), Some(value.to_string()));
        }
    }
}

fn null_if_marker(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || NULL_MARKERS.contains(&value) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse the raw report.  Lines that don't have as many fields as the header
/// are skipped.
pub fn parse_csv(bytes: &[u8]) -> Result<RawTable, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::NoHeader);
    }

    let mut table = RawTable {
        headers,
        ..RawTable::default()
    };
    for (i, result) in rdr.records().enumerate() {
        match result {
            Ok(record) => {
                let row: RawRecord = table
                    .headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(null_if_marker))
                    .collect();
                table.records.push(row);
            }
            Err(e) => {
                debug!("Skipping malformed line {}: {}", i + 2, e);
                table.skipped += 1;
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn parse_with_null_markers() -> Result<(), Box<dyn Error>> {
        let data = "Loc,Loc Zn,TSQ,OAC,Qty Reason\n\
                    1001, Z1 ,NA,N/A,missing\n\
                    1002,Z2,,12.5,ok\n";
        let table = parse_csv(data.as_bytes())?;
        assert_eq!(table.headers, vec!["Loc", "Loc Zn", "TSQ", "OAC", "Qty Reason"]);
        assert_eq!(table.len(), 2);
        let first = &table.records[0];
        assert_eq!(first["Loc Zn"], Some("Z1".to_string()));
        assert_eq!(first["TSQ"], None);
        assert_eq!(first["OAC"], None);
        assert_eq!(first["Qty Reason"], None);
        let second = &table.records[1];
        assert_eq!(second["TSQ"], None);
        assert_eq!(second["OAC"], Some("12.5".to_string()));
        Ok(())
    }

    #[test]
    fn common_null_spellings() -> Result<(), Box<dyn Error>> {
        let data = "Loc,Loc Zn,Loc/QTI,TSQ,OAC,IT,DC,OPC,Qty Reason\n\
                    NULL,null,nan,NaN,#N/A,None,<NA>,n/a,Nancy\n";
        let table = parse_csv(data.as_bytes())?;
        let record = &table.records[0];
        for column in ["Loc", "Loc Zn", "Loc/QTI", "TSQ", "OAC", "IT", "DC", "OPC"] {
            assert_eq!(record[column], None, "column {}", column);
        }
        assert_eq!(record["Qty Reason"], Some("Nancy".to_string()));
        Ok(())
    }

    #[test]
    fn skip_malformed_lines() -> Result<(), Box<dyn Error>> {
        let data = "Loc,Loc Zn,OAC\n1001,Z1,1\n1002,Z2\n1003,Z3,3,extra\n1004,Z4,4\n";
        let table = parse_csv(data.as_bytes())?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped, 2);
        assert_eq!(table.records[1]["Loc"], Some("1004".to_string()));
        Ok(())
    }

    #[test]
    fn quoted_fields_and_bom() -> Result<(), Box<dyn Error>> {
        let data = "\u{feff}Loc,Loc Name\n1001,\"WAHA, TX\"\n";
        let table = parse_csv(data.as_bytes())?;
        assert_eq!(table.headers[0], "Loc");
        assert_eq!(table.records[0]["Loc Name"], Some("WAHA, TX".to_string()));
        Ok(())
    }

    #[test]
    fn invalid_encoding() {
        let res = parse_csv(&[0x4c, 0x6f, 0x63, 0x0a, 0xff, 0xfe, 0x0a]);
        assert!(matches!(res, Err(ParseError::Encoding(_))));
    }

    #[test]
    fn empty_body() {
        assert!(matches!(parse_csv(b""), Err(ParseError::NoHeader)));
    }

    #[test]
    fn stamp_adds_and_overwrites() -> Result<(), Box<dyn Error>> {
        let mut table = parse_csv(b"Loc,Post Date\n1001,NA\n")?;
        table.stamp("Post Date", "2024-03-07T08:00:00");
        table.stamp("Effective Date", "2024-03-06");
        assert_eq!(table.headers, vec!["Loc", "Post Date", "Effective Date"]);
        assert_eq!(table.records[0]["Post Date"], Some("2024-03-07T08:00:00".to_string()));
        assert_eq!(table.records[0]["Effective Date"], Some("2024-03-06".to_string()));
        Ok(())
    }
}
