// src/spreadsheet.rs

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

use crate::extract::ExtractedFields;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("Excel generation error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Excel generation error: timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Write the mapping as a header row plus one data row, columns in
/// mapping order, and return the encoded workbook.
pub fn serialize(fields: &ExtractedFields) -> Result<Vec<u8>, SpreadsheetError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    for (col, (name, value)) in fields.iter().enumerate() {
        let col = u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)?;
        sheet.write_string_with_format(0, col, name, &header)?;

        match value {
            Value::Null => {}
            Value::String(s) => {
                sheet.write_string(1, col, s)?;
            }
            Value::Number(n) => match n.as_f64() {
                Some(f) => {
                    sheet.write_number(1, col, f)?;
                }
                None => {
                    sheet.write_string(1, col, n.to_string())?;
                }
            },
            Value::Bool(b) => {
                sheet.write_boolean(1, col, *b)?;
            }
            // nested values are kept as compact JSON text
            other => {
                sheet.write_string(1, col, other.to_string())?;
            }
        }
    }

    let bytes = workbook.save_to_buffer()?;
    info!(columns = fields.len(), bytes = bytes.len(), "Workbook generated");
    Ok(bytes)
}

/// `invoice_data_<YYYYMMDD_HHMMSS>.xlsx` for the given instant.
pub fn artifact_name(at: OffsetDateTime) -> Result<String, SpreadsheetError> {
    let stamp = at.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    Ok(format!("invoice_data_{stamp}.xlsx"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
    use serde_json::json;
    use std::io::Cursor;
    use time::macros::datetime;

    fn read_back(bytes: Vec<u8>) -> Vec<Vec<Data>> {
        let mut wb: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let range = wb.worksheet_range("Sheet1").unwrap();
        range.rows().map(|r| r.to_vec()).collect()
    }

    fn fields(value: Value) -> ExtractedFields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_one_row_round_trip() {
        let bytes = serialize(&fields(json!({"A": "1", "B": "2"}))).unwrap();
        let rows = read_back(bytes);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            vec![Data::String("A".into()), Data::String("B".into())]
        );
        assert_eq!(
            rows[1],
            vec![Data::String("1".into()), Data::String("2".into())]
        );
    }

    #[test]
    fn test_mixed_values() {
        let bytes = serialize(&fields(json!({
            "Total": 12.5,
            "Paid": true,
            "Vendor": null,
            "Lines": ["a", "b"]
        })))
        .unwrap();
        let rows = read_back(bytes);
        assert_eq!(rows[1][0], Data::Float(12.5));
        assert_eq!(rows[1][1], Data::Bool(true));
        assert_eq!(rows[1][2], Data::Empty);
        assert_eq!(rows[1][3], Data::String(r#"["a","b"]"#.into()));
    }

    #[test]
    fn test_artifact_name_format() {
        let name = artifact_name(datetime!(2025-03-07 09:05:02 UTC)).unwrap();
        assert_eq!(name, "invoice_data_20250307_090502.xlsx");
    }
}
