//! services/api/src/adapters/spreadsheet.rs
//!
//! Decodes an uploaded question-bank sheet into rows of cells. `.csv` goes
//! through `csv`; Excel and OpenDocument workbooks through `calamine`, reading
//! the first worksheet.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use lms_core::import::Cell;
use lms_core::ports::{PortError, PortResult};
use std::io::Cursor;

fn invalid(e: impl std::fmt::Display) -> PortError {
    PortError::Invalid(format!("Error processing file: {e}"))
}

fn from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::from(s.as_str()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        other => Cell::Text(other.to_string()),
    }
}

fn decode_csv(bytes: &[u8]) -> PortResult<Vec<Vec<Cell>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    reader
        .records()
        .map(|record| {
            let record = record.map_err(invalid)?;
            Ok(record.iter().map(Cell::from).collect())
        })
        .collect()
}

fn decode_workbook(bytes: &[u8]) -> PortResult<Vec<Vec<Cell>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(invalid)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| invalid("the workbook has no worksheets"))?
        .map_err(invalid)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(from_data).collect())
        .collect())
}

/// Rows of the first sheet, header row included.
pub fn decode_sheet(file_name: &str, bytes: &[u8]) -> PortResult<Vec<Vec<Cell>>> {
    if bytes.is_empty() {
        return Err(invalid("the uploaded file is empty"));
    }
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        decode_csv(bytes)
    } else if [".xlsx", ".xlsm", ".xls", ".xlsb", ".ods"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        decode_workbook(bytes)
    } else {
        Err(PortError::Invalid(format!(
            "Unsupported spreadsheet '{}'. Upload an .xlsx, .xls, .ods or .csv file.",
            file_name
        )))
    }
}
