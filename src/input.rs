use std::io::Read;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use csv::ReaderBuilder;
use tracing::debug;

use crate::domain::{FlatRecord, normalize_property_name};
use crate::error::SpinnakerError;

pub const WORKBOOK_SHEET: &str = "Sheet1";

/// Reads an input table, trying it as a workbook first and as tab-separated
/// text when that fails.
pub fn read_input(path: &Path) -> Result<Vec<FlatRecord>, SpinnakerError> {
    match read_workbook(path, WORKBOOK_SHEET) {
        Ok(records) => Ok(records),
        Err(err) => {
            debug!(path = %path.display(), "not a workbook, reading as tsv: {err}");
            read_tsv(path)
        }
    }
}

/// Reads `sheet` of a workbook whose first row names the columns. Columns
/// without a header and empty cells are left out of the records.
pub fn read_workbook(path: &Path, sheet: &str) -> Result<Vec<FlatRecord>, SpinnakerError> {
    debug!(path = %path.display(), sheet, "reading workbook input");
    let input_error = |message: String| SpinnakerError::InputRead {
        path: path.to_path_buf(),
        message,
    };
    let mut workbook = open_workbook_auto(path).map_err(|err| input_error(err.to_string()))?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|err| input_error(format!("sheet {sheet}: {err}")))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers = header_row
        .iter()
        .map(|cell| cell_text(cell).map(|name| normalize_property_name(&name)))
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for row in rows {
        let record = headers
            .iter()
            .zip(row.iter())
            .filter_map(|(header, cell)| Some((header.clone()?, cell_text(cell)?)))
            .filter(|(header, _)| !header.is_empty())
            .collect::<FlatRecord>();
        if record.is_empty() {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        other => {
            let text = other.to_string().trim().to_string();
            (!text.is_empty()).then_some(text)
        }
    }
}

/// Reads a tab-separated file whose first row names the columns.
pub fn read_tsv(path: &Path) -> Result<Vec<FlatRecord>, SpinnakerError> {
    debug!(path = %path.display(), "reading tsv input");
    let reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(|err| SpinnakerError::InputRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    collect_records(reader).map_err(|message| SpinnakerError::InputRead {
        path: path.to_path_buf(),
        message,
    })
}

pub fn read_tsv_from<R: Read>(source: R) -> Result<Vec<FlatRecord>, SpinnakerError> {
    let reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(source);
    collect_records(reader).map_err(|message| SpinnakerError::InputRead {
        path: "<stream>".into(),
        message,
    })
}

fn collect_records<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<FlatRecord>, String> {
    let headers = reader
        .headers()
        .map_err(|err| err.to_string())?
        .iter()
        .map(normalize_property_name)
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|err| err.to_string())?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let record = headers
            .iter()
            .zip(row.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, cell)| (header.clone(), cell.trim().to_string()))
            .collect::<FlatRecord>();
        records.push(record);
    }
    Ok(records)
}
