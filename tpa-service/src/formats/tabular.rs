//! CSV and XLSX tables
//!
//! Summaries stream the table once: the header row gives the columns, the
//! remaining rows are only counted (and the `frequency` column folded into a
//! min/max), so no table is materialized just to describe it. Full loads for
//! analysis return column-oriented data.

use calamine::{open_workbook, Data, DataRef, Reader, Xlsx, XlsxError};
use std::collections::HashMap;
use std::path::Path;

use crate::formats::{classify_channel, DataType, IngestError};
use crate::models::{
    is_axis_column, CellValue, ChannelInfo, DataColumn, FrequencyRange, TabularMetadata,
};

const TIME_COLUMN: &str = "time";
const FREQUENCY_COLUMN: &str = "frequency";

/// Summarize a CSV file
pub fn summarize_csv(path: &Path) -> Result<TabularMetadata, IngestError> {
    let mut reader = csv_reader(path)?;
    let columns = normalize_headers(
        reader
            .headers()
            .map_err(|e| IngestError::unreadable(path, e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect(),
    );
    if columns.is_empty() {
        return Err(IngestError::unreadable(path, "No columns to parse from file"));
    }

    let mut scan = RowScan::new(&columns);
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| IngestError::unreadable(path, e.to_string()))?
    {
        scan.observe(|index| {
            record
                .get(index)
                .and_then(|field| std::str::from_utf8(field).ok())
                .and_then(|field| field.trim().parse::<f64>().ok())
        });
    }

    Ok(scan.finish(columns, None))
}

/// Summarize the first worksheet of an XLSX workbook
///
/// Cells are streamed from the sheet XML. The first row holding a value is the
/// header and its leftmost value is column 0. The row count spans from the
/// header to the last row holding a value, as a loaded range would.
pub fn summarize_xlsx(path: &Path) -> Result<TabularMetadata, IngestError> {
    let unreadable = |e: XlsxError| IngestError::unreadable(path, e.to_string());
    let mut workbook = open_workbook::<Xlsx<_>, _>(path).map_err(unreadable)?;
    let sheets = workbook.sheet_names();
    let first = sheets
        .first()
        .ok_or_else(|| IngestError::unreadable(path, "Workbook has no worksheets"))?
        .clone();
    let mut cells = workbook
        .worksheet_cells_reader(&first)
        .map_err(unreadable)?;

    let mut header: Option<(u32, u32)> = None;
    let mut raw_header: Vec<String> = Vec::new();
    let mut body: Option<(Vec<String>, RowScan)> = None;
    let mut last_row = 0;

    while let Some(cell) = cells.next_cell().map_err(unreadable)? {
        let value = cell.get_value();
        if matches!(value, DataRef::Empty) {
            continue;
        }
        let (row, col) = cell.get_position();
        let (header_index, first_col) = *header.get_or_insert((row, col));
        let index = col.saturating_sub(first_col) as usize;

        if row == header_index {
            if raw_header.len() <= index {
                raw_header.resize(index + 1, String::new());
            }
            raw_header[index] = header_text(&Data::from(value.clone()));
            continue;
        }

        let (_, scan) = body.get_or_insert_with(|| {
            let columns = normalize_headers(std::mem::take(&mut raw_header));
            let scan = RowScan::new(&columns);
            (columns, scan)
        });
        if scan.frequency_index == Some(index) {
            if let Some(frequency) = numeric_cell(&Data::from(value.clone())) {
                scan.fold_frequency(frequency);
            }
        }
        last_row = row;
    }

    let (columns, mut scan) = match body {
        Some(body) => body,
        None => {
            let columns = normalize_headers(raw_header);
            let scan = RowScan::new(&columns);
            (columns, scan)
        }
    };
    if columns.is_empty() {
        return Err(IngestError::unreadable(path, "No columns to parse from file"));
    }
    if let Some((header_index, _)) = header {
        scan.rows = last_row.saturating_sub(header_index) as usize;
    }

    Ok(scan.finish(columns, Some(sheets)))
}

/// Load a whole CSV table
pub fn read_csv_table(path: &Path) -> Result<Vec<DataColumn>, IngestError> {
    let mut reader = csv_reader(path)?;
    let names = normalize_headers(
        reader
            .headers()
            .map_err(|e| IngestError::unreadable(path, e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect(),
    );
    let mut columns = empty_columns(names);

    for record in reader.records() {
        let record = record.map_err(|e| IngestError::unreadable(path, e.to_string()))?;
        for (index, column) in columns.iter_mut().enumerate() {
            let value = record.get(index).map(CellValue::parse).unwrap_or(CellValue::Missing);
            column.values.push(value);
        }
    }

    Ok(columns)
}

/// Load the first worksheet of an XLSX workbook
pub fn read_xlsx_table(path: &Path) -> Result<Vec<DataColumn>, IngestError> {
    let (_, range) = first_worksheet(path)?;
    let mut rows = range.rows();
    let names = normalize_headers(rows.next().map(header_row).unwrap_or_default());
    let mut columns = empty_columns(names);

    for row in rows {
        for (index, column) in columns.iter_mut().enumerate() {
            let value = row.get(index).map(cell_value).unwrap_or(CellValue::Missing);
            column.values.push(value);
        }
    }

    Ok(columns)
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, IngestError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| IngestError::unreadable(path, e.to_string()))
}

fn first_worksheet(path: &Path) -> Result<(Vec<String>, calamine::Range<Data>), IngestError> {
    let mut workbook = open_workbook::<Xlsx<_>, _>(path)
        .map_err(|e: XlsxError| IngestError::unreadable(path, e.to_string()))?;
    let sheets = workbook.sheet_names();
    let first = sheets
        .first()
        .ok_or_else(|| IngestError::unreadable(path, "Workbook has no worksheets"))?
        .clone();
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e: XlsxError| IngestError::unreadable(path, e.to_string()))?;
    Ok((sheets, range))
}

fn empty_columns(names: Vec<String>) -> Vec<DataColumn> {
    names
        .into_iter()
        .map(|name| DataColumn {
            name,
            values: Vec::new(),
        })
        .collect()
}

/// Blank headers become `Unnamed: <index>`; repeated names get `.1`, `.2`, ...
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(index, name)| {
            let base = if name.trim().is_empty() {
                format!("Unnamed: {index}")
            } else {
                name
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let unique = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

fn header_row(row: &[Data]) -> Vec<String> {
    row.iter().map(header_text).collect()
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Missing,
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Float(value) => CellValue::Number(*value),
        Data::Bool(value) => CellValue::Number(if *value { 1.0 } else { 0.0 }),
        Data::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

fn numeric_cell(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(value) => Some(*value as f64),
        Data::Float(value) => Some(*value),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Single-pass row counter with the running frequency bounds
struct RowScan {
    rows: usize,
    frequency_index: Option<usize>,
    bounds: Option<FrequencyRange>,
}

impl RowScan {
    fn new(columns: &[String]) -> Self {
        let time_domain = columns.iter().any(|c| c == TIME_COLUMN);
        let frequency_index = if time_domain {
            None
        } else {
            columns.iter().position(|c| c == FREQUENCY_COLUMN)
        };
        Self {
            rows: 0,
            frequency_index,
            bounds: None,
        }
    }

    fn observe(&mut self, numeric_at: impl Fn(usize) -> Option<f64>) {
        self.rows += 1;
        if let Some(value) = self.frequency_index.and_then(numeric_at) {
            self.fold_frequency(value);
        }
    }

    fn fold_frequency(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.bounds = Some(match self.bounds {
            None => FrequencyRange::new(value, value),
            Some(range) => FrequencyRange::new(range.min.min(value), range.max.max(value)),
        });
    }

    fn finish(self, columns: Vec<String>, sheets: Option<Vec<String>>) -> TabularMetadata {
        let data_type = if columns.iter().any(|c| c == TIME_COLUMN) {
            DataType::TimeDomain
        } else {
            DataType::FrequencyDomain
        };
        let channels = columns
            .iter()
            .filter(|name| !is_axis_column(name))
            .map(|name| ChannelInfo {
                name: name.clone(),
                channel_type: classify_channel(name),
            })
            .collect();
        TabularMetadata {
            columns,
            rows: self.rows,
            sheets,
            data_type,
            frequency_range: self.bounds,
            channels,
        }
    }
}
