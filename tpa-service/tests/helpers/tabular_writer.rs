//! CSV and XLSX fixture writers

use anyhow::Result;
use rust_xlsxwriter::Workbook;
use std::path::Path;

/// Write a CSV file from a header and numeric rows
pub fn write_csv(path: &Path, header: &[&str], rows: &[Vec<f64>]) -> Result<()> {
    let mut text = header.join(",");
    text.push('\n');
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&cells.join(","));
        text.push('\n');
    }
    std::fs::write(path, text)?;
    Ok(())
}

/// Write an XLSX workbook; the first sheet holds the table, the rest are empty
pub fn write_xlsx(
    path: &Path,
    sheets: &[&str],
    header: &[&str],
    rows: &[Vec<f64>],
) -> Result<()> {
    let mut workbook = Workbook::new();
    for (index, sheet_name) in sheets.iter().enumerate() {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*sheet_name)?;
        if index > 0 {
            continue;
        }
        for (col, name) in header.iter().enumerate() {
            worksheet.write_string(0, col as u16, *name)?;
        }
        for (row_index, row) in rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                worksheet.write_number(row_index as u32 + 1, col as u16, *value)?;
            }
        }
    }
    workbook.save(path)?;
    Ok(())
}
