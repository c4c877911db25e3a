//! Tabular output: one CSV or XLSX file per image.
//!
//! Both formats share the header [`HEADER`] and the flattening rule in
//! [`WorkoutRecord::flatten`]. Each table is written to a `.tmp` sibling and
//! renamed into place, so a failed write never leaves a truncated table under
//! the final name.

use crate::config::OutputFormat;
use crate::error::WorkoutError;
use crate::record::{Cell, OutputRow, WorkoutRecord, HEADER};
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest string a spreadsheet cell accepts.
const XLSX_MAX_CELL_CHARS: usize = 32_767;

/// Flatten `record` and write it to `path` in `format`.
///
/// `today` replaces a missing date. Returns the number of data rows written;
/// the header is always written, even for an empty record.
pub fn write_table(
    record: &WorkoutRecord,
    path: &Path,
    format: OutputFormat,
    today: &str,
) -> Result<usize, WorkoutError> {
    let rows = record.flatten(today);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| WorkoutError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let tmp_path = tmp_sibling(path);
    let written = match format {
        OutputFormat::Csv => write_csv(&rows, &tmp_path),
        OutputFormat::Xlsx => write_xlsx(&rows, &tmp_path),
    };
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.at(path));
    }

    std::fs::rename(&tmp_path, path).map_err(|e| WorkoutError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl WorkoutError {
    /// Report write failures against the final path, not the temp file.
    fn at(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            WorkoutError::OutputWriteFailed { source, .. } => {
                WorkoutError::OutputWriteFailed { path, source }
            }
            WorkoutError::CsvWriteFailed { source, .. } => WorkoutError::CsvWriteFailed { path, source },
            WorkoutError::SpreadsheetWriteFailed { source, .. } => {
                WorkoutError::SpreadsheetWriteFailed { path, source }
            }
            other => other,
        }
    }
}

fn write_csv(rows: &[OutputRow], path: &Path) -> Result<(), WorkoutError> {
    let csv_err = |source: csv::Error| WorkoutError::CsvWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(HEADER).map_err(csv_err)?;
    for row in rows {
        writer
            .write_record(row.cells().iter().map(|c| c.to_string()))
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| WorkoutError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_xlsx(rows: &[OutputRow], path: &Path) -> Result<(), WorkoutError> {
    let xlsx_err = |source: rust_xlsxwriter::XlsxError| WorkoutError::SpreadsheetWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Workouts").map_err(xlsx_err)?;

    for (col, title) in HEADER.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *title, &bold)
            .map_err(xlsx_err)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (col, cell) in row.cells().iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Int(i) => {
                    sheet.write_number(r, col, *i as f64).map_err(xlsx_err)?;
                }
                Cell::Text(s) => {
                    sheet
                        .write_string(r, col, sanitize_cell(s))
                        .map_err(xlsx_err)?;
                }
            }
        }
    }

    sheet.autofit();
    workbook.save(path).map_err(xlsx_err)
}

/// Drop characters a spreadsheet cell cannot hold: control characters other
/// than tab/newline/CR, and the XML non-characters U+FFFE/U+FFFF. Overlong
/// strings are cut to the cell limit.
pub fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || !(c.is_control() || c == '\u{FFFE}' || c == '\u{FFFF}'))
        .take(XLSX_MAX_CELL_CHARS)
        .collect()
}
