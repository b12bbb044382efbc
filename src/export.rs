//! Date-range export of the scan history to an `.xlsx` workbook.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::info;
use rust_xlsxwriter::{Format, Workbook};

use crate::error::ExportError;
use crate::store::{ScanStore, DATE_FORMAT};

pub const SHEET_NAME: &str = "LichSuQuet";
pub const HEADERS: [&str; 3] = ["Kết quả", "Ngày quét", "Giờ quét"];

/// Rows of one export, already relabelled and formatted for the sheet.
#[derive(Debug)]
pub struct ExportTable {
    pub from: NaiveDate,
    pub to: NaiveDate,
    rows: Vec<[String; 3]>,
}

impl ExportTable {
    /// Records scanned between `from` and `to` inclusive, in id order.
    pub fn collect(store: &ScanStore, from: NaiveDate, to: NaiveDate) -> Result<Self, ExportError> {
        let rows = store
            .between(from, to)?
            .into_iter()
            .map(|record| [record.text, record.scan_date, record.scan_time])
            .collect();
        Ok(ExportTable { from, to, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// File name suggested for this range.
    pub fn default_file_name(&self) -> String {
        format!(
            "{SHEET_NAME}_{}_{}.xlsx",
            self.from.format(DATE_FORMAT),
            self.to.format(DATE_FORMAT)
        )
    }

    /// Writes one sheet: a header row, then one row per record.
    /// Returns the path actually written (with `.xlsx` appended if missing).
    pub fn write_xlsx(&self, path: &Path) -> Result<PathBuf, ExportError> {
        let path = with_xlsx_extension(path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(ExportError::MissingDir(dir.to_path_buf()));
            }
        }

        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        for (col, title) in HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *title, &header)?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                worksheet.write_string(i as u32 + 1, col as u16, value)?;
            }
        }
        worksheet.autofit();

        workbook.save(&path)?;
        info!("exported {} row(s) to {}", self.rows.len(), path.display());
        Ok(path)
    }
}

fn with_xlsx_extension(path: &Path) -> PathBuf {
    let has_ext = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    if has_ext {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".xlsx");
        PathBuf::from(name)
    }
}
