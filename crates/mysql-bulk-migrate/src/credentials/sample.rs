//! Template credentials workbook.

use rust_xlsxwriter::{Color, Format, Workbook};
use std::path::Path;

use crate::error::Result;

pub const SAMPLE_SHEET_NAME: &str = "Database Credentials";

pub const SAMPLE_HEADERS: [&str; 4] = ["database_name", "username", "password", "host"];

const SAMPLE_ROWS: [[&str; 4]; 3] = [
    ["myapp_db", "myapp_user", "secure_password_123", "localhost"],
    ["analytics_db", "analytics_user", "another_password_456", "localhost"],
    ["staging_db", "staging_user", "staging_pass_789", "localhost"],
];

const COLUMN_WIDTHS: [f64; 4] = [20.0, 20.0, 25.0, 15.0];

/// Write the sample workbook users copy and fill in.
pub fn write_sample_workbook(path: &Path) -> Result<()> {
    write_workbook(path, &SAMPLE_ROWS)
}

/// Write a credentials workbook with the standard header and the given rows.
pub fn write_workbook(path: &Path, rows: &[[&str; 4]]) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x4472C4));

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SAMPLE_SHEET_NAME)?;

    for (col, header) in SAMPLE_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (row, values) in rows.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            if !value.is_empty() {
                worksheet.write_string(row as u32 + 1, col as u16, *value)?;
            }
        }
    }

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }

    workbook.save(path)?;
    Ok(())
}
