//! Loading identifier lists from files.
//!
//! CSV files and spreadsheets carry a header row and must have exactly one
//! column; for spreadsheets only the first sheet is read. Any other file is
//! read as one identifier per line. Blank values are skipped, values are
//! trimmed, and duplicates are kept.

use calamine::{open_workbook_auto, Data, Range, Reader};
use std::fs;
use std::path::Path;

use crate::error::KnowMeError;
use crate::types::Identifier;

/// Read identifiers from `path`, picking the format from the extension.
pub fn load_identifiers<P: AsRef<Path>>(path: P) -> Result<Vec<Identifier>, KnowMeError> {
    let path = path.as_ref();
    let display = path.to_string_lossy();

    if !path.exists() {
        return Err(KnowMeError::file_error(display, "File not found"));
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if matches!(extension.as_str(), "xlsx" | "xlsm" | "xls" | "ods") {
        let mut workbook = open_workbook_auto(path).map_err(|e| {
            KnowMeError::file_error(display.clone(), format!("Failed to open spreadsheet: {}", e))
        })?;
        let range = match workbook.worksheet_range_at(0) {
            Some(Ok(range)) => range,
            Some(Err(e)) => {
                return Err(KnowMeError::file_error(
                    display,
                    format!("Failed to read first sheet: {}", e),
                ))
            }
            None => return Err(KnowMeError::file_error(display, "Spreadsheet has no sheets")),
        };
        return parse_single_column_range(&range);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| KnowMeError::file_error(display.clone(), format!("Failed to read file: {}", e)))?;

    if extension == "csv" {
        parse_single_column_csv(&content)
    } else {
        Ok(parse_lines(&content))
    }
}

/// One identifier per non-blank line.
pub fn parse_lines(content: &str) -> Vec<Identifier> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a CSV document with a header row and exactly one column.
pub fn parse_single_column_csv(content: &str) -> Result<Vec<Identifier>, KnowMeError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Ok(Vec::new());
    };

    let header_fields = split_csv_line(header.trim_start_matches('\u{feff}'));
    if header_fields.len() != 1 {
        return Err(KnowMeError::invalid_input(format!(
            "the file must have exactly ONE column, found {} ({})",
            header_fields.len(),
            header_fields.join(", ")
        )));
    }

    let mut identifiers = Vec::new();
    for (idx, line) in lines {
        let mut fields = split_csv_line(line);
        if fields.len() != 1 {
            return Err(KnowMeError::invalid_input(format!(
                "line {}: expected 1 field, found {}",
                idx + 1,
                fields.len()
            )));
        }
        let value = fields.remove(0);
        let value = value.trim();
        if !value.is_empty() {
            identifiers.push(value.to_string());
        }
    }

    Ok(identifiers)
}

/// Read a sheet whose first row is the header and which has exactly one
/// column.
pub fn parse_single_column_range(range: &Range<Data>) -> Result<Vec<Identifier>, KnowMeError> {
    if range.is_empty() {
        return Ok(Vec::new());
    }

    if range.width() != 1 {
        let header: Vec<String> = range
            .rows()
            .next()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default();
        return Err(KnowMeError::invalid_input(format!(
            "the file must have exactly ONE column, found {} ({})",
            range.width(),
            header.join(", ")
        )));
    }

    Ok(range
        .rows()
        .skip(1)
        .filter_map(|row| row.first())
        .map(cell_text)
        .filter(|value| !value.is_empty())
        .collect())
}

/// Cell value as identifier text. Whole numbers lose the `.0` that
/// spreadsheets add to numeric document columns.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

/// Split one CSV line on commas, honouring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
