use crate::error::ConversionError;
use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Reader};
use chrono::Timelike;
use std::io::Cursor;

/// Converts every sheet of an xlsx/xls/ods workbook into markdown: one `##`
/// heading per sheet followed by a pipe table whose first non-empty row is the
/// header. The workbook is read from memory.
pub fn tabular_to_text(spreadsheet: &[u8]) -> Result<String, ConversionError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(spreadsheet.to_vec()))
        .map_err(|error| ConversionError::Spreadsheet(error.to_string()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(ConversionError::EmptyDocument("workbook has no sheets".to_string()));
    }

    let mut sections = Vec::with_capacity(sheet_names.len());
    for sheet_name in sheet_names {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|error| ConversionError::Spreadsheet(format!("{sheet_name}: {error}")))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();

        sections.push(render_sheet(&sheet_name, &rows));
    }

    Ok(sections.join("\n"))
}

fn cell_text(cell: &Data) -> String {
    let raw = match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::Error(error) => format!("#ERR:{error:?}"),
        Data::DateTime(value) => excel_datetime_text(value),
        Data::DateTimeIso(value) => value.clone(),
        Data::DurationIso(value) => value.clone(),
    };
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Date cells are stored as serial numbers; render them as ISO dates, with a
/// time part only when the cell carries one.
fn excel_datetime_text(value: &ExcelDateTime) -> String {
    if value.is_duration() {
        return match value.as_duration() {
            Some(duration) => {
                let seconds = duration.num_seconds();
                format!("{}:{:02}:{:02}", seconds / 3600, seconds % 3600 / 60, seconds % 60)
            }
            None => value.to_string(),
        };
    }
    match value.as_datetime() {
        Some(datetime) if datetime.num_seconds_from_midnight() == 0 => {
            datetime.format("%Y-%m-%d").to_string()
        }
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => value.to_string(),
    }
}

fn render_sheet(name: &str, rows: &[Vec<String>]) -> String {
    let mut out = format!("## {name}\n");
    let Some((header, body)) = rows.split_first() else {
        return out;
    };

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let pad = |row: &[String]| -> String {
        let cells = (0..width)
            .map(|index| row.get(index).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>();
        format!("| {} |\n", cells.join(" | "))
    };

    out.push_str(&pad(header));
    out.push_str(&format!("|{}\n", " --- |".repeat(width)));
    for row in body {
        out.push_str(&pad(row));
    }
    out
}
