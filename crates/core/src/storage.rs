use crate::error::ShipmentError;
use crate::models::ShipmentResponse;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes the response as pretty JSON to
/// `<dir>/shipment_<bol-or-unknown>_<YYYYmmdd_HHMMSS>.json` and returns the path.
pub fn save_shipment(response: &ShipmentResponse, dir: &Path) -> Result<PathBuf, ShipmentError> {
    fs::create_dir_all(dir)?;

    let bol = response
        .extraction
        .bill_of_lading_number
        .as_deref()
        .map(file_safe)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("shipment_{bol}_{timestamp}.json"));

    fs::write(&path, serde_json::to_string_pretty(response)?)?;
    Ok(path)
}

fn file_safe(name: &str) -> String {
    name.trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
