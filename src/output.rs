//! Batch result export (CSV or JSON Lines)
//!
//! Every input position produces one row. Absent lookups keep their row with
//! empty fields so the output lines up with the input list.

use std::io::{self, Write};
use std::path::Path;

use clap::ValueEnum;
use serde::Serialize;

use crate::geocode::{Coordinate, GeocodeRecord, Resolved};

/// CSV column order
pub const CSV_HEADER: [&str; 9] = [
    "cep",
    "latitude",
    "longitude",
    "street",
    "neighborhood",
    "complement",
    "city",
    "state",
    "status",
];

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated values with a header row
    #[default]
    Csv,
    /// One JSON object per line
    Jsonl,
}

impl OutputFormat {
    /// Guesses the format from a file extension (`.jsonl`/`.json` → JSON Lines)
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" => Some(OutputFormat::Csv),
            "jsonl" | "ndjson" | "json" => Some(OutputFormat::Jsonl),
            _ => None,
        }
    }
}

/// Writes results in the requested format
pub fn write_results<W: Write>(w: W, format: OutputFormat, results: &[Resolved]) -> io::Result<()> {
    match format {
        OutputFormat::Csv => write_csv(w, results),
        OutputFormat::Jsonl => write_json_lines(w, results),
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single CSV row to any writer.
fn write_row<W: Write>(w: &mut W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            w.write_all(b",")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

fn csv_row(resolved: &Resolved) -> Vec<String> {
    let status = resolved.lookup.label().to_string();
    let Some(record) = resolved.record() else {
        let mut row = vec![String::new(); CSV_HEADER.len()];
        row[0] = resolved.cep.clone();
        row[CSV_HEADER.len() - 1] = status;
        return row;
    };

    let text = |v: Option<&str>| v.unwrap_or_default().to_string();

    vec![
        resolved.cep.clone(),
        text(record.latitude.as_ref().map(Coordinate::as_str)),
        text(record.longitude.as_ref().map(Coordinate::as_str)),
        text(record.street.as_deref()),
        text(record.neighborhood.as_deref()),
        text(record.complement.as_deref()),
        text(record.city_name()),
        text(record.state_abbreviation()),
        status,
    ]
}

/// Writes a header row followed by one row per result
pub fn write_csv<W: Write>(mut w: W, results: &[Resolved]) -> io::Result<()> {
    let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
    write_row(&mut w, &header)?;
    for resolved in results {
        write_row(&mut w, &csv_row(resolved))?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonLine<'a> {
    cep: &'a str,
    status: &'static str,
    record: Option<&'a GeocodeRecord>,
}

/// Writes one `{"cep", "status", "record"}` object per line
pub fn write_json_lines<W: Write>(mut w: W, results: &[Resolved]) -> io::Result<()> {
    for resolved in results {
        let line = JsonLine {
            cep: &resolved.cep,
            status: resolved.lookup.label(),
            record: resolved.record(),
        };
        serde_json::to_writer(&mut w, &line)?;
        w.write_all(b"\n")?;
    }
    Ok(())
}
