//! Postal code list loading
//!
//! Reads the codes extracted from the CNO export: one per line, blank lines
//! and `#` comments skipped, an optional `cep` header line ignored.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur when loading the postal code list
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file does not exist
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The input file exists but could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Makes a relative path absolute against the working directory
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Loads postal codes from a text file
///
/// A missing file is reported with its resolved absolute path.
pub fn load_postal_codes(path: &Path) -> Result<Vec<String>, InputError> {
    let resolved = resolve_path(path);
    let text = fs::read_to_string(&resolved).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            InputError::NotFound(resolved.clone())
        } else {
            InputError::Read {
                path: resolved.clone(),
                source,
            }
        }
    })?;
    Ok(parse_postal_codes(&text))
}

/// Splits text into trimmed postal codes
pub fn parse_postal_codes(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .filter(|(i, line)| !(*i == 0 && line.eq_ignore_ascii_case("cep")))
        .map(|(_, line)| line.to_string())
        .collect()
}

/// Drops repeated codes, keeping the first occurrence
pub fn dedupe(codes: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

/// Deduplicates, then keeps the `[offset, offset + limit)` slice
///
/// Lets a large extraction be processed in fixed chunks across runs.
pub fn prepare(codes: Vec<String>, offset: usize, limit: Option<usize>) -> Vec<String> {
    let unique = dedupe(codes);
    let rest = unique.into_iter().skip(offset);
    match limit {
        Some(limit) => rest.take(limit).collect(),
        None => rest.collect(),
    }
}
