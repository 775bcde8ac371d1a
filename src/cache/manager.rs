//! Cache manager for persisting geocoding responses to disk
//!
//! Provides a `CacheManager` that stores the verbatim response body of every
//! successful lookup as `<cache_dir>/<cep>.json`.

use directories::ProjectDirs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::geocode::GeocodeRecord;

/// Manages reading and writing cached responses
///
/// The default directory is XDG-compliant (`~/.cache/cepgeo/ceps/` on Linux).
/// Unreadable or unparsable entries are reported and treated as misses.
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Creates a new CacheManager using the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "cepgeo")?;
        let cache_dir = project_dirs.cache_dir().join("ceps");
        Some(Self { cache_dir })
    }

    /// Creates a new CacheManager with a custom cache directory
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path of the cache file for a postal code
    ///
    /// `[A-Za-z0-9-]` is kept as-is and every other byte is percent-encoded
    /// (`.` → `%2E`), so distinct keys always map to distinct files and no
    /// key can escape the cache directory.
    pub fn path_for(&self, cep: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(cep)))
    }

    /// Whether an entry file exists for the postal code (parsable or not)
    pub fn contains(&self, cep: &str) -> bool {
        self.path_for(cep).is_file()
    }

    /// Reads and parses the cached record for a postal code
    ///
    /// # Arguments
    /// * `cep` - The postal code to look up
    ///
    /// # Returns
    /// * `Some(GeocodeRecord)` if an entry exists and parses
    /// * `None` if there is no entry, or it cannot be read or parsed (logged;
    ///   the caller refetches)
    pub fn read(&self, cep: &str) -> Option<GeocodeRecord> {
        let path = self.path_for(cep);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(cep, path = %path.display(), error = %e, "unreadable cache entry, refetching");
                return None;
            }
        };

        match GeocodeRecord::from_body(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(cep, path = %path.display(), error = %e, "corrupt cache entry, refetching");
                None
            }
        }
    }

    /// Stores a raw response body for a postal code
    ///
    /// The body is written to a temporary sibling and renamed into place, so
    /// readers never see a partial file and concurrent writers end up with
    /// the last complete write. The temporary file is removed on any failure.
    ///
    /// # Arguments
    /// * `cep` - The postal code the body belongs to
    /// * `body` - The response body, stored verbatim
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err` if directory creation, writing, or the rename fails
    pub fn write(&self, cep: &str, body: &str) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let path = self.path_for(cep);
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp, body)
            .and_then(|()| fs::rename(&tmp, &path))
            .inspect_err(|_| {
                let _ = fs::remove_file(&tmp);
            })
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9-]`
fn file_stem(cep: &str) -> String {
    let mut stem = String::with_capacity(cep.len());
    for byte in cep.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}
