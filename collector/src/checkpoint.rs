use chrono::{DateTime, Utc};
use collector_core::{timestamp, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDocument {
    last_processed_time: String,
}

/// Durable per-input progress marker: one small JSON file per input under
/// the checkpoint directory, holding the `date` of the last record handed
/// to the sink. Reads and writes go through the input identity so two
/// inputs can never share a file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Map an input identity to its checkpoint file. The identity is
    /// namespaced as `scheme://name`; the part after the first `//` becomes
    /// the file name. Anything that could escape the checkpoint directory
    /// or collide with another input is rejected outright.
    pub fn resolve_path(&self, identity: &str) -> Result<PathBuf> {
        let name = sanitize_identity(identity)?;
        Ok(self.dir.join(name))
    }

    /// Overwrite the checkpoint for `identity`. Writes to a temp file and
    /// renames so a reader never observes a partially written document.
    pub fn write(&self, identity: &str, ts: DateTime<Utc>) -> Result<()> {
        let path = self.resolve_path(identity)?;
        let tmp_path = tmp_sibling(&path);

        let document = CheckpointDocument {
            last_processed_time: timestamp::format(ts),
        };
        let json = serde_json::to_string(&document)?;

        fs::write(&tmp_path, json.as_bytes())?;
        {
            let f = fs::File::open(&tmp_path)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        debug!(identity, last_processed_time = %document.last_processed_time, "Checkpoint saved");
        Ok(())
    }

    /// Read the checkpoint for `identity`. `None` means no checkpoint yet
    /// (first run). A file that exists but does not parse is a hard error:
    /// silently falling back to "no checkpoint" would re-process or skip a
    /// wide time range without anyone noticing.
    pub fn read(&self, identity: &str) -> Result<Option<DateTime<Utc>>> {
        let path = self.resolve_path(identity)?;

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document: CheckpointDocument =
            serde_json::from_str(&content).map_err(|e| Error::CorruptCheckpoint {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;

        let ts = timestamp::parse(&document.last_processed_time).map_err(|_| {
            Error::CorruptCheckpoint {
                path: path.display().to_string(),
                details: format!(
                    "unparsable last_processed_time {:?}",
                    document.last_processed_time
                ),
            }
        })?;

        Ok(Some(ts))
    }
}

// Temp names start with a dot, which `sanitize_identity` never allows in a
// checkpoint name, so an in-flight write can never share a path with some
// other input's checkpoint.
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Extract and validate the file-name-safe segment of an input identity.
/// Also used to derive the secret lookup key for an input.
pub(crate) fn sanitize_identity(identity: &str) -> Result<&str> {
    let invalid = |details: &str| Error::InvalidIdentity {
        identity: identity.to_string(),
        details: details.to_string(),
    };

    let (_, name) = identity
        .split_once("//")
        .ok_or_else(|| invalid("expected a `scheme://name` form"))?;

    if name.is_empty() {
        return Err(invalid("empty name segment"));
    }
    // Leading dots cover `.` and `..`, and keep the dot-prefixed temp-file
    // namespace disjoint from checkpoint names.
    if name.starts_with('.') {
        return Err(invalid("name segment starts with a dot"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(invalid("name segment contains path separators"));
    }

    Ok(name)
}
