use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::{ComparatorResult, ImageContext, Map, Value};
use crate::services::dispatch::{Comparator, ComparatorError};

/// What a path in an extracted filesystem is, reduced to what matters for
/// change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with the SHA-256 of its content.
    File(String),
    Dir,
    Symlink(PathBuf),
    /// Device nodes, sockets, fifos.
    Special,
    /// Regular file whose content could not be read (e.g. mode 0000).
    Unreadable,
}

/// Added, removed and modified paths between the two extracted filesystems.
///
/// Adds one key to the report: `files`, a mapping with `added`, `removed` and
/// `modified` lists of absolute in-image paths. In silent mode the contents of
/// an added or removed directory are folded into the directory itself.
pub struct FilesComparator;

impl Comparator for FilesComparator {
    fn name(&self) -> &'static str {
        "files"
    }

    fn description(&self) -> &'static str {
        "Added, removed and modified files in the extracted filesystems"
    }

    fn run(
        &self,
        first: &ImageContext,
        second: &ImageContext,
        silent: bool,
    ) -> Result<ComparatorResult, ComparatorError> {
        let old = snapshot(first.root())?;
        let new = snapshot(second.root())?;
        debug!(first = old.len(), second = new.len(), "filesystem snapshots taken");

        let added: Vec<&str> =
            new.keys().filter(|p| !old.contains_key(*p)).map(String::as_str).collect();
        let removed: Vec<&str> =
            old.keys().filter(|p| !new.contains_key(*p)).map(String::as_str).collect();
        let modified: Vec<&str> = old
            .iter()
            .filter(|(path, kind)| new.get(*path).is_some_and(|other| other != *kind))
            .map(|(path, _)| path.as_str())
            .collect();

        let (added, removed) = if silent {
            (collapse(&added, &new), collapse(&removed, &old))
        } else {
            (added, removed)
        };

        let mut files = Map::new();
        files.insert("added".into(), to_list(&added));
        files.insert("removed".into(), to_list(&removed));
        files.insert("modified".into(), to_list(&modified));

        let mut result = ComparatorResult::new();
        result.insert("files".into(), Value::Object(files));
        Ok(result)
    }
}

/// Map every path under `root` (as `/relative/path`) to its kind.
pub fn snapshot(root: &Path) -> Result<BTreeMap<String, EntryKind>, ComparatorError> {
    let mut entries = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(ComparatorError::Runtime(format!(
                    "failed to walk {}: {err}",
                    root.display()
                )));
            }
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let key = format!("/{}", rel.to_string_lossy());

        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_symlink() {
            let target =
                fs::read_link(entry.path()).map_err(|e| ComparatorError::io(entry.path(), e))?;
            EntryKind::Symlink(target)
        } else if file_type.is_file() {
            match sha256_file(entry.path()) {
                Ok(digest) => EntryKind::File(digest),
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "cannot hash file; comparing by presence only");
                    EntryKind::Unreadable
                }
            }
        } else {
            EntryKind::Special
        };
        entries.insert(key, kind);
    }
    Ok(entries)
}

/// Drop paths whose parent directory is itself in `paths`.
fn collapse<'a>(paths: &[&'a str], snapshot: &BTreeMap<String, EntryKind>) -> Vec<&'a str> {
    let dirs: BTreeSet<&str> = paths
        .iter()
        .copied()
        .filter(|p| matches!(snapshot.get(*p), Some(EntryKind::Dir)))
        .collect();
    paths
        .iter()
        .copied()
        .filter(|p| {
            !Path::new(p)
                .ancestors()
                .skip(1)
                .any(|ancestor| ancestor.to_str().is_some_and(|a| dirs.contains(a)))
        })
        .collect()
}

fn to_list(paths: &[&str]) -> Value {
    Value::Array(paths.iter().map(|p| Value::String(p.to_string())).collect())
}

fn sha256_file(path: &Path) -> Result<String, ComparatorError> {
    let file = fs::File::open(path).map_err(|e| ComparatorError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).map_err(|e| ComparatorError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
