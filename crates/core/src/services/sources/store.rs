use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::model::Value;
use crate::services::sources::{ExtractError, ImageExtractor, ImageResolver, ResolveError};

/// Images unpacked on disk, one directory per image:
///
/// ```text
/// <root>/<name>/metadata.json   config, history, optional "Id"
/// <root>/<name>/rootfs/         the image filesystem
/// ```
///
/// The canonical id of an image is the `Id` field of its metadata, or
/// `sha256:<digest of metadata.json>` when absent.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    pub root: PathBuf,
}

/// One image found in a [`DirectoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub name: String,
    pub id: String,
    pub dir: PathBuf,
    pub metadata: Value,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn image_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Load the image stored under `name`, if any.
    pub fn load(&self, name: &str) -> Result<Option<StoredImage>, String> {
        let dir = self.image_dir(name);
        let metadata_path = dir.join("metadata.json");
        if !metadata_path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&metadata_path)
            .map_err(|e| format!("failed to read {}: {e}", metadata_path.display()))?;
        let metadata: Value = serde_json::from_slice(&bytes)
            .map_err(|e| format!("failed to parse {}: {e}", metadata_path.display()))?;
        let id = match metadata.get("Id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => format!("sha256:{:x}", Sha256::digest(&bytes)),
        };
        Ok(Some(StoredImage { name: name.to_string(), id, dir, metadata }))
    }

    /// All images in the store, sorted by name.
    pub fn list(&self) -> Result<Vec<StoredImage>, String> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| format!("failed to read image store {}: {e}", self.root.display()))?;
        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| e.to_string())?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(image) = self.load(&name)? {
                images.push(image);
            }
        }
        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<StoredImage>, String> {
        Ok(self.list()?.into_iter().find(|image| image.id == id))
    }
}

impl ImageResolver for DirectoryStore {
    fn resolve(&self, identifier: &str) -> Result<String, ResolveError> {
        let failed = |reason: String| ResolveError::Failed { identifier: identifier.into(), reason };

        if let Some(image) = self.load(identifier).map_err(failed)? {
            return Ok(image.id);
        }

        // Full or abbreviated ids, the way `docker image inspect` accepts them.
        let bare = identifier.strip_prefix("sha256:").unwrap_or(identifier);
        let matches: Vec<StoredImage> = self
            .list()
            .map_err(failed)?
            .into_iter()
            .filter(|image| {
                let id = image.id.strip_prefix("sha256:").unwrap_or(&image.id);
                !bare.is_empty() && id.starts_with(bare)
            })
            .collect();
        match matches.as_slice() {
            [only] => Ok(only.id.clone()),
            [] => Err(ResolveError::NotFound(identifier.to_string())),
            _ => Err(ResolveError::Failed {
                identifier: identifier.to_string(),
                reason: format!("ambiguous identifier matches {} images", matches.len()),
            }),
        }
    }
}

impl ImageExtractor for DirectoryStore {
    fn extract(&self, id: &str, dest: &Path) -> Result<Value, ExtractError> {
        let image = self
            .find_by_id(id)
            .map_err(|reason| ExtractError::failed(id, reason))?
            .ok_or_else(|| ExtractError::failed(id, "image is not in the store"))?;
        let rootfs = image.dir.join("rootfs");
        if rootfs.is_dir() {
            copy_tree(id, &rootfs, dest)?;
        } else {
            debug!(image = %image.name, "image has no rootfs directory; extracting metadata only");
        }
        Ok(image.metadata)
    }
}

fn copy_tree(id: &str, src: &Path, dest: &Path) -> Result<(), ExtractError> {
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            ExtractError::failed(id, format!("failed to walk {}: {e}", src.display()))
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ExtractError::io(&target, e))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| ExtractError::io(entry.path(), e))?;
            copy_symlink(&link, &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| ExtractError::io(&target, e))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), ExtractError> {
    std::os::unix::fs::symlink(link, target).map_err(|e| ExtractError::io(target, e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), ExtractError> {
    // No portable symlinks; keep the link target as file content.
    fs::write(target, link.to_string_lossy().as_bytes()).map_err(|e| ExtractError::io(target, e))
}
