//! `collectstatic`: copies the static source tree into the static root,
//! adds content-hashed copies and writes a manifest mapping the two.

use super::BootstrapError;
use crate::config::StaticFilesConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MANIFEST_NAME: &str = "staticfiles.json";

/// Hex digits of the content hash embedded in hashed file names.
const HASH_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub copied: usize,
    pub manifest: PathBuf,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    version: &'static str,
    paths: &'a BTreeMap<String, String>,
}

/// Returns `None` when the source tree does not exist; nothing is written.
pub fn collect_static(config: &StaticFilesConfig) -> Result<Option<CollectReport>, BootstrapError> {
    if !config.source_dir.is_dir() {
        warn!(source = %config.source_dir.display(), "static source directory missing; skipping collection");
        return Ok(None);
    }

    let mut files = Vec::new();
    walk(&config.source_dir, &mut files).map_err(|source| io_error(&config.source_dir, source))?;
    files.sort();

    let mut paths = BTreeMap::new();
    for file in &files {
        let relative = file.strip_prefix(&config.source_dir).unwrap_or(file);
        let name = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let contents = fs::read(file).map_err(|source| io_error(file, source))?;
        let hashed = hashed_name(&name, &contents);

        for target in [&name, &hashed] {
            let destination = config.root.join(target);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
            }
            fs::write(&destination, &contents).map_err(|source| io_error(&destination, source))?;
        }
        paths.insert(name, hashed);
    }

    fs::create_dir_all(&config.root).map_err(|source| io_error(&config.root, source))?;
    let manifest = config.root.join(MANIFEST_NAME);
    let body = serde_json::to_vec_pretty(&Manifest {
        version: "1.1",
        paths: &paths,
    })?;
    fs::write(&manifest, body).map_err(|source| io_error(&manifest, source))?;

    info!(copied = paths.len(), root = %config.root.display(), "static files collected");
    Ok(Some(CollectReport {
        copied: paths.len(),
        manifest,
    }))
}

/// Symlinks are skipped, never followed: a link may point outside the
/// source tree or back up into it.
fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_symlink() {
            warn!(path = %path.display(), "skipping symlink in static source tree");
        } else if file_type.is_dir() {
            walk(&path, files)?;
        } else if file_type.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

/// `css/admin.css` -> `css/admin.<hash>.css`.
fn hashed_name(name: &str, contents: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(contents));
    let hash = &digest[..HASH_LEN];

    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, name),
    };
    let file = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.{hash}.{ext}"),
        _ => format!("{file}.{hash}"),
    };
    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}

fn io_error(path: &Path, source: std::io::Error) -> BootstrapError {
    BootstrapError::Static {
        path: path.display().to_string(),
        source,
    }
}
