//! Asset copying.
//!
//! Assets are copied byte for byte into the top of the output directory
//! under their base name: `css/style.css` lands at `{output}/style.css`.
//! Two assets with the same base name overwrite each other, last one wins.

use crate::config::BookPaths;
use crate::generate::GenerateError;
use crate::tracker::{Tracked, WatchState};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Result of syncing one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    Copied(PathBuf),
    Unchanged,
}

/// Where an asset is copied to, or `None` when the path has no file name
/// (e.g. `css/..`).
pub fn asset_output_path(asset: &str, output: &Path) -> Option<PathBuf> {
    Path::new(asset).file_name().map(|name| output.join(name))
}

/// Copy `asset` into the output directory when it changed since the time
/// recorded in `state` (or always, with `force`), then record its new time.
///
/// An asset that can't be stat'ed is [`GenerateError::MissingAsset`], which
/// is fatal. Read and write failures are plain I/O errors.
pub fn sync_asset(
    asset: &str,
    paths: &BookPaths,
    state: &mut WatchState,
    force: bool,
) -> Result<AssetOutcome, GenerateError> {
    let source = paths.source_file(asset);
    let modified = fs::metadata(&source)
        .and_then(|meta| meta.modified())
        .map_err(|e| GenerateError::MissingAsset {
            path: source.clone(),
            source: e,
        })?;

    if !force && !state.has_changed(Tracked::Asset(asset), Some(modified)) {
        return Ok(AssetOutcome::Unchanged);
    }

    let output = asset_output_path(asset, &paths.output).ok_or_else(|| {
        let e = io::Error::new(io::ErrorKind::InvalidInput, "asset path has no file name");
        GenerateError::io("copy asset", &source, e)
    })?;
    log::info!("Copy asset {asset}");
    let bytes = fs::read(&source).map_err(|e| GenerateError::io("read asset", &source, e))?;
    fs::write(&output, bytes).map_err(|e| GenerateError::io("write asset", &output, e))?;

    state.record(Tracked::Asset(asset), modified);
    Ok(AssetOutcome::Copied(output))
}
