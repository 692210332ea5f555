//! Cover art extraction.
//!
//! Albums are directories, so one `cover.jpg` per directory is enough. The
//! first attached-picture frame wins; there is no search across the rest of
//! the directory's files (the scanner clears its per-directory flag after
//! the first attempt, success or not).

use crate::tags::TrackTags;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("{dir} :: no attached picture frames")]
    NoArtwork { dir: String },
    #[error("cover write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Write `<dir>/cover.jpg` from the first artwork frame in `tags`,
/// overwriting any existing file. Mode 0644.
pub fn write_cover(dir: &Path, tags: &TrackTags) -> Result<PathBuf, CoverError> {
    let art = tags.artwork.first().ok_or_else(|| CoverError::NoArtwork {
        dir: dir.display().to_string(),
    })?;

    let dest = dir.join("cover.jpg");
    let mut f = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(&dest)?;
    f.write_all(&art.data)?;
    Ok(dest)
}
