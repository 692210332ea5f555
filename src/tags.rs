//! Tag reading and field cleanup.
//!
//! `read_tags` opens a file with lofty, pulls the frames the catalog cares
//! about into an owned [`TrackTags`], and releases the file handle before
//! returning. Absent frames come back as empty strings; defaulting happens
//! in the normalizers below, at ingestion time.

use lofty::file::TaggedFileExt;
use lofty::picture::PictureType;
use lofty::prelude::*;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("tag error {path}: {source}")]
pub struct TagError {
    pub path: String,
    #[source]
    pub source: lofty::error::LoftyError,
}

/// An attached-picture frame, detached from the parse.
#[derive(Debug, Clone)]
pub struct Artwork {
    pub mime: Option<String>,
    pub picture_type: PictureType,
    pub description: Option<String>,
    pub data: Vec<u8>,
}

/// Frames extracted from one audio file. Strings are raw (untrimmed,
/// undefaulted); `track` is the raw TRCK text.
#[derive(Debug, Clone, Default)]
pub struct TrackTags {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub year: String,
    pub genre: String,
    pub track: String,
    pub artwork: Vec<Artwork>,
}

/// Read tags from an audio file. A file that parses but carries no tag
/// yields empty [`TrackTags`]; a parse or I/O failure is an error.
pub fn read_tags(path: &Path) -> Result<TrackTags, TagError> {
    let tagged_file = lofty::read_from_path(path).map_err(|e| TagError {
        path: path.display().to_string(),
        source: e,
    })?;

    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(t) => t,
        None => return Ok(TrackTags::default()),
    };

    let artwork = tag
        .pictures()
        .iter()
        .map(|p| Artwork {
            mime: p.mime_type().map(|m| m.as_str().to_string()),
            picture_type: p.pic_type(),
            description: p.description().map(|d| d.to_string()),
            data: p.data().to_vec(),
        })
        .collect();

    Ok(TrackTags {
        artist: tag.artist().map(|s| s.to_string()).unwrap_or_default(),
        title: tag.title().map(|s| s.to_string()).unwrap_or_default(),
        album: tag.album().map(|s| s.to_string()).unwrap_or_default(),
        year: tag
            .get_string(&ItemKey::RecordingDate)
            .map(|s| s.to_string())
            .or_else(|| tag.year().map(|y| y.to_string()))
            .unwrap_or_default(),
        genre: tag.genre().map(|s| s.to_string()).unwrap_or_default(),
        track: tag
            .get_string(&ItemKey::TrackNumber)
            .map(|s| s.to_string())
            .or_else(|| tag.track().map(|t| t.to_string()))
            .unwrap_or_default(),
        artwork,
    })
}

/// Clean up a raw TRCK value: `"N/M"` keeps only `N`, empty becomes `"99"`.
pub fn normalize_track_number(raw: &str) -> String {
    let num = raw.split('/').next().unwrap_or("");
    if num.is_empty() {
        // empty track numbers create spurious errors downstream
        "99".to_string()
    } else {
        num.to_string()
    }
}

/// Clean up a raw year: empty becomes `"9999"`, an ISO datestamp
/// (`YYYY-MM-DD`) keeps only the year.
pub fn normalize_year(raw: &str) -> String {
    if raw.is_empty() {
        return "9999".to_string();
    }
    let chunks: Vec<&str> = raw.split('-').collect();
    if chunks.len() == 3 {
        chunks[0].to_string()
    } else {
        raw.to_string()
    }
}
