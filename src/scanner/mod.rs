//! Incremental ingestion: walk the music root, reconcile what's on disk
//! with the tracks table, and extract cover art along the way.
//!
//! The walk is depth-first and lexicographic, directories before their
//! contents. Each directory entry resets two flags that its files then see:
//! `clean` (directory mtime is not newer than the stored watermark, so its
//! files are skipped outright) and `needs_cover` (no `cover.jpg` present on
//! entry; at most one extraction attempt per directory per scan).
//!
//! The writer runs with per-row fsync off. An interrupted scan leaves the
//! store valid but incomplete, and the watermark untouched, so the next run
//! picks the same directories back up.

use crate::db::models::NewTrack;
use crate::db::{Database, ScanStore};
use crate::{AUDIO_EXT, cover, genres, tags};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error(transparent)]
    Tag(#[from] tags::TagError),
    #[error("facets encode failed: {0}")]
    Facets(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct ScanTotals {
    pub seen: u64,
    pub added: u64,
    /// Reserved: the scanner never revises existing rows.
    pub updated: u64,
}

/// Per-walk mutable state. The directory flags belong to the most recently
/// entered directory; entering the next directory replaces them.
struct ScanState {
    clean: bool,
    needs_cover: bool,
    max_mtime: i64,
    totals: ScanTotals,
}

/// Walk `root` and ingest every dirty audio file not already in the catalog.
///
/// `catalog` answers existence checks and supplies the watermark as of scan
/// start; inserts go through a separate throughput-mode connection opened on
/// `db_path`. Diagnostics (tag errors, missing tags, cover failures) go to
/// `scanlog`. On success the watermark advances to the newest file mtime
/// observed, never backwards.
pub fn scan(
    catalog: &Database,
    db_path: &Path,
    root: &Path,
    force: bool,
    scanlog: &mut dyn Write,
) -> Result<ScanTotals, ScanError> {
    let lastscan = catalog.lastscan()?;
    let store = ScanStore::open(db_path)?;

    let mut st = ScanState {
        clean: false,
        needs_cover: true,
        max_mtime: lastscan,
        totals: ScanTotals::default(),
    };
    let suffix = format!(".{AUDIO_EXT}");

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;

        if entry.file_type().is_dir() {
            enter_dir(&entry, lastscan, force, &mut st)?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(&suffix) {
            continue;
        }

        st.totals.seen += 1;
        if st.clean {
            continue;
        }

        let path = entry.path().to_string_lossy().to_string();
        let in_db = catalog.track_exists(&path)?;
        if in_db && !force {
            continue;
        }

        ingest(&store, &entry, path, in_db, &mut st, scanlog)?;
    }

    println!(
        "Totals: seen {}, added, {}, updated {}",
        st.totals.seen, st.totals.added, st.totals.updated
    );
    store.set_lastscan(st.max_mtime)?;
    Ok(st.totals)
}

fn enter_dir(
    entry: &DirEntry,
    lastscan: i64,
    force: bool,
    st: &mut ScanState,
) -> Result<(), ScanError> {
    if force {
        st.clean = false;
    } else {
        let meta = entry.metadata()?;
        st.clean = meta.mtime() <= lastscan;
    }
    st.needs_cover = !entry.path().join("cover.jpg").exists();
    log::debug!(
        "dir {}: clean={} needs_cover={}",
        entry.path().display(),
        st.clean,
        st.needs_cover
    );
    Ok(())
}

/// One file through the pipeline: timestamps, tag, cover art, field
/// normalization, diagnostics, append. `in_db` is true only in force mode,
/// where the file is processed but the row is not re-written.
fn ingest(
    store: &ScanStore,
    entry: &DirEntry,
    path: String,
    in_db: bool,
    st: &mut ScanState,
    scanlog: &mut dyn Write,
) -> Result<(), ScanError> {
    let tag = match tags::read_tags(entry.path()) {
        Ok(t) => t,
        Err(e) => {
            writeln!(scanlog, "{e}")?;
            return Err(e.into());
        }
    };
    ingest_tagged(store, entry, path, tag, in_db, st, scanlog)
}

fn ingest_tagged(
    store: &ScanStore,
    entry: &DirEntry,
    path: String,
    tag: tags::TrackTags,
    in_db: bool,
    st: &mut ScanState,
    scanlog: &mut dyn Write,
) -> Result<(), ScanError> {
    let meta = entry.metadata()?;
    let mtime = meta.mtime();
    // ctime is clamped so that ctime <= mtime holds for every stored row
    let ctime = meta.ctime().min(mtime);
    st.max_mtime = st.max_mtime.max(mtime);

    if st.needs_cover {
        let dir = entry.path().parent().unwrap_or(Path::new("."));
        if let Err(e) = cover::write_cover(dir, &tag) {
            writeln!(scanlog, "{e}")?;
        }
        // success or failure, the directory has been checked; the first
        // file without artwork is a reliable predictor for the rest
        st.needs_cover = false;
    }

    let genre = genres::resolve(&tag.genre);
    let track_number = tags::normalize_track_number(&tag.track);
    let year = tags::normalize_year(&tag.year);

    if tag.artist.is_empty() || tag.album.is_empty() || tag.title.is_empty() {
        writeln!(
            scanlog,
            "{} :: missing tags: t '{}', a '{}', b '{}'",
            path, tag.title, tag.artist, tag.album
        )?;
    }

    if !in_db {
        println!(
            "+ {} '{}' '{}' ({}; {}; {})",
            tag.artist.trim(),
            tag.album.trim(),
            tag.title.trim(),
            track_number,
            year,
            genre
        );
        store.append(&NewTrack {
            path,
            ctime,
            mtime,
            track_number,
            artist: tag.artist.trim().to_string(),
            title: tag.title.trim().to_string(),
            album: tag.album.trim().to_string(),
            year,
            facets: serde_json::to_string(&[genre.as_str()])?,
        })?;
        st.totals.added += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TrackFilter;
    use rusqlite::Connection;
    use std::fs;

    /// A catalog on disk plus a temp music tree.
    struct Fixture {
        _tmp: tempfile::TempDir,
        db_path: std::path::PathBuf,
        root: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("catalog.db");
        let root = tmp.path().join("music");
        fs::create_dir(&root).unwrap();
        let db = Database::open(&db_path).unwrap();
        db.create_schema().unwrap();
        Fixture {
            _tmp: tmp,
            db_path,
            root,
        }
    }

    fn set_lastscan(db_path: &Path, v: i64) {
        let conn = Connection::open(db_path).unwrap();
        conn.execute("UPDATE meta SET lastscan = ?1", [v]).unwrap();
    }

    #[test]
    fn test_non_audio_files_are_invisible() {
        let fx = fixture();
        fs::write(fx.root.join("notes.txt"), b"not audio").unwrap();
        fs::write(fx.root.join("image.jpg"), b"not audio either").unwrap();

        let db = Database::open(&fx.db_path).unwrap();
        let mut log = Vec::new();
        let totals = scan(&db, &fx.db_path, &fx.root, false, &mut log).unwrap();
        assert_eq!(totals.seen, 0);
        assert_eq!(totals.added, 0);
    }

    #[test]
    fn test_clean_directory_skips_files_entirely() {
        let fx = fixture();
        // garbage mp3: if the scanner ever tried to read its tag, the scan
        // would abort. a clean directory must skip before that point.
        fs::write(fx.root.join("a.mp3"), b"garbage").unwrap();
        set_lastscan(&fx.db_path, i64::MAX);

        let db = Database::open(&fx.db_path).unwrap();
        let mut log = Vec::new();
        let totals = scan(&db, &fx.db_path, &fx.root, false, &mut log).unwrap();
        assert_eq!(totals.seen, 1);
        assert_eq!(totals.added, 0);
        // watermark never moves backwards, even though no file was examined
        assert_eq!(db.lastscan().unwrap(), i64::MAX);
    }

    #[test]
    fn test_known_path_skips_before_tag_read() {
        let fx = fixture();
        let track = fx.root.join("a.mp3");
        fs::write(&track, b"garbage").unwrap();

        let db = Database::open(&fx.db_path).unwrap();
        db.conn
            .execute(
                "INSERT INTO tracks VALUES (?1, 1, 1, '1', 'a', 't', 'b', '1999', '[\"Rock\"]')",
                [track.to_string_lossy().to_string()],
            )
            .unwrap();

        let mut log = Vec::new();
        let totals = scan(&db, &fx.db_path, &fx.root, false, &mut log).unwrap();
        assert_eq!(totals.seen, 1);
        assert_eq!(totals.added, 0);
        // still exactly one row for that path
        let f = TrackFilter::default();
        assert_eq!(db.query_paths(&f, None, 0, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_file_aborts_scan_and_holds_watermark() {
        let fx = fixture();
        fs::write(fx.root.join("bad.mp3"), b"garbage").unwrap();

        let db = Database::open(&fx.db_path).unwrap();
        let mut log = Vec::new();
        let err = scan(&db, &fx.db_path, &fx.root, false, &mut log).unwrap_err();
        assert!(matches!(err, ScanError::Tag(_)));
        // diagnostic landed in the scanlog sink
        assert!(String::from_utf8_lossy(&log).contains("bad.mp3"));
        // watermark unchanged on a failed scan
        assert_eq!(db.lastscan().unwrap(), 0);
    }

    #[test]
    fn test_force_rescan_reprocesses_clean_dirs_without_duplicates() {
        let fx = fixture();
        let track = fx.root.join("a.mp3");
        fs::write(&track, b"garbage").unwrap();
        // clean watermark, already in catalog: force mode reprocesses the
        // file (and so hits the tag-read failure) but would not re-insert
        set_lastscan(&fx.db_path, i64::MAX);

        let db = Database::open(&fx.db_path).unwrap();
        db.conn
            .execute(
                "INSERT INTO tracks VALUES (?1, 1, 1, '1', 'a', 't', 'b', '1999', '[\"Rock\"]')",
                [track.to_string_lossy().to_string()],
            )
            .unwrap();

        // without force: clean dir, no error even for a garbage file
        let mut log = Vec::new();
        assert!(scan(&db, &fx.db_path, &fx.root, false, &mut log).is_ok());

        // with force: the file is processed again, so the garbage surfaces
        let err = scan(&db, &fx.db_path, &fx.root, true, &mut log).unwrap_err();
        assert!(matches!(err, ScanError::Tag(_)));
    }

    #[test]
    fn test_ingest_appends_normalized_row() {
        let fx = fixture();
        let dir = fx.root.join("A");
        fs::create_dir(&dir).unwrap();
        let track = dir.join("a.mp3");
        fs::write(&track, b"x").unwrap();

        let db = Database::open(&fx.db_path).unwrap();
        let store = ScanStore::open(&fx.db_path).unwrap();
        let mut st = ScanState {
            clean: false,
            needs_cover: true,
            max_mtime: 0,
            totals: ScanTotals::default(),
        };
        let entry = WalkDir::new(&track)
            .into_iter()
            .next()
            .unwrap()
            .unwrap();

        // bypass the lofty read: drive the tail of the pipeline directly
        let tag = tags::TrackTags {
            artist: " X ".to_string(),
            title: "Z".to_string(),
            album: "Y".to_string(),
            year: "2011-03-04".to_string(),
            genre: "9".to_string(),
            track: "3/12".to_string(),
            artwork: vec![],
        };
        let mut log = Vec::new();
        ingest_tagged(
            &store,
            &entry,
            track.to_string_lossy().to_string(),
            tag,
            false,
            &mut st,
            &mut log,
        )
        .unwrap();

        let info = db
            .track_info(&track.to_string_lossy())
            .unwrap()
            .expect("row appended");
        assert_eq!(info.artist, "X");
        assert_eq!(info.track_number, "3");
        assert_eq!(info.year, "2011");
        assert_eq!(info.facets, "[\"Metal\"]");
        let facets: Vec<String> = serde_json::from_str(&info.facets).unwrap();
        assert_eq!(facets, vec!["Metal"]);

        // ctime <= mtime invariant on the stored row
        let (ctime, mtime): (i64, i64) = db
            .conn
            .query_row("SELECT ctime, mtime FROM tracks", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert!(ctime <= mtime);
        assert!(st.max_mtime >= mtime);
        assert_eq!(st.totals.added, 1);
        // no artwork frame: flag cleared, no cover written, diagnostic logged
        assert!(!st.needs_cover);
        assert!(!dir.join("cover.jpg").exists());
        assert!(String::from_utf8_lossy(&log).contains("no attached picture"));
    }

    #[test]
    fn test_ingest_writes_cover_once_per_directory() {
        let fx = fixture();
        let dir = fx.root.join("A");
        fs::create_dir(&dir).unwrap();
        let track = dir.join("a.mp3");
        fs::write(&track, b"x").unwrap();

        let store = ScanStore::open(&fx.db_path).unwrap();
        let mut st = ScanState {
            clean: false,
            needs_cover: true,
            max_mtime: 0,
            totals: ScanTotals::default(),
        };
        let entry = WalkDir::new(&track).into_iter().next().unwrap().unwrap();

        let tag = tags::TrackTags {
            artist: "X".to_string(),
            title: "Z".to_string(),
            album: "Y".to_string(),
            genre: "9".to_string(),
            artwork: vec![crate::tags::Artwork {
                mime: Some("image/jpeg".to_string()),
                picture_type: lofty::picture::PictureType::CoverFront,
                description: None,
                data: b"B".to_vec(),
            }],
            ..tags::TrackTags::default()
        };
        let mut log = Vec::new();
        ingest_tagged(
            &store,
            &entry,
            track.to_string_lossy().to_string(),
            tag.clone(),
            false,
            &mut st,
            &mut log,
        )
        .unwrap();

        assert_eq!(fs::read(dir.join("cover.jpg")).unwrap(), b"B");
        assert!(!st.needs_cover);

        // second file in the same directory: flag already cleared, the
        // stale check must not re-trigger an extraction
        fs::write(dir.join("cover.jpg"), b"KEEP").unwrap();
        let track2 = dir.join("b.mp3");
        fs::write(&track2, b"x").unwrap();
        let entry2 = WalkDir::new(&track2).into_iter().next().unwrap().unwrap();
        ingest_tagged(
            &store,
            &entry2,
            track2.to_string_lossy().to_string(),
            tag,
            false,
            &mut st,
            &mut log,
        )
        .unwrap();
        assert_eq!(fs::read(dir.join("cover.jpg")).unwrap(), b"KEEP");
    }
}
