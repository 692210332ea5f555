pub mod models;
pub mod queries;

use models::NewTrack;
use rusqlite::{Connection, params};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("bad order column: {0}")]
    BadOrderColumn(String),
    #[error("facets decode failed for {path}: {source}")]
    FacetsDecode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, DbError>;

/// The catalog connection: schema creation, existence checks, the watermark
/// read, and the whole query surface. Scanning writes through [`ScanStore`]
/// instead.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    /// Open the catalog. Does not create schema — that is `waxcat init`'s job.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.create_schema()?;
        Ok(db)
    }

    /// Create the tracks and meta tables and seed the watermark at zero.
    pub fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tracks (
                path            TEXT NOT NULL UNIQUE,
                ctime           INTEGER NOT NULL,
                mtime           INTEGER NOT NULL,
                track_number    TEXT NOT NULL,
                artist          TEXT NOT NULL,
                title           TEXT NOT NULL,
                album           TEXT NOT NULL,
                year            TEXT NOT NULL,
                facets          TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist);
            CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album);
            CREATE INDEX IF NOT EXISTS idx_tracks_year ON tracks(year);

            CREATE TABLE IF NOT EXISTS meta (
                lastscan        INTEGER NOT NULL
            );

            INSERT INTO meta (lastscan)
                SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM meta);
            ",
        )?;
        Ok(())
    }

    /// The scan watermark: the newest file mtime observed by the most recent
    /// completed scan.
    pub fn lastscan(&self) -> Result<i64> {
        let v = self
            .conn
            .query_row("SELECT lastscan FROM meta", [], |row| row.get(0))?;
        Ok(v)
    }
}

/// The ingestion writer. Owns its own connection for the duration of one
/// scan, with per-row fsync turned off: a crashed scan is rerun, since the
/// watermark only advances on clean completion.
pub struct ScanStore {
    conn: Connection,
}

impl ScanStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "synchronous", "0")?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn from_conn(conn: Connection) -> Self {
        Self { conn }
    }

    /// Append one track row through the prepared insert.
    pub fn append(&self, t: &NewTrack) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO tracks VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)")?;
        stmt.execute(params![
            t.path,
            t.ctime,
            t.mtime,
            t.track_number,
            t.artist,
            t.title,
            t.album,
            t.year,
            t.facets,
        ])?;
        Ok(())
    }

    pub fn set_lastscan(&self, v: i64) -> Result<()> {
        self.conn
            .execute("UPDATE meta SET lastscan = ?1", params![v])?;
        Ok(())
    }
}
