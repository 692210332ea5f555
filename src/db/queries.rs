use super::models::{LibraryStats, TrackFilter, TrackInfo};
use super::{Database, DbError, Result};
use rusqlite::{params, params_from_iter};

/// Columns a `--order` list may name.
const ORDER_COLUMNS: &[&str] = &[
    "artist",
    "album",
    "title",
    "year",
    "track_number",
    "path",
    "ctime",
    "mtime",
];

fn build_where(f: &TrackFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut vals = Vec::new();

    if let Some(a) = &f.artist {
        clauses.push(format!("artist LIKE ?{}", vals.len() + 1));
        vals.push(format!("%{a}%"));
    }
    if let Some(a) = &f.album {
        clauses.push(format!("album LIKE ?{}", vals.len() + 1));
        vals.push(format!("%{a}%"));
    }
    if let Some(y) = &f.year {
        clauses.push(format!("year = ?{}", vals.len() + 1));
        vals.push(y.clone());
    }
    if let Some(g) = &f.facet {
        // facets is a JSON array of strings; match the quoted element
        clauses.push(format!("facets LIKE ?{}", vals.len() + 1));
        vals.push(format!("%\"{g}\"%"));
    }

    if clauses.is_empty() {
        (String::new(), vals)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), vals)
    }
}

fn order_clause(order: Option<&str>) -> Result<String> {
    let Some(order) = order else {
        return Ok(" ORDER BY path".to_string());
    };
    let mut cols = Vec::new();
    for col in order.split(',') {
        let col = col.trim();
        if col.is_empty() {
            continue;
        }
        if !ORDER_COLUMNS.contains(&col) {
            return Err(DbError::BadOrderColumn(col.to_string()));
        }
        cols.push(col);
    }
    if cols.is_empty() {
        return Ok(" ORDER BY path".to_string());
    }
    Ok(format!(" ORDER BY {}", cols.join(", ")))
}

impl Database {
    /// Does a track with this exact path exist?
    pub fn track_exists(&self, path: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Paths of all tracks matching the filter, in the requested order.
    /// `limit == 0` means unlimited.
    pub fn query_paths(
        &self,
        filter: &TrackFilter,
        order: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>> {
        let (where_sql, vals) = build_where(filter);
        let mut sql = format!("SELECT path FROM tracks{where_sql}");
        sql.push_str(&order_clause(order)?);
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        } else if offset > 0 {
            sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let paths = stmt
            .query_map(params_from_iter(vals.iter()), |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    /// Full row for one track, or None if the path is unknown.
    pub fn track_info(&self, path: &str) -> Result<Option<TrackInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT path, track_number, artist, title, album, year, facets
                 FROM tracks WHERE path = ?1",
                params![path],
                |row| {
                    Ok(TrackInfo {
                        path: row.get(0)?,
                        track_number: row.get(1)?,
                        artist: row.get(2)?,
                        title: row.get(3)?,
                        album: row.get(4)?,
                        year: row.get(5)?,
                        facets: row.get(6)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })?;
        Ok(info)
    }

    /// Paths of tracks on albums whose newest ctime is at or after `cutoff`
    /// (seconds since the epoch), ordered by album then track number.
    pub fn query_recent(&self, cutoff: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT path FROM tracks
             WHERE album IN (
                 SELECT album FROM tracks GROUP BY album HAVING MAX(ctime) >= ?1
             )
             ORDER BY album, CAST(track_number AS INTEGER), path",
        )?;
        let paths = stmt
            .query_map(params![cutoff], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    /// Add a facet to every track matching the filter. Returns the number of
    /// rows changed; rows already carrying the facet are left alone.
    pub fn facet_add(&self, filter: &TrackFilter, facet: &str) -> Result<usize> {
        self.edit_facets(filter, |facets| {
            if facets.iter().any(|f| f == facet) {
                false
            } else {
                facets.push(facet.to_string());
                true
            }
        })
    }

    /// Remove a facet from every track matching the filter. Returns the
    /// number of rows changed.
    pub fn facet_remove(&self, filter: &TrackFilter, facet: &str) -> Result<usize> {
        self.edit_facets(filter, |facets| {
            let before = facets.len();
            facets.retain(|f| f != facet);
            facets.len() != before
        })
    }

    fn edit_facets<F>(&self, filter: &TrackFilter, mut edit: F) -> Result<usize>
    where
        F: FnMut(&mut Vec<String>) -> bool,
    {
        let (where_sql, vals) = build_where(filter);
        let sql = format!("SELECT path, facets FROM tracks{where_sql}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(vals.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        for (path, raw) in rows {
            let mut facets: Vec<String> =
                serde_json::from_str(&raw).map_err(|e| DbError::FacetsDecode {
                    path: path.clone(),
                    source: e,
                })?;
            if !edit(&mut facets) {
                continue;
            }
            let encoded =
                serde_json::to_string(&facets).map_err(|e| DbError::FacetsDecode {
                    path: path.clone(),
                    source: e,
                })?;
            tx.execute(
                "UPDATE tracks SET facets = ?1 WHERE path = ?2",
                params![encoded, path],
            )?;
            changed += 1;
        }
        tx.commit()?;
        Ok(changed)
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let (total_tracks, artists, albums): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT artist), COUNT(DISTINCT album) FROM tracks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(LibraryStats {
            total_tracks,
            artists,
            albums,
            lastscan: self.lastscan()?,
        })
    }
}
