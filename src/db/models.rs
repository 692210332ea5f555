/// The row the ingestion pipeline appends. String fields are already
/// normalized (trimmed, defaulted) and `facets` is JSON-encoded.
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub path: String,
    pub ctime: i64,
    pub mtime: i64,
    pub track_number: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub year: String,
    pub facets: String,
}

/// A full track row read back for detail display.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub path: String,
    pub track_number: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub year: String,
    pub facets: String,
}

/// Filter predicates for the query surface. All present predicates must
/// match; artist/album are substring matches, year is exact, facet matches
/// the JSON-encoded facets column.
#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub facet: Option<String>,
}

impl TrackFilter {
    pub fn is_empty(&self) -> bool {
        self.artist.is_none() && self.album.is_none() && self.year.is_none() && self.facet.is_none()
    }
}

/// Library-wide counts for `waxcat stats`.
#[derive(Debug)]
pub struct LibraryStats {
    pub total_tracks: i64,
    pub artists: i64,
    pub albums: i64,
    pub lastscan: i64,
}
