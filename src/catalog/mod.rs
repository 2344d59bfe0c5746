// Track catalog - where the playable tracks come from
// The controller only sees the TrackCatalog trait; SoundCloud is the one real backend

pub mod soundcloud;

pub use soundcloud::SoundCloudClient;

use thiserror::Error;

/// A playable track with its stream URL already resolved.
///
/// Results without a resolvable stream never become a `Track`, so the
/// player core can assume `stream_url` points at fetchable audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: u64,
    pub title: String,
    pub stream_url: String,
}

impl Track {
    pub fn new(id: u64, title: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            stream_url: stream_url.into(),
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Unknown"
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("search query is empty")]
    EmptyQuery,
    #[error("catalog request failed: {0}")]
    Request(String),
    #[error("catalog returned status {0}")]
    Status(u16),
    #[error("could not parse catalog response: {0}")]
    Parse(String),
    #[error("no playable tracks found for \"{0}\"")]
    NoResults(String),
}

/// Search backend consumed by the startup flow and the player's "new search".
#[allow(async_fn_in_trait)]
pub trait TrackCatalog {
    /// Ordered list of playable tracks; never empty on success.
    async fn search(&self, query: &str) -> Result<Vec<Track>, CatalogError>;
}
