use super::{CatalogError, Track, TrackCatalog};
use crate::config::SoundCloudConfig;
use serde::Deserialize;
use tracing::{debug, info, warn};

const PROGRESSIVE: &str = "progressive";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    collection: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    media: Media,
}

#[derive(Debug, Default, Deserialize)]
struct Media {
    #[serde(default)]
    transcodings: Vec<Transcoding>,
}

#[derive(Debug, Deserialize)]
struct Transcoding {
    url: String,
    format: TranscodingFormat,
}

#[derive(Debug, Deserialize)]
struct TranscodingFormat {
    protocol: String,
}

#[derive(Debug, Deserialize)]
struct StreamLocation {
    url: String,
}

impl ApiTrack {
    /// Transcoding endpoints that serve a single downloadable file, in API order.
    fn progressive_refs(&self) -> impl Iterator<Item = &str> {
        self.media
            .transcodings
            .iter()
            .filter(|t| t.format.protocol == PROGRESSIVE)
            .map(|t| t.url.as_str())
    }
}

fn parse_search(body: &str) -> Result<Vec<ApiTrack>, CatalogError> {
    serde_json::from_str::<SearchResponse>(body)
        .map(|r| r.collection)
        .map_err(|e| CatalogError::Parse(e.to_string()))
}

fn parse_stream_location(body: &str) -> Result<String, CatalogError> {
    serde_json::from_str::<StreamLocation>(body)
        .map(|l| l.url)
        .map_err(|e| CatalogError::Parse(e.to_string()))
}

/// SoundCloud v2 search client. Holds the client id it authenticates with.
#[derive(Debug, Clone)]
pub struct SoundCloudClient {
    http: reqwest::Client,
    client_id: String,
    api_base: String,
    limit: u32,
}

impl SoundCloudClient {
    pub fn new(client_id: String, config: &SoundCloudConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            limit: config.search_limit,
        }
    }

    /// Turn a transcoding reference into the actual media URL.
    pub async fn resolve_stream(&self, transcoding_url: &str) -> Result<String, CatalogError> {
        let body = self
            .get_text(transcoding_url, &[("client_id", self.client_id.as_str())])
            .await?;
        parse_stream_location(&body)
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, CatalogError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status().as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))
    }

    async fn resolve_first(&self, track: &ApiTrack) -> Option<String> {
        for reference in track.progressive_refs() {
            match self.resolve_stream(reference).await {
                Ok(url) => return Some(url),
                Err(e) => debug!("Stream resolve failed for track {}: {}", track.id, e),
            }
        }
        None
    }
}

impl TrackCatalog for SoundCloudClient {
    async fn search(&self, query: &str) -> Result<Vec<Track>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CatalogError::EmptyQuery);
        }

        let url = format!("{}/search/tracks", self.api_base);
        let limit = self.limit.to_string();
        let body = self
            .get_text(
                &url,
                &[
                    ("q", query),
                    ("client_id", self.client_id.as_str()),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;

        let candidates = parse_search(&body)?;
        let total = candidates.len();

        let mut tracks = Vec::with_capacity(total);
        for candidate in &candidates {
            match self.resolve_first(candidate).await {
                Some(stream_url) => {
                    tracks.push(Track::new(candidate.id, candidate.title.clone(), stream_url))
                }
                None => warn!("Dropping '{}': no progressive stream", candidate.title),
            }
        }

        info!("Search '{}': {} of {} results playable", query, tracks.len(), total);

        if tracks.is_empty() {
            return Err(CatalogError::NoResults(query.to_string()));
        }
        Ok(tracks)
    }
}
