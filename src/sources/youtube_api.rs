use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use super::{MetadataProvider, VideoMetadata};
use crate::error::ResolutionError;

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";
const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

#[derive(Debug, Deserialize)]
struct VideoDetailsResponse {
    items: Vec<VideoDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    snippet: VideoSnippet,
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    title: String,
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: String,
    thumbnail_url: Option<String>,
}

fn http_client() -> Result<reqwest::Client, ResolutionError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| ResolutionError::Metadata(e.to_string()))
}

/// Cliente de la YouTube Data API v3 (requiere API key)
pub struct YouTubeDataApi {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeDataApi {
    pub fn new(api_key: String) -> Result<Self, ResolutionError> {
        Ok(Self {
            api_key,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl MetadataProvider for YouTubeDataApi {
    async fn video(&self, video_id: &str) -> Result<VideoMetadata, ResolutionError> {
        debug!("📊 YouTube API v3: video {}", video_id);

        let response = self
            .client
            .get(VIDEOS_ENDPOINT)
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ResolutionError::Metadata(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            error!("❌ YouTube API error: {}", status);
            return Err(ResolutionError::Metadata(format!("HTTP {status}")));
        }

        let details: VideoDetailsResponse = response
            .json()
            .await
            .map_err(|e| ResolutionError::Metadata(e.to_string()))?;

        let video = details
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::Metadata("video no encontrado".into()))?;

        let thumbnail = video
            .snippet
            .thumbnails
            .high
            .or(video.snippet.thumbnails.medium)
            .map(|t| t.url);

        Ok(VideoMetadata {
            title: video.snippet.title,
            duration: parse_iso8601_duration(&video.content_details.duration),
            thumbnail,
        })
    }
}

/// Endpoint oEmbed público: título y miniatura, sin duración
pub struct OEmbedClient {
    client: reqwest::Client,
}

impl OEmbedClient {
    pub fn new() -> Result<Self, ResolutionError> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

#[async_trait]
impl MetadataProvider for OEmbedClient {
    async fn video(&self, video_id: &str) -> Result<VideoMetadata, ResolutionError> {
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");
        debug!("📊 oEmbed: {}", watch_url);

        let response = self
            .client
            .get(OEMBED_ENDPOINT)
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| ResolutionError::Metadata(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolutionError::Metadata(format!("HTTP {}", response.status())));
        }

        let body: OEmbedResponse = response
            .json()
            .await
            .map_err(|e| ResolutionError::Metadata(e.to_string()))?;

        Ok(VideoMetadata {
            title: body.title,
            duration: None,
            thumbnail: body.thumbnail_url,
        })
    }
}

/// Extrae el ID de video de youtube.com/watch?v=ID o youtu.be/ID
pub fn extract_video_id(url: &str) -> Result<String, ResolutionError> {
    let parsed = Url::parse(url).map_err(|_| ResolutionError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() == Some("youtu.be") {
        if let Some(id) = parsed.path_segments().and_then(|mut s| s.next()) {
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ResolutionError::InvalidUrl(url.to_string()))
}

/// Parsea duraciones ISO 8601 como PT1H2M3S. Los directos ("P0D") no tienen duración.
pub fn parse_iso8601_duration(value: &str) -> Option<Duration> {
    let rest = value.strip_prefix('P')?;
    let mut seconds = 0u64;
    let mut number = String::new();
    let mut in_time = false;

    for ch in rest.chars() {
        match ch {
            'T' => in_time = true,
            c if c.is_ascii_digit() => number.push(c),
            unit => {
                let n: u64 = number.parse().ok()?;
                number.clear();
                seconds += match (unit, in_time) {
                    ('D', false) => n * 86_400,
                    ('W', false) => n * 604_800,
                    ('H', true) => n * 3600,
                    ('M', true) => n * 60,
                    ('S', true) => n,
                    _ => return None,
                };
            }
        }
    }

    (seconds > 0).then(|| Duration::from_secs(seconds))
}
