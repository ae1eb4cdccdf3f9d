//! # Sources Module
//!
//! Turns what a user typed after `/play` into [`Track`]s, and turns a queued
//! track into a fresh, directly fetchable media locator right before it plays.
//!
//! Two seams keep the network and process calls swappable:
//!
//! - [`MetadataProvider`] - title/duration/thumbnail from the platform API
//!   ([`youtube_api::YouTubeDataApi`] or the keyless [`youtube_api::OEmbedClient`])
//! - [`MediaExtractor`] - the `yt-dlp` command line ([`ytdlp::YtDlp`])

pub mod youtube_api;
pub mod ytdlp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serenity::model::id::{ChannelId, UserId};
use std::{sync::{Arc, LazyLock}, time::Duration};
use tracing::{debug, info, warn};

use crate::error::ResolutionError;

/// Título usado cuando ni la API ni yt-dlp devuelven uno
const FALLBACK_TITLE: &str = "YouTube Video";

static YOUTUBE_WATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.|m\.|music\.)?youtube\.com/watch\?(.*&)?v=[\w-]+").expect("regex válida")
});
static YOUTUBE_SHORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://youtu\.be/[\w-]+").expect("regex válida"));
static YOUTUBE_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.|m\.|music\.)?youtube\.com/playlist\?(.*&)?list=[\w-]+").expect("regex válida")
});
static SPOTIFY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://open\.spotify\.com/").expect("regex válida"));

/// A playable item in a guild queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub requested_by: UserId,
    /// Text channel that receives "now playing" and error messages.
    pub channel_id: ChannelId,
    pub added_at: DateTime<Utc>,
}

/// Who asked for a track and where to answer.
#[derive(Debug, Clone, Copy)]
pub struct TrackRequest {
    pub requested_by: UserId,
    pub channel_id: ChannelId,
}

impl TrackRequest {
    pub fn track(&self, title: String, url: String) -> Track {
        Track {
            title,
            url,
            duration: None,
            thumbnail: None,
            requested_by: self.requested_by,
            channel_id: self.channel_id,
            added_at: Utc::now(),
        }
    }
}

/// A track paired with a media locator that is only valid for a while.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub track: Track,
    pub stream_url: String,
}

/// Shape of the user's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    YouTubeVideo,
    YouTubePlaylist,
    Spotify,
    Search,
}

impl SourceKind {
    pub fn classify(input: &str) -> Self {
        let input = input.trim();
        if YOUTUBE_PLAYLIST.is_match(input) {
            SourceKind::YouTubePlaylist
        } else if YOUTUBE_WATCH.is_match(input) || YOUTUBE_SHORT.is_match(input) {
            SourceKind::YouTubeVideo
        } else if SPOTIFY.is_match(input) {
            SourceKind::Spotify
        } else {
            SourceKind::Search
        }
    }
}

/// Metadata returned by the platform API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

/// One entry of a flat playlist listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Obtiene metadatos de un video por su ID
    async fn video(&self, video_id: &str) -> Result<VideoMetadata, ResolutionError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Título del video (fallback cuando la API falla)
    async fn title(&self, url: &str) -> Result<String, ResolutionError>;

    /// URL directa del mejor stream de audio
    async fn stream_url(&self, url: &str) -> Result<String, ResolutionError>;

    /// Entradas de una playlist, en orden, hasta `limit`
    async fn playlist(&self, url: &str, limit: usize) -> Result<Vec<PlaylistEntry>, ResolutionError>;
}

/// Resolves user input into tracks and tracks into playable locators.
pub struct SourceResolver {
    metadata: Arc<dyn MetadataProvider>,
    extractor: Arc<dyn MediaExtractor>,
    max_playlist_size: usize,
}

impl SourceResolver {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        extractor: Arc<dyn MediaExtractor>,
        max_playlist_size: usize,
    ) -> Self {
        Self {
            metadata,
            extractor,
            max_playlist_size,
        }
    }

    /// Convierte la consulta del usuario en uno o más tracks
    pub async fn resolve(
        &self,
        query: &str,
        request: TrackRequest,
    ) -> Result<Vec<Track>, ResolutionError> {
        let query = query.trim();

        match SourceKind::classify(query) {
            SourceKind::YouTubeVideo => {
                info!("📺 URL de YouTube detectada: {}", query);
                Ok(vec![self.resolve_video(query, request).await?])
            }
            SourceKind::YouTubePlaylist => {
                info!("📋 Playlist de YouTube detectada: {}", query);
                self.resolve_playlist(query, request).await
            }
            SourceKind::Spotify => {
                warn!("🎧 URL de Spotify rechazada: {}", query);
                Err(ResolutionError::UnsupportedSource { platform: "Spotify" })
            }
            SourceKind::Search => {
                debug!("🔍 Búsqueda por texto rechazada: {}", query);
                Err(ResolutionError::SearchUnsupported)
            }
        }
    }

    /// Calcula una URL de stream nueva para cada intento de reproducción
    pub async fn locate(&self, track: &Track) -> Result<ResolvedSource, ResolutionError> {
        let stream_url = self.extractor.stream_url(&track.url).await?;
        debug!("🎯 Stream resuelto para {}", track.title);

        Ok(ResolvedSource {
            track: track.clone(),
            stream_url,
        })
    }

    async fn resolve_video(&self, url: &str, request: TrackRequest) -> Result<Track, ResolutionError> {
        let metadata = match youtube_api::extract_video_id(url) {
            Ok(video_id) => self.metadata.video(&video_id).await,
            Err(e) => Err(e),
        };

        match metadata {
            Ok(meta) => {
                info!("✅ Metadatos obtenidos: {}", meta.title);
                let mut track = request.track(meta.title, url.to_string());
                track.duration = meta.duration;
                track.thumbnail = meta.thumbnail;
                Ok(track)
            }
            Err(e) => {
                warn!("❌ API de metadatos falló ({}), usando yt-dlp como fallback", e);
                let title = match self.extractor.title(url).await {
                    Ok(title) if !title.trim().is_empty() => title.trim().to_string(),
                    Ok(_) => FALLBACK_TITLE.to_string(),
                    Err(e) => {
                        warn!("⚠️ yt-dlp tampoco devolvió título: {}", e);
                        FALLBACK_TITLE.to_string()
                    }
                };
                Ok(request.track(title, url.to_string()))
            }
        }
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        request: TrackRequest,
    ) -> Result<Vec<Track>, ResolutionError> {
        let entries = self.extractor.playlist(url, self.max_playlist_size).await?;
        if entries.is_empty() {
            return Err(ResolutionError::EmptyPlaylist);
        }

        info!("📋 Playlist con {} canciones", entries.len());
        Ok(entries
            .into_iter()
            .take(self.max_playlist_size)
            .map(|entry| {
                let mut track = request.track(entry.title, entry.url);
                track.duration = entry.duration;
                track
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> TrackRequest {
        TrackRequest {
            requested_by: UserId::new(7),
            channel_id: ChannelId::new(11),
        }
    }

    fn resolver(metadata: MockMetadataProvider, extractor: MockMediaExtractor) -> SourceResolver {
        SourceResolver::new(Arc::new(metadata), Arc::new(extractor), 50)
    }

    #[test]
    fn classifies_known_url_shapes() {
        assert_eq!(
            SourceKind::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            SourceKind::YouTubeVideo
        );
        assert_eq!(SourceKind::classify("https://youtu.be/dQw4w9WgXcQ"), SourceKind::YouTubeVideo);
        assert_eq!(
            SourceKind::classify("https://music.youtube.com/watch?v=abc&list=xyz"),
            SourceKind::YouTubeVideo
        );
        assert_eq!(
            SourceKind::classify("https://www.youtube.com/playlist?list=PL123"),
            SourceKind::YouTubePlaylist
        );
        assert_eq!(
            SourceKind::classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"),
            SourceKind::Spotify
        );
        assert_eq!(SourceKind::classify("never gonna give you up"), SourceKind::Search);
        assert_eq!(SourceKind::classify("https://example.com/song.mp3"), SourceKind::Search);
    }

    #[tokio::test]
    async fn unsupported_platform_never_touches_external_tools() {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_video().never();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_title().never();
        extractor.expect_stream_url().never();
        extractor.expect_playlist().never();

        let err = resolver(metadata, extractor)
            .resolve("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M", request())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::UnsupportedSource { platform: "Spotify" }));
        assert!(err.to_string().contains("YouTube"));
    }

    #[tokio::test]
    async fn free_text_search_is_rejected_with_guidance() {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_video().never();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_title().never();

        let err = resolver(metadata, extractor)
            .resolve("lofi hip hop radio", request())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::SearchUnsupported));
    }

    #[tokio::test]
    async fn video_metadata_comes_from_the_api() {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_video()
            .withf(|id| id == "dQw4w9WgXcQ")
            .times(1)
            .returning(|_| {
                Ok(VideoMetadata {
                    title: "Never Gonna Give You Up".into(),
                    duration: Some(Duration::from_secs(213)),
                    thumbnail: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".into()),
                })
            });
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_title().never();

        let tracks = resolver(metadata, extractor)
            .resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ", request())
            .await
            .unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Never Gonna Give You Up");
        assert_eq!(tracks[0].duration, Some(Duration::from_secs(213)));
        assert_eq!(tracks[0].requested_by, UserId::new(7));
        assert_eq!(tracks[0].channel_id, ChannelId::new(11));
    }

    #[tokio::test]
    async fn api_failure_falls_back_to_extractor_title() {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_video()
            .returning(|_| Err(ResolutionError::Metadata("403 quotaExceeded".into())));
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_title()
            .times(1)
            .returning(|_| Ok("  Título desde yt-dlp \n".into()));

        let tracks = resolver(metadata, extractor)
            .resolve("https://youtu.be/dQw4w9WgXcQ", request())
            .await
            .unwrap();

        assert_eq!(tracks[0].title, "Título desde yt-dlp");
        assert_eq!(tracks[0].duration, None);
        assert_eq!(tracks[0].thumbnail, None);
    }

    #[tokio::test]
    async fn extractor_failure_still_yields_a_placeholder_track() {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_video()
            .returning(|_| Err(ResolutionError::Metadata("timeout".into())));
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_title()
            .returning(|_| Err(ResolutionError::Extractor("not found".into())));

        let tracks = resolver(metadata, extractor)
            .resolve("https://youtu.be/dQw4w9WgXcQ", request())
            .await
            .unwrap();

        assert_eq!(tracks[0].title, FALLBACK_TITLE);
    }

    #[tokio::test]
    async fn playlist_expands_in_order() {
        let metadata = MockMetadataProvider::new();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_playlist()
            .withf(|_, limit| *limit == 50)
            .returning(|_, _| {
                Ok(vec![
                    PlaylistEntry {
                        title: "uno".into(),
                        url: "https://www.youtube.com/watch?v=a".into(),
                        duration: Some(Duration::from_secs(60)),
                    },
                    PlaylistEntry {
                        title: "dos".into(),
                        url: "https://www.youtube.com/watch?v=b".into(),
                        duration: None,
                    },
                ])
            });

        let tracks = resolver(metadata, extractor)
            .resolve("https://www.youtube.com/playlist?list=PL123", request())
            .await
            .unwrap();

        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["uno", "dos"]);
    }

    #[tokio::test]
    async fn empty_playlist_is_an_error() {
        let metadata = MockMetadataProvider::new();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_playlist().returning(|_, _| Ok(Vec::new()));

        let err = resolver(metadata, extractor)
            .resolve("https://www.youtube.com/playlist?list=PL123", request())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::EmptyPlaylist));
    }

    #[tokio::test]
    async fn locate_asks_the_extractor_every_time() {
        let metadata = MockMetadataProvider::new();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_stream_url()
            .times(2)
            .returning(|url| Ok(format!("{url}&signed=1")));

        let resolver = resolver(metadata, extractor);
        let track = request().track("x".into(), "https://youtu.be/x".into());

        let first = resolver.locate(&track).await.unwrap();
        let second = resolver.locate(&track).await.unwrap();
        assert_eq!(first.stream_url, "https://youtu.be/x&signed=1");
        assert_eq!(second.stream_url, first.stream_url);
    }
}
