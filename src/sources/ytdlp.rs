use async_process::{Command, Output};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{MediaExtractor, PlaylistEntry};
use crate::error::ResolutionError;

/// Entrada de `--flat-playlist --dump-json`
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
}

/// Cliente de línea de comandos de yt-dlp
pub struct YtDlp {
    binary: String,
    // Limitar invocaciones concurrentes para evitar rate limiting
    permits: Semaphore,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            permits: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolutionError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ResolutionError::Extractor(e.to_string()))?;

        let output: Output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| ResolutionError::Extractor(format!("no se pudo ejecutar {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::Extractor(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn title(&self, url: &str) -> Result<String, ResolutionError> {
        debug!("📊 Obteniendo título con yt-dlp: {}", url);
        let stdout = self
            .run(&["--no-playlist", "--no-warnings", "--get-title", url])
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn stream_url(&self, url: &str) -> Result<String, ResolutionError> {
        debug!("🎵 Obteniendo URL de stream para: {}", url);
        let stdout = self
            .run(&["--no-playlist", "--no-warnings", "-f", "bestaudio/best", "--get-url", url])
            .await?;
        first_stream_url(&stdout).ok_or(ResolutionError::NoStreamUrl)
    }

    async fn playlist(&self, url: &str, limit: usize) -> Result<Vec<PlaylistEntry>, ResolutionError> {
        info!("📋 Obteniendo playlist: {}", url);
        let limit_arg = limit.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--no-warnings",
                "--playlist-end",
                &limit_arg,
                url,
            ])
            .await?;
        Ok(parse_flat_playlist(&stdout, limit))
    }
}

/// Formatos con audio y video separados devuelven varias líneas; la primera es el audio
fn first_stream_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn parse_flat_playlist(stdout: &str, limit: usize) -> Vec<PlaylistEntry> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("⚠️ Entrada de playlist ignorada: {}", e);
                None
            }
        })
        .filter_map(|entry| {
            let url = match (entry.url, entry.id) {
                (Some(url), _) if url.starts_with("http") => url,
                (_, Some(id)) => format!("https://www.youtube.com/watch?v={id}"),
                (Some(url), None) => format!("https://www.youtube.com/watch?v={url}"),
                (None, None) => return None,
            };
            Some(PlaylistEntry {
                title: entry.title.unwrap_or_else(|| "YouTube Video".to_string()),
                url,
                duration: entry
                    .duration
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .map(Duration::from_secs_f64),
            })
        })
        .take(limit)
        .collect()
}
