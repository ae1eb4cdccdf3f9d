//! Error taxonomy for the playback pipeline.
//!
//! Every failure a track can hit on its way to the voice channel maps to one
//! variant of [`PlaybackError`]. The playback worker catches all of them at the
//! per-track boundary, reports them to the track's text channel and moves on
//! to the next queue entry.

use std::time::Duration;
use thiserror::Error;

/// Failures while turning a user query into tracks or a track into a
/// streamable media locator.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("{platform} todavía no está soportado. Usa una URL de YouTube (youtube.com/watch?v=... o youtu.be/...)")]
    UnsupportedSource { platform: &'static str },

    #[error("la búsqueda por texto todavía no está disponible. Usa una URL directa de YouTube, por ejemplo: /play https://youtube.com/watch?v=VIDEO_ID")]
    SearchUnsupported,

    #[error("no se pudo leer la URL: {0}")]
    InvalidUrl(String),

    #[error("error de la API de metadatos: {0}")]
    Metadata(String),

    #[error("yt-dlp falló: {0}")]
    Extractor(String),

    #[error("yt-dlp no devolvió una URL de audio")]
    NoStreamUrl,

    #[error("la playlist está vacía o es privada")]
    EmptyPlaylist,
}

/// Failures of the external decoder process.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no se pudo iniciar ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg no produjo audio")]
    NoAudio,

    #[error("ffmpeg no entregó audio en {0:?}")]
    Stalled(Duration),

    #[error("error leyendo PCM de ffmpeg: {0}")]
    Read(#[source] std::io::Error),
}

/// Failures delivering frames to the voice connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timeout enviando frame de audio ({0:?})")]
    Timeout(Duration),

    #[error("el stream de voz se cerró")]
    Closed,

    #[error("se envió un frame sin señal de speaking activa")]
    NotSpeaking,
}

/// Failures establishing or finding the guild's voice connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no se pudo unir al canal de voz: {0}")]
    Join(String),

    #[error("timeout esperando la conexión de voz ({0:?})")]
    ReadyTimeout(Duration),

    #[error("no hay conexión de voz activa")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no se pudo inicializar el encoder Opus: {0}")]
    EncoderInit(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Why a `/play` request did not enqueue anything.
#[derive(Debug, Error)]
pub enum PlayError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Rejected queue-control operations. These are user mistakes, not pipeline
/// failures, so they never reach the worker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("la cola está llena (máximo {0} canciones)")]
    Full(usize),

    #[error("no hay ninguna canción sonando")]
    NothingPlaying,

    #[error("la música ya está en pausa")]
    AlreadyPaused,

    #[error("la música no está en pausa")]
    NotPaused,

    #[error("el volumen debe estar entre 0 y 100 (recibido {0})")]
    VolumeOutOfRange(i64),
}
