use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Metadatos (opcional: sin key se usa oEmbed)
    pub youtube_api_key: Option<String>,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub opus_bitrate: i32,
    pub frame_buffer: usize,

    // Tiempos límite
    pub send_timeout: Duration,
    pub voice_ready_timeout: Duration,
    pub first_byte_timeout: Duration,
    pub stall_timeout: Duration,
    pub idle_timeout: Duration,

    // Binarios externos
    pub ffmpeg_path: String,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let duration = |key: &str, default: &str| -> Result<Duration> {
            humantime::parse_duration(&var(key, default))
                .with_context(|| format!("{key} no es una duración válida (ej: 5s, 15m)"))
        };

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN")
                .filter(|t| !t.trim().is_empty())
                .context("DISCORD_TOKEN es obligatorio")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            youtube_api_key: lookup("YOUTUBE_API_KEY").filter(|k| !k.trim().is_empty()),

            // Audio
            default_volume: var("DEFAULT_VOLUME", "1.0") // ganancia unitaria: el audio sale tal cual
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_queue_size: var("MAX_QUEUE_SIZE", "1000")
                .parse()
                .context("MAX_QUEUE_SIZE inválido")?,
            max_playlist_size: var("MAX_PLAYLIST_SIZE", "100")
                .parse()
                .context("MAX_PLAYLIST_SIZE inválido")?,
            opus_bitrate: var("OPUS_BITRATE", "96000") // 96kbps (Discord default)
                .parse()
                .context("OPUS_BITRATE inválido")?,
            frame_buffer: var("FRAME_BUFFER", "10") // 200ms de audio en vuelo
                .parse()
                .context("FRAME_BUFFER inválido")?,

            send_timeout: duration("SEND_TIMEOUT", "5s")?,
            voice_ready_timeout: duration("VOICE_READY_TIMEOUT", "10s")?,
            first_byte_timeout: duration("FIRST_BYTE_TIMEOUT", "15s")?,
            stall_timeout: duration("STALL_TIMEOUT", "30s")?,
            idle_timeout: duration("IDLE_TIMEOUT", "15m")?,

            ffmpeg_path: var("FFMPEG_PATH", "ffmpeg"),
            ytdlp_path: var("YTDLP_PATH", "yt-dlp"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Opus bitrate must be within 8kbps..=510kbps
    /// - Queue, playlist and frame buffer sizes must be > 0
    /// - Every timeout must be non-zero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.opus_bitrate > 510_000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8_000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.frame_buffer == 0 {
            anyhow::bail!("Frame buffer must hold at least one frame");
        }

        for (name, value) in [
            ("SEND_TIMEOUT", self.send_timeout),
            ("VOICE_READY_TIMEOUT", self.voice_ready_timeout),
            ("FIRST_BYTE_TIMEOUT", self.first_byte_timeout),
            ("STALL_TIMEOUT", self.stall_timeout),
            ("IDLE_TIMEOUT", self.idle_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging, without
    /// the token or API key.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Metadata: {}\n  \
            Audio: {}% vol, {}kbps, {} frames buffered\n  \
            Limits: {} queue, {} playlist\n  \
            Timeouts: send {}, voice {}, first byte {}, stall {}, idle {}",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            if self.youtube_api_key.is_some() { "YouTube Data API v3" } else { "oEmbed" },
            (self.default_volume * 100.0).round() as u32,
            self.opus_bitrate / 1000,
            self.frame_buffer,
            self.max_queue_size,
            self.max_playlist_size,
            humantime::format_duration(self.send_timeout),
            humantime::format_duration(self.voice_ready_timeout),
            humantime::format_duration(self.first_byte_timeout),
            humantime::format_duration(self.stall_timeout),
            humantime::format_duration(self.idle_timeout),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,
            youtube_api_key: None,

            default_volume: 1.0,
            max_queue_size: 1000,
            max_playlist_size: 100,
            opus_bitrate: 96000,
            frame_buffer: 10,

            send_timeout: Duration::from_secs(5),
            voice_ready_timeout: Duration::from_secs(10),
            first_byte_timeout: Duration::from_secs(15),
            stall_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(15 * 60),

            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
