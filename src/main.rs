use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    player::AudioPlayer,
    session::SessionManager,
    transcode::Ffmpeg,
    transport::SongbirdGateway,
    worker::PlaybackSettings,
};
use crate::bot::{notifier::ChannelNotifier, GuildRadioBot};
use crate::config::Config;
use crate::sources::{
    youtube_api::{OEmbedClient, YouTubeDataApi},
    ytdlp::YtDlp,
    MetadataProvider, SourceResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_radio=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Radio v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Metadatos: API oficial si hay key, oEmbed si no
    let metadata: Arc<dyn MetadataProvider> = match &config.youtube_api_key {
        Some(key) => Arc::new(YouTubeDataApi::new(key.clone())?),
        None => {
            info!("ℹ️ YOUTUBE_API_KEY no configurada, usando oEmbed (sin duraciones)");
            Arc::new(OEmbedClient::new()?)
        }
    };
    let resolver = Arc::new(SourceResolver::new(
        metadata,
        Arc::new(YtDlp::new(config.ytdlp_path.clone())),
        config.max_playlist_size,
    ));

    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(Arc::clone(&songbird), config.frame_buffer));
    let notifier = Arc::new(ChannelNotifier::new(Arc::new(Http::new(&config.discord_token))));

    let settings = PlaybackSettings {
        opus_bitrate: config.opus_bitrate,
        send_timeout: config.send_timeout,
        first_byte_timeout: config.first_byte_timeout,
        stall_timeout: config.stall_timeout,
    };

    let player = Arc::new(AudioPlayer::new(
        SessionManager::new(config.max_queue_size, config.default_volume),
        resolver,
        Arc::new(Ffmpeg::new(config.ffmpeg_path.clone())),
        gateway,
        notifier,
        settings,
        config.voice_ready_timeout,
    ));

    // Solo slash commands y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let handler = GuildRadioBot::new(Arc::clone(&config), player, shutdown.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
