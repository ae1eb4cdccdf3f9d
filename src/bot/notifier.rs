use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http};
use std::sync::Arc;
use tracing::warn;

use crate::{audio::worker::Notifier, error::PlaybackError, sources::Track, ui::embeds};

/// Publica los eventos de reproducción en el canal de texto donde se pidió el track
pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn send(&self, track: &Track, message: CreateMessage) {
        if let Err(e) = track.channel_id.send_message(&self.http, message).await {
            warn!("⚠️ No se pudo enviar mensaje al canal {}: {}", track.channel_id, e);
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn now_playing(&self, track: &Track) {
        self.send(track, CreateMessage::new().embed(embeds::now_playing_embed(track)))
            .await;
    }

    async fn track_failed(&self, track: &Track, error: &PlaybackError) {
        let description = format!("**{}** no se pudo reproducir: {}", track.title, error);
        self.send(
            track,
            CreateMessage::new().embed(embeds::error_embed("Error de reproducción", &description)),
        )
        .await;
    }
}
