use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    encoder::FrameEncoder,
    queue::{Advance, Cursor, Gate},
    session::Session,
    transcode::{FrameRead, PcmSource, PcmStream},
    transport::VoiceLink,
    FRAME_BYTES,
};
use crate::{
    error::{ConnectionError, DecodeError, PlaybackError},
    sources::{SourceResolver, Track},
};

/// Receives user-facing playback events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn now_playing(&self, track: &Track);
    async fn track_failed(&self, track: &Track, error: &PlaybackError);
}

#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub opus_bitrate: i32,
    pub send_timeout: Duration,
    pub first_byte_timeout: Duration,
    pub stall_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Interrupted,
}

/// Drives one guild's queue until it is exhausted or stopped.
pub struct PlaybackWorker {
    session: Arc<Session>,
    epoch: u64,
    resolver: Arc<SourceResolver>,
    pcm: Arc<dyn PcmSource>,
    notifier: Arc<dyn Notifier>,
    settings: PlaybackSettings,
}

impl PlaybackWorker {
    pub fn new(
        session: Arc<Session>,
        epoch: u64,
        resolver: Arc<SourceResolver>,
        pcm: Arc<dyn PcmSource>,
        notifier: Arc<dyn Notifier>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            session,
            epoch,
            resolver,
            pcm,
            notifier,
            settings,
        }
    }

    pub async fn run(self) {
        let guild_id = self.session.guild_id();
        info!("▶️ Worker de reproducción iniciado para guild {}", guild_id);
        let mut encoder = None;
        // Fallos seguidos; con loop activo una cola donde todo falla daría vueltas para siempre
        let mut failures = 0usize;

        loop {
            let (cursor, track) = match self.session.mutate(|s| s.queue.begin(self.epoch)) {
                Advance::Play(cursor, track) => (cursor, track),
                Advance::Exhausted => {
                    info!("🏁 Cola terminada en guild {}", guild_id);
                    break;
                }
                Advance::Superseded => {
                    debug!("Worker reemplazado en guild {}", guild_id);
                    break;
                }
            };

            debug!(guild_id = %guild_id, track = %track.title, index = cursor.index, "🎵 Preparando track");

            match self.play_track(cursor, &track, &mut encoder).await {
                Ok(Outcome::Completed) => {
                    debug!(track = %track.title, "✅ Track completado");
                    failures = 0;
                }
                Ok(Outcome::Interrupted) => {
                    debug!(track = %track.title, "⏭️ Track interrumpido");
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    error!(guild_id = %guild_id, track = %track.title, "❌ Error reproduciendo: {}", e);
                    let disconnected = matches!(e, PlaybackError::Connection(_));
                    self.session.mutate(|s| s.last_error = Some(e.to_string()));
                    self.notifier.track_failed(&track, &e).await;

                    if disconnected {
                        // Sin conexión ningún track puede sonar; la cola queda en pausa dura
                        self.session.mutate(|s| {
                            s.queue.halt(self.epoch);
                            s.link = None;
                        });
                        warn!("🔌 Sin conexión de voz, worker detenido en guild {}", guild_id);
                        break;
                    }
                }
            }

            let all_failed = self.session.mutate(|s| {
                s.queue.finish(cursor);
                if !s.queue.is_empty() && failures >= s.queue.len() {
                    s.queue.halt(self.epoch);
                    true
                } else {
                    false
                }
            });
            if all_failed {
                warn!("🛑 Ningún track de la cola se pudo reproducir, worker detenido en guild {}", guild_id);
                break;
            }
        }
    }

    async fn play_track(
        &self,
        cursor: Cursor,
        track: &Track,
        encoder: &mut Option<FrameEncoder>,
    ) -> Result<Outcome, PlaybackError> {
        let link = self
            .session
            .read(|s| s.link.clone())
            .ok_or(ConnectionError::NotConnected)?;
        if !link.is_ready().await {
            return Err(ConnectionError::NotConnected.into());
        }

        let source = self.resolver.locate(track).await?;
        if !self.is_current(cursor) {
            return Ok(Outcome::Interrupted);
        }

        self.notifier.now_playing(&source.track).await;

        let encoder = match encoder {
            Some(encoder) => encoder,
            None => encoder.insert(FrameEncoder::new(self.settings.opus_bitrate)?),
        };

        let mut stream = self.pcm.open(&source.stream_url).await?;
        let result = self.stream_track(cursor, &mut stream, encoder, link.as_ref()).await;
        debug!(track = %track.title, bytes = stream.bytes_read(), "📦 PCM consumido");
        stream.close(matches!(result, Ok(Outcome::Completed))).await;
        result
    }

    async fn stream_track(
        &self,
        cursor: Cursor,
        stream: &mut PcmStream,
        encoder: &mut FrameEncoder,
        link: &dyn VoiceLink,
    ) -> Result<Outcome, PlaybackError> {
        let mut pcm = [0u8; FRAME_BYTES];

        if stream.read_frame(&mut pcm, self.settings.first_byte_timeout).await? == FrameRead::End {
            return Err(DecodeError::NoAudio.into());
        }

        link.set_speaking(true).await?;
        let result = self.pump(cursor, stream, encoder, link, &mut pcm).await;
        if let Err(e) = link.set_speaking(false).await {
            warn!("⚠️ No se pudo liberar speaking: {}", e);
        }
        result
    }

    /// Bucle por frame: consulta la cola, codifica y envía, lee el siguiente.
    async fn pump(
        &self,
        cursor: Cursor,
        stream: &mut PcmStream,
        encoder: &mut FrameEncoder,
        link: &dyn VoiceLink,
        pcm: &mut [u8; FRAME_BYTES],
    ) -> Result<Outcome, PlaybackError> {
        let mut revision = self.session.subscribe();
        let mut held = false;

        let outcome = loop {
            let gain = match self.session.read(|s| s.queue.gate(cursor)) {
                Gate::Abort => break Ok(Outcome::Interrupted),
                Gate::Hold => {
                    if !held {
                        info!("⏸️ Reproducción en pausa");
                        link.set_held(true).await;
                        held = true;
                    }
                    if revision.changed().await.is_err() {
                        break Ok(Outcome::Interrupted);
                    }
                    continue;
                }
                Gate::Proceed { gain } => gain,
            };

            if held {
                info!("▶️ Reproducción reanudada");
                link.set_held(false).await;
                held = false;
            }

            match encoder.encode(pcm, gain) {
                Ok(frame) => {
                    if let Err(e) = link.send_frame(frame, self.settings.send_timeout).await {
                        break Err(e.into());
                    }
                }
                Err(e) => warn!("⚠️ Frame descartado, error de Opus: {}", e),
            }

            match stream.read_frame(pcm, self.settings.stall_timeout).await {
                Ok(FrameRead::Frame) => {}
                Ok(FrameRead::End) => break Ok(Outcome::Completed),
                Err(e) => break Err(e.into()),
            }
        };

        if held {
            link.set_held(false).await;
        }
        outcome
    }

    fn is_current(&self, cursor: Cursor) -> bool {
        self.session.read(|s| s.queue.is_current(cursor))
    }
}
