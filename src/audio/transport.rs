//! Voice transport: delivers encoded Opus frames to a guild's voice call.
//!
//! [`SongbirdLink`] feeds frames through a bounded channel into a live DCA1
//! stream played by songbird in Opus passthrough. Songbird consumes one
//! packet every 20ms, so the channel bound is what paces the worker.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    tracks::TrackHandle,
    Songbird,
};
use std::{io::Read, sync::Arc, time::Duration};
use symphonia::core::{
    io::{MediaSource, ReadOnlySource},
    probe::Hint,
};
use tracing::{debug, info, warn};

use super::{FRAME_SAMPLES, SAMPLE_RATE};
use crate::error::{ConnectionError, TransportError};

/// A joined voice connection for one guild.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Activa o desactiva la señal de speaking. Con `true` abre un stream nuevo.
    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError>;

    /// Entrega un frame Opus, esperando como máximo `deadline`
    async fn send_frame(&self, frame: Bytes, deadline: Duration) -> Result<(), TransportError>;

    /// Retiene (pausa) la reproducción sin cerrar el stream
    async fn set_held(&self, held: bool);

    async fn is_ready(&self) -> bool;

    async fn disconnect(&self);
}

/// Establishes voice connections.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        ready_timeout: Duration,
    ) -> Result<Arc<dyn VoiceLink>, ConnectionError>;
}

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    frame_buffer: usize,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>, frame_buffer: usize) -> Self {
        Self {
            manager,
            frame_buffer: frame_buffer.max(1),
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        ready_timeout: Duration,
    ) -> Result<Arc<dyn VoiceLink>, ConnectionError> {
        info!("🔊 Uniéndose al canal de voz {} en guild {}", channel_id, guild_id);

        let call = match tokio::time::timeout(ready_timeout, self.manager.join(guild_id, channel_id)).await {
            Ok(Ok(call)) => call,
            Ok(Err(e)) => {
                let _ = self.manager.remove(guild_id).await;
                return Err(ConnectionError::Join(e.to_string()));
            }
            Err(_) => {
                let _ = self.manager.remove(guild_id).await;
                return Err(ConnectionError::ReadyTimeout(ready_timeout));
            }
        };

        if let Err(e) = call.lock().await.deafen(true).await {
            warn!("⚠️ No se pudo ensordecer al bot: {}", e);
        }

        info!("✅ Conectado al canal de voz {}", channel_id);
        Ok(Arc::new(SongbirdLink {
            manager: self.manager.clone(),
            guild_id,
            frame_buffer: self.frame_buffer,
            active: Mutex::new(None),
        }))
    }
}

struct ActiveStream {
    frames: flume::Sender<Bytes>,
    handle: TrackHandle,
}

pub struct SongbirdLink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    frame_buffer: usize,
    active: Mutex<Option<ActiveStream>>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        if !speaking {
            // Soltar el sender deja que songbird drene los frames pendientes
            if self.active.lock().take().is_some() {
                debug!("🔇 Stream de voz cerrado en guild {}", self.guild_id);
            }
            return Ok(());
        }

        let call = self.manager.get(self.guild_id).ok_or(TransportError::Closed)?;
        let (tx, rx) = flume::bounded(self.frame_buffer);
        let input = dca_input(DcaStream::new(rx));
        let handle = call.lock().await.play_only_input(input);

        *self.active.lock() = Some(ActiveStream { frames: tx, handle });
        debug!("🔈 Stream de voz abierto en guild {}", self.guild_id);
        Ok(())
    }

    async fn send_frame(&self, frame: Bytes, deadline: Duration) -> Result<(), TransportError> {
        let frames = self
            .active
            .lock()
            .as_ref()
            .map(|a| a.frames.clone())
            .ok_or(TransportError::NotSpeaking)?;

        match tokio::time::timeout(deadline, frames.send_async(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout(deadline)),
        }
    }

    async fn set_held(&self, held: bool) {
        let handle = self.active.lock().as_ref().map(|a| a.handle.clone());
        if let Some(handle) = handle {
            let result = if held { handle.pause() } else { handle.play() };
            if let Err(e) = result {
                warn!("⚠️ No se pudo cambiar el estado de pausa: {}", e);
            }
        }
    }

    async fn is_ready(&self) -> bool {
        match self.manager.get(self.guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn disconnect(&self) {
        self.active.lock().take();
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Desconexión de guild {}: {}", self.guild_id, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        }
    }
}

fn dca_input(stream: DcaStream) -> Input {
    let mut hint = Hint::new();
    hint.with_extension("dca");

    let source: Box<dyn MediaSource> = Box::new(ReadOnlySource::new(stream));
    Input::Live(
        LiveInput::Raw(AudioStream {
            input: source,
            hint: Some(hint),
        }),
        None,
    )
}

/// Cabecera DCA1: magic, longitud i32 LE y metadatos JSON
fn dca_header() -> Bytes {
    let metadata = serde_json::json!({
        "dca": {
            "version": 1,
            "tool": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "url": null,
                "author": null,
            },
        },
        "opus": {
            "mode": "music",
            "sample_rate": SAMPLE_RATE,
            "frame_size": FRAME_SAMPLES,
            "abr": null,
            "vbr": true,
            "channels": 2,
        },
        "info": null,
        "origin": null,
        "extra": null,
    })
    .to_string();

    let mut header = BytesMut::with_capacity(8 + metadata.len());
    header.put_slice(b"DCA1");
    header.put_i32_le(metadata.len() as i32);
    header.put_slice(metadata.as_bytes());
    header.freeze()
}

fn dca_frame(frame: &[u8]) -> Bytes {
    let mut framed = BytesMut::with_capacity(2 + frame.len());
    framed.put_i16_le(frame.len() as i16);
    framed.put_slice(frame);
    framed.freeze()
}

/// Blocking reader over the frame channel, as songbird's input thread expects.
struct DcaStream {
    pending: Bytes,
    frames: flume::Receiver<Bytes>,
}

impl DcaStream {
    fn new(frames: flume::Receiver<Bytes>) -> Self {
        Self {
            pending: dca_header(),
            frames,
        }
    }
}

impl Read for DcaStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.frames.recv() {
                Ok(frame) => self.pending = dca_frame(&frame),
                // Sender cerrado: fin del stream
                Err(_) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn read_all(mut stream: DcaStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn header_carries_magic_and_opus_metadata() {
        let header = dca_header();
        assert_eq!(&header[..4], b"DCA1");

        let len = i32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        assert_eq!(len, header.len() - 8);

        let metadata: serde_json::Value = serde_json::from_slice(&header[8..]).unwrap();
        assert_eq!(metadata["dca"]["version"], 1);
        assert_eq!(metadata["opus"]["sample_rate"], 48_000);
        assert_eq!(metadata["opus"]["frame_size"], 960);
        assert_eq!(metadata["opus"]["channels"], 2);
    }

    #[test]
    fn frames_follow_the_header_with_length_prefixes() {
        let (tx, rx) = flume::bounded(4);
        tx.send(Bytes::from_static(&[1, 2, 3])).unwrap();
        tx.send(Bytes::from_static(&[4])).unwrap();
        drop(tx);

        let bytes = read_all(DcaStream::new(rx));
        let header_len = dca_header().len();

        assert_eq!(&bytes[header_len..], &[3, 0, 1, 2, 3, 1, 0, 4]);
    }

    #[test]
    fn small_reads_split_frames_without_loss() {
        let (tx, rx) = flume::bounded(1);
        tx.send(Bytes::from_static(&[7, 8, 9])).unwrap();
        drop(tx);

        let mut stream = DcaStream::new(rx);
        let header_len = dca_header().len();
        let mut sink = vec![0u8; header_len];
        stream.read_exact(&mut sink).unwrap();

        let mut byte = [0u8; 1];
        let mut tail = Vec::new();
        while stream.read(&mut byte).unwrap() == 1 {
            tail.push(byte[0]);
        }
        assert_eq!(tail, vec![3, 0, 7, 8, 9]);
    }
}
