use async_trait::async_trait;
use std::{process::Stdio, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader},
    process::{Child, Command},
};
use tracing::{debug, warn};

use super::FRAME_BYTES;
use crate::error::DecodeError;

/// Espera máxima a que ffmpeg termine por su cuenta tras EOF
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Opens a stream of interleaved s16le, 48 kHz, stereo PCM for a media locator.
#[async_trait]
pub trait PcmSource: Send + Sync {
    async fn open(&self, locator: &str) -> Result<PcmStream, DecodeError>;
}

/// Decodificador basado en el binario de ffmpeg
pub struct Ffmpeg {
    binary: String,
}

impl Ffmpeg {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(locator: &str) -> Vec<&str> {
        vec![
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            locator,
            "-vn",
            "-f",
            "s16le",
            "-ar",
            "48000",
            "-ac",
            "2",
            "pipe:1",
        ]
    }
}

#[async_trait]
impl PcmSource for Ffmpeg {
    async fn open(&self, locator: &str) -> Result<PcmStream, DecodeError> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(locator))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DecodeError::Spawn)?;

        debug!("🎬 ffmpeg iniciado (pid {:?})", child.id());

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("ffmpeg: {}", line);
                }
            });
        }

        PcmStream::from_child(child)
    }
}

/// Result of reading one PCM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRead {
    Frame,
    End,
}

/// PCM output of one decode attempt, plus the process producing it.
///
/// Dropping the stream kills the process.
pub struct PcmStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    child: Option<Child>,
    bytes_read: u64,
}

impl PcmStream {
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            child: None,
            bytes_read: 0,
        }
    }

    /// Toma posesión del proceso y lee de su stdout, que debe estar en `piped`
    pub(crate) fn from_child(mut child: Child) -> Result<Self, DecodeError> {
        let stdout = child.stdout.take().ok_or_else(|| {
            DecodeError::Spawn(std::io::Error::other("stdout del decodificador no disponible"))
        })?;

        Ok(Self {
            reader: Box::new(stdout),
            child: Some(child),
            bytes_read: 0,
        })
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Llena `buf` con un frame completo. Cada lectura espera como máximo
    /// `wait`; un frame final incompleto se descarta.
    pub async fn read_frame(
        &mut self,
        buf: &mut [u8; FRAME_BYTES],
        wait: Duration,
    ) -> Result<FrameRead, DecodeError> {
        let mut filled = 0;

        while filled < FRAME_BYTES {
            match tokio::time::timeout(wait, self.reader.read(&mut buf[filled..])).await {
                Err(_) => return Err(DecodeError::Stalled(wait)),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(DecodeError::Read(e)),
                Ok(Ok(0)) => {
                    if filled > 0 {
                        debug!("✂️ Frame final incompleto descartado ({} bytes)", filled);
                    }
                    return Ok(FrameRead::End);
                }
                Ok(Ok(n)) => {
                    filled += n;
                    self.bytes_read += n as u64;
                }
            }
        }

        Ok(FrameRead::Frame)
    }

    /// Cierra el proceso: espera su salida si terminó el audio, o lo mata.
    pub async fn close(mut self, graceful: bool) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if graceful {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) if status.success() => {
                    debug!("✅ ffmpeg terminó ({} bytes de PCM)", self.bytes_read);
                    return;
                }
                Ok(Ok(status)) => {
                    warn!("⚠️ ffmpeg terminó con {}", status);
                    return;
                }
                Ok(Err(e)) => warn!("⚠️ Error esperando a ffmpeg: {}", e),
                Err(_) => warn!("⚠️ ffmpeg no terminó tras EOF, forzando cierre"),
            }
        }

        if let Err(e) = child.kill().await {
            warn!("⚠️ No se pudo terminar ffmpeg: {}", e);
        } else {
            debug!("🔪 ffmpeg terminado");
        }
    }
}
