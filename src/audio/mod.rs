//! # Audio Module
//!
//! Per-guild real-time playback pipeline.
//!
//! Each active guild gets one [`worker::PlaybackWorker`] task that walks its
//! queue and drives every track through the same stages:
//!
//! ```text
//! SourceResolver ──► Ffmpeg (s16le PCM) ──► FrameEncoder (Opus) ──► VoiceLink
//! ```
//!
//! ## Components
//!
//! ### [`queue`] - Queue State Machine
//! - Ordered tracks with a cursor, play/pause/loop flags and volume
//! - An epoch that lets a superseded worker exit without touching state
//!
//! ### [`session`] - Guild Sessions
//! - One mutex-guarded [`session::Session`] per guild, created lazily
//! - A revision channel that wakes a paused worker on any change
//!
//! ### [`transcode`] / [`encoder`] / [`transport`]
//! - ffmpeg child process management with bounded reads
//! - Opus encoding with volume applied as PCM gain
//! - Frame delivery to songbird with a per-frame send deadline
//!
//! ### [`player`] - Control Facade
//! - `play`, `skip`, `stop`, `pause`, `resume`, `loop`, `volume`, `queue`
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed little-endian
//! - **Channels**: Stereo (2 channels)
//! - **Frame**: 960 samples per channel (20ms)

pub mod encoder;
pub mod player;
pub mod queue;
pub mod session;
pub mod transcode;
pub mod transport;
pub mod worker;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: usize = 2;
/// Samples por canal en un frame de 20ms
pub const FRAME_SAMPLES: usize = 960;
/// Bytes de PCM s16le por frame (960 * 2 canales * 2 bytes)
pub const FRAME_BYTES: usize = FRAME_SAMPLES * CHANNELS * 2;
/// Tamaño máximo de un paquete Opus
pub const MAX_OPUS_FRAME: usize = 1920;
