use audiopus::{coder::Encoder, Application, Bitrate, Channels, SampleRate};
use bytes::Bytes;
use tracing::debug;

use super::{FRAME_BYTES, FRAME_SAMPLES, CHANNELS, MAX_OPUS_FRAME};
use crate::error::PlaybackError;

/// Opus encoder for 20ms stereo frames, with volume applied as PCM gain.
pub struct FrameEncoder {
    encoder: Encoder,
    samples: [i16; FRAME_SAMPLES * CHANNELS],
    output: [u8; MAX_OPUS_FRAME],
}

impl FrameEncoder {
    pub fn new(bitrate: i32) -> Result<Self, PlaybackError> {
        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)
            .map_err(|e| PlaybackError::EncoderInit(e.to_string()))?;
        encoder
            .set_bitrate(Bitrate::BitsPerSecond(bitrate))
            .map_err(|e| PlaybackError::EncoderInit(e.to_string()))?;

        debug!("🎚️ Encoder Opus listo ({} bps)", bitrate);
        Ok(Self {
            encoder,
            samples: [0; FRAME_SAMPLES * CHANNELS],
            output: [0; MAX_OPUS_FRAME],
        })
    }

    pub fn encode(&mut self, pcm: &[u8; FRAME_BYTES], gain: f32) -> Result<Bytes, audiopus::Error> {
        decode_samples(pcm, gain, &mut self.samples);
        let len = self.encoder.encode(&self.samples, &mut self.output)?;
        Ok(Bytes::copy_from_slice(&self.output[..len]))
    }
}

/// s16le a muestras, aplicando la ganancia con saturación
fn decode_samples(pcm: &[u8], gain: f32, samples: &mut [i16]) {
    let unity = (gain - 1.0).abs() < f32::EPSILON;

    for (sample, bytes) in samples.iter_mut().zip(pcm.chunks_exact(2)) {
        let raw = i16::from_le_bytes([bytes[0], bytes[1]]);
        *sample = if unity {
            raw
        } else {
            (raw as f32 * gain).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pcm_of(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn gain_scales_and_saturates() {
        let pcm = pcm_of(&[1000, -1000, i16::MAX, i16::MIN]);
        let mut out = [0i16; 4];

        decode_samples(&pcm, 0.5, &mut out);
        assert_eq!(out, [500, -500, 16384, -16384]);

        decode_samples(&pcm, 1.0, &mut out);
        assert_eq!(out, [1000, -1000, i16::MAX, i16::MIN]);

        decode_samples(&pcm, 2.0, &mut out);
        assert_eq!(out, [2000, -2000, i16::MAX, i16::MIN]);

        decode_samples(&pcm, 0.0, &mut out);
        assert_eq!(out, [0, 0, 0, 0]);
    }

    #[test]
    fn encodes_a_frame_within_the_packet_limit() {
        let mut encoder = FrameEncoder::new(96_000).unwrap();
        let samples: Vec<i16> = (0..FRAME_SAMPLES * CHANNELS)
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect();
        let mut pcm = [0u8; FRAME_BYTES];
        pcm.copy_from_slice(&pcm_of(&samples));

        let packet = encoder.encode(&pcm, 0.5).unwrap();
        assert!(!packet.is_empty());
        assert!(packet.len() <= MAX_OPUS_FRAME);
    }
}
