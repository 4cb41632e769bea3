use base64::Engine;
use std::time::Duration;

/// Sample rate of the PCM16 audio returned by the speech endpoint.
pub const SPEECH_PCM16_SAMPLE_RATE: u32 = 24000;
/// The speech endpoint always answers in mono.
pub const SPEECH_CHANNEL_COUNT: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum AudioDecodeError {
    #[error("audio payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Decoded audio, one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Re-interleaves the channels, the layout most output devices expect.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for frame in 0..frames {
            out.extend(self.channels.iter().map(|ch| ch[frame]));
        }
        out
    }
}

/// Decodes interleaved little-endian PCM16 into normalized per-channel samples.
///
/// A trailing odd byte and any trailing partial frame are dropped. Each
/// sample is `i16 / 32768.0`, so values lie in `[-1.0, 1.0)`.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channel_count: u16) -> SampleBuffer {
    let channel_count = channel_count as usize;
    if channel_count == 0 {
        return SampleBuffer {
            sample_rate,
            channels: Vec::new(),
        };
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    let frames = samples.len() / channel_count;

    let mut channels: Vec<Vec<f32>> = (0..channel_count)
        .map(|_| Vec::with_capacity(frames))
        .collect();
    for frame in samples.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample as f32 / 32768.0);
        }
    }

    SampleBuffer {
        sample_rate,
        channels,
    }
}

/// Decodes a base64 PCM16 payload as returned by the speech endpoint.
pub fn decode_base64_pcm16(
    base64_audio: &str,
    sample_rate: u32,
    channel_count: u16,
) -> Result<SampleBuffer, AudioDecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_audio.trim())?;
    Ok(decode_pcm16(&bytes, sample_rate, channel_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_stereo_deinterleaves() {
        let bytes = pcm_bytes(&[0, 16384, -32768, 32767]);
        let buffer = decode_pcm16(&bytes, 24000, 2);

        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0).unwrap(), &[0.0, -1.0]);
        assert_eq!(buffer.channel(1).unwrap(), &[0.5, 32767.0 / 32768.0]);
    }

    #[test]
    fn test_decode_truncates_partial_frame() {
        // Five samples over two channels: the fifth has no partner.
        let bytes = pcm_bytes(&[1, 2, 3, 4, 5]);
        let buffer = decode_pcm16(&bytes, 24000, 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0).unwrap().len(), 2);
        assert_eq!(buffer.channel(1).unwrap().len(), 2);
    }

    #[test]
    fn test_decode_drops_odd_trailing_byte() {
        let mut bytes = pcm_bytes(&[16384]);
        bytes.push(0x7f);
        let buffer = decode_pcm16(&bytes, 24000, 1);
        assert_eq!(buffer.frames(), 1);
        assert_abs_diff_eq!(buffer.channel(0).unwrap()[0], 0.5, epsilon = 0.0001);
    }

    #[test]
    fn test_decode_range_is_half_open() {
        let bytes = pcm_bytes(&[i16::MIN, i16::MAX]);
        let buffer = decode_pcm16(&bytes, 24000, 1);
        let samples = buffer.channel(0).unwrap();
        assert_eq!(samples[0], -1.0);
        assert!(samples[1] < 1.0);
    }

    #[test]
    fn test_decode_zero_channels_is_empty() {
        let buffer = decode_pcm16(&pcm_bytes(&[1, 2]), 24000, 0);
        assert_eq!(buffer.channel_count(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration(), Duration::ZERO);
    }

    #[test]
    fn test_decode_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(pcm_bytes(&[16384, -16384]));
        let buffer = decode_base64_pcm16(&encoded, SPEECH_PCM16_SAMPLE_RATE, SPEECH_CHANNEL_COUNT)
            .expect("valid payload");
        assert_eq!(buffer.sample_rate(), 24000);
        assert_abs_diff_eq!(buffer.channel(0).unwrap()[0], 0.5, epsilon = 0.0001);
        assert_abs_diff_eq!(buffer.channel(0).unwrap()[1], -0.5, epsilon = 0.0001);

        let err = decode_base64_pcm16("invalid_base64!", 24000, 1).unwrap_err();
        assert!(matches!(err, AudioDecodeError::Base64(_)));
    }

    #[test]
    fn test_duration_and_interleaving() {
        let samples: Vec<i16> = (0..48000).map(|i| (i % 100) as i16).collect();
        let buffer = decode_pcm16(&pcm_bytes(&samples), 24000, 2);
        assert_eq!(buffer.duration(), Duration::from_secs(1));

        let stereo = decode_pcm16(&pcm_bytes(&[1, 2, 3, 4]), 24000, 2);
        let expected: Vec<f32> = [1, 2, 3, 4].iter().map(|&s| s as f32 / 32768.0).collect();
        assert_eq!(stereo.interleaved(), expected);
    }
}
