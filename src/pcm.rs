use crate::error::{EngineError, Result};

/// Immutable decoded audio, as handed over by the host's decoder.
///
/// One `Vec<f32>` per channel, all of equal length. Constructed once per
/// loaded file and shared with the analysis worker behind an `Arc`; nothing
/// mutates it until the next load drops it.
#[derive(Debug)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
    length: usize,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EngineError::Internal("sample rate must be positive".into()));
        }
        let Some(first) = channels.first() else {
            return Err(EngineError::Internal("PCM needs at least one channel".into()));
        };
        let length = first.len();
        if channels.iter().any(|c| c.len() != length) {
            return Err(EngineError::Internal(
                "PCM channels differ in length".into(),
            ));
        }
        Ok(Self { sample_rate, channels, length })
    }

    /// Single-channel constructor, mostly for tests and synthetic signals.
    pub fn from_mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        Self::new(sample_rate, vec![samples])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn duration(&self) -> f64 {
        self.length as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_channel_lengths() {
        let result = PcmBuffer::new(48_000, vec![vec![0.0; 10], vec![0.0; 11]]);
        assert!(matches!(result, Err(EngineError::Internal(_))));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let result = PcmBuffer::from_mono(0, vec![0.0; 10]);
        assert!(matches!(result, Err(EngineError::Internal(_))));
    }

    #[test]
    fn duration_follows_rate() {
        let pcm = PcmBuffer::from_mono(48_000, vec![0.0; 96_000]).unwrap();
        assert_eq!(pcm.duration(), 2.0);
        assert_eq!(pcm.channel_count(), 1);
    }
}
