use std::f64::consts::PI;

use crate::pcm::PcmBuffer;

/// Hann-windowed frame extraction with channel downmix.
///
/// Precomputes the window once; `fill` then produces one analysis frame per
/// call: samples are downmixed to mono by arithmetic mean across channels,
/// multiplied by the window, and indices past the end of the buffer
/// contribute zero (tail padding only — segments shorter than one frame are
/// rejected before framing starts).
pub struct FrameWindow {
    window: Vec<f32>,
}

impl FrameWindow {
    pub fn new(fft_size: usize) -> Self {
        Self { window: hann_window(fft_size) }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Fill `out` with the windowed mono frame starting at `start_sample`.
    /// `out` must be exactly `len()` long.
    pub fn fill(&self, pcm: &PcmBuffer, start_sample: usize, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.window.len());

        let channels = pcm.channels();
        let inv_channels = 1.0 / channels.len() as f32;
        let available = pcm.len().saturating_sub(start_sample).min(out.len());

        for (i, slot) in out.iter_mut().take(available).enumerate() {
            let idx = start_sample + i;
            let mut sum = 0.0f32;
            for channel in channels {
                sum += channel[idx];
            }
            *slot = sum * inv_channels * self.window[i];
        }
        for slot in out.iter_mut().skip(available) {
            *slot = 0.0;
        }
    }
}

/// Generates a Hann window: `w[i] = 0.5·(1 − cos(2πi/(n−1)))`.
fn hann_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos())) as f32)
        .collect()
}
