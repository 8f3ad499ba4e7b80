//! Audio-analysis and view-synchronization engine for keyframe editing.
//!
//! Turns a decoded PCM buffer into a normalized short-time magnitude
//! spectrogram, keeps a finer tile in step with the zoomed view, paints
//! through a perceptual color LUT, and tracks the playhead against
//! wall-clock playback. Decoding, waveform drawing and all DOM/UI concerns
//! live in the host; this crate only ever sees samples, view windows and
//! pixel buffers.

use std::time::Duration;

pub mod cancel;
pub mod colormap;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pcm;
pub mod playhead;
pub mod render;
pub mod tiles;
pub mod view;

mod shared;
mod worker;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use dsp::spectrogram::{build_spectrogram, BuildParams, Spectrogram};
pub use engine::{ColorStop, Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use pcm::PcmBuffer;
pub use view::{View, ZoomConfig, ZoomLadder};

/// Default gradient: near-black through blues into warm highlights.
pub const DEFAULT_COLOR_STOPS: [ColorStop; 6] = [
    (0.00, [5, 8, 17]),
    (0.25, [32, 54, 120]),
    (0.50, [69, 137, 205]),
    (0.70, [255, 209, 102]),
    (0.85, [255, 128, 96]),
    (1.00, [255, 255, 255]),
];

pub(crate) const FFT_SIZE: usize = 1024;
pub(crate) const MIN_DB: f32 = -85.0;
pub(crate) const BASE_SPP: f64 = 2048.0;

pub(crate) const ZOOM_STEPS: u32 = 200;
pub(crate) const ZOOM_MIN_FACTOR: f64 = 0.125;
pub(crate) const ZOOM_MAX_FACTOR: f64 = 256.0;
pub(crate) const ZOOM_SNAP_RANGE: f64 = 0.1;

pub(crate) const DEBOUNCE: Duration = Duration::from_millis(120);
pub(crate) const REUSE_TOLERANCE: f64 = 1.0 / 60.0;

/// Full-track analysis hop: 20 ms of audio, floored at 256 samples.
pub(crate) const FULL_HOP_WINDOW_SECS: f64 = 0.02;
pub(crate) const FULL_HOP_MIN: usize = 256;
