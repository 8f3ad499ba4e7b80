//! Short-time magnitude spectrogram computation.
//!
//! The builder windows and transforms one region of a [`PcmBuffer`], tracks
//! the peak magnitude while writing, then log-normalizes every cell into
//! `[0, 1]` against that peak. Sessions are bound to a [`CancelToken`] and
//! check it at frame-group and cell-group boundaries, so a superseded build
//! stops quickly without installing anything.

use crate::cancel::CancelToken;
use crate::dsp::fft::Fft;
use crate::dsp::window::FrameWindow;
use crate::error::{EngineError, Result};
use crate::pcm::PcmBuffer;

/// Cancellation check granularity during the transform pass.
const FRAMES_PER_CANCEL_CHECK: usize = 512;
/// Cancellation check granularity during normalization.
const CELLS_PER_CANCEL_CHECK: usize = 131_072;

/// Immutable result of one analysis run.
///
/// `data` is row-major `frames × bins` with every cell in `[0, 1]`; bin 0 is
/// DC, bin `bins − 1` is Nyquist-adjacent. Frame `f` starts at
/// `slice_start + f · hop_size / sample_rate` seconds.
#[derive(Debug)]
pub struct Spectrogram {
    data: Vec<f32>,
    frames: usize,
    bins: usize,
    hop_size: usize,
    fft_size: usize,
    sample_rate: u32,
    slice_start: f64,
    slice_duration: f64,
    total_duration: f64,
}

impl Spectrogram {
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start of the covered PCM region, seconds.
    pub fn slice_start(&self) -> f64 {
        self.slice_start
    }

    pub fn slice_duration(&self) -> f64 {
        self.slice_duration
    }

    pub fn slice_end(&self) -> f64 {
        self.slice_start + self.slice_duration
    }

    /// Duration of the parent buffer, for anchoring the playhead.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn at(&self, frame: usize, bin: usize) -> f32 {
        self.data[frame * self.bins + bin]
    }

    /// Seconds between successive frame starts.
    pub fn time_per_frame(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    /// Whether this instance covers `[start, end]` within `tolerance` seconds.
    pub fn covers(&self, start: f64, end: f64, tolerance: f64) -> bool {
        self.slice_start <= start + tolerance && self.slice_end() >= end - tolerance
    }
}

/// Inputs of one builder session.
#[derive(Clone, Copy, Debug)]
pub struct BuildParams {
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub hop_size: usize,
    pub fft_size: usize,
    /// Normalization floor; cells at or below it map to 0.
    pub min_db: f32,
}

/// Run one full builder session: clamp → frame → FFT → magnitude → normalize.
///
/// Fails with `InsufficientLength` when the clamped segment is shorter than
/// one frame, `Cancelled` when the token is superseded at any check point,
/// and `Internal` on non-finite magnitudes. Cancellation-free runs on equal
/// inputs produce bit-identical output.
pub fn build_spectrogram(
    pcm: &PcmBuffer,
    params: &BuildParams,
    cancel: &CancelToken,
) -> Result<Spectrogram> {
    let geometry = SessionGeometry::resolve(pcm, params)?;

    let fft = Fft::new(params.fft_size)?;
    let window = FrameWindow::new(params.fft_size);

    let mut data = vec![0.0f32; geometry.frames * geometry.bins];
    let mut re = vec![0.0f32; params.fft_size];
    let mut im = vec![0.0f32; params.fft_size];
    let mut peak = 0.0f32;

    for frame in 0..geometry.frames {
        if frame % FRAMES_PER_CANCEL_CHECK == 0 && cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        window.fill(pcm, geometry.start_sample + frame * params.hop_size, &mut re);
        im.fill(0.0);
        fft.process(&mut re, &mut im);

        let row = &mut data[frame * geometry.bins..(frame + 1) * geometry.bins];
        for (bin, slot) in row.iter_mut().enumerate() {
            let mag = (re[bin] * re[bin] + im[bin] * im[bin]).sqrt();
            *slot = mag;
            if mag > peak {
                peak = mag;
            }
        }
    }

    if data.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::Internal("non-finite magnitude in analysis".into()));
    }
    normalize_magnitudes(&mut data, peak, params.min_db, cancel)?;

    Ok(Spectrogram::from_parts(data, &geometry, params, pcm))
}

/// Map raw magnitudes to `[0, 1]`: `db = 20·log10(mag/peak + 1e-12)` scaled
/// by `(db − min_db) / (−min_db)`, clamped. A non-positive peak (all-zero
/// segment) yields all zeros without touching the log path.
///
/// Shared by the CPU and GPU builders so both normalize identically.
pub(crate) fn normalize_magnitudes(
    data: &mut [f32],
    peak: f32,
    min_db: f32,
    cancel: &CancelToken,
) -> Result<()> {
    if peak <= 0.0 {
        data.fill(0.0);
        return Ok(());
    }
    let inv_peak = 1.0 / peak;
    for (i, cell) in data.iter_mut().enumerate() {
        if i % CELLS_PER_CANCEL_CHECK == 0 && cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let db = 20.0 * (*cell * inv_peak + 1e-12).log10();
        *cell = ((db - min_db) / -min_db).clamp(0.0, 1.0);
    }
    Ok(())
}

/// Resolved geometry of one session: the clamped sample range and the frame
/// grid it produces. Shared by the CPU and GPU builders.
pub(crate) struct SessionGeometry {
    pub start_sample: usize,
    pub segment: usize,
    pub frames: usize,
    pub bins: usize,
}

impl SessionGeometry {
    pub(crate) fn resolve(pcm: &PcmBuffer, params: &BuildParams) -> Result<Self> {
        if params.hop_size == 0 {
            return Err(EngineError::Internal("hop size must be positive".into()));
        }
        let (start_sample, segment) = clamp_to_samples(pcm, params);
        if segment < params.fft_size {
            return Err(EngineError::InsufficientLength {
                segment,
                fft_size: params.fft_size,
            });
        }
        let frames = (segment - params.fft_size) / params.hop_size + 1;
        Ok(Self { start_sample, segment, frames, bins: params.fft_size / 2 })
    }
}

impl Spectrogram {
    /// Assemble a finished analysis from normalized data and its geometry.
    pub(crate) fn from_parts(
        data: Vec<f32>,
        geometry: &SessionGeometry,
        params: &BuildParams,
        pcm: &PcmBuffer,
    ) -> Self {
        debug_assert_eq!(data.len(), geometry.frames * geometry.bins);
        let sr = pcm.sample_rate() as f64;
        Self {
            data,
            frames: geometry.frames,
            bins: geometry.bins,
            hop_size: params.hop_size,
            fft_size: params.fft_size,
            sample_rate: pcm.sample_rate(),
            slice_start: geometry.start_sample as f64 / sr,
            slice_duration: geometry.segment as f64 / sr,
            total_duration: pcm.duration(),
        }
    }
}

/// Clamp the requested window to the track and convert to sample indices.
fn clamp_to_samples(pcm: &PcmBuffer, params: &BuildParams) -> (usize, usize) {
    let total = pcm.duration();
    let start = params.start_seconds.clamp(0.0, total);
    let end = (start + params.duration_seconds.max(0.0)).clamp(start, total);

    let sr = pcm.sample_rate() as f64;
    let start_sample = ((start * sr).floor() as usize).min(pcm.len());
    let end_sample = ((end * sr).floor() as usize).min(pcm.len());
    (start_sample, end_sample - start_sample)
}
