//! The engine facade.
//!
//! One `Engine` owns the analysis worker, the shared snapshot state, the
//! zoom ladder and the color LUT. Hosts drive it with the small call set
//! from the editor: load a decoded buffer, move the view, paint, report the
//! playhead, tear down. Every tunable lives in [`EngineConfig`], fixed at
//! construction — changing a constant means building a new engine, which
//! also invalidates every cached analysis.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::colormap::ColorLut;
use crate::dsp::spectrogram::BuildParams;
use crate::error::{EngineError, Result};
use crate::pcm::PcmBuffer;
use crate::playhead::PlayheadSync;
use crate::render::render_into;
use crate::shared::EngineShared;
use crate::tiles::TileManager;
use crate::view::{resolve_view, View, ZoomConfig, ZoomLadder};
use crate::worker::{AnalysisCommand, AnalysisThread};

/// `(position, rgb)` — one gradient stop of the color LUT.
pub type ColorStop = (f32, [u8; 3]);

/// All engine tunables, passed once at construction.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Transform length; a power of two. The GPU backend only serves 1024.
    pub fft_size: usize,
    /// Normalization floor in dB below peak.
    pub min_db: f32,
    /// Samples per pixel at zoom factor 1.
    pub base_spp: f64,
    pub zoom: ZoomConfig,
    /// Minimum gap between hi-res tile requests.
    pub debounce: Duration,
    /// Slack, in seconds, when testing whether a tile covers the view.
    pub reuse_tolerance: f64,
    pub color_stops: [ColorStop; 6],
    /// Samples-per-pixel ladder supplied by the host's waveform library;
    /// when absent the ladder is derived from the zoom curve.
    pub allowed_spp: Option<Vec<f64>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fft_size: crate::FFT_SIZE,
            min_db: crate::MIN_DB,
            base_spp: crate::BASE_SPP,
            zoom: ZoomConfig {
                steps: crate::ZOOM_STEPS,
                min_factor: crate::ZOOM_MIN_FACTOR,
                max_factor: crate::ZOOM_MAX_FACTOR,
                snap_range: crate::ZOOM_SNAP_RANGE,
            },
            debounce: crate::DEBOUNCE,
            reuse_tolerance: crate::REUSE_TOLERANCE,
            color_stops: crate::DEFAULT_COLOR_STOPS,
            allowed_spp: None,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    ladder: ZoomLadder,
    lut: ColorLut,
    shared: Arc<EngineShared>,
    tx: Sender<AnalysisCommand>,
    worker: Mutex<Option<AnalysisThread>>,
    playhead: Mutex<PlayheadSync>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let shared = Arc::new(EngineShared::new(TileManager::new(
            config.debounce,
            config.reuse_tolerance,
        )));
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = AnalysisThread::spawn(Arc::clone(&shared), rx);

        let ladder = match &config.allowed_spp {
            Some(levels) => ZoomLadder::with_levels(config.zoom, config.base_spp, levels.clone()),
            None => ZoomLadder::new(config.zoom, config.base_spp),
        };
        Self {
            ladder,
            lut: ColorLut::new(&config.color_stops),
            config,
            shared,
            tx,
            worker: Mutex::new(Some(worker)),
            playhead: Mutex::new(PlayheadSync::new()),
        }
    }

    /// Replace the loaded audio. All prior analyses are invalidated first;
    /// the fresh full-track build is then issued to the worker. Fails with
    /// `InsufficientLength` when the buffer is shorter than one frame (the
    /// renderer paints an empty view in that state).
    pub fn load(&self, pcm: PcmBuffer) -> Result<()> {
        self.shared.bump_generation();
        self.shared.tiles.invalidate();
        self.shared.full.store(None);
        *self.shared.pcm.write() = None;
        *self.shared.view.write() = None;
        self.playhead.lock().reset();
        self.shared.mark_repaint();

        if pcm.len() < self.config.fft_size {
            return Err(EngineError::InsufficientLength {
                segment: pcm.len(),
                fft_size: self.config.fft_size,
            });
        }

        let pcm = Arc::new(pcm);
        let total = pcm.duration();
        let view = resolve_view(&self.ladder, 0.0, total, self.config.base_spp, total);
        *self.shared.pcm.write() = Some(Arc::clone(&pcm));
        *self.shared.view.write() = Some(view);

        let params = BuildParams {
            start_seconds: 0.0,
            duration_seconds: total,
            hop_size: full_track_hop(pcm.sample_rate()),
            fft_size: self.config.fft_size,
            min_db: self.config.min_db,
        };
        let token = self.shared.generation();
        let _ = self.tx.send(AnalysisCommand::FullTrack { pcm, params, token });
        Ok(())
    }

    /// Move the view window. Clamps into the track, snaps the zoom to the
    /// allowed ladder, and may schedule a hi-res tile build. Never blocks.
    pub fn set_view(&self, start: f64, duration: f64, samples_per_pixel: f64) {
        let Some(pcm) = self.shared.pcm() else { return };
        let total = pcm.duration();
        let view = resolve_view(&self.ladder, start, duration, samples_per_pixel, total);

        let previous = self.shared.view.write().replace(view);
        if previous != Some(view) {
            self.shared.mark_repaint();
        }

        let request = self.shared.tiles.maybe_request(
            &view,
            pcm.sample_rate(),
            total,
            full_track_hop(pcm.sample_rate()),
            Instant::now(),
        );
        if let Some(request) = request {
            let _ = self.tx.send(AnalysisCommand::Tile {
                pcm,
                request,
                fft_size: self.config.fft_size,
                min_db: self.config.min_db,
            });
        }
    }

    /// Paint the active spectrogram into `buf` (`w_dev × h_dev` RGBA device
    /// pixels). Synchronous; uses one consistent `(view, spectrogram)`
    /// snapshot for the whole repaint and clears the pending-repaint flag.
    pub fn render(&self, buf: &mut [u8], w_dev: u32, h_dev: u32, dpr: f64) {
        let view = self.shared.view();
        let Some(view) = view else {
            if buf.len() == w_dev as usize * h_dev as usize * 4 {
                buf.fill(0);
            }
            self.shared.take_repaint();
            return;
        };

        let active = self
            .shared
            .tiles
            .active_for(&view)
            .or_else(|| self.shared.full.load_full());
        render_into(active.as_deref(), &view, &self.lut, buf, w_dev, h_dev, dpr);
        self.shared.take_repaint();
    }

    /// Report the player position for this display frame.
    pub fn set_playhead(&self, time: f64, playing: bool) {
        let mut sync = self.playhead.lock();
        sync.set(time, playing);
        if let Some(view) = self.shared.view() {
            if sync.tick(&view) {
                self.shared.mark_repaint();
            }
        }
    }

    /// Playhead x in CSS pixels for a container of `width_css`, or `None`
    /// when nothing is loaded.
    pub fn playhead_position(&self, width_css: f64) -> Option<f64> {
        let view = self.shared.view()?;
        let pcm = self.shared.pcm()?;
        self.playhead.lock().position_css(
            &view,
            pcm.sample_rate(),
            width_css,
            self.has_spectrogram(),
        )
    }

    /// Hint that the GPU backend should be preferred where applicable.
    pub fn set_prefer_gpu(&self, prefer: bool) {
        self.shared.prefer_gpu.store(prefer, Ordering::Relaxed);
    }

    pub fn has_spectrogram(&self) -> bool {
        self.shared.full.load().is_some() || self.shared.tiles.current().is_some()
    }

    /// Whether a hi-res tile is currently installed.
    pub fn hi_res_ready(&self) -> bool {
        self.shared.tiles.current().is_some()
    }

    pub fn view(&self) -> Option<View> {
        self.shared.view()
    }

    /// Whether anything changed since the last `render`. Coalesced: any
    /// number of view/playhead/install events map to one pending repaint.
    pub fn take_repaint(&self) -> bool {
        self.shared.take_repaint()
    }

    /// The zoom curve shared with the host's slider.
    pub fn ladder(&self) -> &ZoomLadder {
        &self.ladder
    }

    /// Cancel pending work, stop the worker, free analyses and GPU handles.
    /// Also runs on drop.
    pub fn teardown(&self) {
        self.shared.bump_generation();
        self.shared.tiles.invalidate();
        let _ = self.tx.send(AnalysisCommand::Shutdown);
        if let Some(mut worker) = self.worker.lock().take() {
            worker.join();
        }
        self.shared.full.store(None);
        *self.shared.pcm.write() = None;
        #[cfg(feature = "gpu")]
        crate::gpu::release();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Hop for the coarse full-track analysis: a 20 ms step, floored at 256
/// samples for low sample rates.
pub(crate) fn full_track_hop(sample_rate: u32) -> usize {
    ((sample_rate as f64 * crate::FULL_HOP_WINDOW_SECS) as usize).max(crate::FULL_HOP_MIN)
}
