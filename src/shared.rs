//! State shared between the facade and the analysis worker.
//!
//! Readers (renderer, playhead) take snapshots: the spectrogram slots are
//! `ArcSwapOption` so a repaint keeps whatever instance it loaded even if a
//! newer one installs mid-paint. The builder is the only writer of the
//! full-track slot; the tile manager the only writer of the hi-res slot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;

use crate::dsp::spectrogram::Spectrogram;
use crate::pcm::PcmBuffer;
use crate::tiles::TileManager;
use crate::view::View;

pub(crate) struct EngineShared {
    /// Currently loaded audio; replaced wholesale on `load`.
    pub pcm: RwLock<Option<Arc<PcmBuffer>>>,
    /// Full-track coarse spectrogram.
    pub full: ArcSwapOption<Spectrogram>,
    /// Bumped on every load/teardown; full-track sessions are bound to it.
    /// Tile requests cancel each other through the tile manager's counter
    /// without killing an in-flight full-track build.
    load_generation: Arc<AtomicU64>,
    pub tiles: TileManager,
    /// Current view window; `None` until a file is loaded.
    pub view: RwLock<Option<View>>,
    pub prefer_gpu: AtomicBool,
    /// Set once a GPU session fails with `DeviceUnavailable`; never cleared.
    pub gpu_demoted: AtomicBool,
    /// Coalesced repaint flag; set by installs and view/playhead changes,
    /// cleared by `render`.
    repaint: AtomicBool,
}

impl EngineShared {
    pub fn new(tiles: TileManager) -> Self {
        Self {
            pcm: RwLock::new(None),
            full: ArcSwapOption::const_empty(),
            load_generation: Arc::new(AtomicU64::new(0)),
            tiles,
            view: RwLock::new(None),
            prefer_gpu: AtomicBool::new(false),
            gpu_demoted: AtomicBool::new(false),
            repaint: AtomicBool::new(false),
        }
    }

    pub fn pcm(&self) -> Option<Arc<PcmBuffer>> {
        self.pcm.read().clone()
    }

    pub fn generation_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.load_generation)
    }

    pub fn generation(&self) -> u64 {
        self.load_generation.load(Ordering::Relaxed)
    }

    /// Start a new load generation, cancelling any full-track session.
    pub fn bump_generation(&self) -> u64 {
        self.load_generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn view(&self) -> Option<View> {
        *self.view.read()
    }

    pub fn mark_repaint(&self) {
        self.repaint.store(true, Ordering::Release);
    }

    pub fn take_repaint(&self) -> bool {
        self.repaint.swap(false, Ordering::AcqRel)
    }
}
