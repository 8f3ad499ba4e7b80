//! Hi-res tile policy.
//!
//! Watches view changes and decides when the coarse full-track spectrogram
//! is no longer sharp enough for the current zoom, then schedules one
//! bounded rebuild of the visible window at a finer hop. Requests are
//! debounced, single-in-flight, expanded past the view edges so small pans
//! reuse the tile, and token-guarded so only the newest result ever
//! installs. Build failures are logged by the worker and never surfaced;
//! the last good tile (or the full-track image) stays active.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::dsp::spectrogram::Spectrogram;
use crate::view::View;

/// Hi-res is warranted once one CSS pixel covers less than this fraction of
/// a full-track frame.
const PIXEL_PER_FRAME_THRESHOLD: f64 = 0.8;
/// Bounds for the chosen tile hop, samples.
const TILE_HOP_MIN: usize = 32;
const TILE_HOP_MAX: usize = 4096;
/// Fraction of the view duration added on each side of a request.
const EXPAND_RATIO: f64 = 0.25;

/// One scheduled hi-res build.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileRequest {
    pub start: f64,
    pub duration: f64,
    pub hop_size: usize,
    pub token: u64,
}

/// An installed hi-res spectrogram and the token it was built under.
pub struct HiResTile {
    pub spectrogram: Arc<Spectrogram>,
    pub token: u64,
}

pub struct TileManager {
    latest_token: Arc<AtomicU64>,
    tile: ArcSwapOption<HiResTile>,
    pending: Mutex<Option<TileRequest>>,
    last_request: Mutex<Option<Instant>>,
    debounce: Duration,
    reuse_tolerance: f64,
}

impl TileManager {
    pub fn new(debounce: Duration, reuse_tolerance: f64) -> Self {
        Self {
            latest_token: Arc::new(AtomicU64::new(0)),
            tile: ArcSwapOption::const_empty(),
            pending: Mutex::new(None),
            last_request: Mutex::new(None),
            debounce,
            reuse_tolerance,
        }
    }

    /// The shared monotonic counter; builder sessions compare against it.
    pub fn token_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.latest_token)
    }

    pub fn latest_token(&self) -> u64 {
        self.latest_token.load(Ordering::Relaxed)
    }

    /// Draw a fresh token, cancelling every older session.
    pub fn next_token(&self) -> u64 {
        self.latest_token.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drop all tile state and cancel in-flight work (file reload, teardown).
    pub fn invalidate(&self) {
        self.next_token();
        self.tile.store(None);
        *self.pending.lock() = None;
        *self.last_request.lock() = None;
    }

    pub fn current(&self) -> Option<Arc<HiResTile>> {
        self.tile.load_full()
    }

    /// The hi-res spectrogram to render, if one covers the view window.
    pub fn active_for(&self, view: &View) -> Option<Arc<Spectrogram>> {
        let tile = self.tile.load_full()?;
        tile.spectrogram
            .covers(view.start, view.end(), self.reuse_tolerance)
            .then(|| Arc::clone(&tile.spectrogram))
    }

    /// Evaluate the tile policy for a view change. Returns the request to
    /// enqueue, or `None` when the current state already serves this view,
    /// the debounce window is open, or a matching build is in flight.
    ///
    /// A view that has moved away from the in-flight request's window bumps
    /// the token immediately — the stale session discards itself — and the
    /// replacement is issued from [`refresh_after_build`](Self::refresh_after_build)
    /// once that session settles.
    pub fn maybe_request(
        &self,
        view: &View,
        sample_rate: u32,
        total_duration: f64,
        full_hop: usize,
        now: Instant,
    ) -> Option<TileRequest> {
        let hop_target = self.wanted_hop(view, sample_rate, full_hop)?;
        if self.is_served(view, hop_target) {
            return None;
        }

        {
            let pending = self.pending.lock();
            if let Some(p) = pending.as_ref() {
                if self.request_serves(p, view, hop_target) {
                    return None;
                }
                // In-flight build is for a window the user has left; cancel
                // it now, reissue when it settles.
                self.next_token();
                return None;
            }
        }

        if let Some(last) = *self.last_request.lock() {
            if now.duration_since(last) < self.debounce {
                return None;
            }
        }

        Some(self.issue(view, hop_target, total_duration, now))
    }

    /// Re-evaluate after a build settled. The time debounce does not apply
    /// here; only one build is ever in flight.
    pub fn refresh_after_build(
        &self,
        view: &View,
        sample_rate: u32,
        total_duration: f64,
        full_hop: usize,
        now: Instant,
    ) -> Option<TileRequest> {
        let hop_target = self.wanted_hop(view, sample_rate, full_hop)?;
        if self.is_served(view, hop_target) || self.pending.lock().is_some() {
            return None;
        }
        Some(self.issue(view, hop_target, total_duration, now))
    }

    /// Install a finished tile; refused (and dropped) when its token is no
    /// longer the latest. Returns whether it was installed.
    pub fn install(&self, spectrogram: Spectrogram, token: u64) -> bool {
        if token != self.latest_token() {
            return false;
        }
        self.tile.store(Some(Arc::new(HiResTile {
            spectrogram: Arc::new(spectrogram),
            token,
        })));
        true
    }

    /// Mark the session for `token` as finished, clearing the in-flight slot.
    pub fn settle(&self, token: u64) {
        let mut pending = self.pending.lock();
        if pending.map(|p| p.token) == Some(token) {
            *pending = None;
        }
    }

    fn wanted_hop(&self, view: &View, sample_rate: u32, full_hop: usize) -> Option<usize> {
        let pps = view.pixels_per_second(sample_rate);
        if !pps.is_finite() || pps <= 0.0 || view.duration <= 0.0 {
            return None;
        }
        let full_frame_secs = full_hop as f64 / sample_rate as f64;
        if full_frame_secs <= PIXEL_PER_FRAME_THRESHOLD / pps {
            return None;
        }
        Some(floor_pow2(view.samples_per_pixel).clamp(TILE_HOP_MIN, TILE_HOP_MAX))
    }

    fn is_served(&self, view: &View, hop_target: usize) -> bool {
        match self.tile.load_full() {
            Some(tile) => {
                tile.spectrogram.hop_size() == hop_target
                    && tile
                        .spectrogram
                        .covers(view.start, view.end(), self.reuse_tolerance)
            }
            None => false,
        }
    }

    fn request_serves(&self, request: &TileRequest, view: &View, hop_target: usize) -> bool {
        request.hop_size == hop_target
            && request.start <= view.start + self.reuse_tolerance
            && request.start + request.duration >= view.end() - self.reuse_tolerance
    }

    fn issue(
        &self,
        view: &View,
        hop_target: usize,
        total_duration: f64,
        now: Instant,
    ) -> TileRequest {
        let duration = (view.duration * (1.0 + 2.0 * EXPAND_RATIO)).min(total_duration);
        let start = (view.start - EXPAND_RATIO * view.duration)
            .clamp(0.0, (total_duration - duration).max(0.0));

        let request = TileRequest {
            start,
            duration,
            hop_size: hop_target,
            token: self.next_token(),
        };
        *self.pending.lock() = Some(request);
        *self.last_request.lock() = Some(now);
        request
    }
}

/// Largest power of two ≤ `x` (at least 1).
fn floor_pow2(x: f64) -> usize {
    let x = x.max(1.0) as usize;
    let mut p = 1usize;
    while p * 2 <= x {
        p *= 2;
    }
    p
}
