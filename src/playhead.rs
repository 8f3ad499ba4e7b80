//! Playback-position synchronization with the view.
//!
//! The host player owns the clock; it reports `(current_time, playing)` once
//! per display frame (or on a ~16 ms timer where no frame callback exists).
//! Each tick reconciles the view against the last one seen and decides
//! whether a repaint is due: always while playing, otherwise only when the
//! view actually moved beyond the change epsilon.

use crate::view::{view_changed, View};

/// Playback position as reported by the external player.
#[derive(Clone, Copy, Debug, Default)]
pub struct Playhead {
    pub time: f64,
    pub playing: bool,
}

#[derive(Debug, Default)]
pub struct PlayheadSync {
    playhead: Playhead,
    last_view: Option<View>,
}

impl PlayheadSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, time: f64, playing: bool) {
        self.playhead = Playhead { time, playing };
    }

    pub fn playhead(&self) -> Playhead {
        self.playhead
    }

    /// Forget playback and view history (new file loaded).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance one display frame; returns whether a repaint is due.
    pub fn tick(&mut self, view: &View) -> bool {
        let moved = match &self.last_view {
            Some(last) => view_changed(last, view),
            None => true,
        };
        if moved {
            self.last_view = Some(*view);
        }
        moved || self.playhead.playing
    }

    /// Playhead x in CSS pixels, clamped to the drawn portion of the view;
    /// `None` while no spectrogram is loaded.
    pub fn position_css(
        &self,
        view: &View,
        sample_rate: u32,
        width_css: f64,
        has_spectrogram: bool,
    ) -> Option<f64> {
        if !has_spectrogram {
            return None;
        }
        let pps = view.pixels_per_second(sample_rate);
        let max_x = width_css.min(view.duration * pps);
        Some(((self.playhead.time - view.start) * pps).clamp(0.0, max_x))
    }
}
