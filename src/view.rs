//! View window state and the zoom ladder.
//!
//! The visible window is a plain `(start, duration, samples_per_pixel)`
//! snapshot. Zoom runs on a bi-log slider curve: exponential from the
//! minimum factor up to 1 over the lower half of the slider, exponential
//! from 1 up to the maximum over the upper half, snapped to exactly 1 near
//! the middle. `samples_per_pixel` is always one of a fixed ladder derived
//! from that curve, so every zoom level is reproducible.

/// Slider curve parameters.
#[derive(Clone, Copy, Debug)]
pub struct ZoomConfig {
    pub steps: u32,
    pub min_factor: f64,
    pub max_factor: f64,
    /// Factors within this distance of 1 snap to exactly 1.
    pub snap_range: f64,
}

/// Snapshot of the visible window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    /// Left edge, seconds.
    pub start: f64,
    /// Visible span, seconds.
    pub duration: f64,
    pub samples_per_pixel: f64,
}

impl View {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// CSS pixels per second at this zoom.
    pub fn pixels_per_second(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 / self.samples_per_pixel
    }
}

/// Change detection threshold: `max(1e-4, duration·1e-3)` seconds, applied
/// to both edges so sub-pixel drift does not trigger repaints.
pub fn view_changed(last: &View, next: &View) -> bool {
    let eps = (next.duration * 1e-3).max(1e-4);
    (next.start - last.start).abs() > eps
        || (next.duration - last.duration).abs() > eps
        || next.samples_per_pixel != last.samples_per_pixel
}

/// Bi-log slider mapping plus the derived allowed-`samples_per_pixel` ladder.
pub struct ZoomLadder {
    cfg: ZoomConfig,
    base_spp: f64,
    /// Allowed samples-per-pixel values, ascending.
    levels: Vec<f64>,
}

impl ZoomLadder {
    pub fn new(cfg: ZoomConfig, base_spp: f64) -> Self {
        let mut ladder = Self { cfg, base_spp, levels: Vec::new() };
        let mut levels: Vec<f64> = (0..=cfg.steps)
            .map(|v| base_spp / ladder.factor_from_slider(v as f64))
            .collect();
        levels.sort_by(|a, b| a.partial_cmp(b).unwrap());
        levels.dedup_by(|a, b| (*a - *b).abs() <= *b * 1e-9);
        ladder.levels = levels;
        ladder
    }

    /// Build a ladder from externally supplied levels (e.g. the waveform
    /// library's own samples-per-pixel ladder) instead of deriving them from
    /// the curve. Falls back to the derived ladder when `levels` is empty.
    pub fn with_levels(cfg: ZoomConfig, base_spp: f64, levels: Vec<f64>) -> Self {
        let mut levels: Vec<f64> = levels.into_iter().filter(|&s| s > 0.0).collect();
        if levels.is_empty() {
            return Self::new(cfg, base_spp);
        }
        levels.sort_by(|a, b| a.partial_cmp(b).unwrap());
        levels.dedup_by(|a, b| (*a - *b).abs() <= *b * 1e-9);
        Self { cfg, base_spp, levels }
    }

    pub fn base_spp(&self) -> f64 {
        self.base_spp
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Slider position → zoom factor, with the snap-to-1 rule applied.
    pub fn factor_from_slider(&self, v: f64) -> f64 {
        let steps = self.cfg.steps as f64;
        let v = v.clamp(0.0, steps);
        let mid = steps / 2.0;
        let f = if v < mid {
            self.cfg.min_factor * (1.0 / self.cfg.min_factor).powf(v / mid)
        } else if v > mid {
            self.cfg.max_factor.powf((v - mid) / mid)
        } else {
            1.0
        };
        if (f - 1.0).abs() <= self.cfg.snap_range {
            1.0
        } else {
            f
        }
    }

    /// Zoom factor → slider position; inverse of the curve above.
    pub fn slider_from_factor(&self, factor: f64) -> f64 {
        let f = factor.clamp(self.cfg.min_factor, self.cfg.max_factor);
        let mid = self.cfg.steps as f64 / 2.0;
        if f < 1.0 {
            mid * (f / self.cfg.min_factor).ln() / (1.0 / self.cfg.min_factor).ln()
        } else if f > 1.0 {
            mid + mid * f.ln() / self.cfg.max_factor.ln()
        } else {
            mid
        }
    }

    /// Snap an arbitrary `samples_per_pixel` to the nearest ladder entry,
    /// nearest in log space to match the ladder's exponential spacing.
    pub fn snap_spp(&self, spp: f64) -> f64 {
        debug_assert!(!self.levels.is_empty());
        if spp <= 0.0 {
            return self.levels[0];
        }
        let mut best = self.levels[0];
        let mut best_dist = f64::INFINITY;
        for &level in &self.levels {
            let dist = (level.ln() - spp.ln()).abs();
            if dist < best_dist {
                best = level;
                best_dist = dist;
            }
        }
        best
    }
}

/// Clamp a requested window into `[0, total]` and snap its zoom.
pub fn resolve_view(
    ladder: &ZoomLadder,
    start: f64,
    duration: f64,
    samples_per_pixel: f64,
    total: f64,
) -> View {
    let spp = ladder.snap_spp(samples_per_pixel);
    let duration = duration.max(0.0).min(total);
    let start = start.clamp(0.0, (total - duration).max(0.0));
    View { start, duration, samples_per_pixel: spp }
}

/// Zoom keeping the time under the cursor anchored.
///
/// `cursor_ratio` is the cursor position as a fraction of the container
/// width; the new duration comes from the container width at the snapped
/// zoom level.
pub fn zoom_about(
    ladder: &ZoomLadder,
    view: &View,
    factor: f64,
    cursor_ratio: f64,
    width_css: f64,
    total: f64,
    sample_rate: u32,
) -> View {
    let r = cursor_ratio.clamp(0.0, 1.0);
    let target_time = view.start + r * view.duration;

    let snapped = if (factor - 1.0).abs() <= ladder.cfg.snap_range { 1.0 } else { factor };
    let spp = ladder.snap_spp(ladder.base_spp / snapped);
    let duration = (width_css * spp / sample_rate as f64).min(total);
    let start = (target_time - r * duration).clamp(0.0, (total - duration).max(0.0));
    View { start, duration, samples_per_pixel: spp }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> ZoomLadder {
        ZoomLadder::new(
            ZoomConfig { steps: 200, min_factor: 0.125, max_factor: 256.0, snap_range: 0.1 },
            2048.0,
        )
    }

    #[test]
    fn curve_endpoints_and_midpoint() {
        let l = ladder();
        assert_eq!(l.factor_from_slider(0.0), 0.125);
        assert_eq!(l.factor_from_slider(100.0), 1.0);
        assert_eq!(l.factor_from_slider(200.0), 256.0);
    }

    #[test]
    fn snap_law() {
        let l = ladder();
        for v in 0..=200 {
            let f = l.factor_from_slider(v as f64);
            assert!(f == 1.0 || (f - 1.0).abs() > 0.1, "slider {v} gave {f}");
        }
    }

    #[test]
    fn inverse_law_within_one_percent() {
        let l = ladder();
        let mut f = 0.125;
        while f <= 256.0 {
            let round_trip = l.factor_from_slider(l.slider_from_factor(f));
            if (f - 1.0f64).abs() <= 0.1 {
                assert_eq!(round_trip, 1.0);
            } else {
                assert!((round_trip - f).abs() / f < 0.01, "f {f} → {round_trip}");
            }
            f *= 1.07;
        }
    }

    #[test]
    fn ladder_contains_base_and_is_sorted() {
        let l = ladder();
        assert!(l.levels().iter().any(|&s| s == 2048.0));
        assert!(l.levels().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn near_unity_factor_lands_on_base_spp() {
        let l = ladder();
        // Zoom factor 0.97 snaps to 1, so spp snaps to baseSPP exactly.
        assert_eq!(l.snap_spp(2048.0 / 0.97), 2048.0);
    }

    #[test]
    fn resolve_clamps_into_track() {
        let l = ladder();
        let v = resolve_view(&l, 9.5, 2.0, 2048.0, 10.0);
        assert!(v.start >= 0.0);
        assert!(v.end() <= 10.0 + 1e-12);

        let v = resolve_view(&l, -3.0, 25.0, 2048.0, 10.0);
        assert_eq!(v.start, 0.0);
        assert_eq!(v.duration, 10.0);
    }

    #[test]
    fn zoom_keeps_cursor_time_fixed() {
        let l = ladder();
        // An 800 px container at base zoom: 800 · 2048 / 48000 ≈ 34.13 s.
        let width = 800.0;
        let duration = width * 2048.0 / 48_000.0;
        let view = View { start: 2.0, duration, samples_per_pixel: 2048.0 };
        let cursor = 0.25;
        let target = view.start + cursor * view.duration;

        let zoomed = zoom_about(&l, &view, 8.0, cursor, width, 60.0, 48_000);
        let under_cursor = zoomed.start + cursor * zoomed.duration;
        assert!((under_cursor - target).abs() < 1e-9);
        assert!(zoomed.duration < view.duration);
    }

    #[test]
    fn host_supplied_ladder_wins() {
        let cfg =
            ZoomConfig { steps: 200, min_factor: 0.125, max_factor: 256.0, snap_range: 0.1 };
        let l = ZoomLadder::with_levels(cfg, 2048.0, vec![512.0, 128.0, 2048.0, 128.0]);
        assert_eq!(l.levels(), &[128.0, 512.0, 2048.0]);
        assert_eq!(l.snap_spp(300.0), 512.0);

        // An empty host ladder falls back to the derived one.
        let fallback = ZoomLadder::with_levels(cfg, 2048.0, Vec::new());
        assert!(!fallback.levels().is_empty());
    }

    #[test]
    fn epsilon_suppresses_tiny_changes() {
        let a = View { start: 1.0, duration: 4.0, samples_per_pixel: 256.0 };
        let mut b = a;
        b.start += 1e-5;
        assert!(!view_changed(&a, &b));
        b.start += 0.01;
        assert!(view_changed(&a, &b));
    }
}
