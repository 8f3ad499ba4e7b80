//! Spectrogram rasterization into an RGBA pixel buffer.
//!
//! Nearest-neighbor on both axes, low frequencies at the bottom, one LUT
//! lookup per pixel. The renderer is pure given `(spectrogram, view,
//! dimensions)` and never fails: a missing spectrogram clears the target,
//! and a mis-sized target is logged and left untouched.

use crate::colormap::ColorLut;
use crate::dsp::spectrogram::Spectrogram;
use crate::view::View;

/// Paint `spectrogram` as seen through `view` into `buf` (RGBA, row-major,
/// `w_dev × h_dev` device pixels at the given device pixel ratio).
///
/// Columns past the end of the track (beyond `view_duration` at this zoom)
/// stay cleared; painted pixels carry full alpha.
pub fn render_into(
    spectrogram: Option<&Spectrogram>,
    view: &View,
    lut: &ColorLut,
    buf: &mut [u8],
    w_dev: u32,
    h_dev: u32,
    dpr: f64,
) {
    let needed = w_dev as usize * h_dev as usize * 4;
    if buf.len() != needed {
        log::warn!(
            "render target is {} bytes, expected {} for {}x{}",
            buf.len(),
            needed,
            w_dev,
            h_dev
        );
        return;
    }
    buf.fill(0);

    let Some(spec) = spectrogram else { return };
    if w_dev == 0 || h_dev == 0 || spec.frames() == 0 || spec.bins() == 0 {
        return;
    }

    let pps_dev = view.pixels_per_second(spec.sample_rate()) * dpr;
    if !pps_dev.is_finite() || pps_dev <= 0.0 {
        return;
    }

    let draw_width = ((view.duration * pps_dev).round().max(0.0) as u32).min(w_dev);
    let time_per_frame = spec.time_per_frame();
    let last_frame = spec.frames() - 1;
    let last_bin = spec.bins() - 1;
    let y_denom = (h_dev - 1).max(1) as f64;

    for x in 0..draw_width {
        let t = view.start + x as f64 / pps_dev;
        let frame = (((t - spec.slice_start()) / time_per_frame).round().max(0.0) as usize)
            .min(last_frame);

        for y in 0..h_dev {
            let row_bin = ((y as f64 * last_bin as f64 / y_denom).round() as usize).min(last_bin);
            let bin = last_bin - row_bin;
            let [r, g, b] = lut.rgb(spec.at(frame, bin));

            let idx = (y as usize * w_dev as usize + x as usize) * 4;
            buf[idx] = r;
            buf[idx + 1] = g;
            buf[idx + 2] = b;
            buf[idx + 3] = 255;
        }
    }
}
