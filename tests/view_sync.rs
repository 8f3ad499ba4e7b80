//! View, zoom-ladder and tile-policy scenarios.

use std::time::{Duration, Instant};

use wavescope::cancel::CancelToken;
use wavescope::tiles::TileManager;
use wavescope::view::{resolve_view, View, ZoomConfig, ZoomLadder};
use wavescope::{build_spectrogram, BuildParams, PcmBuffer};

fn ladder() -> ZoomLadder {
    ZoomLadder::new(
        ZoomConfig { steps: 200, min_factor: 0.125, max_factor: 256.0, snap_range: 0.1 },
        2048.0,
    )
}

fn manager() -> TileManager {
    TileManager::new(Duration::from_millis(120), 1.0 / 60.0)
}

#[test]
fn snap_law_over_the_whole_slider() {
    let l = ladder();
    for v in 0..=2000 {
        let f = l.factor_from_slider(v as f64 / 10.0);
        assert!(f == 1.0 || (f - 1.0).abs() > 0.1);
    }
}

#[test]
fn factor_slightly_off_unity_snaps_to_base_spp() {
    // Initial zoom factor 0.97 → snapped factor 1.0 → spp = baseSPP.
    let l = ladder();
    let v = resolve_view(&l, 0.0, 10.0, 2048.0 / 0.97, 10.0);
    assert_eq!(v.samples_per_pixel, 2048.0);
}

#[test]
fn set_view_always_stays_inside_the_track() {
    let l = ladder();
    for (start, duration) in [(-5.0, 3.0), (8.0, 5.0), (100.0, 1.0), (0.0, 100.0)] {
        let v = resolve_view(&l, start, duration, 512.0, 10.0);
        assert!(v.start >= 0.0);
        assert!(v.end() <= 10.0 + 1e-9, "{start},{duration} → {:?}", v);
    }
}

#[test]
fn exactly_one_request_per_settled_view() {
    // Zoom factor 8 → spp = 256 → warranted against the 960-sample full hop.
    let m = manager();
    let view = View { start: 4.0, duration: 1.0, samples_per_pixel: 256.0 };
    let now = Instant::now();

    let first = m.maybe_request(&view, 48_000, 40.0, 960, now);
    assert!(first.is_some());

    // Unchanged view: no second request, neither while pending nor within
    // the debounce window after the build settles.
    assert!(m.maybe_request(&view, 48_000, 40.0, 960, now + Duration::from_millis(10)).is_none());
    m.settle(first.unwrap().token);
    assert!(m.maybe_request(&view, 48_000, 40.0, 960, now + Duration::from_millis(60)).is_none());
}

#[test]
fn superseding_view_wins_the_install() {
    let m = manager();
    let pcm = PcmBuffer::from_mono(48_000, vec![0.0; 48_000 * 40]).unwrap();
    let view_a = View { start: 4.0, duration: 1.0, samples_per_pixel: 256.0 };
    let view_b = View { start: 30.0, duration: 1.0, samples_per_pixel: 256.0 };
    let now = Instant::now();

    let req_a = m.maybe_request(&view_a, 48_000, 40.0, 960, now).unwrap();

    // The view moves to B 50 ms later, while A is still building.
    let b_time = now + Duration::from_millis(50);
    assert!(m.maybe_request(&view_b, 48_000, 40.0, 960, b_time).is_none());

    // A's session finishes, but its token went stale the moment B arrived.
    let build = |req: &wavescope::tiles::TileRequest| {
        let params = BuildParams {
            start_seconds: req.start,
            duration_seconds: req.duration,
            hop_size: req.hop_size,
            fft_size: 1024,
            min_db: -85.0,
        };
        build_spectrogram(&pcm, &params, &CancelToken::detached()).unwrap()
    };
    let spec_a = build(&req_a);
    m.settle(req_a.token);
    assert!(!m.install(spec_a, req_a.token), "stale tile must not install");

    // The replacement request goes out as soon as A settles and must carry
    // B's expanded window.
    let req_b = m
        .refresh_after_build(&view_b, 48_000, 40.0, 960, b_time + Duration::from_millis(5))
        .expect("replacement for view B");
    assert!((req_b.start - 29.75).abs() < 1e-9);
    assert!((req_b.duration - 1.5).abs() < 1e-9);
    assert!(req_b.token > req_a.token);

    let spec_b = build(&req_b);
    m.settle(req_b.token);
    assert!(m.install(spec_b, req_b.token));

    let installed = m.current().unwrap();
    assert_eq!(installed.token, req_b.token);
    assert!((installed.spectrogram.slice_start() - 29.75).abs() < 1e-3);
    assert!(m.active_for(&view_b).is_some());
    assert!(m.active_for(&view_a).is_none());
}

#[test]
fn cached_tile_is_reused_within_tolerance() {
    let m = manager();
    let pcm = PcmBuffer::from_mono(48_000, vec![0.0; 48_000 * 10]).unwrap();
    let view = View { start: 4.0, duration: 1.0, samples_per_pixel: 256.0 };
    let now = Instant::now();

    let req = m.maybe_request(&view, 48_000, 10.0, 960, now).unwrap();
    let params = BuildParams {
        start_seconds: req.start,
        duration_seconds: req.duration,
        hop_size: req.hop_size,
        fft_size: 1024,
        min_db: -85.0,
    };
    let spec = build_spectrogram(&pcm, &params, &CancelToken::detached()).unwrap();
    m.settle(req.token);
    assert!(m.install(spec, req.token));

    // A sub-frame pan inside the expanded window: the tile still serves it.
    let panned = View { start: 4.01, ..view };
    assert!(m.maybe_request(&panned, 48_000, 10.0, 960, now + Duration::from_secs(1)).is_none());
    assert!(m.active_for(&panned).is_some());

    // A pan past the expansion margin needs a rebuild.
    let far = View { start: 7.0, ..view };
    assert!(m.maybe_request(&far, 48_000, 10.0, 960, now + Duration::from_secs(2)).is_some());
}

#[test]
fn tile_tokens_only_move_forward() {
    let m = manager();
    let mut last = 0;
    for _ in 0..5 {
        let token = m.next_token();
        assert!(token > last);
        last = token;
    }
}
