//! Facade-level scenarios: load → analyze → render → playhead, with the
//! worker thread doing the building.

use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use wavescope::{Engine, EngineConfig, EngineError, PcmBuffer};

fn sine(sample_rate: u32, freq: f64, seconds: f64) -> PcmBuffer {
    let n = (sample_rate as f64 * seconds) as usize;
    let samples: Vec<f32> = (0..n)
        .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32)
        .collect();
    PcmBuffer::from_mono(sample_rate, samples).unwrap()
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn load_analyzes_and_renders() {
    let engine = Engine::new(EngineConfig::default());
    engine.load(sine(48_000, 1000.0, 3.0)).unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || engine.has_spectrogram()),
        "full-track analysis did not finish"
    );
    assert!(engine.take_repaint());

    // One row per bin so the tone's bin is sampled exactly.
    let (w, h) = (64u32, 512u32);
    let mut buf = vec![0u8; (w * h * 4) as usize];
    engine.render(&mut buf, w, h, 1.0);

    // The full view covers the whole target: every pixel is painted opaque,
    // and a pure tone leaves both lit and near-floor pixels.
    assert!((0..w * h).all(|i| buf[(i * 4 + 3) as usize] == 255));
    assert!(buf.chunks(4).any(|px| px[0] > 100));
}

#[test]
fn render_before_load_clears() {
    let engine = Engine::new(EngineConfig::default());
    let mut buf = vec![9u8; 16 * 8 * 4];
    engine.render(&mut buf, 16, 8, 1.0);
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn short_clip_load_fails_and_leaves_nothing_active() {
    let engine = Engine::new(EngineConfig::default());
    engine.load(sine(48_000, 500.0, 2.0)).unwrap();
    assert!(wait_until(Duration::from_secs(5), || engine.has_spectrogram()));

    let err = engine.load(PcmBuffer::from_mono(48_000, vec![0.0; 512]).unwrap());
    assert!(matches!(err, Err(EngineError::InsufficientLength { .. })));

    // The failed load still invalidated the previous file.
    assert!(!engine.has_spectrogram());
    let mut buf = vec![7u8; 8 * 8 * 4];
    engine.render(&mut buf, 8, 8, 1.0);
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn zoomed_view_gets_a_hi_res_tile() {
    let engine = Engine::new(EngineConfig::default());
    engine.load(sine(48_000, 1000.0, 4.0)).unwrap();
    assert!(wait_until(Duration::from_secs(5), || engine.has_spectrogram()));

    // Zoom factor 8 (spp 256): one pixel now spans far less than one
    // full-track frame, so a tile must be scheduled and installed. The view
    // is re-asserted each frame, the way a host syncs it while painting.
    let installed = wait_until(Duration::from_secs(5), || {
        engine.set_view(1.0, 0.5, 256.0);
        engine.hi_res_ready()
    });
    assert!(installed, "hi-res tile never installed");

    // The requested zoom snaps to the nearest ladder entry, within one
    // slider step of the asked-for 256 samples per pixel.
    let view = engine.view().unwrap();
    let spp = view.samples_per_pixel;
    assert!((spp / 256.0).ln().abs() < 0.06, "snapped spp {spp}");

    let (w, h) = (64u32, 16u32);
    let mut buf = vec![0u8; (w * h * 4) as usize];
    engine.render(&mut buf, w, h, 1.0);
    assert!(buf.chunks(4).any(|px| px[3] == 255));
}

#[test]
fn superseded_view_still_converges() {
    let engine = Engine::new(EngineConfig::default());
    engine.load(sine(48_000, 800.0, 40.0)).unwrap();
    assert!(wait_until(Duration::from_secs(10), || engine.has_spectrogram()));

    // Two view changes in quick succession; the engine must end up serving
    // the later one.
    engine.set_view(4.0, 1.0, 256.0);
    engine.set_view(30.0, 1.0, 256.0);

    let converged = wait_until(Duration::from_secs(5), || {
        engine.set_view(30.0, 1.0, 256.0);
        engine.hi_res_ready()
    });
    assert!(converged);
    assert!((engine.view().unwrap().start - 30.0).abs() < 1e-9);
}

#[test]
fn playhead_tracks_and_repaints() {
    let engine = Engine::new(EngineConfig::default());
    engine.load(sine(48_000, 1000.0, 2.0)).unwrap();
    assert!(wait_until(Duration::from_secs(5), || engine.has_spectrogram()));

    let mut buf = vec![0u8; 32 * 16 * 4];
    engine.render(&mut buf, 32, 16, 1.0);

    engine.set_playhead(0.5, true);
    assert!(engine.take_repaint(), "playing tick must request a repaint");

    let x = engine.playhead_position(800.0).expect("playhead visible");
    let view = engine.view().unwrap();
    let expected = (0.5 - view.start) * view.pixels_per_second(48_000);
    assert!((x - expected.clamp(0.0, 800.0)).abs() < 1e-6);
}

#[test]
fn playhead_hidden_without_audio() {
    let engine = Engine::new(EngineConfig::default());
    engine.set_playhead(1.0, true);
    assert_eq!(engine.playhead_position(800.0), None);
}

#[test]
fn teardown_is_clean_and_final() {
    let engine = Engine::new(EngineConfig::default());
    engine.load(sine(48_000, 440.0, 2.0)).unwrap();
    engine.teardown();
    assert!(!engine.has_spectrogram());
    // Dropping after an explicit teardown must not hang or double-join.
    drop(engine);
}
