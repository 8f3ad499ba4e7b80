//! Analysis worker thread.
//!
//! Builder sessions run off the facade thread; commands arrive over a
//! channel and results install into [`EngineShared`] behind token guards, so
//! a session that was superseded mid-build discards itself silently.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::cancel::CancelToken;
use crate::dsp::spectrogram::{build_spectrogram, BuildParams, Spectrogram};
use crate::error::{EngineError, Result};
use crate::pcm::PcmBuffer;
use crate::shared::EngineShared;
use crate::tiles::TileRequest;

/// Commands sent from the facade to the analysis thread.
pub(crate) enum AnalysisCommand {
    /// Fresh coarse analysis of the whole track.
    FullTrack {
        pcm: Arc<PcmBuffer>,
        params: BuildParams,
        token: u64,
    },
    /// Hi-res rebuild of (a superset of) the visible window.
    Tile {
        pcm: Arc<PcmBuffer>,
        request: TileRequest,
        fft_size: usize,
        min_db: f32,
    },
    /// Shut down the thread.
    Shutdown,
}

pub(crate) struct AnalysisThread {
    handle: Option<thread::JoinHandle<()>>,
}

impl AnalysisThread {
    pub fn spawn(shared: Arc<EngineShared>, rx: Receiver<AnalysisCommand>) -> Self {
        let handle = thread::Builder::new()
            .name("wavescope-analysis".to_string())
            .spawn(move || analysis_loop(shared, rx))
            .expect("failed to spawn analysis thread");
        Self { handle: Some(handle) }
    }

    pub fn join(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn analysis_loop(shared: Arc<EngineShared>, rx: Receiver<AnalysisCommand>) {
    loop {
        let cmd = match rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => break, // Sender dropped → shutdown
        };

        match cmd {
            AnalysisCommand::FullTrack { pcm, params, token } => {
                handle_full_track(&shared, &pcm, &params, token);
            }
            AnalysisCommand::Tile { pcm, request, fft_size, min_db } => {
                handle_tile(&shared, &pcm, request, fft_size, min_db);
            }
            AnalysisCommand::Shutdown => break,
        }
    }
}

fn handle_full_track(shared: &EngineShared, pcm: &Arc<PcmBuffer>, params: &BuildParams, token: u64) {
    let cancel = CancelToken::new(token, shared.generation_counter());
    match run_build(shared, pcm, params, &cancel) {
        Ok(spec) => {
            if token == shared.generation() {
                shared.full.store(Some(Arc::new(spec)));
                shared.mark_repaint();
            }
        }
        Err(EngineError::Cancelled) => {}
        Err(e) => log::warn!("full-track analysis failed: {}", e),
    }
}

fn handle_tile(
    shared: &EngineShared,
    pcm: &Arc<PcmBuffer>,
    request: TileRequest,
    fft_size: usize,
    min_db: f32,
) {
    let mut next = Some(request);
    while let Some(req) = next.take() {
        let params = BuildParams {
            start_seconds: req.start,
            duration_seconds: req.duration,
            hop_size: req.hop_size,
            fft_size,
            min_db,
        };
        let cancel = CancelToken::new(req.token, shared.tiles.token_counter());
        let outcome = run_build(shared, pcm, &params, &cancel);
        shared.tiles.settle(req.token);
        match outcome {
            Ok(spec) => {
                if shared.tiles.install(spec, req.token) {
                    shared.mark_repaint();
                }
            }
            Err(EngineError::Cancelled) => {}
            Err(e) => log::warn!("hi-res tile build failed: {}", e),
        }

        // The view may have moved on while this session ran; service it now
        // instead of waiting for the next view event. Only while the loaded
        // file is still the one this command captured.
        let same_pcm = shared.pcm().is_some_and(|p| Arc::ptr_eq(&p, pcm));
        if !same_pcm {
            break;
        }
        if let Some(view) = shared.view() {
            next = shared.tiles.refresh_after_build(
                &view,
                pcm.sample_rate(),
                pcm.duration(),
                crate::engine::full_track_hop(pcm.sample_rate()),
                Instant::now(),
            );
        }
    }
}

/// Run one builder session, preferring the GPU backend when it is enabled,
/// wanted, not demoted, and the request fits its fixed transform size.
fn run_build(
    shared: &EngineShared,
    pcm: &PcmBuffer,
    params: &BuildParams,
    cancel: &CancelToken,
) -> Result<Spectrogram> {
    #[cfg(feature = "gpu")]
    {
        use std::sync::atomic::Ordering;

        if shared.prefer_gpu.load(Ordering::Relaxed)
            && !shared.gpu_demoted.load(Ordering::Relaxed)
            && params.fft_size == crate::gpu::GPU_FFT_SIZE
            && crate::gpu::fits_batch(pcm, params)
        {
            match crate::gpu::build_spectrogram_gpu(pcm, params, cancel) {
                Ok(spec) => return Ok(spec),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(EngineError::DeviceUnavailable(msg)) => {
                    shared.gpu_demoted.store(true, Ordering::Relaxed);
                    log::warn!("GPU backend demoted for this process: {}", msg);
                }
                Err(e) => log::warn!("GPU analysis failed, using CPU path: {}", e),
            }
        }
    }
    build_spectrogram(pcm, params, cancel)
}
