//! Optional wgpu compute backend for the fixed 1024-point analysis.
//!
//! Same contract as the CPU builder: framing and windowing run on the CPU
//! (shared code), the bit-reversed frames upload once, the radix-2 butterfly
//! kernel runs one dispatch per stage over every frame of the request, a
//! magnitude kernel collapses the result, and a single staging read-back
//! returns it. Normalization then reuses the CPU path, so the two backends
//! agree to floating-point rounding.
//!
//! The device/queue pair is process-wide: created by the first build that
//! needs it, dropped by [`release`] (called from `Engine::teardown`). A
//! failed initialization surfaces as `DeviceUnavailable`, which demotes this
//! backend for the rest of the process.

use std::sync::mpsc;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use crate::cancel::CancelToken;
use crate::dsp::spectrogram::{normalize_magnitudes, BuildParams, SessionGeometry, Spectrogram};
use crate::dsp::window::FrameWindow;
use crate::error::{EngineError, Result};
use crate::pcm::PcmBuffer;

/// The only transform length this backend serves.
pub const GPU_FFT_SIZE: usize = 1024;

/// Requests above this frame count run on the CPU instead, bounding the
/// complex workspace at ~64 MiB.
const MAX_GPU_FRAMES: usize = 8192;
const WORKGROUP_SIZE: u32 = 256;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct StageParams {
    n: u32,
    len: u32,
    half: u32,
    frames: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MagnitudeParams {
    n: u32,
    bins: u32,
    frames: u32,
    pad: u32,
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    butterfly: wgpu::ComputePipeline,
    magnitude: wgpu::ComputePipeline,
    twiddles: wgpu::Buffer,
}

static CONTEXT: Mutex<Option<Arc<GpuContext>>> = Mutex::new(None);

fn acquire() -> Result<Arc<GpuContext>> {
    let mut slot = CONTEXT.lock();
    if let Some(ctx) = slot.as_ref() {
        return Ok(Arc::clone(ctx));
    }
    let ctx = Arc::new(GpuContext::init()?);
    *slot = Some(Arc::clone(&ctx));
    Ok(ctx)
}

/// Drop the process-wide device and queue.
pub fn release() {
    *CONTEXT.lock() = None;
}

/// Whether a request fits one batched dispatch sequence.
pub(crate) fn fits_batch(pcm: &PcmBuffer, params: &BuildParams) -> bool {
    SessionGeometry::resolve(pcm, params)
        .map(|g| g.frames <= MAX_GPU_FRAMES)
        .unwrap_or(false)
}

impl GpuContext {
    fn init() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("wavescope"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Default::default()
        }))
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

        let butterfly_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fft butterfly"),
            source: wgpu::ShaderSource::Wgsl(include_str!("butterfly.wgsl").into()),
        });
        let magnitude_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("magnitude"),
            source: wgpu::ShaderSource::Wgsl(include_str!("magnitude.wgsl").into()),
        });

        let butterfly = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("fft-butterfly"),
            layout: None,
            module: &butterfly_shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let magnitude = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("magnitude"),
            layout: None,
            module: &magnitude_shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        // Same table as the CPU kernel: e^(−2πik/n) for k < n/2.
        let twiddle_data: Vec<[f32; 2]> = (0..GPU_FFT_SIZE / 2)
            .map(|k| {
                let theta = -2.0 * std::f64::consts::PI * k as f64 / GPU_FFT_SIZE as f64;
                [theta.cos() as f32, theta.sin() as f32]
            })
            .collect();
        let twiddles = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("twiddles"),
            contents: bytemuck::cast_slice(&twiddle_data),
            usage: wgpu::BufferUsages::STORAGE,
        });

        Ok(Self { device, queue, butterfly, magnitude, twiddles })
    }
}

/// GPU variant of `build_spectrogram` for `fft_size = 1024`.
pub fn build_spectrogram_gpu(
    pcm: &PcmBuffer,
    params: &BuildParams,
    cancel: &CancelToken,
) -> Result<Spectrogram> {
    if params.fft_size != GPU_FFT_SIZE {
        return Err(EngineError::InvalidSize(params.fft_size));
    }
    let geometry = SessionGeometry::resolve(pcm, params)?;
    if geometry.frames > MAX_GPU_FRAMES {
        return Err(EngineError::Internal(format!(
            "{} frames exceed the GPU batch cap",
            geometry.frames
        )));
    }
    let ctx = acquire()?;
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let n = GPU_FFT_SIZE;
    // Window + mix on the CPU (shared with the CPU path); bit-reverse
    // permute while packing to complex so the device only runs butterflies.
    let window = FrameWindow::new(n);
    let bits = n.trailing_zeros();
    let mut frame = vec![0.0f32; n];
    let mut upload = vec![[0.0f32; 2]; geometry.frames * n];
    for f in 0..geometry.frames {
        window.fill(pcm, geometry.start_sample + f * params.hop_size, &mut frame);
        let row = &mut upload[f * n..(f + 1) * n];
        for (i, &sample) in frame.iter().enumerate() {
            let j = ((i as u32).reverse_bits() >> (32 - bits)) as usize;
            row[j] = [sample, 0.0];
        }
    }

    let data_buf = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("fft frames"),
        contents: bytemuck::cast_slice(&upload),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let mag_bytes = (geometry.frames * geometry.bins * std::mem::size_of::<f32>()) as u64;
    let mag_buf = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("magnitudes"),
        size: mag_bytes,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: mag_bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let stage_params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("stage params"),
        size: std::mem::size_of::<StageParams>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mag_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("magnitude params"),
        contents: bytemuck::bytes_of(&MagnitudeParams {
            n: n as u32,
            bins: geometry.bins as u32,
            frames: geometry.frames as u32,
            pad: 0,
        }),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let butterfly_bg = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("butterfly"),
        layout: &ctx.butterfly.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: data_buf.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: ctx.twiddles.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 2, resource: stage_params.as_entire_binding() },
        ],
    });
    let magnitude_bg = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("magnitude"),
        layout: &ctx.magnitude.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: data_buf.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: mag_buf.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 2, resource: mag_params.as_entire_binding() },
        ],
    });

    // One dispatch per stage; the queue serializes them.
    let pairs = (geometry.frames * n / 2) as u32;
    let mut len = 2u32;
    while len <= n as u32 {
        let p = StageParams { n: n as u32, len, half: len / 2, frames: geometry.frames as u32 };
        ctx.queue.write_buffer(&stage_params, 0, bytemuck::bytes_of(&p));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&ctx.butterfly);
            pass.set_bind_group(0, &butterfly_bg, &[]);
            pass.dispatch_workgroups(pairs.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        ctx.queue.submit(Some(encoder.finish()));
        len <<= 1;
    }

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
        pass.set_pipeline(&ctx.magnitude);
        pass.set_bind_group(0, &magnitude_bg, &[]);
        let cells = (geometry.frames * geometry.bins) as u32;
        pass.dispatch_workgroups(cells.div_ceil(WORKGROUP_SIZE), 1, 1);
    }
    encoder.copy_buffer_to_buffer(&mag_buf, 0, &staging, 0, mag_bytes);
    ctx.queue.submit(Some(encoder.finish()));

    // The only suspension point: waiting for the read-back mapping.
    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| EngineError::Internal(format!("device poll failed: {e:?}")))?;
    rx.recv()
        .map_err(|_| EngineError::Internal("read-back channel closed".into()))?
        .map_err(|e| EngineError::Internal(format!("read-back mapping failed: {e:?}")))?;

    if cancel.is_cancelled() {
        staging.unmap();
        return Err(EngineError::Cancelled);
    }

    let mut data: Vec<f32> = {
        let view = slice.get_mapped_range();
        bytemuck::cast_slice(&view).to_vec()
    };
    staging.unmap();

    if data.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::Internal("non-finite magnitude in analysis".into()));
    }
    let peak = data.iter().fold(0.0f32, |acc, &v| acc.max(v));
    normalize_magnitudes(&mut data, peak, params.min_db, cancel)?;
    Ok(Spectrogram::from_parts(data, &geometry, params, pcm))
}
