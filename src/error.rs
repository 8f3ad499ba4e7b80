use std::fmt;

/// Top-level error type for the wavescope public API.
#[derive(Debug)]
pub enum EngineError {
    /// FFT length is not a power of two in the supported range.
    InvalidSize(usize),
    /// Requested segment is shorter than one analysis frame.
    InsufficientLength { segment: usize, fft_size: usize },
    /// GPU device absent or initialization failed.
    DeviceUnavailable(String),
    /// The session was superseded by a newer request.
    Cancelled,
    /// Internal invariant violation (e.g. non-finite samples).
    Internal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidSize(n) => write!(f, "invalid FFT size: {}", n),
            EngineError::InsufficientLength { segment, fft_size } => write!(
                f,
                "segment of {} samples is shorter than one frame of {}",
                segment, fft_size
            ),
            EngineError::DeviceUnavailable(msg) => write!(f, "GPU unavailable: {}", msg),
            EngineError::Cancelled => write!(f, "analysis cancelled"),
            EngineError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Convenience alias so callers can write `Result<T>` instead of `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;
