use std::f64::consts::PI;

use crate::error::{EngineError, Result};

/// Maximum supported transform length.
pub const MAX_FFT_SIZE: usize = 65_536;

/// In-place radix-2 Cooley–Tukey FFT for a fixed power-of-two length.
///
/// The bit-reversal permutation and the length `n/2` twiddle table
/// `(cos θ, sin θ)` with `θ = −2πk/n` are precomputed at construction;
/// `process` allocates nothing and is pure — identical inputs give
/// identical outputs.
pub struct Fft {
    n: usize,
    rev: Vec<u32>,
    tw_re: Vec<f32>,
    tw_im: Vec<f32>,
}

impl Fft {
    /// Fails with `InvalidSize` unless `n` is a power of two in `2..=65536`.
    pub fn new(n: usize) -> Result<Self> {
        if n < 2 || n > MAX_FFT_SIZE || !n.is_power_of_two() {
            return Err(EngineError::InvalidSize(n));
        }
        let bits = n.trailing_zeros();
        let rev = (0..n as u32).map(|i| i.reverse_bits() >> (32 - bits)).collect();

        let half = n / 2;
        let mut tw_re = Vec::with_capacity(half);
        let mut tw_im = Vec::with_capacity(half);
        for k in 0..half {
            let theta = -2.0 * PI * k as f64 / n as f64;
            tw_re.push(theta.cos() as f32);
            tw_im.push(theta.sin() as f32);
        }

        Ok(Self { n, rev, tw_re, tw_im })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// Transform `re`/`im` in place. Both slices must be exactly `len()` long.
    pub fn process(&self, re: &mut [f32], im: &mut [f32]) {
        debug_assert_eq!(re.len(), self.n);
        debug_assert_eq!(im.len(), self.n);

        for i in 0..self.n {
            let j = self.rev[i] as usize;
            if j > i {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= self.n {
            let half = len / 2;
            let step = self.n / len;
            for base in (0..self.n).step_by(len) {
                for k in 0..half {
                    let (wr, wi) = (self.tw_re[k * step], self.tw_im[k * step]);
                    let (i0, i1) = (base + k, base + k + half);
                    let tr = re[i1] * wr - im[i1] * wi;
                    let ti = re[i1] * wi + im[i1] * wr;
                    re[i1] = re[i0] - tr;
                    im[i1] = im[i0] - ti;
                    re[i0] += tr;
                    im[i0] += ti;
                }
            }
            len <<= 1;
        }
    }
}
