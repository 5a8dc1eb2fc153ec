use num_complex::Complex;
use num_traits::Zero;
use rayon::prelude::*;

use crate::fourier_analysis::Direction;
use crate::numeric::{check_mix_args, real, NumericBackend, Real, ScalarBackend};
use crate::{DigSigProcErr, Result};

pub const DEFAULT_CHUNK_LEN:usize = 512;

/// Splits every element-wise operation into chunks spread over the rayon thread pool.  Within a chunk the
/// mixing phasor is advanced by complex multiplication in the sample precision instead of being evaluated
/// per sample, and it is re-seeded exactly at every chunk boundary.
pub struct VectorizedBackend<T: Real> {
	chunk_len: usize,
	inner: ScalarBackend<T>,
}

impl<T: Real> Default for VectorizedBackend<T> {
	fn default() -> Self { Self::new() }
}

impl<T: Real> VectorizedBackend<T> {

	pub fn new() -> Self { Self{ chunk_len: DEFAULT_CHUNK_LEN, inner: ScalarBackend::new() } }

	pub fn with_chunk_len(chunk_len:usize) -> Result<Self> {
		if chunk_len == 0 {
			return Err(DigSigProcErr::Configuration("vectorized chunk length must be nonzero".into()));
		}
		Ok(Self{ chunk_len, inner: ScalarBackend::new() })
	}

}

impl<T: Real> NumericBackend<T> for VectorizedBackend<T> {

	fn name(&self) -> &'static str { "vectorized" }

	fn tolerance(&self) -> f64 { 1.0e-3 }

	fn mix(&self, samples:&mut [Complex<T>], sampling_rate:f64, frequency:f64, phase:f64) -> Result<()> {
		check_mix_args(sampling_rate, frequency, phase)?;
		let cycles_per_sample = frequency / sampling_rate;
		let step_theta = 2.0 * std::f64::consts::PI * cycles_per_sample;
		let step = Complex{ re: real::<T>(step_theta.cos()), im: real::<T>(step_theta.sin()) };
		let chunk_len = self.chunk_len;

		samples.par_chunks_mut(chunk_len).enumerate().for_each(|(chunk_idx, chunk)| {
			let start = (chunk_idx * chunk_len) as f64;
			let theta0 = 2.0 * std::f64::consts::PI * (cycles_per_sample * start).fract() + phase;
			let mut phasor = Complex{ re: real::<T>(theta0.cos()), im: real::<T>(theta0.sin()) };
			for s in chunk.iter_mut() {
				*s *= phasor;
				phasor *= step;
			}
		});
		Ok(())
	}

	fn transform(&self, data:&mut [Complex<T>], direction:Direction) -> Result<()> {
		self.inner.transform(data, direction)
	}

	fn correlate(&self, signal:&[Complex<T>], code:&[T]) -> Result<Complex<T>> {
		if signal.len() != code.len() {
			return Err(DigSigProcErr::SizeMismatch{ expected: signal.len(), actual: code.len() });
		}
		Ok(signal.par_chunks(self.chunk_len).zip(code.par_chunks(self.chunk_len))
			.map(|(s, c)| s.iter().zip(c.iter()).fold(Complex::zero(), |acc:Complex<T>, (si, ci)| acc + si.scale(*ci)))
			.reduce(Complex::zero, |a, b| a + b))
	}

	fn abs(&self, x:&[Complex<T>]) -> Vec<T> {
		x.par_iter().with_min_len(self.chunk_len).map(|c| c.norm()).collect()
	}

	fn conj(&self, x:&mut [Complex<T>]) {
		x.par_iter_mut().with_min_len(self.chunk_len).for_each(|c| *c = c.conj());
	}

	fn matched_filter_spectrum(&self, signal:&mut [Complex<T>], conj_spectrum:&[Complex<T>]) -> Result<()> {
		if signal.len() != conj_spectrum.len() {
			return Err(DigSigProcErr::SizeMismatch{ expected: conj_spectrum.len(), actual: signal.len() });
		}
		self.transform(signal, Direction::Forward)?;
		signal.par_iter_mut().zip(conj_spectrum.par_iter()).with_min_len(self.chunk_len).for_each(|(s, h)| *s *= *h);
		self.transform(signal, Direction::Inverse)
	}

	fn mean_stddev(&self, x:&[T]) -> Result<(T, T)> {
		if x.is_empty() { return Err(DigSigProcErr::EmptyInput("mean_stddev")); }
		let n:T = real(x.len() as f64);
		let mean = x.par_iter().with_min_len(self.chunk_len).copied().reduce(T::zero, |a, b| a + b) / n;
		let var  = x.par_iter().with_min_len(self.chunk_len).map(|v| (*v - mean) * (*v - mean)).reduce(T::zero, |a, b| a + b) / n;
		Ok((mean, var.sqrt()))
	}

}
