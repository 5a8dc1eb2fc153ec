//! Numeric backends
//!
//! Every signal-processing primitive the receiver needs (mixing, transforms, correlation, reductions) is
//! expressed against [`NumericBackend`], so acquisition and tracking never care whether the work runs
//! one sample at a time or spread across a thread pool.  The scalar backend is the reference; every other
//! backend must agree with it to within its published [`NumericBackend::tolerance`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use num_complex::Complex;
use num_traits::{Float, FloatConst, NumAssign, Zero};
use rustfft::FftNum;
use serde::{Serialize, Deserialize};

use crate::fourier_analysis::Direction;
use crate::{DigSigProcErr, Result};

mod scalar;
mod scratch;
mod vectorized;

pub use scalar::ScalarBackend;
pub use scratch::ScratchPool;
pub use vectorized::VectorizedBackend;

/// Sample element type: `f32` or `f64`.
pub trait Real: FftNum + Float + FloatConst + NumAssign + Default {}

impl<T: FftNum + Float + FloatConst + NumAssign + Default> Real for T {}

#[inline]
pub fn real<T: Real>(x:f64) -> T { T::from_f64(x).unwrap_or_else(T::nan) }

#[inline]
pub fn to_f64<T: Real>(x:T) -> f64 { x.to_f64().unwrap_or(f64::NAN) }

#[inline]
pub fn complex_to_f64<T: Real>(x:Complex<T>) -> Complex<f64> { Complex{ re: to_f64(x.re), im: to_f64(x.im) } }

pub(crate) fn check_mix_args(sampling_rate:f64, frequency:f64, phase:f64) -> Result<()> {
	if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
		Err(DigSigProcErr::Configuration(format!("sampling rate must be positive and finite, got {}", sampling_rate)))
	} else if !frequency.is_finite() || !phase.is_finite() {
		Err(DigSigProcErr::Configuration(format!("mixing frequency {} and phase {} must be finite", frequency, phase)))
	} else {
		Ok(())
	}
}

pub trait NumericBackend<T: Real>: Send + Sync {

	fn name(&self) -> &'static str;

	/// Largest relative deviation from the closed-form result this backend promises
	fn tolerance(&self) -> f64;

	/// Multiplies sample `i` by `exp(j(2*pi*frequency*i/sampling_rate + phase))` in place
	fn mix(&self, samples:&mut [Complex<T>], sampling_rate:f64, frequency:f64, phase:f64) -> Result<()>;

	/// Discrete Fourier transform of any length.  The inverse is scaled by 1/n.
	fn transform(&self, data:&mut [Complex<T>], direction:Direction) -> Result<()>;

	/// Inner product of a baseband signal against a real code replica
	fn correlate(&self, signal:&[Complex<T>], code:&[T]) -> Result<Complex<T>> {
		if signal.len() != code.len() {
			return Err(DigSigProcErr::SizeMismatch{ expected: signal.len(), actual: code.len() });
		}
		Ok(signal.iter().zip(code.iter()).fold(Complex::zero(), |acc, (s, c)| acc + s.scale(*c)))
	}

	/// Circular cross-correlation of `signal` against `impulse_response`, computed as
	/// `IFFT(FFT(signal) * conj(FFT(impulse_response)))`
	fn matched_filter(&self, signal:&[Complex<T>], impulse_response:&[Complex<T>]) -> Result<Vec<Complex<T>>> {
		if signal.len() != impulse_response.len() {
			return Err(DigSigProcErr::SizeMismatch{ expected: signal.len(), actual: impulse_response.len() });
		}

		let mut spectrum = impulse_response.to_vec();
		self.transform(&mut spectrum, Direction::Forward)?;
		self.conj(&mut spectrum);

		let mut output = signal.to_vec();
		self.matched_filter_spectrum(&mut output, &spectrum)?;
		Ok(output)
	}

	/// Same as [`NumericBackend::matched_filter`], but with the conjugated filter spectrum precomputed.  Operates in place.
	fn matched_filter_spectrum(&self, signal:&mut [Complex<T>], conj_spectrum:&[Complex<T>]) -> Result<()> {
		if signal.len() != conj_spectrum.len() {
			return Err(DigSigProcErr::SizeMismatch{ expected: conj_spectrum.len(), actual: signal.len() });
		}
		self.transform(signal, Direction::Forward)?;
		for (s, h) in signal.iter_mut().zip(conj_spectrum.iter()) { *s *= *h; }
		self.transform(signal, Direction::Inverse)
	}

	fn abs(&self, x:&[Complex<T>]) -> Vec<T> { x.iter().map(|c| c.norm()).collect() }

	fn conj(&self, x:&mut [Complex<T>]) {
		for c in x.iter_mut() { *c = c.conj(); }
	}

	/// Index and value of the first maximum
	fn max_index(&self, x:&[T]) -> Result<(usize, T)> {
		let mut iter = x.iter().copied().enumerate();
		let mut best = iter.next().ok_or(DigSigProcErr::EmptyInput("max_index"))?;
		for (idx, value) in iter {
			if value > best.1 { best = (idx, value); }
		}
		Ok(best)
	}

	/// Population mean and standard deviation
	fn mean_stddev(&self, x:&[T]) -> Result<(T, T)> {
		if x.is_empty() { return Err(DigSigProcErr::EmptyInput("mean_stddev")); }
		let n:T = real(x.len() as f64);
		let mean = x.iter().fold(T::zero(), |acc, v| acc + *v) / n;
		let var  = x.iter().fold(T::zero(), |acc, v| acc + (*v - mean) * (*v - mean)) / n;
		Ok((mean, var.sqrt()))
	}

	/// Folds consecutive blocks of `block_size` elements onto each other by element-wise summation
	fn reshape_and_sum(&self, x:&[T], block_size:usize) -> Result<Vec<T>> {
		if block_size == 0 || x.len() % block_size != 0 {
			return Err(DigSigProcErr::BlockSize{ len: x.len(), block_size });
		}
		let mut ans = vec![T::zero(); block_size];
		for block in x.chunks_exact(block_size) {
			for (a, v) in ans.iter_mut().zip(block.iter()) { *a += *v; }
		}
		Ok(ans)
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind { Scalar, Vectorized }

impl Default for BackendKind {
	fn default() -> Self { BackendKind::Scalar }
}

impl fmt::Display for BackendKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BackendKind::Scalar     => write!(f, "scalar"),
			BackendKind::Vectorized => write!(f, "vectorized"),
		}
	}
}

impl FromStr for BackendKind {
	type Err = DigSigProcErr;

	fn from_str(s:&str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"scalar"     => Ok(BackendKind::Scalar),
			"vectorized" => Ok(BackendKind::Vectorized),
			other => Err(DigSigProcErr::Configuration(format!("unknown numeric backend '{}'", other))),
		}
	}
}

pub fn make_backend<T: Real>(kind:BackendKind) -> Arc<dyn NumericBackend<T>> {
	match kind {
		BackendKind::Scalar     => Arc::new(ScalarBackend::new()),
		BackendKind::Vectorized => Arc::new(VectorizedBackend::new()),
	}
}
