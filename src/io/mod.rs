use num_complex::Complex;

use crate::numeric::Real;
use crate::{DigSigProcErr, Result};

/// A contiguous run of complex baseband samples.  `start_sample` is the index of the first sample
/// within the source it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock<T: Real> {
	pub samples: Vec<Complex<T>>,
	pub sampling_rate: f64,
	pub start_sample: usize,
}

impl<T: Real> SampleBlock<T> {

	pub fn new(samples:Vec<Complex<T>>, sampling_rate:f64, start_sample:usize) -> Self {
		Self{ samples, sampling_rate, start_sample }
	}

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }
	pub fn end_sample(&self) -> usize { self.start_sample + self.samples.len() }

	/// Mean sample power
	pub fn power(&self) -> f64 {
		if self.samples.is_empty() { return 0.0; }
		let total = self.samples.iter().fold(T::zero(), |acc, s| acc + s.norm_sqr());
		crate::numeric::to_f64(total) / (self.samples.len() as f64)
	}

}

pub trait SampleSource<T: Real>: Sync {

	fn sampling_rate(&self) -> f64;

	fn len_samples(&self) -> usize;

	fn read_samples(&self, start:usize, count:usize) -> Result<SampleBlock<T>>;

	fn samples_per_ms(&self) -> usize { (self.sampling_rate() / 1000.0).round() as usize }

	fn len_ms(&self) -> usize {
		match self.samples_per_ms() {
			0 => 0,
			n => self.len_samples() / n,
		}
	}

	/// `duration_ms` milliseconds of samples beginning `start_ms` milliseconds into the source
	fn read(&self, start_ms:usize, duration_ms:usize) -> Result<SampleBlock<T>> {
		let n = self.samples_per_ms();
		self.read_samples(start_ms * n, duration_ms * n)
	}

}

pub(crate) fn check_bounds(start:usize, count:usize, available:usize) -> Result<()> {
	let requested_end = start.checked_add(count).unwrap_or(usize::MAX);
	if requested_end > available {
		Err(DigSigProcErr::OutOfBounds{ requested_end, available })
	} else {
		Ok(())
	}
}

/// A fully buffered recording
#[derive(Debug, Clone)]
pub struct MemorySource<T: Real> {
	samples: Vec<Complex<T>>,
	sampling_rate: f64,
}

impl<T: Real> MemorySource<T> {

	pub fn new(samples:Vec<Complex<T>>, sampling_rate:f64) -> Result<Self> {
		if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
			return Err(DigSigProcErr::Configuration(format!("sampling rate must be positive and finite, got {}", sampling_rate)));
		}
		Ok(Self{ samples, sampling_rate })
	}

	pub fn samples(&self) -> &[Complex<T>] { &self.samples }

}

impl<T: Real> SampleSource<T> for MemorySource<T> {

	fn sampling_rate(&self) -> f64 { self.sampling_rate }

	fn len_samples(&self) -> usize { self.samples.len() }

	fn read_samples(&self, start:usize, count:usize) -> Result<SampleBlock<T>> {
		check_bounds(start, count, self.samples.len())?;
		Ok(SampleBlock::new(self.samples[start..start + count].to_vec(), self.sampling_rate, start))
	}

}
