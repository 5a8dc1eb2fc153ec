use std::sync::Arc;

use num_complex::Complex;

use crate::fourier_analysis::Direction;
use crate::numeric::{to_f64, NumericBackend, Real};
use crate::{DigSigProcErr, Result};

/// Circular correlation against a fixed waveform by spectral multiplication.  The conjugated spectrum
/// of the waveform is computed once, so each application costs one forward and one inverse transform.
pub struct MatchedFilter<T: Real> {
	backend: Arc<dyn NumericBackend<T>>,
	waveform_freq_domain_conj: Vec<Complex<T>>,
	filter_power: f64,
}

impl<T: Real> MatchedFilter<T> {

	pub fn new(waveform_time_domain:&[Complex<T>], backend:Arc<dyn NumericBackend<T>>) -> Result<Self> {
		if waveform_time_domain.is_empty() {
			return Err(DigSigProcErr::EmptyInput("matched filter waveform"));
		}

		let filter_power = waveform_time_domain.iter().map(|x| to_f64(x.norm_sqr())).sum();
		let mut waveform_freq_domain_conj = waveform_time_domain.to_vec();
		backend.transform(&mut waveform_freq_domain_conj, Direction::Forward)?;
		backend.conj(&mut waveform_freq_domain_conj);

		Ok(Self{ backend, waveform_freq_domain_conj, filter_power })
	}

	/// Real-valued code replica, the usual case for spreading codes
	pub fn from_code(code:&[T], backend:Arc<dyn NumericBackend<T>>) -> Result<Self> {
		let waveform:Vec<Complex<T>> = code.iter().map(|c| Complex::new(*c, T::zero())).collect();
		Self::new(&waveform, backend)
	}

	pub fn len(&self) -> usize { self.waveform_freq_domain_conj.len() }
	pub fn is_empty(&self) -> bool { self.waveform_freq_domain_conj.is_empty() }
	pub fn filter_power(&self) -> f64 { self.filter_power }

	/// Filters `signal` in place, leaving the correlation at every circular lag
	pub fn apply_in_place(&self, signal:&mut [Complex<T>]) -> Result<()> {
		self.backend.matched_filter_spectrum(signal, &self.waveform_freq_domain_conj)
	}

	pub fn apply(&self, signal_time_domain:&[Complex<T>]) -> Result<MatchedFilterResponse> {
		if signal_time_domain.len() != self.len() {
			return Err(DigSigProcErr::SizeMismatch{ expected: self.len(), actual: signal_time_domain.len() });
		}
		let signal_power = signal_time_domain.iter().map(|x| to_f64(x.norm_sqr())).sum();

		let mut correlation = signal_time_domain.to_vec();
		self.apply_in_place(&mut correlation)?;
		let correlation_magnitude = self.backend.abs(&correlation).into_iter().map(to_f64).collect();

		Ok(MatchedFilterResponse{ correlation_magnitude, signal_power, filter_power: self.filter_power })
	}

}

#[derive(Debug, Clone)]
pub struct MatchedFilterResponse {
	pub correlation_magnitude: Vec<f64>,
	pub signal_power: f64,
	pub filter_power: f64,
}

impl MatchedFilterResponse {

	pub fn test_stat_at_idx(&self, k:usize) -> f64 {
		let m = self.correlation_magnitude[k];
		m * m / (self.signal_power * self.filter_power)
	}

	/// Index and magnitude of the first largest correlation
	pub fn peak(&self) -> Option<(usize, f64)> {
		self.correlation_magnitude.iter().copied().enumerate()
			.fold(None, |best:Option<(usize, f64)>, (idx, m)| match best {
				Some((_, b)) if b >= m => best,
				_ => Some((idx, m)),
			})
	}

	/// Normalized test statistic at the peak; 1.0 for a noiseless, perfectly aligned match
	pub fn best_test_stat(&self) -> Option<(f64, usize)> {
		self.peak().map(|(idx, _)| (self.test_stat_at_idx(idx), idx))
	}

}
