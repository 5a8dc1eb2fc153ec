//! Parallel code phase search (PCPS) acquisition
//!
//! For every candidate satellite, the raw block is wiped off at each Doppler bin and matched-filtered
//! against the upsampled code, which yields the correlation at every code phase in one shot:
//!
//! ```text
//!   doppler bins: IF-range ... IF ... IF+range   (step = doppler_step_hz)
//!        |
//!        v
//!   mix(-f) -> FFT -> x conj(FFT(code)) -> IFFT -> |.| -> fold per code period -> peak
//! ```
//!
//! The largest peak over all bins wins.  The noise floor is measured on the folded magnitude away from
//! the winning lag.

use std::sync::Arc;

use num_complex::Complex;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::config::AcquisitionConfig;
use crate::dsp::{Mixer, MixStrategy};
use crate::filters::MatchedFilter;
use crate::gnss::{CodeProvider, ReferenceCode, SatelliteId};
use crate::io::{SampleBlock, SampleSource};
use crate::numeric::{real, to_f64, NumericBackend, Real};
use crate::observer::Observer;
use crate::{CancelToken, DigSigProcErr, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionResult {
	pub satellite: SatelliteId,
	/// Offset from the intermediate frequency, Hz
	pub doppler_hz: f64,
	pub doppler_step_hz: f64,
	/// Delay of the code start relative to `sample_idx`, in samples, within one code period
	pub code_phase: usize,
	/// Index of the first sample of the searched block within its source
	pub sample_idx: usize,
	/// Peak correlation magnitude, averaged over the code periods in the block
	pub level: f64,
	pub noise_mean: f64,
	pub sigma: f64,
	pub intermediate_frequency_hz: f64,
	pub sampling_rate_hz: f64,
	pub mf_len: usize,
	pub input_power_total: f64,
}

impl AcquisitionResult {

	pub fn carrier_frequency_hz(&self) -> f64 { self.intermediate_frequency_hz + self.doppler_hz }

	pub fn snr(&self) -> f64 {
		if self.sigma > 0.0 { self.level / self.sigma }
		else if self.level > 0.0 { f64::INFINITY }
		else { 0.0 }
	}

	/// Peak energy normalized by input and filter energy; 1.0 for a noiseless, perfectly aligned signal
	pub fn test_statistic(&self) -> f64 {
		if self.input_power_total > 0.0 { (self.level * self.level) / (self.input_power_total * (self.mf_len as f64)) } else { 0.0 }
	}

}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
	Found(AcquisitionResult),
	/// The best candidate fell below the configured SNR threshold
	NotFound(AcquisitionResult),
}

impl SearchOutcome {

	pub fn found(self) -> Option<AcquisitionResult> {
		match self {
			SearchOutcome::Found(r) => Some(r),
			SearchOutcome::NotFound(_) => None,
		}
	}

	pub fn best(&self) -> &AcquisitionResult {
		match self {
			SearchOutcome::Found(r) | SearchOutcome::NotFound(r) => r,
		}
	}

}

#[derive(Debug, Clone, Copy)]
struct BinPeak {
	doppler_hz: f64,
	lag: usize,
	level: f64,
}

pub struct AcquisitionEngine<T: Real> {
	config: AcquisitionConfig,
	sampling_rate: f64,
	intermediate_frequency: f64,
	backend: Arc<dyn NumericBackend<T>>,
	mixer: Mixer<T>,
	observer: Option<Arc<dyn Observer>>,
	cancel: Option<CancelToken>,
}

impl<T: Real> AcquisitionEngine<T> {

	pub fn new(sampling_rate:f64, intermediate_frequency:f64, config:AcquisitionConfig, backend:Arc<dyn NumericBackend<T>>) -> Result<Self> {
		config.validate()?;
		if !intermediate_frequency.is_finite() {
			return Err(DigSigProcErr::Configuration(format!("intermediate frequency must be finite, got {}", intermediate_frequency)));
		}
		let mixer = Mixer::new(sampling_rate, MixStrategy::Backend, backend.clone())?;
		Ok(Self{ config, sampling_rate, intermediate_frequency, backend, mixer, observer: None, cancel: None })
	}

	pub fn with_observer(mut self, observer:Arc<dyn Observer>) -> Self {
		self.observer = Some(observer);
		self
	}

	pub fn with_cancel_token(mut self, cancel:CancelToken) -> Self {
		self.cancel = Some(cancel);
		self
	}

	pub fn config(&self) -> &AcquisitionConfig { &self.config }

	fn check_cancel(&self) -> Result<()> {
		match &self.cancel {
			Some(token) => token.check(),
			None => Ok(()),
		}
	}

	/// Doppler offsets searched, relative to the intermediate frequency.  The grid starts at `-range` and
	/// always ends on `+range`, even when the step does not divide the span.
	pub fn doppler_bins(&self) -> Vec<f64> {
		let range = self.config.doppler_range_hz;
		let step = self.config.doppler_step_hz;
		let n = (2.0 * range / step - 1.0e-9).ceil().max(0.0) as usize;
		(0..n).map(|k| (k as f64) * step - range).chain(std::iter::once(range)).collect()
	}

	/// Looks up every satellite's code first, so an unsupported satellite fails before any searching starts
	pub fn acquire_satellites<S: SampleSource<T> + ?Sized>(&self, source:&S, provider:&dyn CodeProvider, satellites:&[SatelliteId]) -> Result<Vec<AcquisitionResult>> {
		let codes = satellites.iter().map(|sat| provider.code(sat)).collect::<Result<Vec<ReferenceCode>>>()?;
		self.acquire(source, &codes)
	}

	pub fn acquire<S: SampleSource<T> + ?Sized>(&self, source:&S, codes:&[ReferenceCode]) -> Result<Vec<AcquisitionResult>> {
		self.acquire_at(source, 0, codes)
	}

	/// Searches `ms_to_process` ms starting `start_ms` into the source.  Results come back strongest first.
	pub fn acquire_at<S: SampleSource<T> + ?Sized>(&self, source:&S, start_ms:usize, codes:&[ReferenceCode]) -> Result<Vec<AcquisitionResult>> {
		if (source.sampling_rate() - self.sampling_rate).abs() > 1.0e-6 * self.sampling_rate {
			return Err(DigSigProcErr::Configuration(format!("source sampled at {} Hz, engine configured for {} Hz", source.sampling_rate(), self.sampling_rate)));
		}
		let block = source.read(start_ms, self.config.ms_to_process)?;

		let outcomes = codes.par_iter()
			.map(|code| self.acquire_block(&block, code))
			.collect::<Result<Vec<SearchOutcome>>>()?;

		let mut results:Vec<AcquisitionResult> = outcomes.into_iter().filter_map(SearchOutcome::found).collect();
		results.sort_by(|a, b| b.level.total_cmp(&a.level));
		Ok(results)
	}

	fn correlation_profile(&self, signal:&[Complex<T>], mf:&MatchedFilter<T>, frequency:f64, samples_per_code:usize) -> Result<Vec<T>> {
		let mut buffer = signal.to_vec();
		self.mixer.translate(&mut buffer, frequency, 0.0)?;
		mf.apply_in_place(&mut buffer)?;
		let magnitude = self.backend.abs(&buffer);

		let periods = magnitude.len() / samples_per_code;
		if periods > 1 && magnitude.len() % samples_per_code == 0 {
			let scale:T = real(1.0 / (periods as f64));
			Ok(self.backend.reshape_and_sum(&magnitude, samples_per_code)?.into_iter().map(|m| m * scale).collect())
		} else {
			Ok(magnitude)
		}
	}

	/// Full Doppler by code-phase search of one satellite over the first `ms_to_process` ms of `block`
	pub fn acquire_block(&self, block:&SampleBlock<T>, code:&ReferenceCode) -> Result<SearchOutcome> {
		self.check_cancel()?;

		let mf_len = (self.sampling_rate * (self.config.ms_to_process as f64) / 1000.0).round() as usize;
		if block.len() < mf_len {
			return Err(DigSigProcErr::SizeMismatch{ expected: mf_len, actual: block.len() });
		}
		let signal = &block.samples[..mf_len];
		let samples_per_code = code.samples_per_code(self.sampling_rate).max(1);

		let replica:Vec<T> = code.sampled(self.sampling_rate, self.config.ms_to_process).into_iter().map(|c| real(c as f64)).collect();
		let mf = MatchedFilter::from_code(&replica, self.backend.clone())?;
		let input_power_total = signal.iter().map(|s| to_f64(s.norm_sqr())).sum::<f64>();

		let peaks = self.doppler_bins().par_iter().map(|&doppler_hz| -> Result<BinPeak> {
			self.check_cancel()?;
			let profile = self.correlation_profile(signal, &mf, -(self.intermediate_frequency + doppler_hz), samples_per_code)?;
			let (lag, level) = self.backend.max_index(&profile)?;
			tracing::trace!(satellite = %code.satellite, doppler_hz, lag, level = to_f64(level), "doppler bin");
			Ok(BinPeak{ doppler_hz, lag, level: to_f64(level) })
		}).collect::<Result<Vec<BinPeak>>>()?;

		let best = peaks.iter().copied().fold(None, |best:Option<BinPeak>, p| match best {
			Some(b) if b.level >= p.level => Some(b),
			_ => Some(p),
		}).ok_or(DigSigProcErr::EmptyInput("doppler bins"))?;

		// Noise floor from the winning bin, excluding one chip either side of the peak
		let profile = self.correlation_profile(signal, &mf, -(self.intermediate_frequency + best.doppler_hz), samples_per_code)?;
		let exclusion = (self.sampling_rate / code.chip_rate_hz()).ceil() as usize;
		let len = profile.len();
		let off_peak:Vec<T> = profile.iter().enumerate().filter(|(i, _)| {
			let d = if *i > best.lag { i - best.lag } else { best.lag - i };
			d.min(len - d) > exclusion
		}).map(|(_, m)| *m).collect();
		let (noise_mean, sigma) = match self.backend.mean_stddev(&off_peak) {
			Ok((m, s)) => (to_f64(m), to_f64(s)),
			Err(DigSigProcErr::EmptyInput(_)) => (0.0, 0.0),
			Err(e) => return Err(e),
		};

		if let Some(observer) = &self.observer {
			let magnitude:Vec<f64> = profile.iter().map(|m| to_f64(*m)).collect();
			observer.acquisition_input(&code.satellite, best.doppler_hz, &magnitude);
		}

		let result = AcquisitionResult{
			satellite: code.satellite,
			doppler_hz: best.doppler_hz,
			doppler_step_hz: self.config.doppler_step_hz,
			code_phase: best.lag % samples_per_code,
			sample_idx: block.start_sample,
			level: best.level,
			noise_mean,
			sigma,
			intermediate_frequency_hz: self.intermediate_frequency,
			sampling_rate_hz: self.sampling_rate,
			mf_len,
			input_power_total,
		};

		let snr = result.snr();
		match self.config.snr_threshold {
			Some(threshold) if snr < threshold => {
				tracing::debug!(satellite = %code.satellite, snr, threshold, "no signal above threshold");
				Ok(SearchOutcome::NotFound(result))
			},
			_ => {
				tracing::info!(satellite = %code.satellite, doppler_hz = result.doppler_hz, code_phase = result.code_phase, snr, "acquired");
				if let Some(observer) = &self.observer { observer.acquisition_result(&result); }
				Ok(SearchOutcome::Found(result))
			},
		}
	}

}
