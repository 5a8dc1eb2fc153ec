//! Closed-loop carrier and code tracking
//!
//! One `TrackingChannel` per acquired signal.  Every epoch runs
//!
//! ```text
//!   samples -> carrier wipe-off (NCO phase, frequency) -> E/P/L correlation (code phase, code frequency)
//!                 ^                                            |
//!                 |            Costas PLL + FLL assist  <------+  prompt
//!                 +----------- DLL (early-minus-late)   <------+  early, late
//! ```
//!
//! The code phase is kept as the sample index at which a code period starts, expressed in the frame of
//! the nominal chip rate.  It accumulates without wrapping; reported measurements wrap it to one period.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::config::TrackingConfig;
use crate::dsp::{Epl, EplCorrelator, Mixer, ReplicaTiming};
use crate::filters::{CarrierLoopFilter, CodeLoopFilter, ScalarFilter};
use crate::gnss::{CodeProvider, ReferenceCode, SatelliteId};
use crate::gnss::common::acquisition::AcquisitionResult;
use crate::io::{SampleBlock, SampleSource};
use crate::numeric::{NumericBackend, Real};
use crate::observer::Observer;
use crate::{CancelToken, DigSigProcErr, Result};

pub mod lock_detectors;

pub use lock_detectors::{LockMonitor, LockStatistics};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
	Tracking,
	LostLock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMeasurement {
	pub satellite: SatelliteId,
	pub epoch: usize,
	pub sample_idx: usize,
	/// Radians since the channel was seeded: the local NCO phase at the start of the epoch plus the
	/// measured phase residual (`2π · phase_residual`)
	pub carrier_phase: f64,
	/// Hz, including the intermediate frequency
	pub carrier_frequency: f64,
	/// Samples from `sample_idx` to the start of the next code period
	pub code_phase: f64,
	/// Chips per second
	pub code_frequency: f64,
	/// Cycles
	pub phase_residual: f64,
	/// Cycles per epoch
	pub frequency_residual: f64,
	pub code_residual: f64,
	pub epl: Epl,
	pub state: ChannelState,
}

/// Per-epoch values, one entry per processed epoch in every sequence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelHistory {
	pub sample_idx: Vec<usize>,
	pub carrier_phase: Vec<f64>,
	pub carrier_frequency: Vec<f64>,
	pub code_phase: Vec<f64>,
	pub code_frequency: Vec<f64>,
	pub phase_residual: Vec<f64>,
	pub frequency_residual: Vec<f64>,
	pub code_residual: Vec<f64>,
	pub early: Vec<Complex<f64>>,
	pub prompt: Vec<Complex<f64>>,
	pub late: Vec<Complex<f64>>,
	pub state: Vec<ChannelState>,
}

impl ChannelHistory {

	pub fn len(&self) -> usize { self.sample_idx.len() }
	pub fn is_empty(&self) -> bool { self.sample_idx.is_empty() }

	fn push(&mut self, m:&EpochMeasurement) {
		self.sample_idx.push(m.sample_idx);
		self.carrier_phase.push(m.carrier_phase);
		self.carrier_frequency.push(m.carrier_frequency);
		self.code_phase.push(m.code_phase);
		self.code_frequency.push(m.code_frequency);
		self.phase_residual.push(m.phase_residual);
		self.frequency_residual.push(m.frequency_residual);
		self.code_residual.push(m.code_residual);
		self.early.push(m.epl.early);
		self.prompt.push(m.epl.prompt);
		self.late.push(m.epl.late);
		self.state.push(m.state);
	}

	pub fn measurement(&self, satellite:SatelliteId, epoch:usize) -> Option<EpochMeasurement> {
		if epoch >= self.len() { return None; }
		Some(EpochMeasurement{
			satellite,
			epoch,
			sample_idx: self.sample_idx[epoch],
			carrier_phase: self.carrier_phase[epoch],
			carrier_frequency: self.carrier_frequency[epoch],
			code_phase: self.code_phase[epoch],
			code_frequency: self.code_frequency[epoch],
			phase_residual: self.phase_residual[epoch],
			frequency_residual: self.frequency_residual[epoch],
			code_residual: self.code_residual[epoch],
			epl: Epl{ early: self.early[epoch], prompt: self.prompt[epoch], late: self.late[epoch] },
			state: self.state[epoch],
		})
	}

}

fn finite_or_zero(x:f64) -> f64 { if x.is_finite() { x } else { 0.0 } }

/// Costas discriminator in cycles; insensitive to a half-cycle data flip
fn phase_discriminator(prompt:Complex<f64>) -> f64 {
	if prompt.re == 0.0 { 0.0 } else { finite_or_zero((prompt.im / prompt.re).atan() / (2.0 * PI)) }
}

/// Sign-normalized cross/dot frequency discriminator in cycles per epoch, with the sign the carrier loop
/// filter expects
fn frequency_discriminator(prompt:Complex<f64>, previous:Complex<f64>) -> f64 {
	let dot   = prompt.re * previous.re + prompt.im * previous.im;
	let cross = prompt.re * previous.im - prompt.im * previous.re;
	let sign = if dot < 0.0 { -1.0 } else { 1.0 };
	finite_or_zero((sign * cross).atan2(sign * dot) / (2.0 * PI))
}

pub struct TrackingChannel<T: Real> {
	satellite: SatelliteId,
	code: ReferenceCode,
	sampling_rate: f64,
	intermediate_frequency: f64,

	mixer: Mixer<T>,
	correlator: EplCorrelator<T>,
	carrier_filter: CarrierLoopFilter,
	code_filter: CodeLoopFilter,
	lock_monitor: Option<LockMonitor>,

	carrier_phase: f64,
	carrier_frequency: f64,
	code_phase: f64,
	code_frequency: f64,
	base_code_frequency: f64,
	nominal_code_frequency: f64,
	previous_prompt: Option<Complex<f64>>,

	epoch: usize,
	state: ChannelState,
	history: ChannelHistory,
	buffer: Vec<Complex<T>>,
}

impl<T: Real> TrackingChannel<T> {

	/// Seeds a channel from an acquisition.  The code frequency is carrier-aided from the acquired Doppler.
	pub fn new(result:&AcquisitionResult, code:ReferenceCode, config:&TrackingConfig, backend:Arc<dyn NumericBackend<T>>) -> Result<Self> {
		config.validate()?;
		if code.satellite != result.satellite {
			return Err(DigSigProcErr::Configuration(format!("reference code for {} cannot track {}", code.satellite, result.satellite)));
		}

		let signal = result.satellite.signal;
		let pdi = config.epoch_s();
		let nominal_code_frequency = code.chip_rate_hz();
		let base_code_frequency = nominal_code_frequency * (1.0 + result.doppler_hz / signal.carrier_freq_hz());

		let mixer = Mixer::new(result.sampling_rate_hz, config.mix_strategy, backend.clone())?;
		let correlator = EplCorrelator::new(backend, config.early_late_spacing_chips)?;

		tracing::info!(satellite = %result.satellite, doppler_hz = result.doppler_hz, code_phase = result.code_phase, "tracking channel seeded");

		Ok(Self{
			satellite: result.satellite,
			code,
			sampling_rate: result.sampling_rate_hz,
			intermediate_frequency: result.intermediate_frequency_hz,
			mixer,
			correlator,
			carrier_filter: CarrierLoopFilter::new(config.pll_bandwidth_hz, config.fll_bandwidth_hz, pdi),
			code_filter: CodeLoopFilter::new(config.dll_bandwidth_hz, config.dll_damping, config.dll_gain, pdi),
			lock_monitor: config.lock_monitor.clone().map(|c| LockMonitor::new(c, pdi)),
			carrier_phase: 0.0,
			carrier_frequency: result.carrier_frequency_hz(),
			code_phase: (result.sample_idx + result.code_phase) as f64,
			code_frequency: base_code_frequency,
			base_code_frequency,
			nominal_code_frequency,
			previous_prompt: None,
			epoch: 0,
			state: ChannelState::Tracking,
			history: ChannelHistory::default(),
			buffer: vec![],
		})
	}

	pub fn satellite(&self) -> SatelliteId { self.satellite }
	pub fn state(&self) -> ChannelState { self.state }
	pub fn epochs_processed(&self) -> usize { self.epoch }
	pub fn history(&self) -> &ChannelHistory { &self.history }
	pub fn into_history(self) -> ChannelHistory { self.history }
	pub fn lock_statistics(&self) -> Option<LockStatistics> { self.lock_monitor.as_ref().and_then(|m| m.last_statistics()) }

	pub fn carrier_frequency_hz(&self) -> f64 { self.carrier_frequency }
	pub fn doppler_hz(&self) -> f64 { self.carrier_frequency - self.intermediate_frequency }
	pub fn carrier_phase_rad(&self) -> f64 { self.carrier_phase }
	pub fn code_frequency_hz(&self) -> f64 { self.code_frequency }
	pub fn base_code_frequency_hz(&self) -> f64 { self.base_code_frequency }

	/// Unwrapped code start position in samples
	pub fn code_phase_samples(&self) -> f64 { self.code_phase }

	fn samples_per_code(&self) -> f64 { self.sampling_rate * self.code.period_s() }

	/// Processes one epoch.  Blocks must be contiguous and arrive in order.
	pub fn update(&mut self, block:&SampleBlock<T>) -> Result<EpochMeasurement> {
		if block.is_empty() {
			return Err(DigSigProcErr::EmptyInput("tracking epoch"));
		}
		let n = block.len() as f64;

		// Wipe the carrier off the input signal
		self.buffer.clear();
		self.buffer.extend_from_slice(&block.samples);
		self.mixer.translate(&mut self.buffer, -self.carrier_frequency, -self.carrier_phase.rem_euclid(2.0 * PI))?;

		let timing = ReplicaTiming{
			start_chip: (block.start_sample as f64 - self.code_phase) * self.nominal_code_frequency / self.sampling_rate,
			chips_per_sample: self.code_frequency / self.sampling_rate,
		};
		let epl = self.correlator.correlate(&self.buffer, &self.code, timing)?;
		let prompt = epl.prompt;

		// Carrier loop
		let phase_error = phase_discriminator(prompt);
		let frequency_error = match self.previous_prompt {
			Some(previous) => frequency_discriminator(prompt, previous),
			None => 0.0,
		};
		let carrier_frequency = self.carrier_frequency;
		let carrier_phase = self.carrier_phase + 2.0 * PI * phase_error;
		self.carrier_phase += 2.0 * PI * carrier_frequency * n / self.sampling_rate;
		self.carrier_frequency += self.carrier_filter.apply_assisted(phase_error, frequency_error);

		// Code loop
		let code_error = finite_or_zero(epl.code_discriminator());
		let code_frequency = self.code_frequency;
		let code_phase = (self.code_phase - block.start_sample as f64).rem_euclid(self.samples_per_code());
		self.code_phase -= n * (code_frequency - self.nominal_code_frequency) / self.nominal_code_frequency;
		self.code_frequency = self.base_code_frequency - self.code_filter.apply(code_error);

		if let Some(monitor) = self.lock_monitor.as_mut() {
			if !monitor.update(prompt) && self.state == ChannelState::Tracking {
				tracing::warn!(satellite = %self.satellite, epoch = self.epoch, fail_count = monitor.fail_count(), "lost lock");
				self.state = ChannelState::LostLock;
			}
		}

		let measurement = EpochMeasurement{
			satellite: self.satellite,
			epoch: self.epoch,
			sample_idx: block.start_sample,
			carrier_phase,
			carrier_frequency,
			code_phase,
			code_frequency,
			phase_residual: phase_error,
			frequency_residual: frequency_error,
			code_residual: code_error,
			epl,
			state: self.state,
		};
		tracing::trace!(satellite = %self.satellite, epoch = self.epoch, phase_error, code_error, carrier_frequency, "epoch");

		self.history.push(&measurement);
		self.previous_prompt = Some(prompt);
		self.epoch += 1;
		Ok(measurement)
	}

}

/// Drives a set of channels epoch by epoch.  Channels are updated in parallel; each channel still sees
/// its epochs strictly in order.
pub struct Tracker<T: Real> {
	config: TrackingConfig,
	backend: Arc<dyn NumericBackend<T>>,
	channels: Vec<TrackingChannel<T>>,
	epoch: usize,
	observer: Option<Arc<dyn Observer>>,
	cancel: Option<CancelToken>,
}

impl<T: Real> Tracker<T> {

	pub fn new(config:TrackingConfig, backend:Arc<dyn NumericBackend<T>>) -> Result<Self> {
		config.validate()?;
		Ok(Self{ config, backend, channels: vec![], epoch: 0, observer: None, cancel: None })
	}

	/// One channel per acquisition result, with codes looked up from `provider`
	pub fn from_acquisitions(results:&[AcquisitionResult], provider:&dyn CodeProvider, config:TrackingConfig, backend:Arc<dyn NumericBackend<T>>) -> Result<Self> {
		let mut tracker = Self::new(config, backend)?;
		for result in results {
			tracker.add_channel(result, provider.code(&result.satellite)?)?;
		}
		Ok(tracker)
	}

	pub fn with_observer(mut self, observer:Arc<dyn Observer>) -> Self {
		self.observer = Some(observer);
		self
	}

	pub fn with_cancel_token(mut self, cancel:CancelToken) -> Self {
		self.cancel = Some(cancel);
		self
	}

	pub fn add_channel(&mut self, result:&AcquisitionResult, code:ReferenceCode) -> Result<()> {
		if self.channel(&result.satellite).is_some() {
			return Err(DigSigProcErr::Configuration(format!("{} is already being tracked", result.satellite)));
		}
		let channel = TrackingChannel::new(result, code, &self.config, self.backend.clone())?;
		self.channels.push(channel);
		Ok(())
	}

	/// Replaces the channel for `result.satellite`, or adds one, with a channel seeded from a fresh acquisition
	pub fn reseed(&mut self, result:&AcquisitionResult, code:ReferenceCode) -> Result<()> {
		let channel = TrackingChannel::new(result, code, &self.config, self.backend.clone())?;
		match self.channels.iter_mut().find(|c| c.satellite == result.satellite) {
			Some(existing) => *existing = channel,
			None => self.channels.push(channel),
		}
		Ok(())
	}

	pub fn channels(&self) -> &[TrackingChannel<T>] { &self.channels }
	pub fn channel(&self, satellite:&SatelliteId) -> Option<&TrackingChannel<T>> { self.channels.iter().find(|c| c.satellite == *satellite) }

	/// Epochs stepped so far
	pub fn epoch(&self) -> usize { self.epoch }

	pub fn lost_satellites(&self) -> Vec<SatelliteId> {
		self.channels.iter().filter(|c| c.state == ChannelState::LostLock).map(|c| c.satellite).collect()
	}

	pub fn into_histories(self) -> Vec<(SatelliteId, ChannelHistory)> {
		self.channels.into_iter().map(|c| (c.satellite, c.history)).collect()
	}

	/// Feeds one epoch to every channel that still has lock.
	///
	/// The block is checked before any channel sees it, so an empty block or a sampling rate mismatch leaves
	/// the tracker untouched.  Otherwise every channel gets its update and the tracker always advances by one
	/// epoch.  A channel whose update fails is dropped to `LostLock` (it missed the epoch, so `reseed` is the
	/// way back) and the first such error is returned after the other channels have been recorded.
	pub fn step(&mut self, block:&SampleBlock<T>) -> Result<Vec<EpochMeasurement>> {
		if let Some(token) = &self.cancel { token.check()?; }
		if block.is_empty() {
			return Err(DigSigProcErr::EmptyInput("tracking epoch"));
		}
		if let Some(c) = self.channels.iter().find(|c| (c.sampling_rate - block.sampling_rate).abs() > 1.0e-6 * c.sampling_rate) {
			return Err(DigSigProcErr::Configuration(format!("block sampled at {} Hz, {} tracks at {} Hz", block.sampling_rate, c.satellite, c.sampling_rate)));
		}

		let outcomes:Vec<(SatelliteId, Result<EpochMeasurement>)> = self.channels.par_iter_mut()
			.filter(|c| c.state == ChannelState::Tracking)
			.map(|c| (c.satellite, c.update(block)))
			.collect();

		let epoch = self.epoch;
		self.epoch += 1;

		let mut measurements = Vec::with_capacity(outcomes.len());
		let mut first_error = None;
		for (satellite, outcome) in outcomes {
			match outcome {
				Ok(m) => {
					if let Some(observer) = &self.observer {
						observer.epoch_tracked(&satellite, &m);
						if m.state == ChannelState::LostLock { observer.lock_lost(&satellite, m.epoch); }
					}
					measurements.push(m);
				},
				Err(e) => {
					tracing::warn!(satellite = %satellite, epoch, error = %e, "channel update failed");
					if let Some(c) = self.channels.iter_mut().find(|c| c.satellite == satellite) { c.state = ChannelState::LostLock; }
					if let Some(observer) = &self.observer { observer.lock_lost(&satellite, epoch); }
					first_error.get_or_insert(e);
				},
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(measurements),
		}
	}

	/// Reads consecutive epochs from `source` until it runs out, `max_epochs` have been processed, or every
	/// channel has lost lock.  Returns the number of epochs processed by this call.
	pub fn run<S: SampleSource<T> + ?Sized>(&mut self, source:&S, max_epochs:Option<usize>) -> Result<usize> {
		let epoch_ms = self.config.epoch_ms;
		let available = source.len_ms() / epoch_ms;
		let mut processed = 0;

		while self.epoch < available && max_epochs.map_or(true, |m| processed < m) {
			if self.channels.iter().all(|c| c.state == ChannelState::LostLock) { break; }
			let block = source.read(self.epoch * epoch_ms, epoch_ms)?;
			self.step(&block)?;
			processed += 1;
		}

		tracing::info!(epochs = processed, channels = self.channels.len(), lost = self.lost_satellites().len(), "tracking run finished");
		Ok(processed)
	}

}
