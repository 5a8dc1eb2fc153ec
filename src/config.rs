use serde::{Serialize, Deserialize};

use crate::dsp::MixStrategy;
use crate::numeric::BackendKind;
use crate::{DigSigProcErr, Result};

fn positive(name:&str, x:f64) -> Result<()> {
	if x.is_finite() && x > 0.0 { Ok(()) } else {
		Err(DigSigProcErr::Configuration(format!("{} must be positive and finite, got {}", name, x)))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
	pub doppler_range_hz: f64,
	pub doppler_step_hz: f64,
	pub ms_to_process: usize,
	/// Minimum peak-to-noise ratio for a satellite's best candidate to be reported; `None` reports every satellite
	pub snr_threshold: Option<f64>,
}

impl Default for AcquisitionConfig {
	fn default() -> Self {
		Self{ doppler_range_hz: 5000.0, doppler_step_hz: 250.0, ms_to_process: 4, snr_threshold: None }
	}
}

impl AcquisitionConfig {

	pub fn validate(&self) -> Result<()> {
		positive("doppler_step_hz", self.doppler_step_hz)?;
		if !(self.doppler_range_hz.is_finite() && self.doppler_range_hz >= 0.0) {
			return Err(DigSigProcErr::Configuration(format!("doppler_range_hz must be non-negative and finite, got {}", self.doppler_range_hz)));
		}
		if self.ms_to_process == 0 {
			return Err(DigSigProcErr::Configuration("ms_to_process must be at least 1".into()));
		}
		if let Some(th) = self.snr_threshold { positive("snr_threshold", th)?; }
		Ok(())
	}

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockMonitorConfig {
	pub window_epochs: usize,
	pub cn0_threshold_db_hz: f64,
	pub carrier_lock_threshold: f64,
	pub fail_limit: usize,
}

impl Default for LockMonitorConfig {
	fn default() -> Self {
		Self{ window_epochs: 20, cn0_threshold_db_hz: 30.0, carrier_lock_threshold: 0.8, fail_limit: 50 }
	}
}

impl LockMonitorConfig {

	pub fn validate(&self) -> Result<()> {
		if self.window_epochs < 2 {
			return Err(DigSigProcErr::Configuration(format!("lock monitor window must span at least 2 epochs, got {}", self.window_epochs)));
		}
		if !(-1.0..=1.0).contains(&self.carrier_lock_threshold) {
			return Err(DigSigProcErr::Configuration(format!("carrier lock threshold must be within [-1, 1], got {}", self.carrier_lock_threshold)));
		}
		if !self.cn0_threshold_db_hz.is_finite() {
			return Err(DigSigProcErr::Configuration("C/N0 threshold must be finite".into()));
		}
		Ok(())
	}

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
	pub pll_bandwidth_hz: f64,
	pub fll_bandwidth_hz: f64,
	pub dll_bandwidth_hz: f64,
	pub dll_damping: f64,
	pub dll_gain: f64,
	pub early_late_spacing_chips: f64,
	pub epoch_ms: usize,
	pub mix_strategy: MixStrategy,
	pub lock_monitor: Option<LockMonitorConfig>,
}

impl Default for TrackingConfig {
	fn default() -> Self {
		Self{
			pll_bandwidth_hz: 25.0,
			fll_bandwidth_hz: 250.0,
			dll_bandwidth_hz: 0.7,
			dll_damping: 1.0,
			dll_gain: 0.1,
			early_late_spacing_chips: 0.5,
			epoch_ms: 1,
			mix_strategy: MixStrategy::Backend,
			lock_monitor: Some(LockMonitorConfig::default()),
		}
	}
}

impl TrackingConfig {

	pub fn epoch_s(&self) -> f64 { self.epoch_ms as f64 / 1000.0 }

	pub fn without_lock_monitor(mut self) -> Self {
		self.lock_monitor = None;
		self
	}

	pub fn validate(&self) -> Result<()> {
		positive("pll_bandwidth_hz", self.pll_bandwidth_hz)?;
		positive("dll_bandwidth_hz", self.dll_bandwidth_hz)?;
		positive("dll_damping", self.dll_damping)?;
		positive("dll_gain", self.dll_gain)?;
		if !(self.fll_bandwidth_hz.is_finite() && self.fll_bandwidth_hz >= 0.0) {
			return Err(DigSigProcErr::Configuration(format!("fll_bandwidth_hz must be non-negative and finite, got {}", self.fll_bandwidth_hz)));
		}
		if !(self.early_late_spacing_chips > 0.0 && self.early_late_spacing_chips < 1.0) {
			return Err(DigSigProcErr::Configuration(format!("early_late_spacing_chips must be within (0, 1), got {}", self.early_late_spacing_chips)));
		}
		if self.epoch_ms == 0 {
			return Err(DigSigProcErr::Configuration("epoch_ms must be at least 1".into()));
		}
		if let Some(lock) = &self.lock_monitor { lock.validate()?; }
		Ok(())
	}

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
	pub sampling_rate_hz: f64,
	pub intermediate_frequency_hz: f64,
	pub backend: BackendKind,
	pub acquisition: AcquisitionConfig,
	pub tracking: TrackingConfig,
}

impl Default for ReceiverConfig {
	fn default() -> Self {
		Self{
			sampling_rate_hz: 4.092e6,
			intermediate_frequency_hz: 0.0,
			backend: BackendKind::Scalar,
			acquisition: AcquisitionConfig::default(),
			tracking: TrackingConfig::default(),
		}
	}
}

impl ReceiverConfig {

	pub fn from_json_str(s:&str) -> Result<Self> {
		let config:Self = serde_json::from_str(s)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		positive("sampling_rate_hz", self.sampling_rate_hz)?;
		if !self.intermediate_frequency_hz.is_finite() {
			return Err(DigSigProcErr::Configuration("intermediate_frequency_hz must be finite".into()));
		}
		self.acquisition.validate()?;
		self.tracking.validate()
	}

}
