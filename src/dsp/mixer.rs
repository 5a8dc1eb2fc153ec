use std::fmt;
use std::sync::Arc;

use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::dsp::nco::{Nco, DEFAULT_PHASE_BITS};
use crate::numeric::{NumericBackend, Real};
use crate::{DigSigProcErr, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixStrategy {
	/// Closed-form phase evaluated by the numeric backend
	Backend,
	/// Phase accumulator, optionally with a sine lookup table
	Nco{ bits:u32, table_bits:Option<u32> },
}

impl Default for MixStrategy {
	fn default() -> Self { MixStrategy::Backend }
}

impl MixStrategy {
	pub fn nco() -> Self { MixStrategy::Nco{ bits: DEFAULT_PHASE_BITS, table_bits: None } }
}

/// Frequency translation of complex baseband blocks.  Every call starts from the phase it is given, so the
/// mixer holds no state between blocks.
#[derive(Clone)]
pub struct Mixer<T: Real> {
	sampling_rate: f64,
	strategy: MixStrategy,
	backend: Arc<dyn NumericBackend<T>>,
}

impl<T: Real> fmt::Debug for Mixer<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Mixer").field("sampling_rate", &self.sampling_rate).field("strategy", &self.strategy)
			.field("backend", &self.backend.name()).finish()
	}
}

impl<T: Real> Mixer<T> {

	pub fn new(sampling_rate:f64, strategy:MixStrategy, backend:Arc<dyn NumericBackend<T>>) -> Result<Self> {
		if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
			return Err(DigSigProcErr::Configuration(format!("mixer sampling rate must be positive and finite, got {}", sampling_rate)));
		}
		if let MixStrategy::Nco{ bits, table_bits } = strategy {
			// Fail at construction rather than on the first block
			let nco = Nco::with_bits(bits, sampling_rate, 0.0, 0.0)?;
			if let Some(p) = table_bits { nco.with_table(p)?; }
		}
		Ok(Self{ sampling_rate, strategy, backend })
	}

	pub fn sampling_rate(&self) -> f64 { self.sampling_rate }
	pub fn strategy(&self) -> MixStrategy { self.strategy }

	/// Multiplies `samples` by `exp(j(2*pi*frequency*i/fs + phase))`
	pub fn translate(&self, samples:&mut [Complex<T>], frequency:f64, phase:f64) -> Result<()> {
		match self.strategy {
			MixStrategy::Backend => self.backend.mix(samples, self.sampling_rate, frequency, phase),
			MixStrategy::Nco{ bits, table_bits } => {
				let mut nco = Nco::with_bits(bits, self.sampling_rate, frequency, phase)?;
				if let Some(p) = table_bits { nco = nco.with_table(p)?; }
				nco.mix(samples);
				Ok(())
			},
		}
	}

	/// Per-sample phase error bound, in radians, over a block of `len` samples
	pub fn phase_tolerance(&self, len:usize) -> f64 {
		match self.strategy {
			MixStrategy::Backend => self.backend.tolerance(),
			MixStrategy::Nco{ bits, table_bits } => {
				let quantum = 2.0 * std::f64::consts::PI / 2.0f64.powi(bits as i32);
				let table = table_bits.map(|p| 2.0 * std::f64::consts::PI / 2.0f64.powi(p as i32)).unwrap_or(0.0);
				// Increment rounding accumulates half a count per sample
				quantum * (1.0 + 0.5 * len as f64) + table
			},
		}
	}

}
