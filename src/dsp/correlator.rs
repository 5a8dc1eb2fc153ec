use std::sync::Arc;

use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::gnss::ReferenceCode;
use crate::numeric::{complex_to_f64, real, NumericBackend, Real};
use crate::{DigSigProcErr, Result};

/// Where the local replica sits relative to the first sample of a block: sample `i` reads the chip at
/// position `start_chip + i*chips_per_sample`, taken modulo the code length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplicaTiming {
	pub start_chip: f64,
	pub chips_per_sample: f64,
}

impl ReplicaTiming {
	pub fn chip_at(&self, i:usize) -> f64 { self.start_chip + (i as f64) * self.chips_per_sample }
}

/// Early, prompt, and late correlator outputs for one block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Epl {
	pub early: Complex<f64>,
	pub prompt: Complex<f64>,
	pub late: Complex<f64>,
}

impl Epl {

	/// Normalized early-minus-late envelope discriminator.  Zero when both arms are empty.
	pub fn code_discriminator(&self) -> f64 {
		let e = self.early.norm();
		let l = self.late.norm();
		if e + l > 0.0 { (e - l) / (e + l) } else { 0.0 }
	}

}

/// Builds early/prompt/late code replicas and correlates a wiped-off block against them.  The replica
/// buffers are owned by the correlator so steady-state tracking allocates nothing.
pub struct EplCorrelator<T: Real> {
	backend: Arc<dyn NumericBackend<T>>,
	spacing_chips: f64,
	early: Vec<T>,
	prompt: Vec<T>,
	late: Vec<T>,
}

impl<T: Real> EplCorrelator<T> {

	pub fn new(backend:Arc<dyn NumericBackend<T>>, spacing_chips:f64) -> Result<Self> {
		if !(spacing_chips.is_finite() && spacing_chips > 0.0 && spacing_chips < 1.0) {
			return Err(DigSigProcErr::Configuration(format!("early-late spacing must be within (0, 1) chips, got {}", spacing_chips)));
		}
		Ok(Self{ backend, spacing_chips, early: vec![], prompt: vec![], late: vec![] })
	}

	pub fn spacing_chips(&self) -> f64 { self.spacing_chips }

	fn fill_replicas(&mut self, code:&ReferenceCode, timing:ReplicaTiming, n:usize) {
		for buffer in [&mut self.early, &mut self.prompt, &mut self.late] {
			buffer.clear();
			buffer.reserve(n);
		}

		for i in 0..n {
			let chip = timing.chip_at(i);
			self.early.push(real(code.value_at(chip - self.spacing_chips) as f64));
			self.prompt.push(real(code.value_at(chip) as f64));
			self.late.push(real(code.value_at(chip + self.spacing_chips) as f64));
		}
	}

	pub fn correlate(&mut self, signal:&[Complex<T>], code:&ReferenceCode, timing:ReplicaTiming) -> Result<Epl> {
		self.fill_replicas(code, timing, signal.len());
		Ok(Epl{
			early:  complex_to_f64(self.backend.correlate(signal, &self.early)?),
			prompt: complex_to_f64(self.backend.correlate(signal, &self.prompt)?),
			late:   complex_to_f64(self.backend.correlate(signal, &self.late)?),
		})
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gnss::{CodeProvider, GpsL1CaProvider, SatelliteId};
	use crate::numeric::{make_backend, BackendKind};

	fn sampled(code:&ReferenceCode, timing:ReplicaTiming, n:usize) -> Vec<Complex<f64>> {
		(0..n).map(|i| Complex::new(code.value_at(timing.chip_at(i)) as f64, 0.0)).collect()
	}

	#[test]
	fn aligned_replica_is_balanced() {
		let code = GpsL1CaProvider.code(&SatelliteId::gps_l1ca(3)).unwrap();
		let timing = ReplicaTiming{ start_chip: 0.0, chips_per_sample: 0.25 };
		let signal = sampled(&code, timing, 4092);

		let mut correlator = EplCorrelator::new(make_backend(BackendKind::Scalar), 0.5).unwrap();
		let epl = correlator.correlate(&signal, &code, timing).unwrap();
		assert!((epl.prompt.re - 4092.0).abs() < 1.0e-9);
		assert!(epl.code_discriminator().abs() < 1.0e-9);
		assert!(epl.early.norm() < epl.prompt.norm());
	}

	#[test]
	fn discriminator_sign_follows_code_offset() {
		let code = GpsL1CaProvider.code(&SatelliteId::gps_l1ca(3)).unwrap();
		let local = ReplicaTiming{ start_chip: 0.0, chips_per_sample: 0.25 };
		let mut correlator = EplCorrelator::new(make_backend(BackendKind::Scalar), 0.5).unwrap();

		// Incoming code a quarter chip behind the local replica
		let delayed = sampled(&code, ReplicaTiming{ start_chip: -0.25, ..local }, 4092);
		assert!(correlator.correlate(&delayed, &code, local).unwrap().code_discriminator() > 0.0);

		let advanced = sampled(&code, ReplicaTiming{ start_chip: 0.25, ..local }, 4092);
		assert!(correlator.correlate(&advanced, &code, local).unwrap().code_discriminator() < 0.0);
	}

	#[test]
	fn empty_arms_give_zero_discriminator() {
		assert_eq!(Epl::default().code_discriminator(), 0.0);
	}

	#[test]
	fn spacing_is_validated() {
		assert!(EplCorrelator::<f64>::new(make_backend(BackendKind::Scalar), 0.0).is_err());
		assert!(EplCorrelator::<f64>::new(make_backend(BackendKind::Scalar), 1.5).is_err());
	}

}
