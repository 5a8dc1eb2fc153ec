pub mod matched_filter;

pub use matched_filter::{MatchedFilter, MatchedFilterResponse};

pub trait ScalarFilter {

	fn apply(&mut self, x:f64) -> f64;
	fn initialize(&mut self);

}

/// Second-order Costas PLL with a first-order FLL assist.  The output of each update is the change to apply
/// to the carrier frequency (Hz) given a phase error in cycles and a frequency error in cycles per epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierLoopFilter {
	pub k1: f64,
	pub k2: f64,
	pub k3: f64,
	previous_phase_error: f64,
}

impl CarrierLoopFilter {

	pub fn new(pll_bandwidth_hz:f64, fll_bandwidth_hz:f64, pdi:f64) -> Self {
		let wn = pll_bandwidth_hz / 0.53;
		let k2 = 1.414 * wn;
		let k1 = k2 + wn * wn * pdi;
		let k3 = 4.0 * fll_bandwidth_hz * pdi;
		Self{ k1, k2, k3, previous_phase_error: 0.0 }
	}

	pub fn previous_phase_error(&self) -> f64 { self.previous_phase_error }

	pub fn apply_assisted(&mut self, phase_error:f64, frequency_error:f64) -> f64 {
		let ans = self.k1 * phase_error - self.k2 * self.previous_phase_error - self.k3 * frequency_error;
		self.previous_phase_error = phase_error;
		ans
	}

}

impl ScalarFilter for CarrierLoopFilter {

	fn apply(&mut self, phase_error:f64) -> f64 { self.apply_assisted(phase_error, 0.0) }

	fn initialize(&mut self) { self.previous_phase_error = 0.0; }

}

/// Second-order DLL filter.  Each update returns the accumulated code NCO correction in chips/s.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeLoopFilter {
	pub k1: f64,
	pub k2: f64,
	nco: f64,
	previous_error: f64,
}

impl CodeLoopFilter {

	pub fn new(bandwidth_hz:f64, zeta:f64, gain:f64, pdi:f64) -> Self {
		let wn = (bandwidth_hz * 8.0 * zeta) / (4.0 * zeta * zeta + 1.0);
		let tau1 = gain / (wn * wn);
		let tau2 = (2.0 * zeta) / wn;
		Self{ k1: tau2 / tau1, k2: pdi / tau1, nco: 0.0, previous_error: 0.0 }
	}

	pub fn nco(&self) -> f64 { self.nco }

}

impl ScalarFilter for CodeLoopFilter {

	fn apply(&mut self, error:f64) -> f64 {
		self.nco += self.k1 * (error - self.previous_error) + self.k2 * error;
		self.previous_error = error;
		self.nco
	}

	fn initialize(&mut self) {
		self.nco = 0.0;
		self.previous_error = 0.0;
	}

}
