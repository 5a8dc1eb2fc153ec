//! Synthetic GNSS baseband
//!
//! Samples are generated on demand, so arbitrarily long scenarios cost no memory.  For a satellite with
//! Doppler `fd`, code phase `tau` (samples) and carrier phase `theta`, sample `n` is
//!
//! ```text
//!   a * code((n*fc - tau*f0) / fs) * exp(j(2*pi*(fif + fd)*n/fs + theta))
//!   fc = f0 * (1 + fd / carrier)
//! ```
//!
//! where `f0` is the nominal chip rate.  Optional complex Gaussian noise is seeded from the block start,
//! so reading the same range twice returns the same samples.

use num_complex::Complex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Serialize, Deserialize};

use crate::gnss::{ReferenceCode, SatelliteId};
use crate::io::{check_bounds, SampleBlock, SampleSource};
use crate::numeric::{real, Real};
use crate::{DigSigProcErr, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSatellite {
	pub code: ReferenceCode,
	pub doppler_hz: f64,
	pub code_phase_samples: f64,
	pub carrier_phase_rad: f64,
	pub amplitude: f64,
}

impl SyntheticSatellite {

	pub fn new(code:ReferenceCode, doppler_hz:f64, code_phase_samples:f64) -> Self {
		Self{ code, doppler_hz, code_phase_samples, carrier_phase_rad: 0.0, amplitude: 1.0 }
	}

	pub fn with_carrier_phase(mut self, carrier_phase_rad:f64) -> Self { self.carrier_phase_rad = carrier_phase_rad; self }
	pub fn with_amplitude(mut self, amplitude:f64) -> Self { self.amplitude = amplitude; self }

	pub fn satellite(&self) -> SatelliteId { self.code.satellite }

	pub fn code_frequency_hz(&self) -> f64 {
		let signal = self.code.satellite.signal;
		signal.chip_rate_hz() * (1.0 + self.doppler_hz / signal.carrier_freq_hz())
	}

	fn sample(&self, n:usize, sampling_rate:f64, intermediate_frequency:f64) -> Complex<f64> {
		let chip = ((n as f64) * self.code_frequency_hz() - self.code_phase_samples * self.code.chip_rate_hz()) / sampling_rate;
		let cycles = ((intermediate_frequency + self.doppler_hz) * (n as f64) / sampling_rate).fract();
		let theta = 2.0 * std::f64::consts::PI * cycles + self.carrier_phase_rad;
		Complex::from_polar(self.amplitude * self.code.value_at(chip) as f64, theta)
	}

}

#[derive(Debug, Clone)]
pub struct SyntheticSignal {
	sampling_rate: f64,
	intermediate_frequency: f64,
	len_samples: usize,
	satellites: Vec<SyntheticSatellite>,
	noise_sigma: f64,
	seed: u64,
}

impl SyntheticSignal {

	pub fn new(sampling_rate:f64, intermediate_frequency:f64, duration_ms:usize) -> Result<Self> {
		if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
			return Err(DigSigProcErr::Configuration(format!("sampling rate must be positive and finite, got {}", sampling_rate)));
		}
		if !intermediate_frequency.is_finite() {
			return Err(DigSigProcErr::Configuration(format!("intermediate frequency must be finite, got {}", intermediate_frequency)));
		}
		let len_samples = (sampling_rate / 1000.0).round() as usize * duration_ms;
		Ok(Self{ sampling_rate, intermediate_frequency, len_samples, satellites: vec![], noise_sigma: 0.0, seed: 0 })
	}

	pub fn with_satellite(mut self, satellite:SyntheticSatellite) -> Self {
		self.satellites.push(satellite);
		self
	}

	/// Adds circular complex Gaussian noise with standard deviation `sigma` per component
	pub fn with_noise(mut self, sigma:f64, seed:u64) -> Result<Self> {
		if !(sigma.is_finite() && sigma >= 0.0) {
			return Err(DigSigProcErr::Configuration(format!("noise sigma must be non-negative and finite, got {}", sigma)));
		}
		self.noise_sigma = sigma;
		self.seed = seed;
		Ok(self)
	}

	pub fn satellites(&self) -> &[SyntheticSatellite] { &self.satellites }
	pub fn intermediate_frequency(&self) -> f64 { self.intermediate_frequency }

}

impl<T: Real> SampleSource<T> for SyntheticSignal {

	fn sampling_rate(&self) -> f64 { self.sampling_rate }

	fn len_samples(&self) -> usize { self.len_samples }

	fn read_samples(&self, start:usize, count:usize) -> Result<SampleBlock<T>> {
		check_bounds(start, count, self.len_samples)?;

		let mut samples:Vec<Complex<f64>> = (start..start + count).map(|n| {
			self.satellites.iter().fold(Complex::new(0.0, 0.0), |acc, sat| acc + sat.sample(n, self.sampling_rate, self.intermediate_frequency))
		}).collect();

		if self.noise_sigma > 0.0 {
			let normal = Normal::new(0.0, self.noise_sigma).map_err(|e| DigSigProcErr::Configuration(e.to_string()))?;
			let mut rng = StdRng::seed_from_u64(self.seed ^ (start as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
			for s in samples.iter_mut() {
				*s += Complex::new(normal.sample(&mut rng), normal.sample(&mut rng));
			}
		}

		let samples = samples.into_iter().map(|s| Complex{ re: real::<T>(s.re), im: real::<T>(s.im) }).collect();
		Ok(SampleBlock::new(samples, self.sampling_rate, start))
	}

}
