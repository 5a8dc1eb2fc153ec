//! Numerically controlled oscillator
//!
//! Phase is held in a `bits`-wide unsigned accumulator that advances by a fixed increment every sample and
//! wraps on overflow, so the oscillator never drifts no matter how long it runs.  The output is either
//! evaluated directly from the accumulator or looked up in a quarter-wave-extended sine table indexed by
//! the top `table_bits` of the accumulator.
//!
//! ```text
//!   accumulator:  |<-- table_bits -->|<------ discarded ------>|
//!                 |      index       |                         |
//!   sin = table[index], cos = table[index + 2^table_bits / 4]
//! ```

use std::f64::consts::PI;

use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::numeric::{real, Real};
use crate::{DigSigProcErr, Result};

pub const DEFAULT_PHASE_BITS:u32 = 32;
pub const DEFAULT_TABLE_BITS:u32 = 6;

const MIN_PHASE_BITS:u32 = 8;
const MAX_PHASE_BITS:u32 = 48;
const MIN_TABLE_BITS:u32 = 2;
const MAX_TABLE_BITS:u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NcoState {
	pub phase: u64,
	pub increment: u64,
}

/// One and a quarter periods of a sine wave, so a cosine is a sine read a quarter period later
#[derive(Debug, Clone)]
pub struct SineTable {
	bits: u32,
	quarter: usize,
	values: Vec<f64>,
}

impl SineTable {

	pub fn new(bits:u32) -> Result<Self> {
		if !(MIN_TABLE_BITS..=MAX_TABLE_BITS).contains(&bits) {
			return Err(DigSigProcErr::Configuration(format!("sine table bits must be within {}..={}, got {}", MIN_TABLE_BITS, MAX_TABLE_BITS, bits)));
		}
		let size = 1usize << bits;
		let values = (0..(5 * size / 4)).map(|k| (2.0 * PI * (k as f64) / (size as f64)).sin()).collect();
		Ok(Self{ bits, quarter: size / 4, values })
	}

	pub fn bits(&self) -> u32 { self.bits }
	pub fn len(&self) -> usize { self.values.len() }
	pub fn is_empty(&self) -> bool { self.values.is_empty() }

	/// (cos, sin) at a table index in `0..2^bits`
	pub fn lookup(&self, idx:usize) -> (f64, f64) { (self.values[idx + self.quarter], self.values[idx]) }

	/// Bound on the phase error introduced by truncating the accumulator to the table index
	pub fn max_phase_error(&self) -> f64 { 2.0 * PI / ((1u64 << self.bits) as f64) }

}

#[derive(Debug, Clone)]
enum Waveform {
	Direct,
	Table(SineTable),
}

#[derive(Debug, Clone)]
pub struct Nco {
	state: NcoState,
	bits: u32,
	sampling_rate: f64,
	waveform: Waveform,
}

impl Nco {

	pub fn new(sampling_rate:f64, frequency:f64, phase:f64) -> Result<Self> {
		Self::with_bits(DEFAULT_PHASE_BITS, sampling_rate, frequency, phase)
	}

	pub fn with_bits(bits:u32, sampling_rate:f64, frequency:f64, phase:f64) -> Result<Self> {
		if !(MIN_PHASE_BITS..=MAX_PHASE_BITS).contains(&bits) {
			return Err(DigSigProcErr::Configuration(format!("NCO accumulator bits must be within {}..={}, got {}", MIN_PHASE_BITS, MAX_PHASE_BITS, bits)));
		}
		if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
			return Err(DigSigProcErr::Configuration(format!("NCO sampling rate must be positive and finite, got {}", sampling_rate)));
		}

		let mut nco = Self{ state: NcoState::default(), bits, sampling_rate, waveform: Waveform::Direct };
		nco.set_frequency(frequency)?;
		nco.set_phase(phase)?;
		Ok(nco)
	}

	/// Switches to table lookup using the top `table_bits` of the accumulator
	pub fn with_table(mut self, table_bits:u32) -> Result<Self> {
		if table_bits > self.bits {
			return Err(DigSigProcErr::Configuration(format!("sine table bits ({}) exceed accumulator bits ({})", table_bits, self.bits)));
		}
		self.waveform = Waveform::Table(SineTable::new(table_bits)?);
		Ok(self)
	}

	fn modulus(&self) -> u64 { 1u64 << self.bits }

	fn to_counts(&self, cycles:f64) -> u64 {
		let modulus = self.modulus() as i128;
		((cycles * self.modulus() as f64).round() as i128).rem_euclid(modulus) as u64
	}

	pub fn bits(&self) -> u32 { self.bits }
	pub fn state(&self) -> NcoState { self.state }
	pub fn sampling_rate(&self) -> f64 { self.sampling_rate }

	pub fn set_frequency(&mut self, frequency:f64) -> Result<()> {
		if !frequency.is_finite() {
			return Err(DigSigProcErr::Configuration(format!("NCO frequency must be finite, got {}", frequency)));
		}
		self.state.increment = self.to_counts(frequency / self.sampling_rate);
		Ok(())
	}

	pub fn set_phase(&mut self, phase:f64) -> Result<()> {
		if !phase.is_finite() {
			return Err(DigSigProcErr::Configuration(format!("NCO phase must be finite, got {}", phase)));
		}
		self.state.phase = self.to_counts(phase / (2.0 * PI));
		Ok(())
	}

	/// The realized frequency after quantization of the increment, in (-fs/2, fs/2]
	pub fn frequency(&self) -> f64 {
		let modulus = self.modulus();
		let signed = if self.state.increment > modulus / 2 { self.state.increment as f64 - modulus as f64 } else { self.state.increment as f64 };
		signed * self.sampling_rate / (modulus as f64)
	}

	/// Current accumulator phase in radians, in [0, 2*pi)
	pub fn phase(&self) -> f64 { 2.0 * PI * (self.state.phase as f64) / (self.modulus() as f64) }

	/// Upper bound on the output phase error relative to the accumulator phase
	pub fn quantization_bound(&self) -> f64 {
		match &self.waveform {
			Waveform::Direct => 2.0 * PI / (self.modulus() as f64),
			Waveform::Table(table) => table.max_phase_error(),
		}
	}

	pub fn output(&self) -> Complex<f64> {
		let (cos, sin) = match &self.waveform {
			Waveform::Direct => {
				let (sin, cos) = self.phase().sin_cos();
				(cos, sin)
			},
			Waveform::Table(table) => table.lookup((self.state.phase >> (self.bits - table.bits())) as usize),
		};
		Complex{ re: cos, im: sin }
	}

	pub fn advance(&mut self, n:u64) {
		let total = self.state.phase as u128 + (self.state.increment as u128) * (n as u128);
		self.state.phase = (total % (self.modulus() as u128)) as u64;
	}

	pub fn step(&mut self) -> Complex<f64> {
		let ans = self.output();
		self.advance(1);
		ans
	}

	/// Multiplies the samples by the oscillator output, continuing from the current phase
	pub fn mix<T: Real>(&mut self, samples:&mut [Complex<T>]) {
		for x in samples.iter_mut() {
			let y = self.step();
			*x *= Complex{ re: real::<T>(y.re), im: real::<T>(y.im) };
		}
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	fn wrapped_phase_error(a:Complex<f64>, b:Complex<f64>) -> f64 { (a * b.conj()).arg().abs() }

	#[test]
	fn direct_output_is_periodic_to_machine_precision() {
		let fs = 4.092e6;
		let mut nco = Nco::new(fs, 1234.0, 0.25).unwrap();
		let f = nco.frequency();
		assert!((f - 1234.0).abs() <= fs / 2.0f64.powi(32));

		for n in 0..100_000u64 {
			let expected = Complex::from_polar(1.0, 2.0 * PI * f * (n as f64) / fs + nco.to_counts(0.25 / (2.0 * PI)) as f64 * 2.0 * PI / 2.0f64.powi(32));
			let actual = nco.step();
			assert!(wrapped_phase_error(actual, expected) < 1.0e-9, "n={}", n);
		}
	}

	#[test]
	fn table_output_is_within_quantization_bound() {
		let mut nco = Nco::new(1.0e6, 31_000.0, 0.0).unwrap().with_table(DEFAULT_TABLE_BITS).unwrap();
		let mut reference = Nco::new(1.0e6, 31_000.0, 0.0).unwrap();
		let bound = nco.quantization_bound();
		assert!((bound - 2.0 * PI / 64.0).abs() < 1.0e-15);

		for _ in 0..10_000 {
			let err = wrapped_phase_error(nco.step(), reference.step());
			assert!(err <= bound + 1.0e-12);
		}
	}

	#[test]
	fn table_has_five_quarter_periods() {
		let table = SineTable::new(6).unwrap();
		assert_eq!(table.len(), 80);
		let (cos, sin) = table.lookup(0);
		assert!((cos - 1.0).abs() < 1.0e-15);
		assert!(sin.abs() < 1.0e-15);
		let (cos, sin) = table.lookup(16);
		assert!(cos.abs() < 1.0e-15);
		assert!((sin - 1.0).abs() < 1.0e-15);
		assert!(SineTable::new(1).is_err());
	}

	#[test]
	fn negative_frequencies_wrap_the_increment() {
		let mut nco = Nco::new(1.0e6, -2500.0, 0.0).unwrap();
		assert!((nco.frequency() + 2500.0).abs() < 1.0e-3);
		assert!(nco.state().increment > 1u64 << 31);

		nco.step();
		let second = nco.step();
		assert!((second.arg() + 2.0 * PI * 2500.0 / 1.0e6).abs() < 1.0e-9);
	}

	#[test]
	fn phase_is_set_in_radians() {
		let mut nco = Nco::new(1.0e6, 0.0, 0.0).unwrap();
		nco.set_phase(-PI / 2.0).unwrap();
		assert!((nco.phase() - 1.5 * PI).abs() < 1.0e-8);
		assert!((nco.output() - Complex::new(0.0, -1.0)).norm() < 1.0e-8);
	}

	#[test]
	fn advance_matches_repeated_steps() {
		let mut a = Nco::with_bits(24, 2.0e6, 777.0, 1.0).unwrap();
		let mut b = a.clone();
		for _ in 0..12345 { a.step(); }
		b.advance(12345);
		assert_eq!(a.state(), b.state());
	}

	#[test]
	fn streaming_mix_continues_across_calls() {
		let mut split = Nco::new(2.0e6, 1500.0, 0.0).unwrap();
		let mut whole = split.clone();

		let mut a = vec![Complex::new(1.0f64, 0.0); 300];
		let mut b = a.clone();
		split.mix(&mut a[..100]);
		split.mix(&mut a[100..]);
		whole.mix(&mut b);
		assert_eq!(a, b);
	}

	#[test]
	fn invalid_configuration_is_rejected() {
		assert!(Nco::with_bits(4, 1.0e6, 0.0, 0.0).is_err());
		assert!(Nco::new(0.0, 0.0, 0.0).is_err());
		assert!(Nco::new(1.0e6, f64::INFINITY, 0.0).is_err());
		assert!(Nco::with_bits(8, 1.0e6, 0.0, 0.0).unwrap().with_table(10).is_err());
	}

}
