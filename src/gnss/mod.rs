use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Deserialize};

use crate::{DigSigProcErr, Result};

/// Acquisition and tracking shared by every signal type
pub mod common;

pub mod gps_l1_ca;

pub use gps_l1_ca::GpsL1CaProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum System { Gps, Glonass, Galileo, Beidou }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalType { L1Ca, L2Cm, L5I, E1B, B1I, G1 }

impl SignalType {

	pub fn system(&self) -> System {
		match self {
			SignalType::L1Ca | SignalType::L2Cm | SignalType::L5I => System::Gps,
			SignalType::E1B => System::Galileo,
			SignalType::B1I => System::Beidou,
			SignalType::G1  => System::Glonass,
		}
	}

	pub fn carrier_freq_hz(&self) -> f64 {
		match self {
			SignalType::L1Ca | SignalType::E1B => 1575.42e6,
			SignalType::L2Cm => 1227.60e6,
			SignalType::L5I  => 1176.45e6,
			SignalType::B1I  => 1561.098e6,
			SignalType::G1   => 1602.0e6,
		}
	}

	pub fn chip_rate_hz(&self) -> f64 {
		match self {
			SignalType::L1Ca | SignalType::E1B => 1.023e6,
			SignalType::L2Cm => 511.5e3,
			SignalType::L5I  => 10.23e6,
			SignalType::B1I  => 2.046e6,
			SignalType::G1   => 511.0e3,
		}
	}

	pub fn code_length(&self) -> usize {
		match self {
			SignalType::L1Ca => 1023,
			SignalType::L2Cm | SignalType::L5I => 10230,
			SignalType::E1B  => 4092,
			SignalType::B1I  => 2046,
			SignalType::G1   => 511,
		}
	}

	pub fn code_period_s(&self) -> f64 { self.code_length() as f64 / self.chip_rate_hz() }

}

impl fmt::Display for SignalType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SignalType::L1Ca => "L1CA",
			SignalType::L2Cm => "L2CM",
			SignalType::L5I  => "L5I",
			SignalType::E1B  => "E1B",
			SignalType::B1I  => "B1I",
			SignalType::G1   => "G1",
		};
		write!(f, "{}", name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SatelliteId {
	pub system: System,
	pub prn: u16,
	pub signal: SignalType,
}

impl SatelliteId {

	pub fn new(system:System, prn:u16, signal:SignalType) -> Result<Self> {
		if signal.system() != system {
			return Err(DigSigProcErr::Configuration(format!("{} is not broadcast by {:?}", signal, system)));
		}
		Ok(Self{ system, prn, signal })
	}

	pub fn gps_l1ca(prn:u16) -> Self { Self{ system: System::Gps, prn, signal: SignalType::L1Ca } }

}

impl fmt::Display for SatelliteId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let letter = match self.system {
			System::Gps     => 'G',
			System::Glonass => 'R',
			System::Galileo => 'E',
			System::Beidou  => 'C',
		};
		write!(f, "{}{:02} {}", letter, self.prn, self.signal)
	}
}

/// One period of a spreading code as +1/-1 chips (0 for blanked chips)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCode {
	pub satellite: SatelliteId,
	pub chips: Vec<f32>,
}

impl ReferenceCode {

	pub fn new(satellite:SatelliteId, chips:Vec<f32>) -> Result<Self> {
		if chips.is_empty() {
			return Err(DigSigProcErr::EmptyInput("reference code"));
		}
		Ok(Self{ satellite, chips })
	}

	pub fn len(&self) -> usize { self.chips.len() }
	pub fn is_empty(&self) -> bool { self.chips.is_empty() }
	pub fn chip_rate_hz(&self) -> f64 { self.satellite.signal.chip_rate_hz() }
	pub fn period_s(&self) -> f64 { self.len() as f64 / self.chip_rate_hz() }

	/// Number of samples spanning one code period, rounded to the nearest sample
	pub fn samples_per_code(&self, sampling_rate:f64) -> usize { (sampling_rate * self.period_s()).round() as usize }

	/// Chip value at a fractional chip position; positions wrap modulo the code length in both directions
	pub fn value_at(&self, chip_position:f64) -> f32 {
		let idx = (chip_position.floor() as i64).rem_euclid(self.chips.len() as i64) as usize;
		self.chips[idx]
	}

	/// Code upsampled to `sampling_rate` by nearest-chip replication over `duration_ms`, repeating as needed
	pub fn sampled(&self, sampling_rate:f64, duration_ms:usize) -> Vec<f32> {
		let n = (sampling_rate * (duration_ms as f64) / 1000.0).round() as usize;
		let chips_per_sample = self.chip_rate_hz() / sampling_rate;
		(0..n).map(|i| self.value_at((i as f64) * chips_per_sample)).collect()
	}

}

pub trait CodeProvider: Send + Sync {
	fn code(&self, satellite:&SatelliteId) -> Result<ReferenceCode>;
}

/// Codes supplied from outside the crate, such as memory codes loaded from a file
#[derive(Debug, Clone, Default)]
pub struct CodeTable {
	codes: HashMap<SatelliteId, ReferenceCode>,
}

impl CodeTable {

	pub fn new() -> Self { Self::default() }

	pub fn insert(&mut self, code:ReferenceCode) -> Option<ReferenceCode> { self.codes.insert(code.satellite, code) }

	pub fn len(&self) -> usize { self.codes.len() }
	pub fn is_empty(&self) -> bool { self.codes.is_empty() }

}

impl CodeProvider for CodeTable {
	fn code(&self, satellite:&SatelliteId) -> Result<ReferenceCode> {
		self.codes.get(satellite).cloned()
			.ok_or_else(|| DigSigProcErr::Configuration(format!("no reference code available for {}", satellite)))
	}
}
