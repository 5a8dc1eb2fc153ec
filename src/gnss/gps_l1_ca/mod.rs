//! GPS L1 C/A Gold codes
//!
//! ```text
//!   G1: x^10 + x^3 + 1                         (feedback from stages 3, 10)
//!   G2: x^10 + x^9 + x^8 + x^6 + x^3 + x^2 + 1 (feedback from stages 2, 3, 6, 8, 9, 10)
//!   chip = G1[10] ^ G2[a] ^ G2[b]              (a, b selected per PRN)
//! ```

use crate::gnss::{CodeProvider, ReferenceCode, SatelliteId, SignalType, System};
use crate::{DigSigProcErr, Result};

pub const CODE_LENGTH:usize = 1023;

// G2 phase selector taps, 1-based, for PRN 1 through 32
const G2_TAPS:[(usize, usize); 32] = [
	(2, 6), (3, 7), (4, 8), (5, 9), (1, 9), (2, 10), (1, 8), (2, 9),
	(3, 10), (2, 3), (3, 4), (5, 6), (6, 7), (7, 8), (8, 9), (9, 10),
	(1, 4), (2, 5), (3, 6), (4, 7), (5, 8), (6, 9), (1, 3), (4, 6),
	(5, 7), (6, 8), (7, 9), (8, 10), (1, 6), (2, 7), (3, 8), (4, 9),
];

/// Code bits as 0/1, first chip first
pub fn prn_bits(prn:u16) -> Result<Vec<u8>> {
	if !(1..=32).contains(&prn) {
		return Err(DigSigProcErr::Configuration(format!("GPS L1 C/A PRN must be within 1..=32, got {}", prn)));
	}
	let (a, b) = G2_TAPS[(prn - 1) as usize];

	let mut g1 = [1u8; 10];
	let mut g2 = [1u8; 10];
	let mut bits = Vec::with_capacity(CODE_LENGTH);

	for _ in 0..CODE_LENGTH {
		bits.push(g1[9] ^ g2[a - 1] ^ g2[b - 1]);

		let g1_fb = g1[2] ^ g1[9];
		let g2_fb = g2[1] ^ g2[2] ^ g2[5] ^ g2[7] ^ g2[8] ^ g2[9];
		g1.rotate_right(1);
		g2.rotate_right(1);
		g1[0] = g1_fb;
		g2[0] = g2_fb;
	}

	Ok(bits)
}

/// Code chips as +1.0 (bit 0) and -1.0 (bit 1)
pub fn prn_chips(prn:u16) -> Result<Vec<f32>> {
	Ok(prn_bits(prn)?.into_iter().map(|b| if b == 0 { 1.0 } else { -1.0 }).collect())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GpsL1CaProvider;

impl CodeProvider for GpsL1CaProvider {
	fn code(&self, satellite:&SatelliteId) -> Result<ReferenceCode> {
		if satellite.system != System::Gps || satellite.signal != SignalType::L1Ca {
			return Err(DigSigProcErr::Configuration(format!("no built-in code generator for {}", satellite)));
		}
		ReferenceCode::new(*satellite, prn_chips(satellite.prn)?)
	}
}
