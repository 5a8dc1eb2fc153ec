use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use num_complex::Complex;
use num_traits::Zero;
use rustfft::{Fft, FftDirection, FftPlanner};
use serde::{Serialize, Deserialize};

use crate::numeric::{Real, real};
use crate::{DigSigProcErr, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction { Forward, Inverse }

impl Direction {

	fn fft_direction(self) -> FftDirection {
		match self {
			Direction::Forward => FftDirection::Forward,
			Direction::Inverse => FftDirection::Inverse,
		}
	}

}

/// A planned transform of one fixed length.  Any length is accepted; the inverse is scaled by 1/n so that
/// a forward transform followed by an inverse one reproduces the input.
#[derive(Clone)]
pub struct FftPlan<T: Real> {
	n: usize,
	direction: Direction,
	fft: Arc<dyn Fft<T>>,
}

impl<T: Real> fmt::Debug for FftPlan<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FftPlan").field("n", &self.n).field("direction", &self.direction).finish()
	}
}

impl<T: Real> FftPlan<T> {

	pub fn new(n:usize, direction:Direction) -> Result<Self> {
		if n == 0 {
			return Err(DigSigProcErr::Configuration("cannot plan a zero-length transform".into()));
		}
		let mut planner = FftPlanner::<T>::new();
		let fft = planner.plan_fft(n, direction.fft_direction());
		Ok(Self{ n, direction, fft })
	}

	pub fn len(&self) -> usize { self.n }
	pub fn is_empty(&self) -> bool { self.n == 0 }
	pub fn direction(&self) -> Direction { self.direction }
	pub fn scratch_len(&self) -> usize { self.fft.get_inplace_scratch_len() }

	pub fn process(&self, data:&mut [Complex<T>], scratch:&mut [Complex<T>]) -> Result<()> {
		if data.len() != self.n {
			return Err(DigSigProcErr::SizeMismatch{ expected: self.n, actual: data.len() });
		}
		if scratch.len() < self.scratch_len() {
			return Err(DigSigProcErr::SizeMismatch{ expected: self.scratch_len(), actual: scratch.len() });
		}

		self.fft.process_with_scratch(data, scratch);

		if self.direction == Direction::Inverse {
			let scale:T = real(1.0 / (self.n as f64));
			for x in data.iter_mut() { *x = x.scale(scale); }
		}
		Ok(())
	}

	/// Out-of-place convenience wrapper that allocates its own scratch space
	pub fn execute(&self, input:&[Complex<T>]) -> Result<Vec<Complex<T>>> {
		let mut output = input.to_vec();
		let mut scratch = vec![Complex::zero(); self.scratch_len()];
		self.process(&mut output, &mut scratch)?;
		Ok(output)
	}

}

/// Plans are expensive to build and immutable once built, so they are cached per (length, direction)
/// and shared between threads.
#[derive(Default)]
pub struct FftPlans<T: Real> {
	plans: Mutex<HashMap<(usize, Direction), FftPlan<T>>>,
}

impl<T: Real> FftPlans<T> {

	pub fn new() -> Self { Self{ plans: Mutex::new(HashMap::new()) } }

	pub fn get(&self, n:usize, direction:Direction) -> Result<FftPlan<T>> {
		let mut plans = self.plans.lock().map_err(|_| DigSigProcErr::Backend("FFT plan cache lock poisoned".into()))?;
		if let Some(plan) = plans.get(&(n, direction)) {
			return Ok(plan.clone());
		}

		let plan = FftPlan::new(n, direction)?;
		tracing::trace!(n, ?direction, "planned transform");
		plans.insert((n, direction), plan.clone());
		Ok(plan)
	}

	pub fn cached(&self) -> usize {
		self.plans.lock().map(|plans| plans.len()).unwrap_or(0)
	}

}
