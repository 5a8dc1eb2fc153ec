use std::sync::Mutex;

use num_complex::Complex;
use num_traits::Zero;

use crate::numeric::Real;
use crate::{DigSigProcErr, Result};

const MAX_POOLED:usize = 32;

/// Buffers are checked out for the duration of one operation and handed back afterwards, so parallel
/// callers never share scratch space and steady-state processing stops allocating.
#[derive(Debug, Default)]
pub struct ScratchPool<T: Real> {
	free: Mutex<Vec<Vec<Complex<T>>>>,
}

impl<T: Real> ScratchPool<T> {

	pub fn new() -> Self { Self{ free: Mutex::new(vec![]) } }

	/// A zeroed buffer of exactly `len` elements
	pub fn take(&self, len:usize) -> Result<Vec<Complex<T>>> {
		let mut buffer = self.lock()?.pop().unwrap_or_default();
		buffer.clear();
		buffer.resize(len, Complex::zero());
		Ok(buffer)
	}

	pub fn give(&self, buffer:Vec<Complex<T>>) -> Result<()> {
		let mut free = self.lock()?;
		if free.len() < MAX_POOLED { free.push(buffer); }
		Ok(())
	}

	pub fn pooled(&self) -> usize {
		self.free.lock().map(|free| free.len()).unwrap_or(0)
	}

	fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Vec<Complex<T>>>>> {
		self.free.lock().map_err(|_| DigSigProcErr::Backend("scratch pool lock poisoned".into()))
	}

}
