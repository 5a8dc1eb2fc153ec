use num_complex::Complex;

use crate::fourier_analysis::{Direction, FftPlans};
use crate::numeric::{check_mix_args, real, to_f64, NumericBackend, Real, ScratchPool};
use crate::Result;

/// Reference backend: every sample is computed independently in double precision before being cast
/// back to the sample type.
#[derive(Default)]
pub struct ScalarBackend<T: Real> {
	plans: FftPlans<T>,
	scratch: ScratchPool<T>,
}

impl<T: Real> ScalarBackend<T> {

	pub fn new() -> Self { Self{ plans: FftPlans::new(), scratch: ScratchPool::new() } }

	pub fn scratch_pool(&self) -> &ScratchPool<T> { &self.scratch }

}

impl<T: Real> NumericBackend<T> for ScalarBackend<T> {

	fn name(&self) -> &'static str { "scalar" }

	fn tolerance(&self) -> f64 { to_f64(T::epsilon()).sqrt() }

	fn mix(&self, samples:&mut [Complex<T>], sampling_rate:f64, frequency:f64, phase:f64) -> Result<()> {
		check_mix_args(sampling_rate, frequency, phase)?;
		let cycles_per_sample = frequency / sampling_rate;
		for (i, s) in samples.iter_mut().enumerate() {
			// Reduce to a fraction of a cycle first so long blocks keep full precision
			let theta = 2.0 * std::f64::consts::PI * (cycles_per_sample * (i as f64)).fract() + phase;
			let (sin, cos) = theta.sin_cos();
			*s *= Complex{ re: real::<T>(cos), im: real::<T>(sin) };
		}
		Ok(())
	}

	fn transform(&self, data:&mut [Complex<T>], direction:Direction) -> Result<()> {
		if data.is_empty() { return Ok(()); }

		let plan = self.plans.get(data.len(), direction)?;
		let mut scratch = self.scratch.take(plan.scratch_len())?;
		let result = plan.process(data, &mut scratch);
		self.scratch.give(scratch)?;
		result
	}

}
