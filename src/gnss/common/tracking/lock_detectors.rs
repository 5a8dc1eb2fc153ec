use std::collections::VecDeque;

use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::config::LockMonitorConfig;

/// Signal-to-noise-variance C/N0 estimate in dB-Hz from a window of prompt correlations
pub fn cn0_svn_estimator(prompt_buffer:&VecDeque<Complex<f64>>, coh_integration_time_s:f64) -> f64 {
	let n:f64 = prompt_buffer.len() as f64;
	let p_sig:f64 = {
		let sum:f64 = prompt_buffer.iter().map(|c| c.re.abs()).sum();
		(sum / n).powi(2)
	};
	let p_tot:f64 = {
		let sum:f64 = prompt_buffer.iter().map(|c| c.norm_sqr()).sum();
		sum / n
	};
	if p_tot - p_sig <= 0.0 { return f64::INFINITY; }
	let snr = p_sig / (p_tot - p_sig);
	10.0 * snr.log10() - 10.0 * coh_integration_time_s.log10()
}

/// Normalized narrow-band difference; approaches 1 when the prompt energy sits in the in-phase arm
pub fn carrier_lock_detector(prompt_buffer:&VecDeque<Complex<f64>>) -> f64 {
	let tmp_sum_i:f64 = prompt_buffer.iter().map(|c| c.re).sum();
	let tmp_sum_q:f64 = prompt_buffer.iter().map(|c| c.im).sum();
	let nbp:f64 = tmp_sum_i * tmp_sum_i + tmp_sum_q * tmp_sum_q;
	let nbd:f64 = tmp_sum_i * tmp_sum_i - tmp_sum_q * tmp_sum_q;
	if nbp > 0.0 { nbd / nbp } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockStatistics {
	pub cn0_db_hz: f64,
	pub carrier_lock: f64,
}

/// Sliding-window lock quality check.  Each failed window adds one to a counter and each good window
/// takes one away; lock is declared lost once the counter exceeds the configured limit.
#[derive(Debug, Clone)]
pub struct LockMonitor {
	config: LockMonitorConfig,
	coh_integration_time_s: f64,
	prompt_buffer: VecDeque<Complex<f64>>,
	fail_count: usize,
	last: Option<LockStatistics>,
}

impl LockMonitor {

	pub fn new(config:LockMonitorConfig, coh_integration_time_s:f64) -> Self {
		let prompt_buffer = VecDeque::with_capacity(config.window_epochs + 1);
		Self{ config, coh_integration_time_s, prompt_buffer, fail_count: 0, last: None }
	}

	pub fn fail_count(&self) -> usize { self.fail_count }
	pub fn last_statistics(&self) -> Option<LockStatistics> { self.last }
	pub fn is_lost(&self) -> bool { self.fail_count > self.config.fail_limit }

	/// Adds one prompt value and returns whether the channel is still considered locked
	pub fn update(&mut self, prompt:Complex<f64>) -> bool {
		self.prompt_buffer.push_back(prompt);
		while self.prompt_buffer.len() > self.config.window_epochs { self.prompt_buffer.pop_front(); }

		if self.prompt_buffer.len() == self.config.window_epochs {
			let stats = LockStatistics{
				cn0_db_hz: cn0_svn_estimator(&self.prompt_buffer, self.coh_integration_time_s),
				carrier_lock: carrier_lock_detector(&self.prompt_buffer),
			};
			let pass = stats.carrier_lock >= self.config.carrier_lock_threshold && stats.cn0_db_hz >= self.config.cn0_threshold_db_hz;

			if !pass { self.fail_count += 1; }
			else if self.fail_count > 0 { self.fail_count -= 1; }
			self.last = Some(stats);
		}

		!self.is_lost()
	}

	pub fn reset(&mut self) {
		self.prompt_buffer.clear();
		self.fail_count = 0;
		self.last = None;
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use rand_distr::{Distribution, Normal};

	fn noise(n:usize, seed:u64) -> Vec<Complex<f64>> {
		let mut rng = StdRng::seed_from_u64(seed);
		let normal = Normal::new(0.0, 1.0).unwrap();
		(0..n).map(|_| Complex::new(normal.sample(&mut rng), normal.sample(&mut rng))).collect()
	}

	#[test]
	fn estimators_on_known_prompts() {
		let clean:VecDeque<Complex<f64>> = (0..20).map(|k| Complex::new(if k % 3 == 0 { -100.0 } else { 100.0 }, 0.0)).collect();
		assert_eq!(cn0_svn_estimator(&clean, 0.001), f64::INFINITY);
		assert!((carrier_lock_detector(&clean) - 1.0).abs() < 1.0e-12);

		let quadrature:VecDeque<Complex<f64>> = (0..20).map(|_| Complex::new(0.0, 100.0)).collect();
		assert!((carrier_lock_detector(&quadrature) + 1.0).abs() < 1.0e-12);

		let mixed:VecDeque<Complex<f64>> = (0..20).map(|k| Complex::new(10.0, if k % 2 == 0 { 1.0 } else { -1.0 })).collect();
		// p_sig = 100, p_tot = 101
		assert!((cn0_svn_estimator(&mixed, 0.001) - 50.0).abs() < 1.0e-9);

		assert_eq!(carrier_lock_detector(&VecDeque::new()), 0.0);
	}

	#[test]
	fn noise_alone_is_below_cn0_threshold() {
		let window:VecDeque<Complex<f64>> = noise(2000, 3).into_iter().collect();
		// 2/pi / (2 - 2/pi) over 1 ms is about 26.7 dB-Hz
		let cn0 = cn0_svn_estimator(&window, 0.001);
		assert!(cn0 > 25.0 && cn0 < 28.5, "{}", cn0);
	}

	#[test]
	fn monitor_holds_lock_on_clean_prompts() {
		let mut monitor = LockMonitor::new(LockMonitorConfig::default(), 0.001);
		for _ in 0..500 { assert!(monitor.update(Complex::new(1000.0, 1.0))); }
		assert_eq!(monitor.fail_count(), 0);
		assert!(monitor.last_statistics().unwrap().cn0_db_hz > 60.0);
	}

	#[test]
	fn monitor_declares_loss_after_fail_limit() {
		let config = LockMonitorConfig::default();
		let mut monitor = LockMonitor::new(config.clone(), 0.001);
		let mut lost_at = None;
		for (k, p) in noise(500, 11).into_iter().enumerate() {
			if !monitor.update(p) { lost_at = Some(k); break; }
		}
		let k = lost_at.unwrap();
		assert!(k > config.window_epochs + config.fail_limit - 2 && k < 200, "lost at {}", k);

		monitor.reset();
		assert!(!monitor.is_lost());
		assert!(monitor.last_statistics().is_none());
	}

}
