use super::*;
use crate::config::AcquisitionConfig;
use crate::dsp::MixStrategy;
use crate::gnss::GpsL1CaProvider;
use crate::gnss::common::acquisition::AcquisitionEngine;
use crate::fourier_analysis::Direction;
use crate::numeric::{make_backend, BackendKind, ScalarBackend};
use crate::observer::testing::CountingObserver;
use crate::synth::{SyntheticSatellite, SyntheticSignal};

const FS:f64 = 2.046e6;
const SPC:f64 = 2046.0;

fn code(prn:u16) -> ReferenceCode { GpsL1CaProvider.code(&SatelliteId::gps_l1ca(prn)).unwrap() }

fn seed(prn:u16, doppler_hz:f64, code_phase:usize) -> AcquisitionResult {
	AcquisitionResult{
		satellite: SatelliteId::gps_l1ca(prn),
		doppler_hz,
		doppler_step_hz: 250.0,
		code_phase,
		sample_idx: 0,
		level: 1.0,
		noise_mean: 0.0,
		sigma: 0.0,
		intermediate_frequency_hz: 0.0,
		sampling_rate_hz: FS,
		mf_len: 8184,
		input_power_total: 1.0,
	}
}

/// Wrapped distance between two code phases, in samples
fn code_phase_distance(a:f64, b:f64) -> f64 {
	let d = (a - b).rem_euclid(SPC);
	d.min(SPC - d)
}

fn expected_code_phase(code_phase:f64, doppler_hz:f64, sample_idx:usize) -> f64 {
	(code_phase - (sample_idx as f64) * doppler_hz / 1575.42e6).rem_euclid(SPC)
}

#[test]
fn acquire_then_track_converges() {
	let src = SyntheticSignal::new(FS, 0.0, 1000).unwrap()
		.with_satellite(SyntheticSatellite::new(code(7), 1500.0, 700.0).with_carrier_phase(0.2));
	let backend = make_backend::<f64>(BackendKind::Scalar);

	let results = AcquisitionEngine::new(FS, 0.0, AcquisitionConfig::default(), backend.clone()).unwrap()
		.acquire(&src, &[code(7)]).unwrap();
	assert_eq!(results[0].doppler_hz, 1500.0);
	assert!((results[0].code_phase as i64 - 700).abs() <= 1);

	let mut tracker = Tracker::from_acquisitions(&results, &GpsL1CaProvider, TrackingConfig::default().without_lock_monitor(), backend).unwrap();
	assert_eq!(tracker.run(&src, None).unwrap(), 1000);
	assert_eq!(tracker.epoch(), 1000);

	let (satellite, history) = tracker.into_histories().remove(0);
	assert_eq!(satellite, SatelliteId::gps_l1ca(7));
	assert_eq!(history.len(), 1000);
	assert_eq!(history.prompt.len(), 1000);
	assert_eq!(history.code_frequency.len(), 1000);

	for k in 200..1000 {
		assert!(history.phase_residual[k].abs() < 0.01, "epoch {}: phase residual {}", k, history.phase_residual[k]);
		assert!(history.code_residual[k].abs() < 0.1, "epoch {}: code residual {}", k, history.code_residual[k]);
		assert!((history.carrier_frequency[k] - 1500.0).abs() < 1.0, "epoch {}: {} Hz", k, history.carrier_frequency[k]);
		let expected = expected_code_phase(700.0, 1500.0, history.sample_idx[k]);
		assert!(code_phase_distance(history.code_phase[k], expected) < 1.0, "epoch {}: code phase {} vs {}", k, history.code_phase[k], expected);
	}
	assert!(history.state.iter().all(|s| *s == ChannelState::Tracking));
}

#[test]
fn fll_pulls_in_a_frequency_offset() {
	let src = SyntheticSignal::new(FS, 0.0, 1000).unwrap()
		.with_satellite(SyntheticSatellite::new(code(21), 1000.0, 1500.0).with_carrier_phase(2.0));
	let config = TrackingConfig::default().without_lock_monitor();
	let mut channel = TrackingChannel::<f64>::new(&seed(21, 1040.0, 1500), code(21), &config, make_backend(BackendKind::Scalar)).unwrap();

	for k in 0..1000 {
		let block:SampleBlock<f64> = src.read(k, 1).unwrap();
		let m = channel.update(&block).unwrap();
		assert_eq!(m.epoch, k);
		assert!(m.carrier_frequency.is_finite() && m.code_frequency.is_finite());
	}

	let history = channel.history();
	for k in 500..1000 {
		assert!(history.phase_residual[k].abs() < 0.01, "epoch {}: phase residual {}", k, history.phase_residual[k]);
		assert!((history.carrier_frequency[k] - 1000.0).abs() < 1.0, "epoch {}: {} Hz", k, history.carrier_frequency[k]);
		assert!(history.code_residual[k].abs() < 0.1);
	}
	assert!((channel.doppler_hz() - 1000.0).abs() < 1.0);
	assert!(channel.carrier_phase_rad() > 0.0);
}

#[test]
fn converges_within_200_epochs_with_the_fll_term_every_epoch() {
	let src = SyntheticSignal::new(FS, 0.0, 1000).unwrap()
		.with_satellite(SyntheticSatellite::new(code(14), -800.0, 400.0).with_carrier_phase(1.0));
	let config = TrackingConfig::default().without_lock_monitor();
	let mut channel = TrackingChannel::<f64>::new(&seed(14, -780.0, 400), code(14), &config, make_backend(BackendKind::Scalar)).unwrap();

	for k in 0..1000 {
		let block:SampleBlock<f64> = src.read(k, 1).unwrap();
		channel.update(&block).unwrap();
	}

	let history = channel.history();
	assert!(history.frequency_residual[21..60].iter().any(|f| *f != 0.0));
	for k in 200..1000 {
		assert!(history.phase_residual[k].abs() < 0.01, "epoch {}: phase residual {}", k, history.phase_residual[k]);
		assert!(history.code_residual[k].abs() < 0.1, "epoch {}: code residual {}", k, history.code_residual[k]);
		assert!((history.carrier_frequency[k] + 800.0).abs() < 1.0, "epoch {}: {} Hz", k, history.carrier_frequency[k]);
		assert!(history.frequency_residual[k].abs() < 1.0e-3, "epoch {}: frequency residual {}", k, history.frequency_residual[k]);
	}
}

#[test]
fn reported_carrier_phase_is_nco_phase_plus_residual() {
	let src = SyntheticSignal::new(FS, 0.0, 50).unwrap()
		.with_satellite(SyntheticSatellite::new(code(17), 300.0, 10.0).with_carrier_phase(0.5));
	let config = TrackingConfig::default().without_lock_monitor();
	let mut channel = TrackingChannel::<f64>::new(&seed(17, 300.0, 10), code(17), &config, make_backend(BackendKind::Scalar)).unwrap();

	for k in 0..50 {
		let nco_phase = channel.carrier_phase_rad();
		let frequency = channel.carrier_frequency_hz();
		let block:SampleBlock<f64> = src.read(k, 1).unwrap();
		let m = channel.update(&block).unwrap();
		assert!((m.carrier_phase - (nco_phase + 2.0 * PI * m.phase_residual)).abs() < 1.0e-9);
		// The NCO itself only integrates frequency
		assert!((channel.carrier_phase_rad() - (nco_phase + 2.0 * PI * frequency * SPC / FS)).abs() < 1.0e-9);
	}
}

#[test]
fn nco_mixing_and_single_precision_track_too() {
	let src = SyntheticSignal::new(FS, 0.0, 400).unwrap()
		.with_satellite(SyntheticSatellite::new(code(9), -2000.0, 50.0));

	let nco_config = TrackingConfig{ mix_strategy: MixStrategy::nco(), ..TrackingConfig::default().without_lock_monitor() };
	let mut nco_channel = TrackingChannel::<f64>::new(&seed(9, -2000.0, 50), code(9), &nco_config, make_backend(BackendKind::Scalar)).unwrap();

	let config = TrackingConfig::default().without_lock_monitor();
	let mut f32_channel = TrackingChannel::<f32>::new(&seed(9, -2000.0, 50), code(9), &config, make_backend(BackendKind::Vectorized)).unwrap();

	for k in 0..400 {
		let block64:SampleBlock<f64> = src.read(k, 1).unwrap();
		let block32:SampleBlock<f32> = src.read(k, 1).unwrap();
		nco_channel.update(&block64).unwrap();
		f32_channel.update(&block32).unwrap();
	}

	for channel_history in [nco_channel.history(), f32_channel.history()] {
		for k in 200..400 {
			assert!(channel_history.phase_residual[k].abs() < 0.02, "epoch {}: {}", k, channel_history.phase_residual[k]);
			assert!((channel_history.carrier_frequency[k] + 2000.0).abs() < 2.0);
		}
	}
}

#[test]
fn clean_signal_keeps_lock() {
	let src = SyntheticSignal::new(FS, 0.0, 500).unwrap()
		.with_satellite(SyntheticSatellite::new(code(2), 500.0, 1000.0).with_carrier_phase(0.2))
		.with_noise(0.1, 5).unwrap();
	let mut tracker = Tracker::<f64>::new(TrackingConfig::default(), make_backend(BackendKind::Scalar)).unwrap();
	tracker.add_channel(&seed(2, 500.0, 1000), code(2)).unwrap();

	assert_eq!(tracker.run(&src, None).unwrap(), 500);
	assert!(tracker.lost_satellites().is_empty());

	let channel = tracker.channel(&SatelliteId::gps_l1ca(2)).unwrap();
	assert_eq!(channel.state(), ChannelState::Tracking);
	let stats = channel.lock_statistics().unwrap();
	assert!(stats.cn0_db_hz > 50.0 && stats.carrier_lock > 0.95, "{:?}", stats);
}

#[test]
fn noise_loses_lock_and_reseed_recovers() {
	let noise = SyntheticSignal::new(FS, 0.0, 400).unwrap().with_noise(1.0, 99).unwrap();
	let observer = Arc::new(CountingObserver::default());
	let mut tracker = Tracker::<f64>::new(TrackingConfig::default(), make_backend(BackendKind::Scalar)).unwrap()
		.with_observer(observer.clone());
	tracker.add_channel(&seed(13, 0.0, 0), code(13)).unwrap();

	let processed = tracker.run(&noise, None).unwrap();
	assert!(processed < 200, "processed {}", processed);
	assert_eq!(tracker.lost_satellites(), vec![SatelliteId::gps_l1ca(13)]);
	assert_eq!(*observer.lost.lock().unwrap(), vec![SatelliteId::gps_l1ca(13)]);
	assert_eq!(*observer.epochs.lock().unwrap(), processed);

	let channel = tracker.channel(&SatelliteId::gps_l1ca(13)).unwrap();
	assert_eq!(channel.history().len(), processed);
	assert_eq!(channel.history().state.last(), Some(&ChannelState::LostLock));

	// Lost channels are skipped rather than updated
	let block:SampleBlock<f64> = noise.read(processed, 1).unwrap();
	assert!(tracker.step(&block).unwrap().is_empty());

	tracker.reseed(&seed(13, 250.0, 10), code(13)).unwrap();
	assert!(tracker.lost_satellites().is_empty());
	assert_eq!(tracker.channels().len(), 1);
	assert_eq!(tracker.channel(&SatelliteId::gps_l1ca(13)).unwrap().history().len(), 0);
	assert_eq!(tracker.step(&block).unwrap().len(), 1);
}

/// Scalar backend that refuses to mix above a frequency limit
struct MixLimit {
	inner: ScalarBackend<f64>,
	limit_hz: f64,
}

impl NumericBackend<f64> for MixLimit {

	fn name(&self) -> &'static str { "mix-limit" }
	fn tolerance(&self) -> f64 { self.inner.tolerance() }

	fn mix(&self, samples:&mut [Complex<f64>], sampling_rate:f64, frequency:f64, phase:f64) -> Result<()> {
		if frequency.abs() > self.limit_hz {
			return Err(DigSigProcErr::Backend(format!("cannot mix at {} Hz", frequency)));
		}
		self.inner.mix(samples, sampling_rate, frequency, phase)
	}

	fn transform(&self, data:&mut [Complex<f64>], direction:Direction) -> Result<()> { self.inner.transform(data, direction) }

}

#[test]
fn failed_channel_update_does_not_desynchronize_the_others() {
	let src = SyntheticSignal::new(FS, 0.0, 20).unwrap()
		.with_satellite(SyntheticSatellite::new(code(3), 0.0, 100.0))
		.with_satellite(SyntheticSatellite::new(code(8), 3000.0, 900.0));
	let backend:Arc<dyn NumericBackend<f64>> = Arc::new(MixLimit{ inner: ScalarBackend::new(), limit_hz: 2000.0 });
	let observer = Arc::new(CountingObserver::default());
	let mut tracker = Tracker::new(TrackingConfig::default().without_lock_monitor(), backend).unwrap()
		.with_observer(observer.clone());
	tracker.add_channel(&seed(3, 0.0, 100), code(3)).unwrap();
	tracker.add_channel(&seed(8, 3000.0, 900), code(8)).unwrap();

	// Rejected before any channel sees the block
	assert!(matches!(tracker.step(&SampleBlock::new(vec![], FS, 0)), Err(DigSigProcErr::EmptyInput(_))));
	let first:SampleBlock<f64> = src.read(0, 1).unwrap();
	let resampled = SampleBlock::new(first.samples, 2.0 * FS, 0);
	assert!(matches!(tracker.step(&resampled), Err(DigSigProcErr::Configuration(_))));
	assert_eq!(tracker.epoch(), 0);
	assert!(tracker.channels().iter().all(|c| c.history().is_empty()));

	let block:SampleBlock<f64> = src.read(0, 1).unwrap();
	assert!(matches!(tracker.step(&block), Err(DigSigProcErr::Backend(_))));
	assert_eq!(tracker.epoch(), 1);
	assert_eq!(tracker.lost_satellites(), vec![SatelliteId::gps_l1ca(8)]);
	assert_eq!(*observer.lost.lock().unwrap(), vec![SatelliteId::gps_l1ca(8)]);
	assert_eq!(*observer.epochs.lock().unwrap(), 1);

	let good = tracker.channel(&SatelliteId::gps_l1ca(3)).unwrap();
	assert_eq!(good.epochs_processed(), 1);
	assert_eq!(tracker.channel(&SatelliteId::gps_l1ca(8)).unwrap().history().len(), 0);

	// The surviving channel carries on from the next block in step with the tracker
	assert_eq!(tracker.run(&src, None).unwrap(), 19);
	let history = tracker.channel(&SatelliteId::gps_l1ca(3)).unwrap().history();
	assert_eq!(history.len(), 20);
	assert!(history.sample_idx.windows(2).all(|w| w[1] == w[0] + 2046));
}

#[test]
fn observer_sees_every_channel_epoch() {
	let src = SyntheticSignal::new(FS, 0.0, 50).unwrap()
		.with_satellite(SyntheticSatellite::new(code(1), 0.0, 0.0))
		.with_satellite(SyntheticSatellite::new(code(2), 750.0, 300.0));
	let observer = Arc::new(CountingObserver::default());
	let results = vec![seed(1, 0.0, 0), seed(2, 750.0, 300)];
	let mut tracker = Tracker::<f64>::from_acquisitions(&results, &GpsL1CaProvider, TrackingConfig::default(), make_backend(BackendKind::Vectorized)).unwrap()
		.with_observer(observer.clone());

	assert_eq!(tracker.run(&src, Some(20)).unwrap(), 20);
	assert_eq!(tracker.run(&src, None).unwrap(), 30);
	assert_eq!(tracker.run(&src, None).unwrap(), 0);
	assert_eq!(*observer.epochs.lock().unwrap(), 100);

	for (_, history) in tracker.into_histories() {
		assert_eq!(history.len(), 50);
		let m = history.measurement(SatelliteId::gps_l1ca(1), 49).unwrap();
		assert_eq!(m.epoch, 49);
		assert_eq!(m.sample_idx, 49 * 2046);
		assert!(history.measurement(SatelliteId::gps_l1ca(1), 50).is_none());
	}
}

#[test]
fn cancellation_stops_between_epochs() {
	let src = SyntheticSignal::new(FS, 0.0, 10).unwrap();
	let token = CancelToken::new();
	let mut tracker = Tracker::<f64>::new(TrackingConfig::default(), make_backend(BackendKind::Scalar)).unwrap()
		.with_cancel_token(token.clone());
	tracker.add_channel(&seed(4, 0.0, 0), code(4)).unwrap();

	assert_eq!(tracker.run(&src, Some(3)).unwrap(), 3);
	token.cancel();
	assert!(matches!(tracker.run(&src, None), Err(DigSigProcErr::Cancelled)));
	assert_eq!(tracker.channel(&SatelliteId::gps_l1ca(4)).unwrap().history().len(), 3);
}

#[test]
fn misconfigured_channels_are_rejected() {
	let backend = make_backend::<f64>(BackendKind::Scalar);
	let config = TrackingConfig::default();
	assert!(matches!(TrackingChannel::new(&seed(4, 0.0, 0), code(5), &config, backend.clone()), Err(DigSigProcErr::Configuration(_))));

	let bad = TrackingConfig{ pll_bandwidth_hz: 0.0, ..TrackingConfig::default() };
	assert!(Tracker::new(bad, backend.clone()).is_err());

	let mut tracker = Tracker::new(config, backend.clone()).unwrap();
	tracker.add_channel(&seed(4, 0.0, 0), code(4)).unwrap();
	assert!(matches!(tracker.add_channel(&seed(4, 10.0, 0), code(4)), Err(DigSigProcErr::Configuration(_))));

	let mut channel = TrackingChannel::new(&seed(4, 0.0, 0), code(4), &TrackingConfig::default(), backend).unwrap();
	assert!(matches!(channel.update(&SampleBlock::new(vec![], FS, 0)), Err(DigSigProcErr::EmptyInput(_))));
}

#[test]
fn discriminators() {
	assert_eq!(phase_discriminator(Complex::new(0.0, 5.0)), 0.0);
	assert!((phase_discriminator(Complex::new(1.0, 1.0)) - 0.125).abs() < 1.0e-12);
	// A half-cycle flip reads the same
	assert!((phase_discriminator(Complex::new(-1.0, -1.0)) - 0.125).abs() < 1.0e-12);

	// Prompt rotating forward by 0.01 cycles per epoch, reported with the filter's sign
	let previous = Complex::new(1.0, 0.0);
	let prompt = Complex::from_polar(1.0, 2.0 * PI * 0.01);
	assert!((frequency_discriminator(prompt, previous) + 0.01).abs() < 1.0e-12);
	assert!((frequency_discriminator(-prompt, previous) + 0.01).abs() < 1.0e-12);
}
