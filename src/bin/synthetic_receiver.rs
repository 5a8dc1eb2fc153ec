use std::fs;

use clap::{Arg, App};
use colored::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gnss_baseband::config::ReceiverConfig;
use gnss_baseband::gnss::{CodeProvider, GpsL1CaProvider, SatelliteId};
use gnss_baseband::gnss::common::acquisition::{AcquisitionEngine, AcquisitionResult};
use gnss_baseband::gnss::common::tracking::{ChannelState, EpochMeasurement, Tracker};
use gnss_baseband::numeric::{make_backend, BackendKind};
use gnss_baseband::synth::{SyntheticSatellite, SyntheticSignal};

#[derive(Debug, Serialize)]
struct ChannelSummary {
	satellite: SatelliteId,
	epochs: usize,
	state: Option<ChannelState>,
	rms_phase_residual: f64,
	rms_code_residual: f64,
	last: Option<EpochMeasurement>,
}

#[derive(Debug, Serialize)]
struct Output {
	acquisitions: Vec<AcquisitionResult>,
	tracking: Vec<ChannelSummary>,
}

fn rms(x:&[f64]) -> f64 {
	if x.is_empty() { 0.0 } else { (x.iter().map(|v| v * v).sum::<f64>() / (x.len() as f64)).sqrt() }
}

fn run(config:ReceiverConfig, satellites:Vec<(u16, f64, f64)>, duration_ms:usize, noise_sigma:f64) -> gnss_baseband::Result<Output> {
	let fs = config.sampling_rate_hz;
	let mut signal = SyntheticSignal::new(fs, config.intermediate_frequency_hz, duration_ms)?.with_noise(noise_sigma, 0)?;
	let mut codes = vec![];
	for (prn, doppler_hz, code_phase) in satellites {
		let code = GpsL1CaProvider.code(&SatelliteId::gps_l1ca(prn))?;
		eprintln!("Injecting {}: {:9.2} [Hz], {:9.2} [samples]", code.satellite, doppler_hz, code_phase);
		signal = signal.with_satellite(SyntheticSatellite::new(code.clone(), doppler_hz, code_phase));
		codes.push(code);
	}

	let backend = make_backend::<f64>(config.backend);
	let engine = AcquisitionEngine::new(fs, config.intermediate_frequency_hz, config.acquisition.clone(), backend.clone())?;
	let acquisitions = engine.acquire(&signal, &codes)?;
	for result in acquisitions.iter() {
		eprintln!("{}: {}", result.satellite, format!("{:9.2} [Hz], {:6} [samples], SNR {:8.2}", result.doppler_hz, result.code_phase, result.snr()).green());
	}

	let mut tracker = Tracker::from_acquisitions(&acquisitions, &GpsL1CaProvider, config.tracking.clone(), backend)?;
	let epochs = tracker.run(&signal, None)?;
	for satellite in tracker.lost_satellites() {
		eprintln!("{}: {}", satellite, "lost lock".red());
	}
	eprintln!("Tracked {} epochs", epochs);

	let tracking = tracker.into_histories().into_iter().map(|(satellite, history)| {
		let last = history.len().checked_sub(1).and_then(|k| history.measurement(satellite, k));
		ChannelSummary{
			satellite,
			epochs: history.len(),
			state: last.as_ref().map(|m| m.state),
			rms_phase_residual: rms(&history.phase_residual),
			rms_code_residual: rms(&history.code_residual),
			last,
		}
	}).collect();

	Ok(Output{ acquisitions, tracking })
}

fn main() {

	let matches = App::new("Synthetic GNSS Receiver")
		.version("0.1.0")
		.author("John Stanford (johnwstanford@gmail.com)")
		.about("Synthesizes GPS L1 C/A baseband, then acquires and tracks every injected satellite")
		.arg(Arg::with_name("sample_rate_sps")
			.short("s").long("sample_rate_sps")
			.takes_value(true))
		.arg(Arg::with_name("prn")
			.short("p").long("prn")
			.help("Satellite to inject as prn:doppler_hz:code_phase_samples")
			.takes_value(true).multiple(true).number_of_values(1).required(true))
		.arg(Arg::with_name("duration_ms")
			.short("d").long("duration_ms")
			.takes_value(true).default_value("1000"))
		.arg(Arg::with_name("noise_sigma")
			.short("n").long("noise_sigma")
			.takes_value(true).default_value("0.0"))
		.arg(Arg::with_name("config")
			.short("c").long("config")
			.help("JSON receiver configuration")
			.takes_value(true))
		.arg(Arg::with_name("backend")
			.short("b").long("backend")
			.takes_value(true).possible_values(&["scalar", "vectorized"]))
		.get_matches();

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let mut config:ReceiverConfig = match matches.value_of("config") {
		Some(fname) => ReceiverConfig::from_json_str(&fs::read_to_string(fname).unwrap()).unwrap(),
		None => ReceiverConfig::default(),
	};
	if let Some(fs) = matches.value_of("sample_rate_sps") { config.sampling_rate_hz = fs.parse().unwrap(); }
	if let Some(b)  = matches.value_of("backend") { config.backend = b.parse::<BackendKind>().unwrap(); }

	let duration_ms:usize = matches.value_of("duration_ms").unwrap().parse().unwrap();
	let noise_sigma:f64   = matches.value_of("noise_sigma").unwrap().parse().unwrap();
	let satellites:Vec<(u16, f64, f64)> = matches.values_of("prn").unwrap().map(|s| {
		let fields:Vec<&str> = s.split(':').collect();
		let prn:u16 = fields[0].parse().unwrap();
		let doppler_hz:f64 = fields.get(1).map(|f| f.parse().unwrap()).unwrap_or(0.0);
		let code_phase:f64 = fields.get(2).map(|f| f.parse().unwrap()).unwrap_or(0.0);
		(prn, doppler_hz, code_phase)
	}).collect();

	eprintln!("{} at {} [samples/sec] for {} [ms], backend {}", "Synthetic receiver".bold(), config.sampling_rate_hz, duration_ms, config.backend);

	match run(config, satellites, duration_ms, noise_sigma) {
		Ok(output) => println!("{}", serde_json::to_string_pretty(&output).unwrap()),
		Err(e) => {
			eprintln!("{}", format!("{}", e).red());
			std::process::exit(1);
		},
	}

}
