use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

pub use num_complex::{Complex, Complex64};

pub mod config;
pub mod dsp;
pub mod filters;
pub mod fourier_analysis;
pub mod gnss;
pub mod io;
pub mod numeric;
pub mod observer;
pub mod synth;

#[derive(Debug, Error)]
pub enum DigSigProcErr {
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("size mismatch: expected {expected}, got {actual}")]
	SizeMismatch{ expected:usize, actual:usize },

	#[error("length {len} is not divisible by block size {block_size}")]
	BlockSize{ len:usize, block_size:usize },

	#[error("empty input to {0}")]
	EmptyInput(&'static str),

	#[error("requested samples up to {requested_end}, but only {available} are available")]
	OutOfBounds{ requested_end:usize, available:usize },

	#[error("numeric backend failure: {0}")]
	Backend(String),

	#[error("operation cancelled")]
	Cancelled,

	#[error("malformed configuration: {0}")]
	ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DigSigProcErr>;

/// Cooperative cancellation flag, polled between acquisition candidates and between tracking epochs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {

	pub fn new() -> Self { Self::default() }

	pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }
	pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }

	pub fn check(&self) -> Result<()> {
		if self.is_cancelled() { Err(DigSigProcErr::Cancelled) } else { Ok(()) }
	}

}
