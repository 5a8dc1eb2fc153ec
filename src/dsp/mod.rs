pub mod correlator;
pub mod mixer;
pub mod nco;

pub use correlator::{EplCorrelator, Epl, ReplicaTiming};
pub use mixer::{Mixer, MixStrategy};
pub use nco::{Nco, NcoState, SineTable};
