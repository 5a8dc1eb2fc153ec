use crate::gnss::SatelliteId;
use crate::gnss::common::acquisition::AcquisitionResult;
use crate::gnss::common::tracking::EpochMeasurement;

/// Optional diagnostic hook for plotting or recording intermediate products.  Every method defaults to
/// doing nothing, and nothing the core computes depends on whether an observer is installed.
pub trait Observer: Send + Sync {

	/// Correlation magnitude per code-phase lag for the winning Doppler bin of a search
	fn acquisition_input(&self, _satellite:&SatelliteId, _doppler_hz:f64, _magnitude:&[f64]) {}

	fn acquisition_result(&self, _result:&AcquisitionResult) {}

	fn epoch_tracked(&self, _satellite:&SatelliteId, _measurement:&EpochMeasurement) {}

	fn lock_lost(&self, _satellite:&SatelliteId, _epoch:usize) {}

}
