use rustfft::num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::gnss::correlator::CorrelationTapSet;
use crate::gnss::signal::SignalId;
use crate::gnss::tracking::TrackingState;

/// Synchronization record emitted once per tracking epoch.  Estimates describe the local replica at `sample_counter`,
/// the absolute index of the first sample after the epoch.  Consumers should ignore the carrier and code estimates
/// unless `valid` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GnssSynchro {
	pub signal: SignalId,
	pub channel_id: usize,
	pub sample_counter: u64,
	pub epoch: u64,
	/// Samples integrated in this epoch
	pub epoch_len: usize,
	/// Code phase in [0, code length) [chips]
	pub code_phase_chips: f64,
	pub code_freq_hz: f64,
	/// Accumulated carrier phase since tracking started [rad]
	pub carrier_phase_rad: f64,
	pub carrier_doppler_hz: f64,
	pub carrier_doppler_rate_hz_s: f64,
	pub cn0_db_hz: f64,
	pub carrier_lock_test: f64,
	pub code_error_chips: f64,
	pub carrier_phase_error_rad: f64,
	pub prompt: Complex<f64>,
	pub taps: CorrelationTapSet,
	pub state: TrackingState,
	pub valid: bool,
}

impl GnssSynchro {

	/// Code phase [chips] extrapolated to sample `idx` with the current code rate
	pub fn code_phase_at(&self, idx:u64, fs:f64, code_length:usize) -> f64 {
		let dt = (idx as f64 - self.sample_counter as f64) / fs;
		(self.code_phase_chips + dt * self.code_freq_hz).rem_euclid(code_length as f64)
	}

}
