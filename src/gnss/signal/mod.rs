use std::fmt;

use rustfft::num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;

pub mod gps_l1_ca;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
	GpsL1Ca,
	Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId {
	pub kind: SignalKind,
	pub prn: usize,
}

impl SignalId {
	pub fn gps_l1_ca(prn:usize) -> Self { Self { kind: SignalKind::GpsL1Ca, prn } }
}

impl fmt::Display for SignalId {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self.kind {
			SignalKind::GpsL1Ca => write!(f, "GPS L1 C/A PRN {:02}", self.prn),
			SignalKind::Custom  => write!(f, "custom PRN {:02}", self.prn),
		}
	}
}

/// The known spreading code of one signal.  Chips are complex so that subcarrier-modulated or pilot/data combined
/// replicas go through the same code paths as plain BPSK codes.
#[derive(Debug, Clone)]
pub struct LocalCodeReplica {
	pub signal: SignalId,
	pub chip_rate_hz: f64,
	pub carrier_freq_hz: f64,
	chips: Vec<Complex<f64>>,
}

impl LocalCodeReplica {

	pub fn gps_l1_ca(prn:usize) -> Result<Self, DigSigProcErr> {
		let code = gps_l1_ca::prn_int(prn)
			.ok_or_else(|| DigSigProcErr::InvalidConfiguration(format!("GPS L1 C/A PRN {} is out of range", prn)))?;
		let chips = code.into_iter().map(|b| Complex{ re: b as f64, im: 0.0 }).collect();
		Ok(Self { signal: SignalId::gps_l1_ca(prn), chip_rate_hz: gps_l1_ca::CHIP_RATE_HZ,
			carrier_freq_hz: gps_l1_ca::CARRIER_FREQ_HZ, chips })
	}

	/// Generates the replica of a signal with a built-in code generator
	pub fn for_signal(signal:SignalId) -> Result<Self, DigSigProcErr> { match signal.kind {
		SignalKind::GpsL1Ca => Self::gps_l1_ca(signal.prn),
		SignalKind::Custom  => Err(DigSigProcErr::InvalidConfiguration(format!("{} has no code generator, supply its chips", signal))),
	}}

	pub fn from_chips(signal:SignalId, chips:Vec<Complex<f64>>, chip_rate_hz:f64, carrier_freq_hz:f64) -> Result<Self, DigSigProcErr> {
		if chips.is_empty() {
			return Err(DigSigProcErr::InvalidConfiguration("local code must have at least one chip".into()));
		}
		if !(chip_rate_hz > 0.0) || !(carrier_freq_hz > 0.0) {
			return Err(DigSigProcErr::InvalidConfiguration(format!("chip rate {} [Hz] and carrier {} [Hz] must be positive", chip_rate_hz, carrier_freq_hz)));
		}
		Ok(Self { signal, chip_rate_hz, carrier_freq_hz, chips })
	}

	pub fn code_length(&self) -> usize { self.chips.len() }
	pub fn chips(&self) -> &[Complex<f64>] { &self.chips }
	pub fn code_period_sec(&self) -> f64 { (self.chips.len() as f64) / self.chip_rate_hz }

	/// Number of samples in one code period at `fs`.  A sample rate that doesn't fit a whole number of samples into
	/// one code period is rejected, since every block handed to acquisition is a whole number of code periods.
	pub fn samples_per_code(&self, fs:f64) -> Result<usize, DigSigProcErr> {
		if !(fs > 0.0) {
			return Err(DigSigProcErr::InvalidConfiguration(format!("sample rate {} [sps] must be positive", fs)));
		}
		let n = fs * self.code_period_sec();
		if (n - n.round()).abs() > 1.0e-6 || n.round() < 1.0 {
			return Err(DigSigProcErr::InvalidConfiguration(
				format!("code period of {} chips spans {:.6} samples at {} [sps], which is not a whole number", self.chips.len(), n, fs)));
		}
		Ok(n.round() as usize)
	}

	/// One code period sampled at `fs` starting at chip zero, repeated to fill `n_samples`
	pub fn sampled(&self, fs:f64, n_samples:usize) -> Vec<Complex<f64>> {
		let mut ans = vec![Complex{ re: 0.0, im: 0.0 }; n_samples];
		self.resample_into(0.0, self.chip_rate_hz / fs, &mut ans);
		ans
	}

	/// Fills `out` with the replica starting at `code_phase_chips` and advancing `chips_per_sample` each sample
	pub fn resample_into(&self, code_phase_chips:f64, chips_per_sample:f64, out:&mut [Complex<f64>]) {
		let len = self.chips.len() as f64;
		let start = code_phase_chips.rem_euclid(len);
		for (i, y) in out.iter_mut().enumerate() {
			let idx = ((start + (i as f64) * chips_per_sample).floor() as usize) % self.chips.len();
			*y = self.chips[idx];
		}
	}

}
