use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::gnss::signal::SignalId;

pub mod pcps;
pub mod threshold;


pub use self::pcps::AcquisitionEngine;
pub use self::threshold::{DetectionThreshold, ThresholdModel};

/// What the peak of the grid is measured against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NoiseEstimate {
	/// Mean of the grid cells outside the guard region around the peak
	GuardedGridMean,
	/// Mean power of the input samples.  Needs no second pass over the grid, but a strong signal lowers the statistic.
	InputPower,
}

impl Default for NoiseEstimate {
	fn default() -> Self { NoiseEstimate::GuardedGridMean }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
	/// Half-width of the Doppler search around the current center [Hz]
	pub doppler_max_hz: f64,
	pub doppler_step_hz: f64,
	/// Code periods combined coherently in each dwell
	pub coherent_code_periods: usize,
	/// Dwells combined non-coherently, or tested one at a time in a bit transition search, before the search gives up
	pub max_dwells: usize,
	/// Probability that a noise-only search declares a detection
	pub pfa: f64,
	pub threshold_model: ThresholdModel,
	pub noise_estimate: NoiseEstimate,
	/// Tests every dwell on its own instead of summing them, reporting the strongest.  A data bit edge then spoils
	/// one dwell instead of the whole search.  Needs at least two dwells.
	pub bit_transition_search: bool,
	/// Doppler bins on each side of the peak left out of the noise floor
	pub guard_doppler_bins: usize,
	/// Code offsets on each side of the peak left out of the noise floor [chips]
	pub guard_code_chips: f64,
	/// Delay introduced by any resampler ahead of acquisition [samples]
	pub resampler_latency_samples: u64,
}

impl Default for AcquisitionConfig {
	fn default() -> Self {
		Self {
			doppler_max_hz: 5000.0,
			doppler_step_hz: 250.0,
			coherent_code_periods: 1,
			max_dwells: 1,
			pfa: 0.01,
			threshold_model: ThresholdModel::Gamma,
			noise_estimate: NoiseEstimate::GuardedGridMean,
			bit_transition_search: false,
			guard_doppler_bins: 1,
			guard_code_chips: 1.5,
			resampler_latency_samples: 0,
		}
	}
}

impl AcquisitionConfig {

	pub fn validate(&self) -> Result<(), DigSigProcErr> {
		if !(self.doppler_step_hz > 0.0) || !self.doppler_step_hz.is_finite() {
			return Err(DigSigProcErr::InvalidConfiguration(format!("Doppler step {} [Hz] must be positive", self.doppler_step_hz)));
		}
		if !(self.doppler_max_hz >= 0.0) || !self.doppler_max_hz.is_finite() {
			return Err(DigSigProcErr::InvalidConfiguration(format!("Doppler range {} [Hz] must be non-negative", self.doppler_max_hz)));
		}
		if self.coherent_code_periods == 0 || self.max_dwells == 0 {
			return Err(DigSigProcErr::InvalidConfiguration("coherent code periods and dwells must both be at least one".into()));
		}
		if self.bit_transition_search && self.max_dwells < 2 {
			return Err(DigSigProcErr::InvalidConfiguration("a bit transition search needs at least two dwells".into()));
		}
		if !(self.pfa > 0.0 && self.pfa < 1.0) {
			return Err(DigSigProcErr::InvalidConfiguration(format!("false alarm probability {} must be in (0, 1)", self.pfa)));
		}
		if !(self.guard_code_chips >= 0.0) {
			return Err(DigSigProcErr::InvalidConfiguration(format!("code guard {} [chips] must be non-negative", self.guard_code_chips)));
		}
		self.threshold_model.validate()
	}

	/// Doppler bin centers, symmetric about `center_hz`
	pub fn doppler_bins(&self, center_hz:f64) -> Vec<f64> {
		let k = (self.doppler_max_hz / self.doppler_step_hz + 1.0e-9).floor() as i64;
		(-k..=k).map(|i| center_hz + (i as f64) * self.doppler_step_hz).collect()
	}

}

/// Outcome of one search.  On a detection `code_phase_samples` is the sample offset, from the first sample of the
/// searched block, at which a code period begins; `sample_stamp` is the absolute index that offset is counted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionResult {
	pub signal: SignalId,
	pub detected: bool,
	pub doppler_hz: f64,
	pub doppler_step_hz: f64,
	pub code_phase_samples: usize,
	pub test_statistic: f64,
	pub threshold: f64,
	pub peak_power: f64,
	pub noise_floor: f64,
	pub dwells: usize,
	pub sample_stamp: u64,
}

/// Correlation power over Doppler bins × code offsets, accumulated across dwells.  Lives only for one search.
#[derive(Debug, Clone)]
pub struct AcquisitionGrid {
	pub doppler_bins_hz: Vec<f64>,
	pub n_code_bins: usize,
	cells: Vec<f64>,
}

impl AcquisitionGrid {

	pub fn new(doppler_bins_hz:Vec<f64>, n_code_bins:usize) -> Self {
		let cells = vec![0.0; doppler_bins_hz.len() * n_code_bins];
		Self { doppler_bins_hz, n_code_bins, cells }
	}

	pub fn n_cells(&self) -> usize { self.cells.len() }

	pub fn clear(&mut self) {
		for c in self.cells.iter_mut() { *c = 0.0; }
	}

	pub fn get(&self, bin:usize, code:usize) -> f64 { self.cells[bin * self.n_code_bins + code] }

	pub fn row_mut(&mut self, bin:usize) -> &mut [f64] {
		let n = self.n_code_bins;
		&mut self.cells[bin*n..(bin+1)*n]
	}

	/// (Doppler bin, code offset, power) of the largest cell
	pub fn peak(&self) -> (usize, usize, f64) {
		let mut best = (0, 0, std::f64::MIN);
		for (idx, p) in self.cells.iter().enumerate() {
			if *p > best.2 { best = (idx / self.n_code_bins, idx % self.n_code_bins, *p); }
		}
		best
	}

	/// Mean of every cell outside the guard region around `(bin, code)`.  Code offsets wrap around the code period.
	/// Falls back to every cell but the peak itself when the guard region covers the whole grid.
	pub fn noise_floor(&self, bin:usize, code:usize, guard_bins:usize, guard_code:usize) -> f64 {
		let n = self.n_code_bins;
		let mut sum = 0.0;
		let mut count = 0usize;
		for (b, row) in self.cells.chunks(n).enumerate() {
			let bin_dist = if b > bin { b - bin } else { bin - b };
			for (k, p) in row.iter().enumerate() {
				let d = if k > code { k - code } else { code - k };
				let code_dist = d.min(n - d);
				if bin_dist > guard_bins || code_dist > guard_code {
					sum += p;
					count += 1;
				}
			}
		}

		if count == 0 {
			let total:f64 = self.cells.iter().sum();
			let others = self.cells.len().saturating_sub(1).max(1);
			(total - self.get(bin, code)) / (others as f64)
		} else {
			sum / (count as f64)
		}
	}

}
