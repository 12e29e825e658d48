use serde::{Serialize, Deserialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Gamma};

use crate::DigSigProcErr;

/// Maps a false alarm probability onto a threshold for the peak-to-noise-floor statistic.
///
/// Under the no-signal hypothesis every grid cell divided by the noise floor follows the same distribution, so the
/// probability that the largest of `n_cells` cells crosses the threshold is `1 - F(threshold)^n_cells`.  The
/// distribution depends on how cells were combined, which is why this is a strategy.
pub trait DetectionThreshold: Send + Sync {
	fn threshold(&self, pfa:f64, n_cells:usize, n_dwells:usize) -> Result<f64, DigSigProcErr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdModel {
	/// Non-coherent sum of `n_dwells` complex cells: Gamma(shape n, rate n) after normalization
	Gamma,
	/// Normalized chi-squared with `dof_per_dwell` degrees of freedom contributed by each dwell
	ChiSquared{ dof_per_dwell: f64 },
	/// Constant threshold, independent of `pfa`
	Fixed{ threshold: f64 },
}

impl Default for ThresholdModel {
	fn default() -> Self { ThresholdModel::Gamma }
}

impl ThresholdModel {

	pub fn validate(&self) -> Result<(), DigSigProcErr> { match *self {
		ThresholdModel::Gamma => Ok(()),
		ThresholdModel::ChiSquared{ dof_per_dwell } if dof_per_dwell > 0.0 => Ok(()),
		ThresholdModel::Fixed{ threshold } if threshold > 0.0 => Ok(()),
		m => Err(DigSigProcErr::InvalidConfiguration(format!("threshold model {:?} has a non-positive parameter", m))),
	}}

	pub fn build(&self) -> Box<dyn DetectionThreshold> { match *self {
		ThresholdModel::Gamma                      => Box::new(GammaThreshold),
		ThresholdModel::ChiSquared{ dof_per_dwell } => Box::new(ChiSquaredThreshold{ dof_per_dwell }),
		ThresholdModel::Fixed{ threshold }         => Box::new(FixedThreshold{ threshold }),
	}}

}

#[derive(Debug, Clone, Copy)]
pub struct GammaThreshold;

#[derive(Debug, Clone, Copy)]
pub struct ChiSquaredThreshold { pub dof_per_dwell: f64 }

#[derive(Debug, Clone, Copy)]
pub struct FixedThreshold { pub threshold: f64 }

impl DetectionThreshold for GammaThreshold {
	fn threshold(&self, pfa:f64, n_cells:usize, n_dwells:usize) -> Result<f64, DigSigProcErr> {
		let n = check(pfa, n_cells, n_dwells)? as f64;
		let dist = Gamma::new(n, n).map_err(|e| DigSigProcErr::InvalidConfiguration(format!("{}", e)))?;
		Ok(invert_survival(|x| 1.0 - dist.cdf(x), per_cell_pfa(pfa, n_cells)))
	}
}

impl DetectionThreshold for ChiSquaredThreshold {
	fn threshold(&self, pfa:f64, n_cells:usize, n_dwells:usize) -> Result<f64, DigSigProcErr> {
		let dof = self.dof_per_dwell * (check(pfa, n_cells, n_dwells)? as f64);
		let dist = ChiSquared::new(dof).map_err(|e| DigSigProcErr::InvalidConfiguration(format!("{}", e)))?;
		// The statistic is normalized to unit mean, i.e. chi-squared divided by its degrees of freedom
		Ok(invert_survival(|x| 1.0 - dist.cdf(x * dof), per_cell_pfa(pfa, n_cells)))
	}
}

impl DetectionThreshold for FixedThreshold {
	fn threshold(&self, pfa:f64, n_cells:usize, n_dwells:usize) -> Result<f64, DigSigProcErr> {
		check(pfa, n_cells, n_dwells)?;
		Ok(self.threshold)
	}
}

fn check(pfa:f64, n_cells:usize, n_dwells:usize) -> Result<usize, DigSigProcErr> {
	if !(pfa > 0.0 && pfa < 1.0) {
		return Err(DigSigProcErr::InvalidConfiguration(format!("false alarm probability {} must be in (0, 1)", pfa)));
	}
	if n_cells == 0 || n_dwells == 0 {
		return Err(DigSigProcErr::InvalidConfiguration("threshold needs at least one cell and one dwell".into()));
	}
	Ok(n_dwells)
}

/// Probability that a single cell crosses the threshold such that the maximum of `n_cells` does with `pfa`
pub fn per_cell_pfa(pfa:f64, n_cells:usize) -> f64 {
	-((-pfa).ln_1p() / (n_cells as f64)).exp_m1()
}

// Bisection on a decreasing survival function; thresholds are always positive
fn invert_survival<F: Fn(f64) -> f64>(sf:F, target:f64) -> f64 {
	let mut lo = 0.0;
	let mut hi = 1.0;
	while sf(hi) > target && hi < 1.0e6 { hi *= 2.0; }
	for _ in 0..200 {
		let mid = 0.5 * (lo + hi);
		if sf(mid) > target { lo = mid; } else { hi = mid; }
		if hi - lo < 1.0e-10 * hi { break; }
	}
	0.5 * (lo + hi)
}
