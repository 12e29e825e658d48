use rustfft::num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;

pub mod scalar;
pub mod vectorized;


const ZERO:Complex<f64> = Complex{ re: 0.0, im: 0.0 };

/// Carrier wipe-off and multi-tap code correlation over one accumulation period.
///
/// The local carrier starts at `carrier_phase_rad` and advances `carrier_phase_inc_rad` every sample; each input
/// sample is multiplied by the conjugate of the carrier, then by each replica, and the products are summed over the
/// first `accumulation_length` samples.  Returns one complex sum per replica, in replica order.  Implementations hold
/// no state between calls, so one instance can be shared by every channel.
pub trait Correlator: Send + Sync {

	fn name(&self) -> &'static str;

	/// Does the accumulation on arguments that have already been checked; `out` has one entry per replica
	fn accumulate(&self, input:&[Complex<f64>], carrier_phase_rad:f64, carrier_phase_inc_rad:f64,
		replicas:&[&[Complex<f64>]], out:&mut [Complex<f64>]);

	fn correlate(&self, input:&[Complex<f64>], carrier_phase_rad:f64, carrier_phase_inc_rad:f64,
		replicas:&[&[Complex<f64>]], accumulation_length:usize) -> Result<Vec<Complex<f64>>, DigSigProcErr> {

		check_arguments(input, carrier_phase_rad, carrier_phase_inc_rad, replicas, accumulation_length)?;

		let input:&[Complex<f64>] = &input[..accumulation_length];
		let replicas:Vec<&[Complex<f64>]> = replicas.iter().map(|r| &r[..accumulation_length]).collect();
		let mut out = vec![ZERO; replicas.len()];
		self.accumulate(input, carrier_phase_rad, carrier_phase_inc_rad, &replicas, &mut out);
		Ok(out)
	}

}

fn check_arguments(input:&[Complex<f64>], carrier_phase_rad:f64, carrier_phase_inc_rad:f64,
	replicas:&[&[Complex<f64>]], accumulation_length:usize) -> Result<(), DigSigProcErr> {

	if accumulation_length == 0 {
		return Err(DigSigProcErr::InvalidInput("accumulation length must be at least one sample".into()));
	}
	if input.len() < accumulation_length {
		return Err(DigSigProcErr::InvalidInput(format!("{} input samples is short of the {} sample accumulation", input.len(), accumulation_length)));
	}
	if replicas.is_empty() {
		return Err(DigSigProcErr::InvalidInput("at least one code replica is required".into()));
	}
	if let Some(r) = replicas.iter().find(|r| r.len() < accumulation_length) {
		return Err(DigSigProcErr::InvalidInput(format!("{} replica samples is short of the {} sample accumulation", r.len(), accumulation_length)));
	}
	if !carrier_phase_rad.is_finite() || !carrier_phase_inc_rad.is_finite() {
		return Err(DigSigProcErr::InvalidInput("carrier phase and phase increment must be finite".into()));
	}
	Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelatorKind {
	Auto,
	Scalar,
	Vectorized,
}

impl Default for CorrelatorKind {
	fn default() -> Self { CorrelatorKind::Auto }
}

impl CorrelatorKind {

	/// Resolves `Auto` using runtime CPU feature detection
	pub fn resolve(self) -> Self { match self {
		CorrelatorKind::Auto => if vectorized::simd_available() { CorrelatorKind::Vectorized } else { CorrelatorKind::Scalar },
		k => k,
	}}

	pub fn build(self) -> Box<dyn Correlator> { match self.resolve() {
		CorrelatorKind::Vectorized => Box::new(vectorized::VectorizedCorrelator::new()),
		_                          => Box::new(scalar::ScalarCorrelator),
	}}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TapName {
	VeryEarly,
	Early,
	Prompt,
	Late,
	VeryLate,
}

/// Tap offsets relative to prompt.  Early and very-early replicas use earlier chips, i.e. negative offsets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapLayout {
	pub early_late_spacing_chips: f64,
	pub very_early_late_spacing_chips: Option<f64>,
}

impl Default for TapLayout {
	fn default() -> Self { Self::early_prompt_late(0.5) }
}

impl TapLayout {

	pub fn early_prompt_late(spacing_chips:f64) -> Self {
		Self { early_late_spacing_chips: spacing_chips, very_early_late_spacing_chips: None }
	}

	pub fn very_early_to_very_late(spacing_chips:f64, very_spacing_chips:f64) -> Self {
		Self { early_late_spacing_chips: spacing_chips, very_early_late_spacing_chips: Some(very_spacing_chips) }
	}

	pub fn validate(&self) -> Result<(), DigSigProcErr> {
		let el = self.early_late_spacing_chips;
		if !(el > 0.0) || !el.is_finite() {
			return Err(DigSigProcErr::InvalidConfiguration(format!("early/late spacing {} [chips] must be positive", el)));
		}
		if let Some(vel) = self.very_early_late_spacing_chips {
			if !(vel > el) || !vel.is_finite() {
				return Err(DigSigProcErr::InvalidConfiguration(
					format!("very early/late spacing {} [chips] must be wider than early/late spacing {} [chips]", vel, el)));
			}
		}
		Ok(())
	}

	/// Taps in strictly increasing offset order
	pub fn taps(&self) -> Vec<(TapName, f64)> {
		let el = self.early_late_spacing_chips;
		let mut ans = vec![];
		if let Some(vel) = self.very_early_late_spacing_chips { ans.push((TapName::VeryEarly, -vel)); }
		ans.push((TapName::Early, -el));
		ans.push((TapName::Prompt, 0.0));
		ans.push((TapName::Late, el));
		if let Some(vel) = self.very_early_late_spacing_chips { ans.push((TapName::VeryLate, vel)); }
		ans
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TapValue {
	pub name: TapName,
	pub offset_chips: f64,
	pub value: Complex<f64>,
}

/// One accumulated value per tap for one tracking epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationTapSet {
	pub taps: Vec<TapValue>,
}

impl CorrelationTapSet {

	pub fn from_layout(layout:&TapLayout, values:&[Complex<f64>]) -> Result<Self, DigSigProcErr> {
		let names = layout.taps();
		if names.len() != values.len() {
			return Err(DigSigProcErr::InvalidInput(format!("{} correlation values for {} taps", values.len(), names.len())));
		}
		let taps = names.into_iter().zip(values.iter())
			.map(|((name, offset_chips), value)| TapValue{ name, offset_chips, value: *value })
			.collect();
		Ok(Self { taps })
	}

	pub fn get(&self, name:TapName) -> Option<Complex<f64>> {
		self.taps.iter().find(|t| t.name == name).map(|t| t.value)
	}

	pub fn prompt(&self) -> Complex<f64> { self.get(TapName::Prompt).unwrap_or(ZERO) }
	pub fn early(&self)  -> Complex<f64> { self.get(TapName::Early).unwrap_or(ZERO) }
	pub fn late(&self)   -> Complex<f64> { self.get(TapName::Late).unwrap_or(ZERO) }

}
