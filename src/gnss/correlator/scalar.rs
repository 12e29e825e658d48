use rustfft::num_complex::Complex;

use super::Correlator;

// The carrier rotator is renormalized this often to keep rounding from growing its magnitude
pub const RENORMALIZE_INTERVAL:usize = 1024;

/// Straightforward per-sample loop; the reference the other strategies are held to
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarCorrelator;

impl Correlator for ScalarCorrelator {

	fn name(&self) -> &'static str { "scalar" }

	fn accumulate(&self, input:&[Complex<f64>], carrier_phase_rad:f64, carrier_phase_inc_rad:f64,
		replicas:&[&[Complex<f64>]], out:&mut [Complex<f64>]) {

		let mut carrier     = Complex{ re: carrier_phase_rad.cos(),     im: -carrier_phase_rad.sin() };
		let     carrier_inc = Complex{ re: carrier_phase_inc_rad.cos(), im: -carrier_phase_inc_rad.sin() };

		for (n, x) in input.iter().enumerate() {
			// Remove the carrier, then integrate every tap
			let wiped = x * carrier;
			for (acc, replica) in out.iter_mut().zip(replicas.iter()) {
				*acc += replica[n] * wiped;
			}

			carrier = carrier * carrier_inc;
			if n % RENORMALIZE_INTERVAL == RENORMALIZE_INTERVAL - 1 { carrier = carrier / carrier.norm(); }
		}
	}

}
