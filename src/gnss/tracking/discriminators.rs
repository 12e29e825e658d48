use rustfft::num_complex::Complex;

/// Normalized non-coherent early-minus-late envelope discriminator [chips].  Positive when the local code lags the
/// incoming code.  `spacing_chips` is the distance from prompt to each of early and late.
pub fn dll_nelp(early:Complex<f64>, late:Complex<f64>, spacing_chips:f64) -> f64 {
	let e:f64 = early.norm();
	let l:f64 = late.norm();
	if l + e == 0.0 { 0.0 } else { (1.0 - spacing_chips) * (l - e) / (l + e) }
}

/// Two-quadrant Costas discriminator [rad], insensitive to data bit transitions
pub fn pll_costas(prompt:Complex<f64>) -> f64 {
	if prompt.re == 0.0 { 0.0 } else { (prompt.im / prompt.re).atan() }
}

/// Four-quadrant discriminator [rad] for dataless (pilot) signals
pub fn pll_atan2(prompt:Complex<f64>) -> f64 {
	if prompt.re == 0.0 && prompt.im == 0.0 { 0.0 } else { prompt.im.atan2(prompt.re) }
}

/// Cross-product frequency discriminator [rad/sec] from two consecutive prompts whose centers are `dt` [sec] apart.
/// The two-quadrant form tolerates a data bit flip between the prompts.
pub fn fll_cross_dot(prev:Complex<f64>, prompt:Complex<f64>, dt:f64, two_quadrant:bool) -> f64 {
	let cross = prev.re * prompt.im - prev.im * prompt.re;
	let dot   = prev.re * prompt.re + prev.im * prompt.im;
	if dt <= 0.0 { return 0.0; }
	if two_quadrant {
		if dot == 0.0 { 0.0 } else { (cross / dot).atan() / dt }
	} else {
		if cross == 0.0 && dot == 0.0 { 0.0 } else { cross.atan2(dot) / dt }
	}
}

#[cfg(test)]
mod tests {

	use std::f64::consts;

	use assert_approx_eq::assert_approx_eq;

	use super::*;

	#[test]
	fn zero_correlations_read_as_zero_error() {
		let zero = Complex{ re: 0.0, im: 0.0 };
		assert_eq!(dll_nelp(zero, zero, 0.5), 0.0);
		assert_eq!(pll_costas(zero), 0.0);
		assert_eq!(pll_costas(Complex{ re: 0.0, im: 3.0 }), 0.0);
		assert_eq!(pll_atan2(zero), 0.0);
		assert_eq!(fll_cross_dot(zero, zero, 1.0e-3, true), 0.0);
		assert_eq!(fll_cross_dot(zero, zero, 1.0e-3, false), 0.0);
	}

	#[test]
	fn code_discriminator_recovers_offset_on_triangle() {
		// Ideal autocorrelation 1 - |tau|; local code lagging by 0.1 chips
		let tau = 0.1;
		let d = 0.5;
		let early = Complex{ re: 1.0 - (d + tau), im: 0.0 };
		let late  = Complex{ re: 1.0 - (d - tau), im: 0.0 };
		assert_approx_eq!(dll_nelp(early, late, d), tau, 1.0e-12);
		assert_approx_eq!(dll_nelp(late, early, d), -tau, 1.0e-12);
	}

	#[test]
	fn carrier_discriminators() {
		let p = Complex::from_polar(&2.0, &0.3);
		assert_approx_eq!(pll_costas(p), 0.3, 1.0e-12);
		assert_approx_eq!(pll_atan2(p), 0.3, 1.0e-12);

		// A data bit flip turns the prompt around; Costas doesn't notice, atan2 does
		assert_approx_eq!(pll_costas(-p), 0.3, 1.0e-12);
		assert_approx_eq!(pll_atan2(-p), 0.3 - consts::PI, 1.0e-12);
	}

	#[test]
	fn frequency_discriminator() {
		let dt = 1.0e-3;
		let w = 2.0 * consts::PI * 50.0;
		let p0 = Complex::from_polar(&1.0, &0.2);
		let p1 = Complex::from_polar(&1.0, &(0.2 + w * dt));
		assert_approx_eq!(fll_cross_dot(p0, p1, dt, false), w, 1.0e-6);
		assert_approx_eq!(fll_cross_dot(p0, -p1, dt, true), w, 1.0e-6);
	}

}
