use std::f64::consts;

/// Wraps `x` into `[-period/2, period/2)`.
pub fn wrap_symmetric(x:f64, period:f64) -> f64 {
	let y = (x + 0.5*period).rem_euclid(period) - 0.5*period;
	// rem_euclid can round up to exactly `period` for tiny negative inputs
	if y >= 0.5*period { y - period } else { y }
}

/// Wraps `x` into `[0, period)`.
pub fn wrap_positive(x:f64, period:f64) -> f64 {
	let y = x.rem_euclid(period);
	if y >= period { 0.0 } else { y }
}

pub fn wrap_to_pi(rad:f64) -> f64 { wrap_symmetric(rad, 2.0 * consts::PI) }
pub fn wrap_to_2pi(rad:f64) -> f64 { wrap_positive(rad, 2.0 * consts::PI) }

pub fn mean(xs:&[f64]) -> f64 {
	if xs.is_empty() { 0.0 } else { xs.iter().sum::<f64>() / (xs.len() as f64) }
}

pub fn std_dev(xs:&[f64]) -> f64 {
	if xs.len() < 2 { return 0.0; }
	let m = mean(xs);
	let ss:f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
	(ss / ((xs.len() - 1) as f64)).sqrt()
}
