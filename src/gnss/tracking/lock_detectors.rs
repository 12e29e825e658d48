use std::collections::VecDeque;

use rustfft::num_complex::Complex;

pub const CN0_MAX_DB_HZ:f64 = 100.0;

/// Signal-to-noise variance C/N0 estimator [dB-Hz] over a window of prompts, each integrated over
/// `coh_integration_time_s`.  The result is clamped to [0, 100]; a window with no measurable noise reads 100.
pub fn cn0_svn_estimator(prompt_buffer:&VecDeque<Complex<f64>>, coh_integration_time_s:f64) -> f64 {
	if prompt_buffer.is_empty() || !(coh_integration_time_s > 0.0) { return 0.0; }
	let n:f64 = prompt_buffer.len() as f64;
	let p_sig:f64 = {
		let sum:f64 = prompt_buffer.iter().map(|c| c.re.abs()).sum();
		(sum / n).powi(2)
	};
	let p_tot:f64 = {
		let sum:f64 = prompt_buffer.iter().map(|c| c.norm_sqr()).sum();
		sum / n
	};
	if p_tot <= p_sig { return CN0_MAX_DB_HZ; }
	if p_sig == 0.0 { return 0.0; }

	let snr = p_sig / (p_tot - p_sig);
	(10.0 * snr.log10() - 10.0 * coh_integration_time_s.log10()).max(0.0).min(CN0_MAX_DB_HZ)
}

/// Narrowband carrier lock test, near one when the signal energy sits in the in-phase arm.  With `strip_data` the
/// sign of each in-phase prompt is removed first so that data bit transitions don't cancel the sums.
pub fn carrier_lock_detector(prompt_buffer:&VecDeque<Complex<f64>>, strip_data:bool) -> f64 {
	let (tmp_sum_i, tmp_sum_q):(f64, f64) = if strip_data {
		(prompt_buffer.iter().map(|c| c.re.abs()).sum(),
		 prompt_buffer.iter().map(|c| if c.re >= 0.0 { c.im } else { -c.im }).sum())
	} else {
		(prompt_buffer.iter().map(|c| c.re).sum(),
		 prompt_buffer.iter().map(|c| c.im).sum())
	};
	let nbp:f64 = tmp_sum_i * tmp_sum_i + tmp_sum_q * tmp_sum_q;
	let nbd:f64 = tmp_sum_i * tmp_sum_i - tmp_sum_q * tmp_sum_q;
	if nbp == 0.0 { 0.0 } else { nbd / nbp }
}

/// Sliding window of the most recent prompts and carrier phase errors
#[derive(Debug, Clone)]
pub struct LockDetector {
	window: usize,
	prompt_buffer: VecDeque<Complex<f64>>,
	phase_errors: VecDeque<f64>,
}

impl LockDetector {

	pub fn new(window:usize) -> Self {
		Self { window, prompt_buffer: VecDeque::with_capacity(window + 1), phase_errors: VecDeque::with_capacity(window + 1) }
	}

	pub fn push(&mut self, prompt:Complex<f64>, phase_err_rad:f64) {
		self.prompt_buffer.push_back(prompt);
		self.phase_errors.push_back(phase_err_rad);
		while self.prompt_buffer.len() > self.window { self.prompt_buffer.pop_front(); }
		while self.phase_errors.len()  > self.window { self.phase_errors.pop_front(); }
	}

	pub fn is_full(&self) -> bool { self.prompt_buffer.len() >= self.window }

	pub fn len(&self) -> usize { self.prompt_buffer.len() }

	/// Mean square carrier phase error over the window [rad^2]
	pub fn phase_error_mean_square(&self) -> f64 {
		if self.phase_errors.is_empty() { return 0.0; }
		self.phase_errors.iter().map(|e| e * e).sum::<f64>() / (self.phase_errors.len() as f64)
	}

	pub fn cn0_db_hz(&self, coh_integration_time_s:f64) -> f64 { cn0_svn_estimator(&self.prompt_buffer, coh_integration_time_s) }

	pub fn carrier_lock_test(&self, strip_data:bool) -> f64 { carrier_lock_detector(&self.prompt_buffer, strip_data) }

	pub fn clear(&mut self) {
		self.prompt_buffer.clear();
		self.phase_errors.clear();
	}

}

#[cfg(test)]
mod tests {

	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use rand_distr::{Distribution, Normal};

	use super::*;

	#[test]
	fn cn0_estimate_tracks_injected_noise() {
		// Prompt of amplitude A over T has noise sd sqrt(N0 / (2 T)) per arm after normalizing by the sample count
		let t = 1.0e-3;
		let cn0_db_hz = 42.0;
		let n0 = 1.0 / 10.0_f64.powf(cn0_db_hz / 10.0);
		let normal = Normal::new(0.0, (n0 / (2.0 * t)).sqrt()).unwrap();
		let mut rng = StdRng::seed_from_u64(42);

		let buffer:VecDeque<Complex<f64>> = (0..2000)
			.map(|k| {
				let bit = if (k / 20) % 2 == 0 { 1.0 } else { -1.0 };
				Complex{ re: bit + normal.sample(&mut rng), im: normal.sample(&mut rng) }
			})
			.collect();

		let est = cn0_svn_estimator(&buffer, t);
		assert!((est - cn0_db_hz).abs() < 1.0, "estimated {} [dB-Hz]", est);
	}

	#[test]
	fn cn0_estimate_is_clamped() {
		let clean:VecDeque<Complex<f64>> = vec![Complex{ re: 1.0, im: 0.0 }; 10].into_iter().collect();
		assert_eq!(cn0_svn_estimator(&clean, 1.0e-3), CN0_MAX_DB_HZ);

		let silent:VecDeque<Complex<f64>> = vec![Complex{ re: 0.0, im: 1.0 }; 10].into_iter().collect();
		assert_eq!(cn0_svn_estimator(&silent, 1.0e-3), 0.0);
		assert_eq!(cn0_svn_estimator(&VecDeque::new(), 1.0e-3), 0.0);
	}

	#[test]
	fn lock_test_ignores_data_bits_when_stripped() {
		let buffer:VecDeque<Complex<f64>> = (0..10)
			.map(|k| if k % 2 == 0 { Complex{ re: 1.0, im: 0.05 } } else { Complex{ re: -1.0, im: -0.05 } })
			.collect();

		assert!(carrier_lock_detector(&buffer, true) > 0.99);
		// Without stripping the alternating bits cancel out entirely
		assert_eq!(carrier_lock_detector(&buffer, false), 0.0);

		let quadrature:VecDeque<Complex<f64>> = vec![Complex{ re: 0.0, im: 1.0 }; 10].into_iter().collect();
		assert!(carrier_lock_detector(&quadrature, true) < -0.99);
	}

	#[test]
	fn window_keeps_only_recent_values() {
		let mut det = LockDetector::new(3);
		assert!(!det.is_full());
		det.push(Complex{ re: 1.0, im: 0.0 }, 1.0);
		det.push(Complex{ re: 1.0, im: 0.0 }, 0.0);
		det.push(Complex{ re: 1.0, im: 0.0 }, 0.0);
		assert!(det.is_full());
		assert!((det.phase_error_mean_square() - 1.0 / 3.0).abs() < 1.0e-12);

		det.push(Complex{ re: 1.0, im: 0.0 }, 0.0);
		assert_eq!(det.len(), 3);
		assert_eq!(det.phase_error_mean_square(), 0.0);

		det.clear();
		assert_eq!(det.len(), 0);
	}

}
