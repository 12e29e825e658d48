// Loop filter constants from the standard analog-to-digital mapping of 2nd and 3rd order loops.  The natural frequency
// of each loop is derived from its one-sided noise bandwidth.
pub const FLL_ASSIST_A2:f64        = 1.414;
pub const FLL_ASSIST_WN_BW:f64     = 0.53;
pub const PLL_3RD_ORDER_A3:f64     = 1.1;
pub const PLL_3RD_ORDER_B3:f64     = 2.4;
pub const PLL_3RD_ORDER_WN_BW:f64  = 0.7845;

pub trait ScalarFilter {

	/// Filters one discriminator output `x`, measured over an update interval of `dt` [sec]
	fn apply(&mut self, x:f64, dt:f64) -> f64;
	fn initialize(&mut self);
	fn set_noise_bandwidth(&mut self, bw_hz:f64);

}

/// Natural frequency [rad/sec] of a 2nd order loop with noise bandwidth `bw_hz` and damping ratio `zeta`
pub fn second_order_natural_freq(bw_hz:f64, zeta:f64) -> f64 { (bw_hz * 8.0 * zeta) / (4.0 * zeta * zeta + 1.0) }

/// Proportional-plus-integral filter used by the code loop.  The output is a rate correction in the same units as
/// the input per second, e.g. [chips/sec] for a discriminator in [chips].
#[derive(Debug, Clone)]
pub struct SecondOrderLoopFilter {
	pub bw_hz: f64,
	pub zeta: f64,
	wn: f64,
	integrator: f64,
}

impl SecondOrderLoopFilter {

	pub fn new(bw_hz:f64, zeta:f64) -> Self {
		Self { bw_hz, zeta, wn: second_order_natural_freq(bw_hz, zeta), integrator: 0.0 }
	}

	pub fn natural_freq(&self) -> f64 { self.wn }
	pub fn integrator(&self) -> f64 { self.integrator }

}

impl ScalarFilter for SecondOrderLoopFilter {

	fn apply(&mut self, x:f64, dt:f64) -> f64 {
		self.integrator += self.wn * self.wn * dt * x;
		self.integrator + 2.0 * self.zeta * self.wn * x
	}

	fn initialize(&mut self) {
		self.integrator = 0.0;
	}

	fn set_noise_bandwidth(&mut self, bw_hz:f64) {
		// The integrator carries the rate estimate, so it survives a bandwidth change
		self.bw_hz = bw_hz;
		self.wn = second_order_natural_freq(bw_hz, self.zeta);
	}

}

/// Third order carrier loop filter with optional frequency-locked assist.  The frequency error drives only the
/// frequency integrator; the frequency rate integrator is driven by phase error alone.  Phase error input is [rad],
/// frequency error input is [rad/sec], and the output is a frequency correction [rad/sec] relative to the frequency
/// the loop was initialized with.
#[derive(Debug, Clone)]
pub struct ThirdOrderLoopFilter {
	pub bw_hz: f64,
	pub fll_bw_hz: f64,
	wn: f64,
	wn_fll: f64,
	rate_enabled: bool,
	freq_rate: f64,
	freq: f64,
}

impl ThirdOrderLoopFilter {

	pub fn new(bw_hz:f64, fll_bw_hz:f64) -> Self {
		Self { bw_hz, fll_bw_hz, wn: bw_hz / PLL_3RD_ORDER_WN_BW, wn_fll: fll_bw_hz / FLL_ASSIST_WN_BW,
			rate_enabled: true, freq_rate: 0.0, freq: 0.0 }
	}

	/// Runs one update with both a phase error [rad] and a frequency error [rad/sec]
	pub fn apply_assisted(&mut self, phase_err:f64, freq_err:f64, dt:f64) -> f64 {
		let wn = self.wn;
		if self.rate_enabled { self.freq_rate += dt * wn.powi(3) * phase_err; }
		self.freq      += dt * (self.freq_rate + PLL_3RD_ORDER_A3 * wn * wn * phase_err + FLL_ASSIST_A2 * self.wn_fll * freq_err);
		self.freq + PLL_3RD_ORDER_B3 * wn * phase_err
	}

	/// Holding the rate integrator turns the filter into a 2nd order loop
	pub fn enable_rate_integrator(&mut self, enabled:bool) { self.rate_enabled = enabled; }

	/// Frequency rate estimate [rad/sec^2]
	pub fn freq_rate(&self) -> f64 { self.freq_rate }

}

impl ScalarFilter for ThirdOrderLoopFilter {

	fn apply(&mut self, x:f64, dt:f64) -> f64 { self.apply_assisted(x, 0.0, dt) }

	fn initialize(&mut self) {
		self.freq_rate = 0.0;
		self.freq = 0.0;
	}

	fn set_noise_bandwidth(&mut self, bw_hz:f64) {
		self.bw_hz = bw_hz;
		self.wn = bw_hz / PLL_3RD_ORDER_WN_BW;
	}

}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn second_order_integrates_constant_error() {
		let mut f = SecondOrderLoopFilter::new(2.0, 0.7);
		let first = f.apply(0.1, 1.0e-3);
		let mut last = first;
		for _ in 0..100 { last = f.apply(0.1, 1.0e-3); }
		assert!(last > first);
		assert!(f.integrator() > 0.0);

		f.initialize();
		assert_eq!(f.integrator(), 0.0);
	}

	#[test]
	fn second_order_closes_a_rate_loop() {
		// Plant: position integrates the filter output; the loop should drive a position step to zero
		let mut f = SecondOrderLoopFilter::new(5.0, 0.7);
		let dt = 1.0e-3;
		let target = 0.3;
		let mut pos = 0.0;
		for _ in 0..3000 {
			let rate = f.apply(target - pos, dt);
			pos += rate * dt;
		}
		assert!((target - pos).abs() < 1.0e-3);
	}

	#[test]
	fn third_order_tracks_frequency_ramp() {
		// Plant: phase integrates (true freq - estimated freq); true frequency ramps at 20 [rad/sec^2]
		let mut f = ThirdOrderLoopFilter::new(20.0, 0.0);
		let dt = 1.0e-3;
		let mut phase_err = 0.0;
		let mut est = 0.0;
		for k in 0..5000 {
			let true_freq = 20.0 * (k as f64) * dt;
			phase_err += (true_freq - est) * dt;
			est = f.apply(phase_err, dt);
		}
		assert!(phase_err.abs() < 1.0e-2, "phase_err={}", phase_err);
		assert!((f.freq_rate() - 20.0).abs() < 1.0);
	}

	#[test]
	fn held_rate_integrator_stays_at_zero() {
		let mut f = ThirdOrderLoopFilter::new(30.0, 0.0);
		f.enable_rate_integrator(false);
		let dt = 1.0e-3;
		let mut phase_err = 1.0;
		let mut est = 0.0;
		for _ in 0..2000 {
			phase_err -= est * dt;
			est = f.apply(phase_err, dt);
		}
		assert_eq!(f.freq_rate(), 0.0);
		assert!(phase_err.abs() < 1.0e-3, "phase_err={}", phase_err);
	}

	#[test]
	fn fll_assist_pulls_in_frequency_offset() {
		let mut f = ThirdOrderLoopFilter::new(10.0, 10.0);
		let dt = 1.0e-3;
		let true_freq = 2.0 * std::f64::consts::PI * 100.0;
		let mut est = 0.0;
		for _ in 0..1000 {
			est = f.apply_assisted(0.0, true_freq - est, dt);
		}
		assert!((true_freq - est).abs() < 1.0);
	}

}
