use std::f64::consts;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex;

use crate::gnss::signal::LocalCodeReplica;

/// Synthesizes a single spread-spectrum signal with optional white Gaussian noise.  Chip zero of the code begins at
/// sample `code_delay_samples`, and the code rate follows the carrier Doppler the way a real satellite signal does.
pub struct SignalSimulator {
	code: LocalCodeReplica,
	pub fs: f64,
	pub doppler_hz: f64,
	pub amplitude: f64,
	code_phase_chips: f64,
	carrier_phase_rad: f64,
	next_idx: u64,
	data_bits: Vec<f64>,
	bit_len_samples: u64,
	noise: Option<Normal<f64>>,
	rng: StdRng,
}

impl SignalSimulator {

	pub fn new(code:LocalCodeReplica, fs:f64, doppler_hz:f64, code_delay_samples:f64, carrier_phase_rad:f64) -> Self {
		let code_phase_chips = -code_delay_samples * code.chip_rate_hz * (1.0 + doppler_hz / code.carrier_freq_hz) / fs;
		Self { code, fs, doppler_hz, amplitude: 1.0, code_phase_chips, carrier_phase_rad, next_idx: 0,
			data_bits: vec![], bit_len_samples: 1, noise: None, rng: StdRng::seed_from_u64(0) }
	}

	/// Adds complex white noise sized so that a unit-amplitude signal has carrier-to-noise density `cn0_db_hz`
	pub fn with_noise(mut self, cn0_db_hz:f64, seed:u64) -> Self {
		let n0 = self.amplitude * self.amplitude / 10.0_f64.powf(cn0_db_hz / 10.0);
		let sd = (n0 * self.fs / 2.0).sqrt();
		self.noise = Normal::new(0.0, sd).ok();
		self.rng = StdRng::seed_from_u64(seed);
		self
	}

	/// Modulates the signal with `bits` (each +1 or -1), one every `bit_len_samples` samples counted from sample zero,
	/// repeating once they run out
	pub fn with_data_bits(mut self, bits:Vec<f64>, bit_len_samples:u64) -> Self {
		self.data_bits = bits;
		self.bit_len_samples = bit_len_samples.max(1);
		self
	}

	/// Noise only, no signal
	pub fn noise_only(fs:f64, sd:f64, seed:u64) -> Self {
		let code = LocalCodeReplica::gps_l1_ca(1).unwrap();
		let mut ans = Self::new(code, fs, 0.0, 0.0, 0.0);
		ans.amplitude = 0.0;
		ans.noise = Normal::new(0.0, sd).ok();
		ans.rng = StdRng::seed_from_u64(seed);
		ans
	}

	pub fn chips_per_sample(&self) -> f64 {
		self.code.chip_rate_hz * (1.0 + self.doppler_hz / self.code.carrier_freq_hz) / self.fs
	}

	/// Code phase [chips] of the next sample to be generated
	pub fn code_phase_chips(&self) -> f64 { self.code_phase_chips.rem_euclid(self.code.code_length() as f64) }

	pub fn next_idx(&self) -> u64 { self.next_idx }

	/// Changes the Doppler from the next sample on, keeping carrier and code phase continuous
	pub fn set_doppler(&mut self, doppler_hz:f64) { self.doppler_hz = doppler_hz; }

	pub fn next_block(&mut self, n:usize) -> Vec<Complex<f64>> {
		let chips = self.code.chips();
		let len = chips.len() as f64;
		let cps = self.chips_per_sample();
		let phase_inc = 2.0 * consts::PI * self.doppler_hz / self.fs;
		let (code_phase0, carrier_phase0, amplitude) = (self.code_phase_chips, self.carrier_phase_rad, self.amplitude);
		let noise = self.noise;
		let (next_idx, bits, bit_len) = (self.next_idx, &self.data_bits, self.bit_len_samples);
		let rng = &mut self.rng;

		let ans = (0..n).map(|i| {
			let code_phase = (code_phase0 + (i as f64) * cps).rem_euclid(len);
			let carrier_phase = carrier_phase0 + (i as f64) * phase_inc;
			let chip = chips[(code_phase.floor() as usize) % chips.len()];
			let bit = if bits.is_empty() { 1.0 } else { bits[(((next_idx + i as u64) / bit_len) as usize) % bits.len()] };
			let mut x = bit * chip * Complex{ re: carrier_phase.cos(), im: carrier_phase.sin() } * amplitude;
			if let Some(normal) = noise {
				x += Complex{ re: normal.sample(rng), im: normal.sample(rng) };
			}
			x
		}).collect();

		self.code_phase_chips = (self.code_phase_chips + (n as f64) * cps).rem_euclid(len);
		self.carrier_phase_rad = (self.carrier_phase_rad + (n as f64) * phase_inc).rem_euclid(2.0 * consts::PI);
		self.next_idx += n as u64;
		ans
	}

}
