use rustfft::num_complex::Complex;

use super::Correlator;

/// Number of samples processed side by side.  Real and imaginary parts live in separate fixed-size arrays so the
/// lane loops compile to packed arithmetic.
pub const LANES:usize = 8;

// Renormalize the lane rotators every this many batches
const RENORMALIZE_BATCHES:usize = 128;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn simd_available() -> bool { is_x86_feature_detected!("avx2") }

// NEON is part of the aarch64 baseline
#[cfg(target_arch = "aarch64")]
pub fn simd_available() -> bool { true }

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
pub fn simd_available() -> bool { false }

#[derive(Debug, Clone, Copy)]
pub struct VectorizedCorrelator {
	use_avx2: bool,
}

impl VectorizedCorrelator {

	pub fn new() -> Self {
		#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
		let use_avx2 = is_x86_feature_detected!("avx2");
		#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
		let use_avx2 = false;

		Self { use_avx2 }
	}

	/// Batched kernel without any target-specific code generation
	pub fn portable() -> Self { Self { use_avx2: false } }

}

impl Default for VectorizedCorrelator {
	fn default() -> Self { Self::new() }
}

impl Correlator for VectorizedCorrelator {

	fn name(&self) -> &'static str { if self.use_avx2 { "vectorized-avx2" } else { "vectorized" } }

	fn accumulate(&self, input:&[Complex<f64>], carrier_phase_rad:f64, carrier_phase_inc_rad:f64,
		replicas:&[&[Complex<f64>]], out:&mut [Complex<f64>]) {

		#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
		{
			if self.use_avx2 {
				// Safe because use_avx2 is only set after the CPU reported AVX2 support
				unsafe { accumulate_avx2(input, carrier_phase_rad, carrier_phase_inc_rad, replicas, out) };
				return;
			}
		}

		accumulate_batched(input, carrier_phase_rad, carrier_phase_inc_rad, replicas, out)
	}

}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2")]
unsafe fn accumulate_avx2(input:&[Complex<f64>], carrier_phase_rad:f64, carrier_phase_inc_rad:f64,
	replicas:&[&[Complex<f64>]], out:&mut [Complex<f64>]) {
	accumulate_batched(input, carrier_phase_rad, carrier_phase_inc_rad, replicas, out)
}

#[inline(always)]
fn accumulate_batched(input:&[Complex<f64>], carrier_phase_rad:f64, carrier_phase_inc_rad:f64,
	replicas:&[&[Complex<f64>]], out:&mut [Complex<f64>]) {

	// Lane l starts at the carrier phase of sample l and every lane steps LANES samples per batch
	let mut rot_re = [0.0; LANES];
	let mut rot_im = [0.0; LANES];
	for l in 0..LANES {
		let phase = carrier_phase_rad + (l as f64) * carrier_phase_inc_rad;
		rot_re[l] =  phase.cos();
		rot_im[l] = -phase.sin();
	}
	let step = (LANES as f64) * carrier_phase_inc_rad;
	let (step_re, step_im) = (step.cos(), -step.sin());

	let mut acc_re = vec![[0.0; LANES]; replicas.len()];
	let mut acc_im = vec![[0.0; LANES]; replicas.len()];

	let n_batches = input.len() / LANES;
	for b in 0..n_batches {
		let base = b * LANES;
		let xs = &input[base..base + LANES];

		let mut w_re = [0.0; LANES];
		let mut w_im = [0.0; LANES];
		for l in 0..LANES {
			w_re[l] = xs[l].re * rot_re[l] - xs[l].im * rot_im[l];
			w_im[l] = xs[l].re * rot_im[l] + xs[l].im * rot_re[l];
		}

		for (t, replica) in replicas.iter().enumerate() {
			let code = &replica[base..base + LANES];
			let ar = &mut acc_re[t];
			let ai = &mut acc_im[t];
			for l in 0..LANES {
				ar[l] += code[l].re * w_re[l] - code[l].im * w_im[l];
				ai[l] += code[l].re * w_im[l] + code[l].im * w_re[l];
			}
		}

		for l in 0..LANES {
			let re = rot_re[l] * step_re - rot_im[l] * step_im;
			let im = rot_re[l] * step_im + rot_im[l] * step_re;
			rot_re[l] = re;
			rot_im[l] = im;
		}

		if b % RENORMALIZE_BATCHES == RENORMALIZE_BATCHES - 1 {
			for l in 0..LANES {
				let mag = rot_re[l].hypot(rot_im[l]);
				rot_re[l] /= mag;
				rot_im[l] /= mag;
			}
		}
	}

	// Lane zero now sits at the phase of the first leftover sample
	let mut carrier = Complex{ re: rot_re[0], im: rot_im[0] };
	let carrier_inc = Complex{ re: carrier_phase_inc_rad.cos(), im: -carrier_phase_inc_rad.sin() };
	for n in (n_batches * LANES)..input.len() {
		let wiped = input[n] * carrier;
		for (acc, replica) in out.iter_mut().zip(replicas.iter()) {
			*acc += replica[n] * wiped;
		}
		carrier = carrier * carrier_inc;
	}

	for (t, acc) in out.iter_mut().enumerate() {
		*acc += Complex{ re: acc_re[t].iter().sum(), im: acc_im[t].iter().sum() };
	}
}
