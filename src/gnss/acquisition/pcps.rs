use std::f64::consts;
use std::sync::Arc;

use log::{debug, info};
use rustfft::{FFT, FFTplanner};
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;

use crate::{DigSigProcErr, SampleBlock};
use crate::gnss::StopHandle;
use crate::gnss::signal::{LocalCodeReplica, SignalId};

use super::{AcquisitionConfig, AcquisitionGrid, AcquisitionResult, DetectionThreshold, NoiseEstimate};
use super::threshold::per_cell_pfa;

/// Parallel code phase search.  For every Doppler bin the input is wiped off, transformed, multiplied by the conjugate
/// spectrum of the local code, and transformed back, which yields the correlation at every code offset at once.
///
/// Dwells are normally summed into one grid.  In a bit transition search each dwell is a separate look with its own
/// grid; the false alarm probability is split evenly across the looks and the strongest look is reported.
pub struct AcquisitionEngine {
	config: AcquisitionConfig,
	fs: f64,
	samples_per_code: usize,
	len_fft: usize,
	doppler_center_hz: f64,
	threshold: Box<dyn DetectionThreshold>,
	fft: Arc<dyn FFT<f64>>,
	ifft: Arc<dyn FFT<f64>>,
	local_code_signal: SignalId,
	local_code_chip_rate_hz: f64,
	local_code_freq_domain: Vec<Complex<f64>>,
	stop: StopHandle,
}

impl AcquisitionEngine {

	pub fn new(config:AcquisitionConfig, fs:f64, local_code:&LocalCodeReplica) -> Result<Self, DigSigProcErr> {
		config.validate()?;
		let samples_per_code = local_code.samples_per_code(fs)?;
		let len_fft = samples_per_code * config.coherent_code_periods;

		let fft  = FFTplanner::new(false).plan_fft(len_fft);
		let ifft = FFTplanner::new(true).plan_fft(len_fft);
		let threshold = config.threshold_model.build();

		let mut ans = Self { config, fs, samples_per_code, len_fft, doppler_center_hz: 0.0, threshold, fft, ifft,
			local_code_signal: local_code.signal, local_code_chip_rate_hz: local_code.chip_rate_hz,
			local_code_freq_domain: vec![], stop: StopHandle::new() };
		ans.set_local_code(local_code)?;
		Ok(ans)
	}

	/// Replaces the detection threshold strategy chosen by the configuration
	pub fn with_threshold(mut self, threshold:Box<dyn DetectionThreshold>) -> Self {
		self.threshold = threshold;
		self
	}

	/// Caches the conjugate spectrum of `local_code`, repeated over the coherent integration
	pub fn set_local_code(&mut self, local_code:&LocalCodeReplica) -> Result<(), DigSigProcErr> {
		let spc = local_code.samples_per_code(self.fs)?;
		if spc != self.samples_per_code {
			return Err(DigSigProcErr::InvalidConfiguration(
				format!("{} spans {} samples per code period, but this search was planned for {}", local_code.signal, spc, self.samples_per_code)));
		}

		let mut local_code_time_domain = local_code.sampled(self.fs, self.len_fft);
		let mut fft_out = vec![Complex::zero(); self.len_fft];
		self.fft.process(&mut local_code_time_domain, &mut fft_out);

		self.local_code_freq_domain = fft_out.into_iter().map(|p| p.conj()).collect();
		self.local_code_signal = local_code.signal;
		self.local_code_chip_rate_hz = local_code.chip_rate_hz;
		Ok(())
	}

	pub fn config(&self) -> &AcquisitionConfig { &self.config }
	pub fn fs(&self) -> f64 { self.fs }
	pub fn samples_per_code(&self) -> usize { self.samples_per_code }

	/// Samples a search needs to be able to run every dwell
	pub fn samples_required(&self) -> usize { self.len_fft * self.config.max_dwells }

	pub fn doppler_center_hz(&self) -> f64 { self.doppler_center_hz }
	pub fn set_doppler_center(&mut self, doppler_hz:f64) { self.doppler_center_hz = doppler_hz; }

	pub fn stop_handle(&self) -> StopHandle { self.stop.clone() }

	/// Shares a stop flag with the caller, e.g. the one its channel already hands out
	pub fn set_stop_handle(&mut self, stop:StopHandle) { self.stop = stop; }

	pub fn reset(&mut self) {
		self.doppler_center_hz = 0.0;
		self.stop.clear();
	}

	/// Runs one acquisition attempt over the start of `block`
	pub fn search(&mut self, block:&SampleBlock, local_code:&LocalCodeReplica) -> Result<AcquisitionResult, DigSigProcErr> {
		if local_code.signal != self.local_code_signal { self.set_local_code(local_code)?; }

		if block.is_empty() {
			return Err(DigSigProcErr::InvalidInput("acquisition needs a non-empty block".into()));
		}
		if (block.fs - self.fs).abs() > 1.0e-6 * self.fs {
			return Err(DigSigProcErr::InvalidInput(format!("block sampled at {} [sps], search planned for {} [sps]", block.fs, self.fs)));
		}
		let required = self.samples_required();
		if block.len() < required {
			return Err(DigSigProcErr::InvalidInput(format!("acquisition needs {} samples, block has {}", required, block.len())));
		}

		let spc = self.samples_per_code;
		let len_fft = self.len_fft;
		let doppler_bins = self.config.doppler_bins(self.doppler_center_hz);
		let mut grid = AcquisitionGrid::new(doppler_bins.clone(), spc);
		let guard_code = (self.config.guard_code_chips * self.fs / self.local_code_chip_rate_hz).ceil() as usize;

		// Cells hold |r/N|^2 so an aligned unit-amplitude signal peaks at one
		let scale = 1.0 / (len_fft as f64).powi(4);

		let bit_search = self.config.bit_transition_search;
		let pfa = if bit_search { per_cell_pfa(self.config.pfa, self.config.max_dwells) } else { self.config.pfa };
		// Sum of the mean input power of every dwell in the grid
		let mut input_power = 0.0;

		let mut wiped:Vec<Complex<f64>>    = vec![Complex::zero(); len_fft];
		let mut fft_out:Vec<Complex<f64>>  = vec![Complex::zero(); len_fft];
		let mut ifft_out:Vec<Complex<f64>> = vec![Complex::zero(); len_fft];

		let mut result = AcquisitionResult {
			signal: local_code.signal, detected: false, doppler_hz: self.doppler_center_hz,
			doppler_step_hz: self.config.doppler_step_hz, code_phase_samples: 0, test_statistic: 0.0, threshold: 0.0,
			peak_power: 0.0, noise_floor: 0.0, dwells: 0,
			sample_stamp: block.start_idx.saturating_sub(self.config.resampler_latency_samples),
		};

		for dwell in 0..self.config.max_dwells {
			let offset = dwell * len_fft;
			let signal = &block.samples[offset..offset + len_fft];

			if bit_search {
				grid.clear();
				input_power = 0.0;
			}
			input_power += signal.iter().map(|x| x.norm_sqr()).sum::<f64>() / (len_fft as f64);

			for (bin, freq) in doppler_bins.iter().enumerate() {
				if self.stop.is_stopped() { return Err(DigSigProcErr::Cancelled); }

				// Wipe the carrier off the input signal
				let phase_step_rad:f64 = (-2.0 * consts::PI * freq) / self.fs;
				for (i, (w, x)) in wiped.iter_mut().zip(signal.iter()).enumerate() {
					let phase = phase_step_rad * ((offset + i) as f64);
					*w = x * Complex{ re: phase.cos(), im: phase.sin() };
				}

				// Multiplication in the frequency domain is circular correlation in the time domain
				self.fft.process(&mut wiped, &mut fft_out);
				for (y, c) in fft_out.iter_mut().zip(self.local_code_freq_domain.iter()) { *y = *y * c; }
				self.ifft.process(&mut fft_out, &mut ifft_out);

				// The local code repeats every period, so the first period of offsets holds every distinct value
				for (cell, c) in grid.row_mut(bin).iter_mut().zip(ifft_out.iter()) {
					*cell += c.norm_sqr() * scale;
				}
			}

			let dwells = dwell + 1;
			let in_grid = if bit_search { 1 } else { dwells };
			let (peak_bin, peak_code, peak) = grid.peak();
			let noise_floor = match self.config.noise_estimate {
				NoiseEstimate::GuardedGridMean => grid.noise_floor(peak_bin, peak_code, self.config.guard_doppler_bins, guard_code),
				// A noise-only cell averages the input power over the coherent length
				NoiseEstimate::InputPower => input_power / (len_fft as f64),
			};
			let test_statistic = if noise_floor > 0.0 { peak / noise_floor } else { 0.0 };
			let threshold = self.threshold.threshold(pfa, grid.n_cells(), in_grid)?;

			debug!("{}: dwell {} peak at {:.1} [Hz], {} [samples], statistic {:.2} vs threshold {:.2}",
				local_code.signal, dwells, doppler_bins[peak_bin], peak_code, test_statistic, threshold);

			result.dwells = dwells;
			result.threshold = threshold;
			if !bit_search || dwell == 0 || test_statistic > result.test_statistic {
				result.doppler_hz = doppler_bins[peak_bin];
				result.code_phase_samples = peak_code;
				result.test_statistic = test_statistic;
				result.peak_power = peak / (in_grid as f64);
				result.noise_floor = noise_floor / (in_grid as f64);
			}

			if test_statistic > threshold {
				result.detected = true;
				info!("{} acquired at {:.1} [Hz], code phase {} [samples] after {} dwell(s)",
					local_code.signal, result.doppler_hz, result.code_phase_samples, dwells);
				break;
			}
		}

		Ok(result)
	}

}
