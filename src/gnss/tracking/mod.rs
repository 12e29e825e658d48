use std::f64::consts;

use log::{debug, info, warn};
use rustfft::num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::{DigSigProcErr, SampleBlock};
use crate::filters::{ScalarFilter, SecondOrderLoopFilter, ThirdOrderLoopFilter};
use crate::gnss::acquisition::AcquisitionResult;
use crate::gnss::correlator::{Correlator, CorrelatorKind, CorrelationTapSet, TapLayout, TapName};
use crate::gnss::signal::{LocalCodeReplica, SignalId};
use crate::gnss::synchro::GnssSynchro;
use crate::utils;

pub mod discriminators;
pub mod lock_detectors;

#[cfg(test)]
mod tests;

use self::lock_detectors::LockDetector;

// A code phase this close below the end of a period is treated as the start of the next one
const CODE_BOUNDARY_TOL_CHIPS:f64 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
	Initializing,
	PullIn,
	SteadyState,
	LossOfLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierDiscriminator {
	/// Two-quadrant, for signals carrying data bits
	Costas,
	/// Four-quadrant, for pilot signals
	Atan2,
}

/// Loop and lock detector settings.  With the defaults at 45 [dB-Hz] the steady state loop rides out a Doppler step of
/// about 5 [Hz].  Larger steps are still followed in frequency, but the phase error transient can hold the carrier
/// lock test under `carrier_lock_threshold` for more than `unlock_epochs`; from about 8 [Hz] lock is always declared
/// lost.  A wider `pll_narrow_bw_hz` or a longer `unlock_epochs` raises that margin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
	pub taps: TapLayout,
	pub correlator: CorrelatorKind,
	/// Code periods integrated coherently in each epoch
	pub code_periods_per_epoch: usize,
	pub pll_bw_hz: f64,
	pub pll_narrow_bw_hz: f64,
	/// Frequency-locked assist bandwidth, only used during pull-in [Hz]
	pub fll_bw_hz: f64,
	pub dll_bw_hz: f64,
	pub dll_narrow_bw_hz: f64,
	pub dll_damping: f64,
	pub carrier_discriminator: CarrierDiscriminator,
	/// Steer the code NCO with the carrier Doppler scaled to the chip rate
	pub carrier_aiding: bool,
	/// Epochs in the lock detector window
	pub lock_window: usize,
	/// Mean square phase error below which pull-in counts an epoch as locked [rad^2]
	pub lock_phase_error_threshold: f64,
	/// Mean square phase error above which steady state counts an epoch as failed [rad^2]
	pub unlock_phase_error_threshold: f64,
	pub lock_epochs: usize,
	pub unlock_epochs: usize,
	pub cn0_min_db_hz: f64,
	pub carrier_lock_threshold: f64,
	pub max_pull_in_epochs: usize,
}

impl Default for TrackingConfig {
	fn default() -> Self {
		Self {
			taps: TapLayout::early_prompt_late(0.5),
			correlator: CorrelatorKind::Auto,
			code_periods_per_epoch: 1,
			pll_bw_hz: 30.0,
			pll_narrow_bw_hz: 20.0,
			fll_bw_hz: 10.0,
			dll_bw_hz: 10.0,
			dll_narrow_bw_hz: 2.0,
			dll_damping: 0.7,
			carrier_discriminator: CarrierDiscriminator::Costas,
			carrier_aiding: true,
			lock_window: 10,
			lock_phase_error_threshold: 0.05,
			unlock_phase_error_threshold: 0.5,
			lock_epochs: 20,
			unlock_epochs: 50,
			cn0_min_db_hz: 30.0,
			carrier_lock_threshold: 0.8,
			max_pull_in_epochs: 2000,
		}
	}
}

impl TrackingConfig {

	pub fn validate(&self) -> Result<(), DigSigProcErr> {
		self.taps.validate()?;
		if self.code_periods_per_epoch == 0 {
			return Err(DigSigProcErr::InvalidConfiguration("an epoch must span at least one code period".into()));
		}
		for (name, bw) in &[("PLL", self.pll_bw_hz), ("narrow PLL", self.pll_narrow_bw_hz), ("DLL", self.dll_bw_hz),
			("narrow DLL", self.dll_narrow_bw_hz)] {
			if !(*bw > 0.0) || !bw.is_finite() {
				return Err(DigSigProcErr::InvalidConfiguration(format!("{} bandwidth {} [Hz] must be positive", name, bw)));
			}
		}
		if !(self.fll_bw_hz >= 0.0) || !(self.dll_damping > 0.0) {
			return Err(DigSigProcErr::InvalidConfiguration(
				format!("FLL bandwidth {} [Hz] must be non-negative and DLL damping {} positive", self.fll_bw_hz, self.dll_damping)));
		}
		if self.lock_window < 2 || self.lock_epochs == 0 {
			return Err(DigSigProcErr::InvalidConfiguration("lock detector needs a window of two or more and at least one lock epoch".into()));
		}
		if !(self.lock_phase_error_threshold > 0.0) || !(self.unlock_phase_error_threshold >= self.lock_phase_error_threshold) {
			return Err(DigSigProcErr::InvalidConfiguration(format!("unlock threshold {} must be at least the lock threshold {} > 0",
				self.unlock_phase_error_threshold, self.lock_phase_error_threshold)));
		}
		if !(self.carrier_lock_threshold >= -1.0 && self.carrier_lock_threshold <= 1.0) {
			return Err(DigSigProcErr::InvalidConfiguration(format!("carrier lock threshold {} must be in [-1, 1]", self.carrier_lock_threshold)));
		}
		Ok(())
	}

}

/// Code and carrier tracking for one signal.  Each call to `process_epoch` integrates exactly `next_epoch_len()`
/// samples, closes the DLL and the FLL-assisted PLL, and reports the result as a `GnssSynchro`.
pub struct TrackingLoop {
	config: TrackingConfig,
	fs: f64,
	code: LocalCodeReplica,
	channel_id: usize,
	correlator: Box<dyn Correlator>,
	taps: Vec<(TapName, f64)>,
	replicas: Vec<Vec<Complex<f64>>>,
	initialized: bool,
	state: TrackingState,
	acq_doppler_hz: f64,
	carrier_doppler_hz: f64,
	carrier_phase_rad: f64,
	code_phase_chips: f64,
	code_freq_hz: f64,
	pll: ThirdOrderLoopFilter,
	dll: SecondOrderLoopFilter,
	lock: LockDetector,
	prev_prompt: Option<(Complex<f64>, usize)>,
	lock_pass_count: usize,
	lock_fail_count: usize,
	pull_in_epochs: usize,
	epoch: u64,
	sample_counter: u64,
	next_epoch_len: usize,
	last_cn0_db_hz: f64,
	last_carrier_lock_test: f64,
}

impl TrackingLoop {

	pub fn new(config:TrackingConfig, fs:f64, code:LocalCodeReplica, channel_id:usize) -> Result<Self, DigSigProcErr> {
		config.validate()?;
		if !(fs > 0.0) || !fs.is_finite() {
			return Err(DigSigProcErr::InvalidConfiguration(format!("sample rate {} [sps] must be positive", fs)));
		}
		let correlator = config.correlator.build();
		let taps = config.taps.taps();
		let replicas = vec![vec![]; taps.len()];
		let pll = ThirdOrderLoopFilter::new(config.pll_bw_hz, config.fll_bw_hz);
		let dll = SecondOrderLoopFilter::new(config.dll_bw_hz, config.dll_damping);
		let lock = LockDetector::new(config.lock_window);
		let code_freq_hz = code.chip_rate_hz;

		Ok(Self { config, fs, code, channel_id, correlator, taps, replicas, initialized: false,
			state: TrackingState::Initializing, acq_doppler_hz: 0.0, carrier_doppler_hz: 0.0, carrier_phase_rad: 0.0,
			code_phase_chips: 0.0, code_freq_hz, pll, dll, lock, prev_prompt: None, lock_pass_count: 0, lock_fail_count: 0,
			pull_in_epochs: 0, epoch: 0, sample_counter: 0, next_epoch_len: 0, last_cn0_db_hz: 0.0, last_carrier_lock_test: 0.0 })
	}

	/// Replaces the correlation strategy chosen by the configuration
	pub fn with_correlator(mut self, correlator:Box<dyn Correlator>) -> Self {
		self.correlator = correlator;
		self
	}

	pub fn config(&self) -> &TrackingConfig { &self.config }
	pub fn fs(&self) -> f64 { self.fs }
	pub fn signal(&self) -> SignalId { self.code.signal }
	pub fn channel_id(&self) -> usize { self.channel_id }
	pub fn state(&self) -> TrackingState { self.state }
	pub fn epoch(&self) -> u64 { self.epoch }

	/// Absolute index of the next sample the loop expects
	pub fn sample_counter(&self) -> u64 { self.sample_counter }

	/// Length of the block the next call to `process_epoch` must be given, zero once lock is lost
	pub fn next_epoch_len(&self) -> usize { self.next_epoch_len }

	pub fn code_phase_chips(&self) -> f64 { self.code_phase_chips }
	pub fn code_freq_hz(&self) -> f64 { self.code_freq_hz }
	pub fn carrier_doppler_hz(&self) -> f64 { self.carrier_doppler_hz }
	pub fn carrier_phase_rad(&self) -> f64 { self.carrier_phase_rad }
	pub fn last_cn0_db_hz(&self) -> f64 { self.last_cn0_db_hz }
	pub fn last_carrier_lock_test(&self) -> f64 { self.last_carrier_lock_test }

	/// Starts tracking from a detection.  `start_idx` is the absolute index of the first sample that will be handed
	/// to `process_epoch`; the acquired code phase is propagated to it at the acquired Doppler.
	pub fn initialize(&mut self, acq:&AcquisitionResult, start_idx:u64) -> Result<(), DigSigProcErr> {
		if !acq.detected {
			return Err(DigSigProcErr::InvalidInput(format!("{} was not detected, nothing to track", acq.signal)));
		}
		if acq.signal != self.code.signal {
			return Err(DigSigProcErr::InvalidInput(format!("detection of {} handed to a loop tracking {}", acq.signal, self.code.signal)));
		}

		let len = self.code.code_length() as f64;
		self.acq_doppler_hz = acq.doppler_hz;
		self.carrier_doppler_hz = acq.doppler_hz;
		self.code_freq_hz = self.nominal_code_freq(acq.doppler_hz);
		let cps = self.code_freq_hz / self.fs;
		let code_start = (acq.sample_stamp as f64) + (acq.code_phase_samples as f64);
		self.code_phase_chips = utils::wrap_positive(((start_idx as f64) - code_start) * cps, len);
		self.carrier_phase_rad = 0.0;

		self.pll = ThirdOrderLoopFilter::new(self.config.pll_bw_hz, self.config.fll_bw_hz);
		self.dll = SecondOrderLoopFilter::new(self.config.dll_bw_hz, self.config.dll_damping);
		self.pll.enable_rate_integrator(false);
		self.lock.clear();
		self.prev_prompt = None;
		self.lock_pass_count = 0;
		self.lock_fail_count = 0;
		self.pull_in_epochs = 0;
		self.epoch = 0;
		self.sample_counter = start_idx;
		self.last_cn0_db_hz = 0.0;
		self.last_carrier_lock_test = 0.0;

		self.initialized = true;
		self.state = TrackingState::Initializing;
		self.next_epoch_len = self.epoch_len_to_boundary(1);

		debug!("{} on channel {}: tracking from sample {} at {:.1} [Hz], code phase {:.3} [chips]",
			self.code.signal, self.channel_id, start_idx, acq.doppler_hz, self.code_phase_chips);
		Ok(())
	}

	/// Forgets the current signal; `initialize` must be called again before the next epoch
	pub fn reset(&mut self) {
		self.initialized = false;
		self.state = TrackingState::Initializing;
		self.next_epoch_len = 0;
		self.lock.clear();
	}

	fn nominal_code_freq(&self, doppler_hz:f64) -> f64 {
		self.code.chip_rate_hz * (1.0 + doppler_hz / self.code.carrier_freq_hz)
	}

	/// Samples until the local code has completed `periods` more code periods
	fn epoch_len_to_boundary(&self, periods:usize) -> usize {
		let len = self.code.code_length() as f64;
		let mut phase = self.code_phase_chips;
		if len - phase < CODE_BOUNDARY_TOL_CHIPS { phase -= len; }
		let cps = self.code_freq_hz / self.fs;
		((len * (periods as f64) - phase) / cps).ceil().max(1.0) as usize
	}

	fn declare_loss_of_lock(&mut self, reason:&str) {
		warn!("{} on channel {}: loss of lock after {} epochs ({})", self.code.signal, self.channel_id, self.epoch, reason);
		self.state = TrackingState::LossOfLock;
		self.next_epoch_len = 0;
	}

	/// Integrates one epoch and closes the loops.  `block` must hold exactly `next_epoch_len()` samples starting at
	/// `sample_counter()`.
	pub fn process_epoch(&mut self, block:&SampleBlock) -> Result<GnssSynchro, DigSigProcErr> {
		if !self.initialized {
			return Err(DigSigProcErr::InvalidState("tracking loop has not been initialized"));
		}
		if self.state == TrackingState::LossOfLock {
			return Err(DigSigProcErr::InvalidState("tracking loop has lost lock"));
		}
		if (block.fs - self.fs).abs() > 1.0e-6 * self.fs {
			return Err(DigSigProcErr::InvalidInput(format!("block sampled at {} [sps], loop running at {} [sps]", block.fs, self.fs)));
		}
		if block.len() != self.next_epoch_len {
			return Err(DigSigProcErr::InvalidInput(format!("epoch needs {} samples, block has {}", self.next_epoch_len, block.len())));
		}
		if block.start_idx != self.sample_counter {
			return Err(DigSigProcErr::InvalidInput(format!("expected sample {}, block starts at {}", self.sample_counter, block.start_idx)));
		}

		let n = block.len();
		let len = self.code.code_length() as f64;
		let cps = self.code_freq_hz / self.fs;
		let carrier_phase_inc_rad = 2.0 * consts::PI * self.carrier_doppler_hz / self.fs;

		// Local replicas for every tap
		for (replica, (_, offset)) in self.replicas.iter_mut().zip(self.taps.iter()) {
			replica.resize(n, Complex{ re: 0.0, im: 0.0 });
			self.code.resample_into(self.code_phase_chips + offset, cps, &mut replica[..n]);
		}
		let replica_refs:Vec<&[Complex<f64>]> = self.replicas.iter().map(|r| &r[..n]).collect();
		let nco_phase = utils::wrap_to_2pi(self.carrier_phase_rad);
		let values:Vec<Complex<f64>> = self.correlator.correlate(block.samples, nco_phase, carrier_phase_inc_rad, &replica_refs, n)?
			.into_iter().map(|v| v / (n as f64)).collect();
		let taps = CorrelationTapSet::from_layout(&self.config.taps, &values)?;

		// NCOs run over the epoch at the rates they were set to
		self.carrier_phase_rad += (n as f64) * carrier_phase_inc_rad;
		self.code_phase_chips = utils::wrap_positive(self.code_phase_chips + (n as f64) * cps, len);
		self.sample_counter += n as u64;
		self.epoch += 1;

		let prompt = taps.prompt();
		let (code_err, phase_err) = if self.state == TrackingState::Initializing {
			// This epoch only lined the NCO up with a code boundary
			self.state = TrackingState::PullIn;
			(0.0, 0.0)
		} else {
			self.close_loops(&taps, n)
		};

		let ans = GnssSynchro {
			signal: self.code.signal,
			channel_id: self.channel_id,
			sample_counter: self.sample_counter,
			epoch: self.epoch,
			epoch_len: n,
			code_phase_chips: self.code_phase_chips,
			code_freq_hz: self.code_freq_hz,
			carrier_phase_rad: self.carrier_phase_rad,
			carrier_doppler_hz: self.carrier_doppler_hz,
			carrier_doppler_rate_hz_s: self.pll.freq_rate() / (2.0 * consts::PI),
			cn0_db_hz: self.last_cn0_db_hz,
			carrier_lock_test: self.last_carrier_lock_test,
			code_error_chips: code_err,
			carrier_phase_error_rad: phase_err,
			prompt,
			taps,
			state: self.state,
			valid: self.state == TrackingState::SteadyState,
		};

		if self.state != TrackingState::LossOfLock {
			let periods = if self.state == TrackingState::Initializing { 1 } else { self.config.code_periods_per_epoch };
			self.next_epoch_len = self.epoch_len_to_boundary(periods);
		}
		Ok(ans)
	}

	/// Discriminators, loop filters and lock detection for one epoch of `n` samples.  Returns the code and phase errors.
	fn close_loops(&mut self, taps:&CorrelationTapSet, n:usize) -> (f64, f64) {
		let dt = (n as f64) / self.fs;
		let prompt = taps.prompt();
		let costas = self.config.carrier_discriminator == CarrierDiscriminator::Costas;

		let code_err = discriminators::dll_nelp(taps.early(), taps.late(), self.config.taps.early_late_spacing_chips);
		let phase_err = if costas { discriminators::pll_costas(prompt) } else { discriminators::pll_atan2(prompt) };
		let freq_err = match (self.state, self.prev_prompt) {
			(TrackingState::PullIn, Some((prev, prev_n))) =>
				discriminators::fll_cross_dot(prev, prompt, ((prev_n + n) as f64) / (2.0 * self.fs), costas),
			_ => 0.0,
		};
		self.prev_prompt = Some((prompt, n));

		// Carrier loop output is relative to the acquired Doppler
		let carrier_out = self.pll.apply_assisted(phase_err, freq_err, dt);
		self.carrier_doppler_hz = self.acq_doppler_hz + carrier_out / (2.0 * consts::PI);

		let code_out = self.dll.apply(code_err, dt);
		let aiding_doppler_hz = if self.config.carrier_aiding { self.carrier_doppler_hz } else { self.acq_doppler_hz };
		self.code_freq_hz = self.nominal_code_freq(aiding_doppler_hz) + code_out;

		self.update_lock_state(prompt, phase_err, dt);

		let chip_rate = self.code.chip_rate_hz;
		if self.state != TrackingState::LossOfLock && (!self.code_freq_hz.is_finite()
			|| self.code_freq_hz < 0.5 * chip_rate || self.code_freq_hz > 1.5 * chip_rate) {
			self.declare_loss_of_lock("code rate diverged");
		}

		(code_err, phase_err)
	}

	fn update_lock_state(&mut self, prompt:Complex<f64>, phase_err:f64, dt:f64) {
		let strip_data = self.config.carrier_discriminator == CarrierDiscriminator::Costas;
		self.lock.push(prompt, phase_err);

		let mut epoch_ok = None;
		if self.lock.is_full() {
			let mean_square = self.lock.phase_error_mean_square();
			self.last_cn0_db_hz = self.lock.cn0_db_hz(dt);
			self.last_carrier_lock_test = self.lock.carrier_lock_test(strip_data);
			let signal_ok = self.last_cn0_db_hz >= self.config.cn0_min_db_hz
				&& self.last_carrier_lock_test >= self.config.carrier_lock_threshold;
			epoch_ok = Some(match self.state {
				TrackingState::PullIn => signal_ok && mean_square < self.config.lock_phase_error_threshold,
				_                     => signal_ok && mean_square <= self.config.unlock_phase_error_threshold,
			});
		}

		match self.state {
			TrackingState::PullIn => {
				self.pull_in_epochs += 1;
				if epoch_ok == Some(true) { self.lock_pass_count += 1; } else { self.lock_pass_count = 0; }

				if self.lock_pass_count >= self.config.lock_epochs {
					self.state = TrackingState::SteadyState;
					self.lock_fail_count = 0;
					self.pll.set_noise_bandwidth(self.config.pll_narrow_bw_hz);
					self.pll.enable_rate_integrator(true);
					self.dll.set_noise_bandwidth(self.config.dll_narrow_bw_hz);
					info!("{} on channel {}: locked after {} epochs at {:.1} [Hz], C/N0 {:.1} [dB-Hz]",
						self.code.signal, self.channel_id, self.epoch, self.carrier_doppler_hz, self.last_cn0_db_hz);
				} else if self.pull_in_epochs > self.config.max_pull_in_epochs {
					self.declare_loss_of_lock("pull-in did not converge");
				}
			},
			TrackingState::SteadyState => {
				match epoch_ok {
					Some(false) => self.lock_fail_count += 1,
					Some(true) if self.lock_fail_count > 0 => self.lock_fail_count -= 1,
					_ => {},
				}
				if self.lock_fail_count > self.config.unlock_epochs {
					self.declare_loss_of_lock("lock detector failed");
				}
			},
			_ => {},
		}
	}

}
