use log::{debug, info, warn};
use rustfft::num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::{DigSigProcErr, SampleBlock};
use crate::gnss::StopHandle;
use crate::gnss::acquisition::{AcquisitionConfig, AcquisitionEngine, AcquisitionResult};
use crate::gnss::signal::{LocalCodeReplica, SignalId};
use crate::gnss::synchro::GnssSynchro;
use crate::gnss::tracking::{TrackingConfig, TrackingLoop, TrackingState};


#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ChannelState {
	Idle,
	Acquiring,
	Tracking,
	Lost,
}

/// What a channel does once `max_acquisition_attempts` searches in a row have come up empty
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ExhaustedPolicy {
	/// Drop to Idle until the next `start`
	Idle,
	/// Keep searching, with the Doppler search recentered on zero
	Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
	pub acquisition: AcquisitionConfig,
	pub tracking: TrackingConfig,
	pub max_acquisition_attempts: usize,
	pub on_exhausted: ExhaustedPolicy,
	/// Go straight back to acquisition after loss of lock
	pub reacquire_after_loss: bool,
	/// Center the reacquisition Doppler search on the last tracked Doppler
	pub recenter_doppler_after_loss: bool,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			acquisition: AcquisitionConfig::default(),
			tracking: TrackingConfig::default(),
			max_acquisition_attempts: 3,
			on_exhausted: ExhaustedPolicy::Retry,
			reacquire_after_loss: true,
			recenter_doppler_after_loss: true,
		}
	}
}

impl ChannelConfig {

	pub fn validate(&self) -> Result<(), DigSigProcErr> {
		self.acquisition.validate()?;
		self.tracking.validate()?;
		if self.max_acquisition_attempts == 0 {
			return Err(DigSigProcErr::InvalidConfiguration("a channel needs at least one acquisition attempt".into()));
		}
		Ok(())
	}

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelEvent {
	Acquisition(AcquisitionResult),
	StateChange{ from:ChannelState, to:ChannelState, sample_idx:u64 },
	Synchro(GnssSynchro),
}

/// One receiver channel.  Sequences acquisition and tracking of one signal over blocks of any size, staging samples
/// until the active component has exactly what it needs.  Acquisition and tracking never run at the same time.
pub struct Channel {
	id: usize,
	config: ChannelConfig,
	fs: f64,
	state: ChannelState,
	code: LocalCodeReplica,
	acq: AcquisitionEngine,
	trk: TrackingLoop,
	staging: Vec<Complex<f64>>,
	staging_start_idx: u64,
	attempts: usize,
	last_doppler_hz: f64,
	stop: StopHandle,
}

impl Channel {

	pub fn new(id:usize, config:ChannelConfig, fs:f64, signal:SignalId) -> Result<Self, DigSigProcErr> {
		Self::with_code(id, config, fs, LocalCodeReplica::for_signal(signal)?)
	}

	pub fn with_code(id:usize, config:ChannelConfig, fs:f64, code:LocalCodeReplica) -> Result<Self, DigSigProcErr> {
		config.validate()?;
		let stop = StopHandle::new();
		let mut acq = AcquisitionEngine::new(config.acquisition.clone(), fs, &code)?;
		acq.set_stop_handle(stop.clone());
		let trk = TrackingLoop::new(config.tracking.clone(), fs, code.clone(), id)?;

		Ok(Self { id, config, fs, state: ChannelState::Idle, code, acq, trk, staging: vec![], staging_start_idx: 0,
			attempts: 0, last_doppler_hz: 0.0, stop })
	}

	// Read-only getter methods
	pub fn id(&self) -> usize { self.id }
	pub fn fs(&self) -> f64 { self.fs }
	pub fn state(&self) -> ChannelState { self.state }
	pub fn signal(&self) -> SignalId { self.code.signal }
	pub fn config(&self) -> &ChannelConfig { &self.config }
	pub fn acquisition(&self) -> &AcquisitionEngine { &self.acq }
	pub fn tracking(&self) -> &TrackingLoop { &self.trk }
	pub fn last_doppler_hz(&self) -> f64 { self.last_doppler_hz }

	/// Samples the channel is holding for the active component
	pub fn staged_len(&self) -> usize { self.staging.len() }

	/// A handle that makes the channel drop to Idle at its next checkpoint.  Shared with the acquisition engine so
	/// that a search is abandoned between Doppler bins.
	pub fn stop_handle(&self) -> StopHandle { self.stop.clone() }

	/// Starts or restarts acquisition, rebinding the channel to `signal` when one is given
	pub fn start(&mut self, signal:Option<SignalId>) -> Result<(), DigSigProcErr> {
		match signal {
			Some(s) if s != self.code.signal => self.rebind(LocalCodeReplica::for_signal(s)?),
			_ => self.begin_acquisition(),
		}
	}

	/// Starts acquisition of an arbitrary code
	pub fn start_with_code(&mut self, code:LocalCodeReplica) -> Result<(), DigSigProcErr> { self.rebind(code) }

	fn rebind(&mut self, code:LocalCodeReplica) -> Result<(), DigSigProcErr> {
		// Build everything before touching the channel so a bad code leaves it as it was
		let mut acq = AcquisitionEngine::new(self.config.acquisition.clone(), self.fs, &code)?;
		acq.set_stop_handle(self.stop.clone());
		let trk = TrackingLoop::new(self.config.tracking.clone(), self.fs, code.clone(), self.id)?;

		info!("channel {}: {} -> {}", self.id, self.code.signal, code.signal);
		self.acq = acq;
		self.trk = trk;
		self.code = code;
		self.begin_acquisition()
	}

	fn begin_acquisition(&mut self) -> Result<(), DigSigProcErr> {
		self.stop.clear();
		self.acq.set_doppler_center(0.0);
		self.trk.reset();
		self.staging.clear();
		self.attempts = 0;
		let idx = self.staging_start_idx;
		self.transition(ChannelState::Acquiring, idx);
		Ok(())
	}

	/// Drops to Idle, discarding staged samples
	pub fn stop(&mut self) {
		self.trk.reset();
		self.staging.clear();
		let idx = self.staging_start_idx;
		self.transition(ChannelState::Idle, idx);
	}

	fn transition(&mut self, to:ChannelState, sample_idx:u64) -> Option<ChannelEvent> {
		let from = self.state;
		if from == to { return None; }
		self.state = to;
		info!("channel {} ({}): {:?} -> {:?} at sample {}", self.id, self.code.signal, from, to, sample_idx);
		Some(ChannelEvent::StateChange{ from, to, sample_idx })
	}

	fn consume(&mut self, n:usize) {
		self.staging.drain(..n);
		self.staging_start_idx += n as u64;
	}

	fn halt(&mut self, events:&mut Vec<ChannelEvent>) {
		self.stop.clear();
		self.trk.reset();
		self.staging.clear();
		let idx = self.staging_start_idx;
		events.extend(self.transition(ChannelState::Idle, idx));
	}

	/// Hands a block of samples to the channel and runs every acquisition attempt or tracking epoch it completes
	pub fn apply(&mut self, block:&SampleBlock) -> Result<Vec<ChannelEvent>, DigSigProcErr> {
		if (block.fs - self.fs).abs() > 1.0e-6 * self.fs {
			return Err(DigSigProcErr::InvalidInput(format!("block sampled at {} [sps], channel running at {} [sps]", block.fs, self.fs)));
		}

		let mut events = vec![];
		if self.state == ChannelState::Idle {
			self.staging_start_idx = block.end_idx();
			return Ok(events);
		}

		let expected_idx = self.staging_start_idx + self.staging.len() as u64;
		if block.start_idx != expected_idx {
			if self.state == ChannelState::Tracking {
				return Err(DigSigProcErr::InvalidInput(format!("expected sample {} while tracking, block starts at {}", expected_idx, block.start_idx)));
			}
			debug!("channel {}: gap from sample {} to {}, restaging", self.id, expected_idx, block.start_idx);
			self.staging.clear();
		}
		if self.staging.is_empty() { self.staging_start_idx = block.start_idx; }
		self.staging.extend_from_slice(block.samples);

		loop {
			if self.stop.is_stopped() {
				self.halt(&mut events);
				break;
			}

			match self.state {
				ChannelState::Idle => {
					self.staging_start_idx += self.staging.len() as u64;
					self.staging.clear();
					break;
				},
				ChannelState::Acquiring => {
					let n = self.acq.samples_required();
					if self.staging.len() < n { break; }
					if !self.acquire(n, &mut events)? { break; }
				},
				ChannelState::Tracking => {
					let n = self.trk.next_epoch_len();
					if self.staging.len() < n { break; }
					self.track(n, &mut events)?;
				},
				ChannelState::Lost => {
					if !self.config.reacquire_after_loss {
						self.staging_start_idx += self.staging.len() as u64;
						self.staging.clear();
						break;
					}
					self.acq.set_doppler_center(if self.config.recenter_doppler_after_loss { self.last_doppler_hz } else { 0.0 });
					self.attempts = 0;
					let idx = self.staging_start_idx;
					events.extend(self.transition(ChannelState::Acquiring, idx));
				},
			}
		}

		Ok(events)
	}

	/// Runs one acquisition attempt over the first `n` staged samples.  Returns false once the channel halted.
	fn acquire(&mut self, n:usize, events:&mut Vec<ChannelEvent>) -> Result<bool, DigSigProcErr> {
		let result = {
			let block = SampleBlock::new(&self.staging[..n], self.fs, self.staging_start_idx);
			match self.acq.search(&block, &self.code) {
				Err(DigSigProcErr::Cancelled) => {
					self.halt(events);
					return Ok(false);
				},
				r => r?,
			}
		};
		self.consume(n);
		events.push(ChannelEvent::Acquisition(result.clone()));

		if result.detected {
			self.trk.initialize(&result, self.staging_start_idx)?;
			self.attempts = 0;
			let idx = self.staging_start_idx;
			events.extend(self.transition(ChannelState::Tracking, idx));
			return Ok(true);
		}

		self.attempts += 1;
		if self.attempts >= self.config.max_acquisition_attempts {
			warn!("channel {} ({}): no detection in {} attempts", self.id, self.code.signal, self.attempts);
			self.attempts = 0;
			match self.config.on_exhausted {
				ExhaustedPolicy::Idle  => {
					let idx = self.staging_start_idx;
					events.extend(self.transition(ChannelState::Idle, idx));
				},
				ExhaustedPolicy::Retry => self.acq.set_doppler_center(0.0),
			}
		}
		Ok(true)
	}

	fn track(&mut self, n:usize, events:&mut Vec<ChannelEvent>) -> Result<(), DigSigProcErr> {
		let rec = {
			let block = SampleBlock::new(&self.staging[..n], self.fs, self.staging_start_idx);
			self.trk.process_epoch(&block)?
		};
		self.consume(n);

		let lost = rec.state == TrackingState::LossOfLock;
		self.last_doppler_hz = rec.carrier_doppler_hz;
		events.push(ChannelEvent::Synchro(rec));

		if lost {
			let idx = self.staging_start_idx;
			events.extend(self.transition(ChannelState::Lost, idx));
		}
		Ok(())
	}

}
