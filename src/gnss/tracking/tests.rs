use crate::{DigSigProcErr, SampleBlock};
use crate::gnss::acquisition::{AcquisitionConfig, AcquisitionEngine, AcquisitionResult};
use crate::gnss::signal::LocalCodeReplica;
use crate::gnss::simulation::SignalSimulator;
use crate::gnss::synchro::GnssSynchro;
use crate::utils;

use super::{CarrierDiscriminator, TrackingConfig, TrackingLoop, TrackingState};

const FS:f64 = 2.5e6;

fn detection(code:&LocalCodeReplica, doppler_hz:f64, code_phase_samples:usize, sample_stamp:u64) -> AcquisitionResult {
	AcquisitionResult { signal: code.signal, detected: true, doppler_hz, doppler_step_hz: 250.0, code_phase_samples,
		test_statistic: 100.0, threshold: 10.0, peak_power: 1.0, noise_floor: 0.01, dwells: 1, sample_stamp }
}

fn step(trk:&mut TrackingLoop, sim:&mut SignalSimulator) -> GnssSynchro {
	let start = sim.next_idx();
	let samples = sim.next_block(trk.next_epoch_len());
	trk.process_epoch(&SampleBlock::new(&samples, sim.fs, start)).unwrap()
}

fn chip_error(a:f64, b:f64, len:usize) -> f64 { utils::wrap_symmetric(a - b, len as f64) }

#[test]
fn aligned_signal_reaches_steady_state() {
	let code = LocalCodeReplica::gps_l1_ca(3).unwrap();

	for &disc in &[CarrierDiscriminator::Costas, CarrierDiscriminator::Atan2] {
		let config = TrackingConfig{ carrier_discriminator: disc, ..TrackingConfig::default() };
		let mut trk = TrackingLoop::new(config, FS, code.clone(), 0).unwrap();
		let mut sim = SignalSimulator::new(code.clone(), FS, 0.0, 0.0, 0.5);
		trk.initialize(&detection(&code, 0.0, 0, 0), 0).unwrap();
		assert_eq!(trk.state(), TrackingState::Initializing);

		let mut locked_at = None;
		for k in 0..50 {
			let rec = step(&mut trk, &mut sim);
			if rec.state == TrackingState::SteadyState { locked_at = Some(k); break; }
		}
		assert!(locked_at.is_some(), "{:?} never locked", disc);

		let mut last = None;
		for _ in 0..100 { last = Some(step(&mut trk, &mut sim)); }
		let rec = last.unwrap();
		assert!(rec.valid);
		assert!(rec.code_error_chips.abs() < 0.02, "{:?}", rec);
		assert!(rec.carrier_phase_error_rad.abs() < 0.05, "{:?}", rec);
		assert!(rec.carrier_doppler_hz.abs() < 1.0, "{:?}", rec);
		assert!(rec.cn0_db_hz > 60.0);
		assert!(rec.carrier_lock_test > 0.99);
		assert!(chip_error(rec.code_phase_chips, sim.code_phase_chips(), 1023).abs() < 0.02);
	}
}

#[test]
fn acquired_signal_is_tracked_to_fine_code_phase() {
	let code = LocalCodeReplica::gps_l1_ca(17).unwrap();
	let mut sim = SignalSimulator::new(code.clone(), FS, 1500.0, 237.0, 1.0).with_noise(45.0, 1500);

	let mut engine = AcquisitionEngine::new(AcquisitionConfig::default(), FS, &code).unwrap();
	let samples = sim.next_block(engine.samples_required());
	let acq = engine.search(&SampleBlock::new(&samples, FS, 0), &code).unwrap();
	assert!(acq.detected);
	assert!((acq.doppler_hz - 1500.0).abs() <= acq.doppler_step_hz);
	assert!((acq.code_phase_samples as i64 - 237).abs() <= 1, "{:?}", acq);

	let mut trk = TrackingLoop::new(TrackingConfig::default(), FS, code.clone(), 4).unwrap();
	trk.initialize(&acq, sim.next_idx()).unwrap();

	// Pull in, then let the narrow loops settle
	let mut locked_at = None;
	for k in 0..3000 {
		let rec = step(&mut trk, &mut sim);
		assert_ne!(rec.state, TrackingState::LossOfLock);
		if rec.state == TrackingState::SteadyState && locked_at.is_none() { locked_at = Some(k); }
		if let Some(l) = locked_at { if k >= l + 200 { break; } }
	}
	assert!(locked_at.is_some(), "no lock within 3000 epochs");

	let mut errors = vec![];
	let mut cn0 = vec![];
	for _ in 0..1000 {
		let rec = step(&mut trk, &mut sim);
		assert_eq!(rec.state, TrackingState::SteadyState);
		assert_eq!(rec.channel_id, 4);
		errors.push(chip_error(rec.code_phase_chips, sim.code_phase_chips(), 1023));
		cn0.push(rec.cn0_db_hz);
	}

	let sd = utils::std_dev(&errors);
	assert!(sd < 0.05, "code phase error sd {} [chips]", sd);
	assert!(utils::mean(&errors).abs() < 0.05);
	assert!((trk.carrier_doppler_hz() - 1500.0).abs() < 5.0);
	assert!((utils::mean(&cn0) - 45.0).abs() < 2.0, "mean C/N0 {}", utils::mean(&cn0));
}

fn locked_loop(code:&LocalCodeReplica, doppler_hz:f64, seed:u64) -> (TrackingLoop, SignalSimulator) {
	let mut trk = TrackingLoop::new(TrackingConfig::default(), FS, code.clone(), 0).unwrap();
	let mut sim = SignalSimulator::new(code.clone(), FS, doppler_hz, 0.0, 0.0).with_noise(45.0, seed);
	trk.initialize(&detection(code, doppler_hz, 0, 0), 0).unwrap();
	for _ in 0..300 { step(&mut trk, &mut sim); }
	assert_eq!(trk.state(), TrackingState::SteadyState);
	(trk, sim)
}

// The default loop holds a Doppler step of about 5 [Hz] in steady state; these two sit either side of it
#[test]
fn doppler_step_inside_tolerance_keeps_lock() {
	let code = LocalCodeReplica::gps_l1_ca(8).unwrap();
	for &(seed, step_hz) in &[(1, 4.0), (3, -4.0)] {
		let (mut trk, mut sim) = locked_loop(&code, -2000.0, seed);

		sim.set_doppler(-2000.0 + step_hz);
		for _ in 0..500 {
			let rec = step(&mut trk, &mut sim);
			assert_eq!(rec.state, TrackingState::SteadyState, "step {} [Hz]", step_hz);
		}
		assert!((trk.carrier_doppler_hz() - sim.doppler_hz).abs() < 5.0);
	}
}

#[test]
fn doppler_step_past_tolerance_loses_lock() {
	let code = LocalCodeReplica::gps_l1_ca(8).unwrap();
	let (mut trk, mut sim) = locked_loop(&code, -2000.0, 4);

	// The frequency estimate follows, but the transient phase error holds the carrier lock test down for longer than
	// the unlock hysteresis allows
	sim.set_doppler(-1992.0);
	let mut lost_at = None;
	for k in 0..300 {
		if step(&mut trk, &mut sim).state == TrackingState::LossOfLock {
			lost_at = Some(k);
			break;
		}
	}
	let lost_at = lost_at.expect("8 [Hz] step should break lock");
	assert!(lost_at >= TrackingConfig::default().unlock_epochs, "lost lock after only {} epochs", lost_at);
}

#[test]
fn large_doppler_step_loses_lock() {
	let code = LocalCodeReplica::gps_l1_ca(8).unwrap();
	let (mut trk, mut sim) = locked_loop(&code, -2000.0, 2);

	sim.set_doppler(0.0);
	let mut lost_at = None;
	for k in 0..200 {
		let rec = step(&mut trk, &mut sim);
		if rec.state == TrackingState::LossOfLock {
			assert!(!rec.valid);
			lost_at = Some(k);
			break;
		}
	}
	assert!(lost_at.is_some());
	assert_eq!(trk.next_epoch_len(), 0);

	let samples = sim.next_block(2500);
	assert_eq!(trk.process_epoch(&SampleBlock::new(&samples, FS, trk.sample_counter())),
		Err(DigSigProcErr::InvalidState("tracking loop has lost lock")));
}

#[test]
fn pull_in_without_a_signal_gives_up() {
	let code = LocalCodeReplica::gps_l1_ca(1).unwrap();
	let config = TrackingConfig{ max_pull_in_epochs: 60, ..TrackingConfig::default() };
	let mut trk = TrackingLoop::new(config, FS, code.clone(), 0).unwrap();
	let mut sim = SignalSimulator::noise_only(FS, 1.0, 99);
	trk.initialize(&detection(&code, 500.0, 100, 0), 0).unwrap();

	let mut records = vec![];
	while trk.state() != TrackingState::LossOfLock && records.len() < 100 {
		records.push(step(&mut trk, &mut sim));
	}
	assert_eq!(trk.state(), TrackingState::LossOfLock);
	// One alignment epoch, then the pull-in budget
	assert_eq!(records.len(), 62);
	assert!(records.iter().all(|r| !r.valid));
}

#[test]
fn epochs_end_on_code_period_boundaries() {
	let code = LocalCodeReplica::gps_l1_ca(21).unwrap();
	let config = TrackingConfig{ code_periods_per_epoch: 2, ..TrackingConfig::default() };
	let mut trk = TrackingLoop::new(config, FS, code.clone(), 0).unwrap();
	let mut sim = SignalSimulator::new(code.clone(), FS, 900.0, 1000.0, 0.0);
	trk.initialize(&detection(&code, 900.0, 1000, 0), 0).unwrap();

	// The first epoch only runs up to the next code period
	assert!(trk.next_epoch_len() <= 1001);
	let mut expected_counter = 0;
	for k in 0..20 {
		let n = trk.next_epoch_len();
		let rec = step(&mut trk, &mut sim);
		expected_counter += n as u64;
		assert_eq!(rec.sample_counter, expected_counter);
		assert_eq!(rec.epoch, k + 1);
		assert_eq!(rec.epoch_len, n);
		if k > 0 { assert!(n >= 4999 && n <= 5001, "epoch of {} samples", n); }

		let cps = rec.code_freq_hz / FS;
		assert!(rec.code_phase_chips < 2.0 * cps || rec.code_phase_chips > 1023.0 - 1.0e-6, "{}", rec.code_phase_chips);
	}
}

#[test]
fn rejects_out_of_sequence_blocks() {
	let code = LocalCodeReplica::gps_l1_ca(1).unwrap();
	let mut trk = TrackingLoop::new(TrackingConfig::default(), FS, code.clone(), 0).unwrap();
	let mut sim = SignalSimulator::new(code.clone(), FS, 0.0, 0.0, 0.0);
	let samples = sim.next_block(5000);

	assert_eq!(trk.process_epoch(&SampleBlock::new(&samples[..2500], FS, 0)),
		Err(DigSigProcErr::InvalidState("tracking loop has not been initialized")));

	let mut not_detected = detection(&code, 0.0, 0, 0);
	not_detected.detected = false;
	assert!(trk.initialize(&not_detected, 0).is_err());

	trk.initialize(&detection(&code, 0.0, 0, 0), 0).unwrap();
	let n = trk.next_epoch_len();
	let is_input_err = |r:Result<GnssSynchro, DigSigProcErr>| match r { Err(DigSigProcErr::InvalidInput(_)) => true, _ => false };
	assert!(is_input_err(trk.process_epoch(&SampleBlock::new(&samples[..n - 1], FS, 0))));
	assert!(is_input_err(trk.process_epoch(&SampleBlock::new(&samples[..n], FS, 7))));
	assert!(is_input_err(trk.process_epoch(&SampleBlock::new(&samples[..n], 2.0 * FS, 0))));

	// Rejected blocks leave the loop where it was
	assert_eq!(trk.state(), TrackingState::Initializing);
	assert!(trk.process_epoch(&SampleBlock::new(&samples[..n], FS, 0)).is_ok());
	assert_eq!(trk.state(), TrackingState::PullIn);
}

#[test]
fn rejects_bad_configuration() {
	let code = LocalCodeReplica::gps_l1_ca(1).unwrap();
	let is_config_err = |c:TrackingConfig| match TrackingLoop::new(c, FS, code.clone(), 0) {
		Err(DigSigProcErr::InvalidConfiguration(_)) => true,
		_ => false,
	};
	assert!(is_config_err(TrackingConfig{ pll_bw_hz: 0.0, ..TrackingConfig::default() }));
	assert!(is_config_err(TrackingConfig{ code_periods_per_epoch: 0, ..TrackingConfig::default() }));
	assert!(is_config_err(TrackingConfig{ unlock_phase_error_threshold: 0.01, ..TrackingConfig::default() }));
	assert!(is_config_err(TrackingConfig{ lock_window: 1, ..TrackingConfig::default() }));
	assert!(is_config_err(TrackingConfig{ taps: crate::gnss::correlator::TapLayout::early_prompt_late(-0.5), ..TrackingConfig::default() }));
}

#[test]
fn record_extrapolates_code_phase() {
	let code = LocalCodeReplica::gps_l1_ca(1).unwrap();
	let mut trk = TrackingLoop::new(TrackingConfig::default(), FS, code.clone(), 0).unwrap();
	let mut sim = SignalSimulator::new(code.clone(), FS, 0.0, 0.0, 0.0);
	trk.initialize(&detection(&code, 0.0, 0, 0), 0).unwrap();
	let rec = step(&mut trk, &mut sim);

	let later = rec.code_phase_at(rec.sample_counter + 1250, FS, 1023);
	assert!((later - (rec.code_phase_chips + 0.5 * 1023.0 * rec.code_freq_hz / 1.023e6)).abs() < 1.0e-6);
}
