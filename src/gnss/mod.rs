use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Spreading codes and the local replicas generated from them
pub mod signal;

/// Carrier wipe-off and multi-tap correlation strategies
pub mod correlator;

/// This module contains functionality related to acquiring GNSS signals
pub mod acquisition;

/// This module contains functionality related to tracking signals after acquisition
pub mod tracking;

pub mod synchro;

/// One receiver channel sequencing acquisition and tracking for one signal
pub mod channel;

#[cfg(test)]
pub(crate) mod simulation;

/// Shared flag a host can raise to make a long-running search or channel give up at its next checkpoint
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {

	pub fn new() -> Self { Self::default() }

	pub fn stop(&self)  { self.0.store(true, Ordering::SeqCst) }
	pub fn clear(&self) { self.0.store(false, Ordering::SeqCst) }
	pub fn is_stopped(&self) -> bool { self.0.load(Ordering::SeqCst) }

}
