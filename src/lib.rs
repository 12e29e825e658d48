use rustfft::num_complex::Complex;

pub mod block;

pub mod filters;
pub mod io;
pub mod gnss;

pub mod utils;

/// Owned run of samples, for handing a block to another task
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
	pub samples: Vec<Complex<f64>>,
	pub fs: f64,
	pub start_idx: u64,
}

impl SampleBuffer {
	pub fn as_block(&self) -> SampleBlock { SampleBlock::new(&self.samples, self.fs, self.start_idx) }
}

/// A borrowed run of contiguous complex baseband samples.  `start_idx` is the absolute index of the first sample
/// in the stream, which lets the consumers check continuity without owning the buffer.
#[derive(Debug, Clone, Copy)]
pub struct SampleBlock<'a> {
	pub samples: &'a [Complex<f64>],
	pub fs: f64,
	pub start_idx: u64,
}

impl<'a> SampleBlock<'a> {

	pub fn new(samples:&'a [Complex<f64>], fs:f64, start_idx:u64) -> Self { Self { samples, fs, start_idx } }

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }
	pub fn end_idx(&self) -> u64 { self.start_idx + self.samples.len() as u64 }

}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DigSigProcErr {
	#[error("invalid configuration: {0}")]
	InvalidConfiguration(String),
	#[error("invalid input: {0}")]
	InvalidInput(String),
	#[error("invalid state: {0}")]
	InvalidState(&'static str),
	#[error("stop requested")]
	Cancelled,
}
