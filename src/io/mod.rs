use std::io::{ErrorKind, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use rustfft::num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::{DigSigProcErr, SampleBuffer};

pub const DEFAULT_BLOCK_LEN:usize = 4096;

/// Sample layout of a recording: interleaved little-endian I and Q
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IqFormat {
	ComplexI16,
	ComplexF32,
}

impl IqFormat {
	pub fn bytes_per_sample(&self) -> usize { match self {
		IqFormat::ComplexI16 => 4,
		IqFormat::ComplexF32 => 8,
	}}
}

/// Reads a recording as consecutive blocks of `block_len` samples, tagging each with its absolute index.  The last
/// block may be short; a trailing partial sample is dropped.
pub struct IqFileSource<S: Read> {
	src: S,
	format: IqFormat,
	fs: f64,
	scale: f64,
	block_len: usize,
	next_idx: u64,
	done: bool,
}

impl<S: Read> IqFileSource<S> {

	pub fn new(src:S, format:IqFormat, fs:f64, block_len:usize) -> Result<Self, DigSigProcErr> {
		if block_len == 0 {
			return Err(DigSigProcErr::InvalidConfiguration("block length must be at least one sample".into()));
		}
		if !(fs > 0.0) {
			return Err(DigSigProcErr::InvalidConfiguration(format!("sample rate {} [sps] must be positive", fs)));
		}
		Ok(Self { src, format, fs, scale: 1.0, block_len, next_idx: 0, done: false })
	}

	/// Multiplies every sample by `scale`, e.g. 1/32768 to bring full scale 16-bit samples to unity
	pub fn with_scale(mut self, scale:f64) -> Self {
		self.scale = scale;
		self
	}

	/// Discards the first `n` samples
	pub fn skip_samples(&mut self, n:u64) -> Result<u64, DigSigProcErr> {
		let mut skipped = 0;
		while skipped < n {
			match self.read_sample()? {
				Some(_) => skipped += 1,
				None    => break,
			}
		}
		self.next_idx += skipped;
		Ok(skipped)
	}

	pub fn next_idx(&self) -> u64 { self.next_idx }

	fn read_sample(&mut self) -> Result<Option<Complex<f64>>, DigSigProcErr> {
		let pair = match self.format {
			IqFormat::ComplexI16 => self.src.read_i16::<LittleEndian>()
				.and_then(|i| self.src.read_i16::<LittleEndian>().map(|q| (i as f64, q as f64))),
			IqFormat::ComplexF32 => self.src.read_f32::<LittleEndian>()
				.and_then(|i| self.src.read_f32::<LittleEndian>().map(|q| (i as f64, q as f64))),
		};
		match pair {
			Ok((re, im)) => Ok(Some(Complex{ re: re * self.scale, im: im * self.scale })),
			Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
			Err(e) => Err(DigSigProcErr::InvalidInput(format!("unable to read samples: {}", e))),
		}
	}

	/// Next block, or None at the end of the recording
	pub fn next_block(&mut self) -> Result<Option<SampleBuffer>, DigSigProcErr> {
		if self.done { return Ok(None); }

		let mut samples = Vec::with_capacity(self.block_len);
		while samples.len() < self.block_len {
			match self.read_sample()? {
				Some(c) => samples.push(c),
				None    => { self.done = true; break; }
			}
		}
		if samples.is_empty() { return Ok(None); }

		let ans = SampleBuffer{ samples, fs: self.fs, start_idx: self.next_idx };
		self.next_idx += ans.samples.len() as u64;
		Ok(Some(ans))
	}

}

impl<S: Read> Iterator for IqFileSource<S> {
	type Item = Result<SampleBuffer, DigSigProcErr>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.next_block() {
			Ok(Some(buf)) => Some(Ok(buf)),
			Ok(None)      => None,
			Err(e)        => { self.done = true; Some(Err(e)) },
		}
	}
}
