use log::{debug, error};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{DigSigProcErr as DSPErr, SampleBuffer};
use crate::gnss::channel::{Channel, ChannelEvent};
use crate::gnss::signal::SignalId;


pub const DEFAULT_QUEUE_DEPTH:usize = 10;

/// Something that can be driven by a `Block`: it takes control messages of type C (answering with D) and inputs of
/// type T, and answers every input with an output of type U
pub trait BlockFunctionality<C: Clone, D, T: Clone, U> {

	fn control(&mut self, control:&C) -> Result<D, DSPErr>;
	fn apply(&mut self, input:&T) -> Result<U, DSPErr>;

}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelControl {
	Start(Option<SignalId>),
	Stop,
}

impl BlockFunctionality<ChannelControl, (), SampleBuffer, Vec<ChannelEvent>> for Channel {

	fn control(&mut self, control:&ChannelControl) -> Result<(), DSPErr> {
		match control {
			ChannelControl::Start(signal) => self.start(*signal),
			ChannelControl::Stop          => { self.stop(); Ok(()) },
		}
	}

	// Every buffer gets an answer, even an empty one, so a caller can pace itself on the outputs
	fn apply(&mut self, input:&SampleBuffer) -> Result<Vec<ChannelEvent>, DSPErr> {
		Channel::apply(self, &input.as_block())
	}

}

/// Owns a `BlockFunctionality` on a tokio task of its own.  Inputs and control messages go in through the two
/// senders; outputs come back on the receiver.  The task ends when the input sender or the output receiver is
/// dropped, or when the functionality fails.
pub struct Block<C: 'static + Send, T: 'static + Send, U: 'static + Send> {
	pub control: mpsc::Sender<C>,
	pub input:   mpsc::Sender<T>,
	pub output:  mpsc::Receiver<U>,
	task: JoinHandle<Result<(), DSPErr>>,
}

impl<C: Send + Sync + Clone, T: Send + Sync + Clone, U: Send + Sync> Block<C, T, U> {

	pub fn spawn<B: 'static + BlockFunctionality<C, (), T, U> + Send + Sync>(functionality:B) -> Self {
		Self::with_queue_depth(functionality, DEFAULT_QUEUE_DEPTH)
	}

	pub fn with_queue_depth<B: 'static + BlockFunctionality<C, (), T, U> + Send + Sync>(functionality:B, depth:usize) -> Self {

		let (control, mut control_rx) = mpsc::channel::<C>(depth);
		let (input,   mut input_rx)   = mpsc::channel::<T>(depth);
		let (mut output_tx, output)   = mpsc::channel::<U>(depth);

		let task = tokio::spawn(async move {
			let mut inner = functionality;

			while let Some(t) = input_rx.recv().await {

				// Control messages are only applied between inputs, so the task is the sole owner of the state
				while let Ok(c) = control_rx.try_recv() {
					inner.control(&c)?;
				}

				match inner.apply(&t) {
					Ok(u) => if output_tx.send(u).await.is_err() {
						debug!("block output receiver dropped, stopping");
						break;
					},
					Err(e) => {
						error!("block stopped: {}", e);
						return Err(e);
					}
				}
			}

			Ok(())
		});

		Block{ control, input, output, task }
	}

	/// Closes the input and the output and waits for the task to finish.  Inputs still queued and outputs nobody
	/// received are discarded.
	pub async fn shutdown(self) -> Result<(), DSPErr> {
		let Block{ control, input, output, task } = self;
		drop(input);
		drop(output);
		drop(control);
		task.await.map_err(|_| DSPErr::InvalidState("block task panicked"))?
	}

}
