//! Sequence models
//!
//! Windowing ([`make_samples`]), autoregressive decoding
//! ([`AutoregressiveDecoder`]) and the LSTM model built on them.

mod decoder;
mod lstm;
mod rnn;
mod sampler;

pub use decoder::{AutoregressiveDecoder, RecurrentCell};
pub use lstm::{LstmCell, LstmStack, LstmState};
pub use rnn::{RnnConfig, RnnModel};
pub use sampler::{make_samples, Sample, SampleSet, Samples, WindowConfig};
