//! Autoregressive multi-step decoding
//!
//! The decoder walks through `AwaitingContext -> Stepping -> Done`. Encoding
//! the context produces the initial hidden state; each step then consumes one
//! decoder row, emits one prediction and feeds it into the previous-target
//! slot (column 0) of the next row.

use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Recurrent cell driven by the decoder
pub trait RecurrentCell {
    type Hidden: Clone;

    /// Hidden state before any input
    fn initial_hidden(&self) -> Self::Hidden;

    /// Consume one input row
    fn step(&self, hidden: &Self::Hidden, input: ArrayView1<'_, f64>) -> Self::Hidden;

    /// Read the one-step prediction out of a hidden state
    fn project(&self, hidden: &Self::Hidden) -> f64;

    /// Run a sequence of rows from `hidden`
    fn encode(&self, hidden: Self::Hidden, rows: ArrayView2<'_, f64>) -> Self::Hidden {
        rows.rows()
            .into_iter()
            .fold(hidden, |h, row| self.step(&h, row))
    }
}

#[derive(Debug, Clone)]
enum DecoderState<H> {
    AwaitingContext,
    Stepping { hidden: H, step: usize },
    Done,
}

/// Step-by-step decoder over a fixed number of future rows.
///
/// Only the first decoder row may carry an observed previous target. Later
/// rows have their previous-target slot cleared on construction and refilled
/// with predictions as decoding proceeds, so no future target is ever read.
pub struct AutoregressiveDecoder<'a, C: RecurrentCell> {
    cell: &'a C,
    inputs: Array2<f64>,
    predictions: Vec<f64>,
    state: DecoderState<C::Hidden>,
}

impl<'a, C: RecurrentCell> AutoregressiveDecoder<'a, C> {
    /// Create a decoder over `decoder_inputs` (one row per step, previous
    /// target in column 0)
    pub fn new(cell: &'a C, mut decoder_inputs: Array2<f64>) -> Result<Self> {
        if decoder_inputs.nrows() == 0 || decoder_inputs.ncols() == 0 {
            return Err(ForecastError::ShapeError {
                expected: "at least one decoder row and column".to_string(),
                actual: format!("{:?}", decoder_inputs.dim()),
            });
        }

        for mut row in decoder_inputs.rows_mut().into_iter().skip(1) {
            row[0] = f64::NAN;
        }

        Ok(Self {
            cell,
            predictions: Vec::with_capacity(decoder_inputs.nrows()),
            inputs: decoder_inputs,
            state: DecoderState::AwaitingContext,
        })
    }

    /// Number of steps this decoder emits
    pub fn decoder_length(&self) -> usize {
        self.inputs.nrows()
    }

    /// Encode the context window; allowed exactly once
    pub fn consume_context(&mut self, encoder_inputs: ArrayView2<'_, f64>) -> Result<()> {
        if !matches!(self.state, DecoderState::AwaitingContext) {
            return Err(ForecastError::InvalidState(
                "decoder context was already consumed".to_string(),
            ));
        }
        if encoder_inputs.nrows() > 0 && encoder_inputs.ncols() != self.inputs.ncols() {
            return Err(ForecastError::ShapeError {
                expected: format!("{} encoder columns", self.inputs.ncols()),
                actual: format!("{} encoder columns", encoder_inputs.ncols()),
            });
        }

        let hidden = self.cell.encode(self.cell.initial_hidden(), encoder_inputs);
        self.state = DecoderState::Stepping { hidden, step: 0 };
        Ok(())
    }

    /// Emit the next prediction
    pub fn step(&mut self) -> Result<f64> {
        let (hidden, step) = match std::mem::replace(&mut self.state, DecoderState::Done) {
            DecoderState::Stepping { hidden, step } => (hidden, step),
            DecoderState::AwaitingContext => {
                self.state = DecoderState::AwaitingContext;
                return Err(ForecastError::InvalidState(
                    "decoder stepped before its context was consumed".to_string(),
                ));
            }
            DecoderState::Done => {
                return Err(ForecastError::InvalidState(
                    "decoder already emitted every step".to_string(),
                ))
            }
        };

        let hidden = self.cell.step(&hidden, self.inputs.row(step));
        let prediction = self.cell.project(&hidden);
        self.predictions.push(prediction);

        let next = step + 1;
        if next < self.inputs.nrows() {
            self.inputs[[next, 0]] = prediction;
            self.state = DecoderState::Stepping { hidden, step: next };
        }
        Ok(prediction)
    }

    /// Encode `encoder_inputs` and decode every step
    pub fn run(mut self, encoder_inputs: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.consume_context(encoder_inputs)?;
        while !self.is_done() {
            self.step()?;
        }
        Ok(Array1::from(self.predictions))
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, DecoderState::Done)
    }

    /// Decoder rows as fed to the cell so far
    pub fn decoder_inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    /// Predictions emitted so far, in time order
    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Remembers the last previous-target input; predicts it plus one
    struct Increment;

    impl RecurrentCell for Increment {
        type Hidden = f64;

        fn initial_hidden(&self) -> f64 {
            0.0
        }

        fn step(&self, _hidden: &f64, input: ArrayView1<'_, f64>) -> f64 {
            input[0]
        }

        fn project(&self, hidden: &f64) -> f64 {
            hidden + 1.0
        }
    }

    #[test]
    fn test_predictions_feed_back() {
        let inputs = array![[10.0, 0.0], [999.0, 0.0], [999.0, 0.0]];
        let decoder = AutoregressiveDecoder::new(&Increment, inputs).unwrap();
        let predictions = decoder.run(array![[9.0, 0.0]].view()).unwrap();
        assert_eq!(predictions.to_vec(), vec![11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_future_targets_are_cleared() {
        let inputs = array![[1.0], [50.0], [60.0]];
        let mut decoder = AutoregressiveDecoder::new(&Increment, inputs).unwrap();
        assert!(decoder.decoder_inputs()[[1, 0]].is_nan());
        assert!(decoder.decoder_inputs()[[2, 0]].is_nan());

        decoder.consume_context(Array2::zeros((0, 1)).view()).unwrap();
        let first = decoder.step().unwrap();
        assert_eq!(decoder.decoder_inputs()[[1, 0]], first);
    }

    #[test]
    fn test_state_misuse() {
        let mut decoder = AutoregressiveDecoder::new(&Increment, array![[1.0]]).unwrap();
        assert!(matches!(decoder.step(), Err(ForecastError::InvalidState(_))));

        decoder.consume_context(array![[0.0]].view()).unwrap();
        assert!(matches!(
            decoder.consume_context(array![[0.0]].view()),
            Err(ForecastError::InvalidState(_))
        ));

        decoder.step().unwrap();
        assert!(decoder.is_done());
        assert!(matches!(decoder.step(), Err(ForecastError::InvalidState(_))));
        assert_eq!(decoder.predictions(), &[2.0]);
    }
}
