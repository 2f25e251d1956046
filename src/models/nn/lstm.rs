//! Stacked LSTM cells with a linear readout

use super::decoder::RecurrentCell;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// LSTM cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmCell {
    pub input_size: usize,
    pub hidden_size: usize,

    // Input gate
    w_ii: Array2<f64>,
    w_hi: Array2<f64>,
    b_i: Array1<f64>,

    // Forget gate
    w_if: Array2<f64>,
    w_hf: Array2<f64>,
    b_f: Array1<f64>,

    // Cell candidate
    w_ig: Array2<f64>,
    w_hg: Array2<f64>,
    b_g: Array1<f64>,

    // Output gate
    w_io: Array2<f64>,
    w_ho: Array2<f64>,
    b_o: Array1<f64>,
}

impl LstmCell {
    /// Create a cell with weights drawn uniformly from `±1/sqrt(hidden_size)`
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let mut uniform = |rows: usize, cols: usize| {
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..limit))
        };

        Self {
            input_size,
            hidden_size,
            w_ii: uniform(hidden_size, input_size),
            w_hi: uniform(hidden_size, hidden_size),
            b_i: Array1::zeros(hidden_size),
            w_if: uniform(hidden_size, input_size),
            w_hf: uniform(hidden_size, hidden_size),
            b_f: Array1::from_elem(hidden_size, 1.0),
            w_ig: uniform(hidden_size, input_size),
            w_hg: uniform(hidden_size, hidden_size),
            b_g: Array1::zeros(hidden_size),
            w_io: uniform(hidden_size, input_size),
            w_ho: uniform(hidden_size, hidden_size),
            b_o: Array1::zeros(hidden_size),
        }
    }

    /// One time step, returns `(h_next, c_next)`
    pub fn forward(
        &self,
        x: ArrayView1<'_, f64>,
        h_prev: &Array1<f64>,
        c_prev: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let i_gate = (self.w_ii.dot(&x) + self.w_hi.dot(h_prev) + &self.b_i).mapv(sigmoid);
        let f_gate = (self.w_if.dot(&x) + self.w_hf.dot(h_prev) + &self.b_f).mapv(sigmoid);
        let g = (self.w_ig.dot(&x) + self.w_hg.dot(h_prev) + &self.b_g).mapv(f64::tanh);
        let o_gate = (self.w_io.dot(&x) + self.w_ho.dot(h_prev) + &self.b_o).mapv(sigmoid);

        let c_next = &f_gate * c_prev + &i_gate * &g;
        let h_next = &o_gate * &c_next.mapv(f64::tanh);
        (h_next, c_next)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Hidden and cell state of every layer
pub type LstmState = Vec<(Array1<f64>, Array1<f64>)>;

/// LSTM layers feeding a linear projection of the top hidden state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmStack {
    layers: Vec<LstmCell>,
    readout: Array1<f64>,
    intercept: f64,
}

impl LstmStack {
    /// `num_layers` randomly initialised layers and a zero readout
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, num_layers: usize, rng: &mut R) -> Self {
        let layers = (0..num_layers.max(1))
            .map(|layer| {
                let input = if layer == 0 { input_size } else { hidden_size };
                LstmCell::new(input, hidden_size, rng)
            })
            .collect();

        Self {
            layers,
            readout: Array1::zeros(hidden_size),
            intercept: 0.0,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Hidden state of the top layer
    pub fn output<'s>(&self, state: &'s LstmState) -> Option<&'s Array1<f64>> {
        state.last().map(|(h, _)| h)
    }

    /// Replace the linear projection
    pub fn set_readout(&mut self, readout: Array1<f64>, intercept: f64) {
        self.readout = readout;
        self.intercept = intercept;
    }
}

impl RecurrentCell for LstmStack {
    type Hidden = LstmState;

    fn initial_hidden(&self) -> LstmState {
        self.layers
            .iter()
            .map(|cell| (Array1::zeros(cell.hidden_size), Array1::zeros(cell.hidden_size)))
            .collect()
    }

    fn step(&self, hidden: &LstmState, input: ArrayView1<'_, f64>) -> LstmState {
        let mut next = Vec::with_capacity(self.layers.len());
        let mut x = input.to_owned();
        for (cell, (h, c)) in self.layers.iter().zip(hidden) {
            let (h_next, c_next) = cell.forward(x.view(), h, c);
            x = h_next.clone();
            next.push((h_next, c_next));
        }
        next
    }

    fn project(&self, hidden: &LstmState) -> f64 {
        self.output(hidden)
            .map(|h| self.readout.dot(h) + self.intercept)
            .unwrap_or(self.intercept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_cell_shapes_and_bounds() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let cell = LstmCell::new(3, 4, &mut rng);
        let (h, c) = cell.forward(array![1.0, -1.0, 0.5].view(), &Array1::zeros(4), &Array1::zeros(4));
        assert_eq!(h.len(), 4);
        assert_eq!(c.len(), 4);
        assert!(h.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_seeded_stacks_match() {
        let a = LstmStack::new(2, 5, 2, &mut Xoshiro256PlusPlus::seed_from_u64(7));
        let b = LstmStack::new(2, 5, 2, &mut Xoshiro256PlusPlus::seed_from_u64(7));
        let input = array![0.3, -0.2];
        let ha = a.step(&a.initial_hidden(), input.view());
        let hb = b.step(&b.initial_hidden(), input.view());
        assert_eq!(ha, hb);
        assert_eq!(a.num_layers(), 2);
    }

    #[test]
    fn test_projection_uses_readout() {
        let mut stack = LstmStack::new(1, 3, 1, &mut Xoshiro256PlusPlus::seed_from_u64(1));
        let state = stack.initial_hidden();
        assert_eq!(stack.project(&state), 0.0);
        stack.set_readout(Array1::ones(3), 2.5);
        assert_eq!(stack.project(&state), 2.5);
    }
}
