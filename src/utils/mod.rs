//! Utility functions and types

pub mod linalg;
pub mod parallel;

pub use linalg::{cholesky_solve, ridge_fit};
