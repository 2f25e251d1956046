//! Small dense solvers for normal equations

use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, Axis};

/// Solve `A x = b` for a symmetric positive definite `A` via Cholesky.
///
/// When `A` is not positive definite a small ridge is added to the diagonal
/// and the factorisation is retried once.
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    match cholesky_factor(a) {
        Some(l) => Some(substitute(&l, b)),
        None => {
            let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
            let mut a_reg = a.clone();
            a_reg.diag_mut().mapv_inplace(|v| v + ridge.max(1e-12));
            cholesky_factor(&a_reg).map(|l| substitute(&l, b))
        }
    }
}

/// Lower triangular `L` with `A = L L^T`, `None` if `A` is not positive definite
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // L y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Ridge regression with an unpenalised intercept.
///
/// Returns `(weights, intercept)` minimising `|y - Xw - c|^2 + alpha |w|^2`.
pub fn ridge_fit(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<(Array1<f64>, f64)> {
    if x.nrows() != y.len() {
        return Err(ForecastError::ShapeError {
            expected: format!("{} targets", x.nrows()),
            actual: format!("{} targets", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(ForecastError::DataError(
            "ridge fit needs at least one row".to_string(),
        ));
    }

    let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let xc = x - &x_mean;
    let yc = y - y_mean;

    let mut xtx = xc.t().dot(&xc);
    xtx.diag_mut().mapv_inplace(|v| v + alpha);
    let xty = xc.t().dot(&yc);

    let weights = cholesky_solve(&xtx, &xty).ok_or_else(|| {
        ForecastError::DataError("normal equations are singular".to_string())
    })?;
    let intercept = y_mean - x_mean.dot(&weights);
    Ok((weights, intercept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = cholesky_solve(&a, &b).unwrap();
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-10);
        assert!((back[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_cholesky_rejects_bad_shapes() {
        let a = Array2::<f64>::eye(2);
        assert!(cholesky_solve(&a, &array![1.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn test_ridge_recovers_linear_relation() {
        // y = 2*x1 + 3*x2 + 1
        let x = array![[1.0, 1.0], [2.0, 1.0], [1.0, 2.0], [2.0, 2.0], [3.0, 1.0]];
        let y = array![6.0, 8.0, 9.0, 11.0, 10.0];
        let (w, c) = ridge_fit(&x, &y, 1e-9).unwrap();
        assert!((w[0] - 2.0).abs() < 1e-6);
        assert!((w[1] - 3.0).abs() < 1e-6);
        assert!((c - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ridge_handles_collinear_columns() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let y = array![2.0, 4.0, 6.0];
        let (w, c) = ridge_fit(&x, &y, 0.1).unwrap();
        let pred = x.dot(&w) + c;
        assert!((pred[1] - 4.0).abs() < 0.1);
    }
}
