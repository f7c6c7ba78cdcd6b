//! Ordinary least squares linear regression
//!
//! Solves the normal equations β = (X'X)^(-1) X'y with a Cholesky
//! factorization. Rank-deficient designs are rejected up front instead of
//! being regularized into arbitrary coefficients.

use crate::error::RiskError;
use ndarray::{s, Array1, Array2, Axis};
use thiserror::Error;

/// Errors that can occur during linear regression
#[derive(Error, Debug, PartialEq)]
pub enum RegressionError {
    #[error("Design matrix is rank-deficient: rank {rank} < {columns} columns")]
    RankDeficient { rank: usize, columns: usize },

    #[error("Matrix is singular and cannot be factorized")]
    SingularMatrix,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("No samples to fit on")]
    Empty,
}

impl From<RegressionError> for RiskError {
    fn from(err: RegressionError) -> Self {
        RiskError::ModelFit(err.to_string())
    }
}

/// Linear Regression model using Ordinary Least Squares
#[derive(Debug, Clone)]
pub struct LinearRegression {
    /// Coefficients (weights) for each feature
    pub coefficients: Option<Array1<f64>>,
    /// Intercept (bias) term
    pub intercept: Option<f64>,
    /// Whether to fit an intercept
    fit_intercept: bool,
    /// R-squared score; absent when the target is constant
    pub r_squared: Option<f64>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LinearRegression {
    pub fn new(fit_intercept: bool) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept,
            r_squared: None,
        }
    }

    /// Fit the model using Ordinary Least Squares
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), RegressionError> {
        if x.nrows() != y.len() {
            return Err(RegressionError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }
        if x.nrows() == 0 {
            return Err(RegressionError::Empty);
        }

        let x_design = if self.fit_intercept {
            let ones = Array2::ones((x.nrows(), 1));
            ndarray::concatenate(Axis(1), &[ones.view(), x.view()])
                .map_err(|_| RegressionError::DimensionMismatch {
                    expected: x.nrows(),
                    got: x.nrows(),
                })?
        } else {
            x.clone()
        };

        let columns = x_design.ncols();
        let rank = matrix_rank(&x_design);
        if rank < columns {
            return Err(RegressionError::RankDeficient { rank, columns });
        }

        let xt = x_design.t();
        let beta = cholesky_solve(&xt.dot(&x_design), &xt.dot(y))?;

        if self.fit_intercept {
            self.intercept = Some(beta[0]);
            self.coefficients = Some(beta.slice(s![1..]).to_owned());
        } else {
            self.intercept = Some(0.0);
            self.coefficients = Some(beta);
        }

        let predictions = self.predict(x)?;
        let y_mean = y.sum() / y.len() as f64;
        let ss_tot: f64 = y.iter().map(|&yi| (yi - y_mean).powi(2)).sum();
        let ss_res: f64 = y
            .iter()
            .zip(predictions.iter())
            .map(|(&yi, &pi)| (yi - pi).powi(2))
            .sum();

        self.r_squared = (ss_tot > 1e-12).then(|| 1.0 - ss_res / ss_tot);

        Ok(())
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, RegressionError> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or(RegressionError::NotFitted)?;
        let intercept = self.intercept.ok_or(RegressionError::NotFitted)?;

        if x.ncols() != coefficients.len() {
            return Err(RegressionError::DimensionMismatch {
                expected: coefficients.len(),
                got: x.ncols(),
            });
        }

        Ok(x.dot(coefficients) + intercept)
    }
}

/// Numerical rank by Gaussian elimination with partial pivoting
pub fn matrix_rank(a: &Array2<f64>) -> usize {
    let mut m = a.clone();
    let (rows, cols) = m.dim();
    let max_abs = m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if max_abs == 0.0 {
        return 0;
    }
    let tol = rows.max(cols) as f64 * f64::EPSILON * max_abs * 10.0;

    let mut rank = 0;
    for col in 0..cols {
        if rank == rows {
            break;
        }

        let (pivot, pivot_abs) = (rank..rows)
            .map(|r| (r, m[[r, col]].abs()))
            .fold((rank, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

        if pivot_abs <= tol {
            continue;
        }

        if pivot != rank {
            for c in 0..cols {
                m.swap([pivot, c], [rank, c]);
            }
        }

        for r in (rank + 1)..rows {
            let factor = m[[r, col]] / m[[rank, col]];
            if factor != 0.0 {
                for c in col..cols {
                    m[[r, c]] -= factor * m[[rank, c]];
                }
            }
        }
        rank += 1;
    }

    rank
}

/// Solve A x = b for symmetric positive-definite A
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, RegressionError> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    // A = L * L^T
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return Err(RegressionError::SingularMatrix);
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Ok(x)
}
