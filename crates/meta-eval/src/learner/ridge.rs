//! Closed-form ridge-regression base learner with a learnable calibration.
//!
//! Uses the dual form: with support features `X` (n x d), one-hot targets
//! `Y` (n x c) and query features `Xq` (q x d), the query logits are
//!
//!   L = scale * Xq Xᵀ (X Xᵀ + lambda I)⁻¹ Y + bias
//!
//! so the only linear solve is n x n (n = ways * shots), small regardless
//! of the feature dimension. Solved in f64 by Cholesky factorization.
//! `scale`, `bias` and `lambda` can take gradient steps through the query
//! cross-entropy; the gradients are closed-form, no autodiff needed.

use crate::episode::Episode;

const LAMBDA_FLOOR: f64 = 1e-6;

/// Ridge learner hyperparameters and initial calibration.
#[derive(Debug, Clone)]
pub struct RidgeConfig {
    /// Initial logit scale.
    pub init_scale: f64,
    /// Initial logit bias.
    pub init_bias: f64,
    /// Initial ridge regularizer.
    pub init_lambda: f64,
    /// Step size for per-episode calibration updates.
    pub adapt_lr: f64,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            init_scale: 1e-4,
            init_bias: 0.0,
            init_lambda: 1.0,
            adapt_lr: 0.01,
        }
    }
}

/// Ridge-regression base learner.
///
/// `scale`, `bias` and `lambda` persist across episodes, so an adaptation
/// pass over one split calibrates the learner for later splits.
#[derive(Debug, Clone)]
pub struct RidgeLearner {
    pub scale: f64,
    pub bias: f64,
    pub lambda: f64,
    lr: f64,
}

/// Intermediate products of one episode solve, kept for the gradient step.
struct Solve {
    /// Cholesky factor of `X Xᵀ + lambda I`, lower triangular, n x n.
    chol: Vec<f64>,
    /// Dual coefficients `A = K⁻¹ Y`, n x c.
    a: Vec<f64>,
    /// Query-support kernel `M = Xq Xᵀ`, q x n.
    m: Vec<f64>,
    /// Pre-calibration responses `P = M A`, q x c.
    p: Vec<f64>,
    /// Calibrated logits `scale * P + bias`, q x c.
    logits: Vec<f64>,
    n: usize,
    q: usize,
    c: usize,
}

impl RidgeLearner {
    pub fn new(config: &RidgeConfig) -> Self {
        Self {
            scale: config.init_scale,
            bias: config.init_bias,
            lambda: config.init_lambda,
            lr: config.adapt_lr,
        }
    }

    /// Predicted episode-local label per query row.
    pub fn predict(&self, episode: &Episode) -> Vec<usize> {
        let solve = self.solve(episode);
        argmax_rows(&solve.logits, solve.q, solve.c)
    }

    /// One gradient step on `scale`, `bias` and `lambda` through the query
    /// cross-entropy of this episode. Returns the pre-step loss.
    pub fn adapt(&mut self, episode: &Episode) -> f64 {
        let solve = self.solve(episode);
        let (loss, grad) = self.loss_and_grad(episode, &solve);

        self.scale -= self.lr * grad.scale;
        self.bias -= self.lr * grad.bias;
        // Clamp so lambda cannot drift below the solve-time floor, where
        // the gradient no longer describes the (clamped) objective.
        self.lambda = (self.lambda - self.lr * grad.lambda).max(LAMBDA_FLOOR);

        loss
    }

    /// Query cross-entropy at the current calibration, without updating.
    pub fn loss(&self, episode: &Episode) -> f64 {
        let solve = self.solve(episode);
        self.loss_and_grad(episode, &solve).0
    }

    fn solve(&self, episode: &Episode) -> Solve {
        let n = episode.support.len();
        let q = episode.query.len();
        let c = episode
            .support_labels
            .iter()
            .chain(episode.query_labels.iter())
            .max()
            .map_or(0, |&l| l + 1);

        let lambda = self.lambda.max(LAMBDA_FLOOR);

        // K = X Xᵀ + lambda I
        let mut k = vec![0.0f64; n * n];
        for i in 0..n {
            for j in 0..=i {
                let dot = dot_f32(&episode.support[i], &episode.support[j]);
                k[i * n + j] = dot;
                k[j * n + i] = dot;
            }
            k[i * n + i] += lambda;
        }

        // Y one-hot targets.
        let mut y = vec![0.0f64; n * c];
        for (i, &label) in episode.support_labels.iter().enumerate() {
            y[i * c + label] = 1.0;
        }

        let mut chol = k;
        cholesky_factor(&mut chol, n);
        let a = cholesky_solve(&chol, &y, n, c);

        // M = Xq Xᵀ
        let mut m = vec![0.0f64; q * n];
        for i in 0..q {
            for j in 0..n {
                m[i * n + j] = dot_f32(&episode.query[i], &episode.support[j]);
            }
        }

        let p = matmul(&m, &a, q, n, c);
        let logits: Vec<f64> = p.iter().map(|&v| self.scale * v + self.bias).collect();

        Solve {
            chol,
            a,
            m,
            p,
            logits,
            n,
            q,
            c,
        }
    }

    fn loss_and_grad(&self, episode: &Episode, solve: &Solve) -> (f64, Grad) {
        let Solve { n, q, c, .. } = *solve;

        // G = (softmax(L) - onehot) / q, and the mean NLL alongside.
        let mut g = vec![0.0f64; q * c];
        let mut loss = 0.0;
        for i in 0..q {
            let row = &solve.logits[i * c..(i + 1) * c];
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let denom: f64 = row.iter().map(|&v| (v - max).exp()).sum();
            let label = episode.query_labels[i];
            loss += denom.ln() + max - row[label];
            for j in 0..c {
                let prob = (row[j] - max).exp() / denom;
                g[i * c + j] = (prob - if j == label { 1.0 } else { 0.0 }) / q as f64;
            }
        }
        loss /= q as f64;

        let grad_scale: f64 = g.iter().zip(&solve.p).map(|(&gi, &pi)| gi * pi).sum();
        let grad_bias: f64 = g.iter().sum();

        // d loss / d lambda = -scale * sum( (Mᵀ G) ⊙ Z ) with K Z = A.
        let z = cholesky_solve(&solve.chol, &solve.a, n, c);
        let mut mt_g = vec![0.0f64; n * c];
        for i in 0..q {
            for j in 0..n {
                let mij = solve.m[i * n + j];
                for l in 0..c {
                    mt_g[j * c + l] += mij * g[i * c + l];
                }
            }
        }
        let grad_lambda: f64 =
            -self.scale * mt_g.iter().zip(&z).map(|(&a, &b)| a * b).sum::<f64>();

        (
            loss,
            Grad {
                scale: grad_scale,
                bias: grad_bias,
                lambda: grad_lambda,
            },
        )
    }
}

struct Grad {
    scale: f64,
    bias: f64,
    lambda: f64,
}

fn dot_f32(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| x as f64 * y as f64).sum()
}

fn matmul(a: &[f64], b: &[f64], rows: usize, inner: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0f64; rows * cols];
    for i in 0..rows {
        for k in 0..inner {
            let aik = a[i * inner + k];
            for j in 0..cols {
                out[i * cols + j] += aik * b[k * cols + j];
            }
        }
    }
    out
}

fn argmax_rows(values: &[f64], rows: usize, cols: usize) -> Vec<usize> {
    (0..rows)
        .map(|i| {
            let row = &values[i * cols..(i + 1) * cols];
            row.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(j, _)| j)
        })
        .collect()
}

/// In-place Cholesky factorization of a symmetric positive definite matrix,
/// leaving the lower-triangular factor in the lower part of `a`.
fn cholesky_factor(a: &mut [f64], n: usize) {
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= a[i * n + k] * a[j * n + k];
            }
            if i == j {
                // The ridge term keeps K positive definite; the fallback
                // only fires on badly degenerate inputs.
                a[i * n + j] = if sum > 0.0 { sum.sqrt() } else { 1e-10 };
            } else {
                a[i * n + j] = sum / a[j * n + j];
            }
        }
    }
}

/// Solve `K X = B` for `B` with `cols` columns, given the Cholesky factor
/// of `K`. Forward then backward substitution per column.
fn cholesky_solve(chol: &[f64], b: &[f64], n: usize, cols: usize) -> Vec<f64> {
    let mut x = vec![0.0f64; n * cols];
    for col in 0..cols {
        // L w = b
        let mut w = vec![0.0f64; n];
        for i in 0..n {
            let mut sum = b[i * cols + col];
            for k in 0..i {
                sum -= chol[i * n + k] * w[k];
            }
            w[i] = sum / chol[i * n + i];
        }
        // Lᵀ x = w
        for i in (0..n).rev() {
            let mut sum = w[i];
            for k in (i + 1)..n {
                sum -= chol[k * n + i] * x[k * cols + col];
            }
            x[i * cols + col] = sum / chol[i * n + i];
        }
    }
    x
}
