//! ARIMA forecasting of daily net cashflow
//!
//! Fixed-order, seasonal-free ARIMA(p,d,q) without intercept. Coefficients are
//! estimated with the two-stage Hannan–Rissanen regression:
//!
//! 1. a long autoregression on the differenced series yields innovation estimates
//! 2. the differenced series is regressed on its own lags and lagged innovations
//!
//! When the history is too short to identify every term the effective order
//! shrinks (MA terms first, then AR terms) down to a random walk.

use crate::error::MonitorError;
use crate::models::{DailyCashflowSeries, ForecastPoint, ForecastSeries};
use crate::Result;
use std::fmt;
use tracing::{debug, info};

/// Bound applied to every MA coefficient so the innovation recursion stays finite
const MA_COEFFICIENT_BOUND: f64 = 0.99;
const RIDGE_FACTOR: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArimaOrder {
    /// Autoregressive terms
    pub p: usize,
    /// Differencing degree
    pub d: usize,
    /// Moving-average terms
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Fewest observations the model accepts
    pub fn min_observations(&self) -> usize {
        self.p + self.q + 1
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// Model order and horizon for one call-site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastConfig {
    pub order: ArimaOrder,
    pub horizon: usize,
}

impl ForecastConfig {
    /// Three-day outlook used by the quick analysis
    pub const fn quick() -> Self {
        Self {
            order: ArimaOrder::new(1, 1, 1),
            horizon: 3,
        }
    }

    /// Ten-day outlook used by the supervisor pipeline
    pub const fn supervisor() -> Self {
        Self {
            order: ArimaOrder::new(2, 1, 2),
            horizon: 10,
        }
    }
}

/// A model that can be fitted to a series
pub trait ForecastModel {
    type Trained: TrainedForecastModel;

    fn train(&self, data: &[f64]) -> Result<Self::Trained>;

    fn name(&self) -> &str;
}

/// A fitted model able to project forward
pub trait TrainedForecastModel {
    fn forecast(&self, horizon: usize) -> Result<Vec<f64>>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ArimaModel {
    name: String,
    order: ArimaOrder,
}

#[derive(Debug, Clone)]
pub struct TrainedArimaModel {
    name: String,
    ar_coefficients: Vec<f64>,
    ma_coefficients: Vec<f64>,
    /// Series after `d` rounds of differencing
    differenced: Vec<f64>,
    residuals: Vec<f64>,
    /// Last value at each differencing level, outermost first
    tails: Vec<f64>,
}

impl ArimaModel {
    pub fn new(order: ArimaOrder) -> Self {
        Self {
            name: order.to_string(),
            order,
        }
    }
}

impl ForecastModel for ArimaModel {
    type Trained = TrainedArimaModel;

    fn train(&self, data: &[f64]) -> Result<TrainedArimaModel> {
        let ArimaOrder { p, d, q } = self.order;

        if data.len() < self.order.min_observations() {
            return Err(MonitorError::ForecastError(format!(
                "Insufficient data for {}. Need at least {} observations, got {}.",
                self.name,
                self.order.min_observations(),
                data.len()
            )));
        }

        if data.iter().any(|v| !v.is_finite()) {
            return Err(MonitorError::ForecastError(
                "Series contains non-finite values".to_string(),
            ));
        }

        let mut tails = Vec::with_capacity(d);
        let mut current = data.to_vec();
        for _ in 0..d {
            match current.last() {
                Some(last) => tails.push(*last),
                None => break,
            }
            current = difference(&current);
        }

        if current.is_empty() {
            return Err(MonitorError::ForecastError(format!(
                "Series of {} observations is too short to difference {} time(s)",
                data.len(),
                d
            )));
        }

        let (ar_coefficients, ma_coefficients) = estimate_arma(&current, p, q)?;
        let residuals = innovations(&current, &ar_coefficients, &ma_coefficients);

        if residuals.iter().any(|e| !e.is_finite()) {
            return Err(MonitorError::ForecastError(format!(
                "{} fitting did not converge",
                self.name
            )));
        }

        debug!(
            model = %self.name,
            ar = ?ar_coefficients,
            ma = ?ma_coefficients,
            observations = data.len(),
            "Fitted ARIMA model"
        );

        Ok(TrainedArimaModel {
            name: self.name.clone(),
            ar_coefficients,
            ma_coefficients,
            differenced: current,
            residuals,
            tails,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl TrainedForecastModel for TrainedArimaModel {
    fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        let mut history = self.differenced.clone();
        let mut errors = self.residuals.clone();
        let mut projected = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let t = history.len();
            let mut value = 0.0;
            for (i, phi) in self.ar_coefficients.iter().enumerate() {
                if t > i {
                    value += phi * history[t - 1 - i];
                }
            }
            for (j, theta) in self.ma_coefficients.iter().enumerate() {
                if t > j {
                    value += theta * errors[t - 1 - j];
                }
            }
            history.push(value);
            // Future innovations have zero expectation
            errors.push(0.0);
            projected.push(value);
        }

        for tail in self.tails.iter().rev() {
            let mut level = *tail;
            for value in projected.iter_mut() {
                level += *value;
                *value = level;
            }
        }

        if projected.iter().any(|v| !v.is_finite()) {
            return Err(MonitorError::ForecastError(format!(
                "{} produced a non-finite forecast",
                self.name
            )));
        }

        Ok(projected)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fit the configured ARIMA model and project `config.horizon` days past the
/// last historical date.
pub fn forecast_cashflow(
    series: &DailyCashflowSeries,
    config: ForecastConfig,
) -> Result<ForecastSeries> {
    let last_date = series.last_date().ok_or_else(|| {
        MonitorError::ForecastError("Cannot forecast an empty series".to_string())
    })?;

    let model = ArimaModel::new(config.order);
    let trained = model.train(&series.values())?;
    let values = trained.forecast(config.horizon)?;

    let points: Vec<ForecastPoint> = last_date
        .iter_days()
        .skip(1)
        .zip(values)
        .map(|(date, value)| ForecastPoint { date, value })
        .collect();

    info!(
        model = %model.name(),
        history_days = series.len(),
        horizon = points.len(),
        "Cashflow forecast complete"
    );

    Ok(ForecastSeries { points })
}

fn difference(series: &[f64]) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Hannan–Rissanen estimation with order reduction on short histories
fn estimate_arma(w: &[f64], p: usize, q: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = w.len();
    let mut ar = vec![0.0; p];
    let mut ma = vec![0.0; q];

    if w.iter().all(|v| v.abs() < f64::EPSILON) {
        return Ok((ar, ma));
    }

    // Stage 1: long autoregression for innovation estimates
    let mut long_order = (p + q).max(3).min(n / 3);
    let mut long_innovations: Option<Vec<f64>> = None;
    if q > 0 {
        while long_order > 0 && long_innovations.is_none() {
            if n - long_order > long_order {
                let phi = fit_autoregression(w, long_order)?;
                long_innovations = Some(innovations(w, &phi, &[]));
            } else {
                long_order -= 1;
            }
        }
    }

    // Stage 2: regression on lagged values and lagged innovations
    let mut p_eff = p;
    let mut q_eff = if long_innovations.is_some() { q } else { 0 };

    loop {
        if p_eff + q_eff == 0 {
            return Ok((ar, ma));
        }

        let start = if q_eff > 0 {
            p_eff.max(long_order + q_eff)
        } else {
            p_eff
        };
        let rows = n.saturating_sub(start);

        if rows > p_eff + q_eff {
            let empty = Vec::new();
            let e = long_innovations.as_ref().unwrap_or(&empty);
            let mut design = Vec::with_capacity(rows);
            let mut target = Vec::with_capacity(rows);
            for t in start..n {
                let mut row = Vec::with_capacity(p_eff + q_eff);
                row.extend((1..=p_eff).map(|i| w[t - i]));
                row.extend((1..=q_eff).map(|j| e[t - j]));
                design.push(row);
                target.push(w[t]);
            }

            let beta = least_squares(&design, &target)?;
            ar[..p_eff].copy_from_slice(&beta[..p_eff]);
            for (slot, theta) in ma.iter_mut().zip(&beta[p_eff..]) {
                *slot = theta.clamp(-MA_COEFFICIENT_BOUND, MA_COEFFICIENT_BOUND);
            }
            return Ok((ar, ma));
        }

        if q_eff > 0 {
            q_eff -= 1;
        } else {
            p_eff -= 1;
        }
    }
}

fn fit_autoregression(w: &[f64], order: usize) -> Result<Vec<f64>> {
    let design: Vec<Vec<f64>> = (order..w.len())
        .map(|t| (1..=order).map(|i| w[t - i]).collect())
        .collect();
    let target: Vec<f64> = w[order..].to_vec();
    least_squares(&design, &target)
}

/// Conditional one-step errors; terms before the AR order are zero
fn innovations(w: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut errors = vec![0.0; w.len()];
    for t in p..w.len() {
        let mut predicted = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            predicted += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                predicted += theta * errors[t - 1 - j];
            }
        }
        errors[t] = w[t] - predicted;
    }
    errors
}

/// Ridge-stabilised normal equations solved by Gaussian elimination
fn least_squares(design: &[Vec<f64>], target: &[f64]) -> Result<Vec<f64>> {
    let k = design.first().map(|row| row.len()).unwrap_or(0);
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, y) in design.iter().zip(target) {
        for i in 0..k {
            xty[i] += row[i] * y;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let trace: f64 = (0..k).map(|i| xtx[i][i]).sum();
    let ridge = (RIDGE_FACTOR * trace / k as f64).max(f64::MIN_POSITIVE);
    for (i, row) in xtx.iter_mut().enumerate() {
        row[i] += ridge;
    }

    solve_linear(xtx, xty).ok_or_else(|| {
        MonitorError::ForecastError("ARIMA fitting did not converge (singular system)".to_string())
    })
}

fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))?;
        if !a[pivot][col].is_finite() || a[pivot][col].abs() < f64::MIN_POSITIVE {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
