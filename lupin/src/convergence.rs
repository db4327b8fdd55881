use crate::error::{LupinError, Result};
use crate::options::{ConvergenceMode, TrainOptions};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// relative ELBO decrease tolerated between consecutive evaluations
pub const ELBO_DECREASE_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConvergenceStatus {
    #[default]
    Running,
    Converged,
    MaxIterReached,
    ManuallyStopped,
}

/// Running -> {Converged, MaxIterReached, ManuallyStopped}
///
/// The monitor consumes one (possibly absent) ELBO value per iteration.
/// Factor pruning runs as a guard of each evaluated step: when it
/// removes factors the step can't converge and the next evaluation
/// has no reference to compare against.
pub struct ConvergenceMonitor {
    epsilon: f64,
    start_elbo: usize,
    max_iter: usize,
    reference: Option<f64>,
    status: ConvergenceStatus,
    stop: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

fn scale(x: f64) -> f64 {
    x.abs().max(1.0)
}

impl ConvergenceMonitor {
    pub fn new(opts: &TrainOptions, stop: Arc<AtomicBool>) -> Self {
        Self::with_mode(opts.convergence_mode, opts.start_elbo, opts.iter, stop)
            .with_timeout(opts.timeout.map(Duration::from_secs_f64))
    }

    pub fn with_mode(
        mode: ConvergenceMode,
        start_elbo: usize,
        max_iter: usize,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            epsilon: mode.epsilon(),
            start_elbo,
            max_iter,
            reference: None,
            status: ConvergenceStatus::Running,
            stop,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    pub fn status(&self) -> ConvergenceStatus {
        self.status
    }

    /// Honour a stop request or an elapsed timeout; called between
    /// iterations only
    pub fn check_interrupt(&mut self) -> ConvergenceStatus {
        if self.status == ConvergenceStatus::Running {
            let timed_out = self.deadline.is_some_and(|d| Instant::now() >= d);
            if self.stop.load(Ordering::Relaxed) || timed_out {
                self.status = ConvergenceStatus::ManuallyStopped;
            }
        }
        self.status
    }

    /// Consume the outcome of iteration `iter` (0-based)
    ///
    /// * `elbo` - the value evaluated after this iteration, if any
    /// * `prune` - guard run on every evaluated step; returns true
    ///   when it removed factors
    pub fn step<F>(&mut self, iter: usize, elbo: Option<f64>, prune: F) -> Result<ConvergenceStatus>
    where
        F: FnOnce() -> Result<bool>,
    {
        if self.status != ConvergenceStatus::Running {
            return Ok(self.status);
        }

        if let Some(elbo) = elbo {
            if !elbo.is_finite() {
                return Err(LupinError::Numerical(format!(
                    "non-finite ELBO at iteration {}",
                    iter
                )));
            }

            if let Some(prev) = self.reference {
                if elbo < prev - ELBO_DECREASE_TOLERANCE * scale(prev) {
                    return Err(LupinError::Numerical(format!(
                        "ELBO decreased from {} to {} at iteration {}",
                        prev, elbo, iter
                    )));
                }
            }

            if prune()? {
                self.reference = None;
            } else {
                if let Some(prev) = self.reference {
                    let converged = (elbo - prev).abs() < self.epsilon * scale(prev);
                    if iter >= self.start_elbo && converged {
                        self.status = ConvergenceStatus::Converged;
                    }
                }
                self.reference = Some(elbo);
            }
        }

        if self.status == ConvergenceStatus::Running && iter + 1 >= self.max_iter {
            self.status = ConvergenceStatus::MaxIterReached;
        }
        Ok(self.status)
    }
}
