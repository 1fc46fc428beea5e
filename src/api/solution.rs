//! Solution interface.

use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};

/// Solve modes understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// Single power-flow solution.
    Snapshot,
    /// Daily load-shape series.
    Daily,
    /// Yearly load-shape series.
    Yearly,
    /// Duty-cycle series.
    DutyCycle,
    /// Dynamics mode.
    Dynamic,
    /// Harmonic solution.
    Harmonic,
}

impl SolveMode {
    /// Decode the engine's mode id.
    pub fn from_raw(raw: i32) -> Option<SolveMode> {
        Some(match raw {
            0 => SolveMode::Snapshot,
            1 => SolveMode::Daily,
            2 => SolveMode::Yearly,
            3 => SolveMode::DutyCycle,
            4 => SolveMode::Dynamic,
            5 => SolveMode::Harmonic,
            _ => return None,
        })
    }

    /// The engine's mode id.
    pub fn as_raw(self) -> i32 {
        match self {
            SolveMode::Snapshot => 0,
            SolveMode::Daily => 1,
            SolveMode::Yearly => 2,
            SolveMode::DutyCycle => 3,
            SolveMode::Dynamic => 4,
            SolveMode::Harmonic => 5,
        }
    }
}

/// Solution state and solve control of the active circuit.
#[derive(Clone)]
pub struct Solution {
    ctx: Arc<Context>,
}

impl Solution {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Solution { ctx }
    }

    /// Run the solver.
    pub fn solve(&self) -> Result<()> {
        debug!("solve requested");
        self.ctx.call(|api, h| unsafe { (api.solution_solve)(h) })
    }

    /// Whether the last solve converged.
    pub fn converged(&self) -> Result<bool> {
        Ok(self.ctx.call(|api, h| unsafe { (api.solution_get_converged)(h) })? != 0)
    }

    /// Iteration count of the last solve.
    pub fn iterations(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.solution_get_iterations)(h) })
    }

    /// Current solve mode.
    pub fn mode(&self) -> Result<SolveMode> {
        let raw = self.ctx.call(|api, h| unsafe { (api.solution_get_mode)(h) })?;
        SolveMode::from_raw(raw).ok_or(Error::UnknownSolveMode(raw))
    }

    /// Select the solve mode.
    pub fn set_mode(&self, mode: SolveMode) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.solution_set_mode)(h, mode.as_raw()) })
    }

    /// Convergence tolerance.
    pub fn tolerance(&self) -> Result<f64> {
        self.ctx.call(|api, h| unsafe { (api.solution_get_tolerance)(h) })
    }

    /// Set the convergence tolerance.
    pub fn set_tolerance(&self, tolerance: f64) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.solution_set_tolerance)(h, tolerance) })
    }

    /// Global load multiplier.
    pub fn load_mult(&self) -> Result<f64> {
        self.ctx.call(|api, h| unsafe { (api.solution_get_load_mult)(h) })
    }

    /// Set the global load multiplier.
    pub fn set_load_mult(&self, mult: f64) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.solution_set_load_mult)(h, mult) })
    }
}
