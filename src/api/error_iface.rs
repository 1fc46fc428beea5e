//! Manual error inspection.
//!
//! With the context's `check_errors` option off, failed calls leave the
//! engine's error cell set instead of surfacing `Err`. This interface
//! reads that state. Read [`ErrorIface::description`] before
//! [`ErrorIface::number`]: reading the number resets the cell.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};

/// The engine's sticky error state.
#[derive(Clone)]
pub struct ErrorIface {
    ctx: Arc<Context>,
}

impl ErrorIface {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        ErrorIface { ctx }
    }

    /// Current error number; reading resets the cell to zero.
    pub fn number(&self) -> i32 {
        self.ctx.take_error().map(|(number, _)| number).unwrap_or(0)
    }

    /// Current error description, without touching the cell.
    pub fn description(&self) -> String {
        self.ctx.error_description_raw()
    }

    /// Surface the current error state as a `Result`, clearing the cell.
    pub fn check(&self) -> Result<()> {
        match self.ctx.take_error() {
            None => Ok(()),
            Some((number, message)) => Err(Error::Engine { number, message }),
        }
    }
}
