//! Load and line collection interfaces.
//!
//! Collections follow the engine's First/Next activation protocol: an
//! element becomes active, and scalar properties read or write the active
//! element. [`Loads::iter`] wraps the protocol in an iterator over
//! 1-based element indices.

use std::sync::Arc;

use ndarray::Array2;

use crate::batch::LoadBatch;
use crate::context::Context;
use crate::error::{Error, Result};

/// Load elements of the active circuit.
#[derive(Clone)]
pub struct Loads {
    ctx: Arc<Context>,
}

impl Loads {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Loads { ctx }
    }

    /// Activate the first load; returns its index, or 0 when empty.
    pub fn first(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.loads_get_first)(h) })
    }

    /// Activate the next load; returns its index, or 0 past the end.
    pub fn next(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.loads_get_next)(h) })
    }

    /// Number of loads.
    pub fn count(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.loads_get_count)(h) })
    }

    /// Index of the active load (1-based; 0 when none).
    pub fn idx(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.loads_get_idx)(h) })
    }

    /// Activate the load at a 1-based index.
    pub fn set_idx(&self, idx: i32) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.loads_set_idx)(h, idx) })
    }

    /// Name of the active load.
    pub fn name(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.loads_get_name)(h) })
    }

    /// Rename the active load.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.ctx.set_string(name, |api, h, s| unsafe { (api.loads_set_name)(h, s) })
    }

    /// Names of every load, in element order.
    pub fn all_names(&self) -> Result<Vec<String>> {
        self.ctx
            .get_string_array(|api, h, p, c| unsafe { (api.loads_get_all_names)(h, p, c) })
    }

    /// Active power of the active load, kW.
    pub fn kw(&self) -> Result<f64> {
        self.ctx.call(|api, h| unsafe { (api.loads_get_kw)(h) })
    }

    /// Set the active power of the active load, kW.
    pub fn set_kw(&self, kw: f64) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.loads_set_kw)(h, kw) })
    }

    /// Reactive power of the active load, kvar.
    pub fn kvar(&self) -> Result<f64> {
        self.ctx.call(|api, h| unsafe { (api.loads_get_kvar)(h) })
    }

    /// Set the reactive power of the active load, kvar.
    pub fn set_kvar(&self, kvar: f64) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.loads_set_kvar)(h, kvar) })
    }

    /// Iterate over all loads via the First/Next protocol, yielding the
    /// active index as each element is activated.
    pub fn iter(&self) -> LoadIter<'_> {
        LoadIter { loads: self, started: false, done: false }
    }

    /// Group the given 1-based indices for vectorized access.
    pub fn batch(&self, indices: Vec<i32>) -> LoadBatch {
        LoadBatch::new(self.ctx.clone(), indices)
    }

    /// Group every load for vectorized access.
    pub fn batch_all(&self) -> Result<LoadBatch> {
        let count = self.count()?;
        Ok(self.batch((1..=count).collect()))
    }
}

/// Iterator over load indices; see [`Loads::iter`].
pub struct LoadIter<'a> {
    loads: &'a Loads,
    started: bool,
    done: bool,
}

impl Iterator for LoadIter<'_> {
    type Item = Result<i32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = if self.started {
            self.loads.next()
        } else {
            self.started = true;
            self.loads.first()
        };
        match step {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(idx) => Some(Ok(idx)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Line elements of the active circuit.
#[derive(Clone)]
pub struct Lines {
    ctx: Arc<Context>,
}

impl Lines {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Lines { ctx }
    }

    /// Activate the first line; returns its index, or 0 when empty.
    pub fn first(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.lines_get_first)(h) })
    }

    /// Activate the next line; returns its index, or 0 past the end.
    pub fn next(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.lines_get_next)(h) })
    }

    /// Number of lines.
    pub fn count(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.lines_get_count)(h) })
    }

    /// Index of the active line (1-based; 0 when none).
    pub fn idx(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.lines_get_idx)(h) })
    }

    /// Activate the line at a 1-based index.
    pub fn set_idx(&self, idx: i32) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.lines_set_idx)(h, idx) })
    }

    /// Name of the active line.
    pub fn name(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.lines_get_name)(h) })
    }

    /// Phase count of the active line.
    pub fn phases(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.lines_get_phases)(h) })
    }

    /// Set the phase count of the active line.
    pub fn set_phases(&self, phases: i32) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.lines_set_phases)(h, phases) })
    }

    /// Sending bus of the active line.
    pub fn bus1(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.lines_get_bus1)(h) })
    }

    /// Reconnect the sending end of the active line.
    pub fn set_bus1(&self, bus: &str) -> Result<()> {
        self.ctx.set_string(bus, |api, h, s| unsafe { (api.lines_set_bus1)(h, s) })
    }

    /// Receiving bus of the active line.
    pub fn bus2(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.lines_get_bus2)(h) })
    }

    /// Length of the active line, km.
    pub fn length(&self) -> Result<f64> {
        self.ctx.call(|api, h| unsafe { (api.lines_get_length)(h) })
    }

    /// Set the length of the active line, km.
    pub fn set_length(&self, km: f64) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.lines_set_length)(h, km) })
    }

    /// Resistance matrix of the active line, phases x phases, ohms/km.
    pub fn rmatrix(&self) -> Result<Array2<f64>> {
        self.ctx
            .get_f64(|api, h, p, c| unsafe { (api.lines_get_rmatrix)(h, p, c) })?
            .into_matrix()
    }

    /// Replace the resistance matrix of the active line. The matrix must
    /// be square with the line's phase count on each side.
    pub fn set_rmatrix(&self, matrix: &Array2<f64>) -> Result<()> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(Error::ShapeMismatch { expected: rows * rows, got: rows * cols });
        }
        // The engine expects column-major order.
        let mut flat = Vec::with_capacity(rows * cols);
        for col in matrix.columns() {
            flat.extend(col.iter().copied());
        }
        self.ctx
            .set_f64_array(&flat, |api, h, p, n| unsafe { (api.lines_set_rmatrix)(h, p, n) })
    }
}
