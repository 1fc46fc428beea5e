//! Vectorized property access over element groups.
//!
//! A batch is a binding-side grouping of 1-based element indices of one
//! collection class. Property access loops activate-then-access against
//! the native table; the engine's active-element pointer is left on the
//! last batch member afterwards, matching the collection protocol.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::ffi::{ApiTable, Ctx};

/// A group of load elements addressed by index.
#[derive(Clone)]
pub struct LoadBatch {
    ctx: Arc<Context>,
    indices: Vec<i32>,
}

impl LoadBatch {
    pub(crate) fn new(ctx: Arc<Context>, indices: Vec<i32>) -> Self {
        LoadBatch { ctx, indices }
    }

    /// Number of elements in the batch.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True when the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The grouped indices.
    pub fn indices(&self) -> &[i32] {
        &self.indices
    }

    fn activate(&self, idx: i32) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.loads_set_idx)(h, idx) })
    }

    fn map_f64(&self, get: impl Fn(&ApiTable, Ctx) -> f64) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.indices.len());
        for &idx in &self.indices {
            self.activate(idx)?;
            out.push(self.ctx.call(&get)?);
        }
        Ok(out)
    }

    fn zip_set_f64(&self, values: &[f64], set: impl Fn(&ApiTable, Ctx, f64)) -> Result<()> {
        if values.len() != self.indices.len() {
            return Err(Error::ShapeMismatch {
                expected: self.indices.len(),
                got: values.len(),
            });
        }
        for (&idx, &value) in self.indices.iter().zip(values) {
            self.activate(idx)?;
            self.ctx.call(|api, h| set(api, h, value))?;
        }
        Ok(())
    }

    fn fill_f64(&self, value: f64, set: impl Fn(&ApiTable, Ctx, f64)) -> Result<()> {
        for &idx in &self.indices {
            self.activate(idx)?;
            self.ctx.call(|api, h| set(api, h, value))?;
        }
        Ok(())
    }

    /// Active power of each element, kW.
    pub fn kw(&self) -> Result<Vec<f64>> {
        self.map_f64(|api, h| unsafe { (api.loads_get_kw)(h) })
    }

    /// Set per-element active power; `values` must match the batch length.
    pub fn set_kw(&self, values: &[f64]) -> Result<()> {
        self.zip_set_f64(values, |api, h, v| unsafe { (api.loads_set_kw)(h, v) })
    }

    /// Set every element's active power to one value.
    pub fn fill_kw(&self, value: f64) -> Result<()> {
        self.fill_f64(value, |api, h, v| unsafe { (api.loads_set_kw)(h, v) })
    }

    /// Reactive power of each element, kvar.
    pub fn kvar(&self) -> Result<Vec<f64>> {
        self.map_f64(|api, h| unsafe { (api.loads_get_kvar)(h) })
    }

    /// Set per-element reactive power; `values` must match the batch
    /// length.
    pub fn set_kvar(&self, values: &[f64]) -> Result<()> {
        self.zip_set_f64(values, |api, h, v| unsafe { (api.loads_set_kvar)(h, v) })
    }

    /// Set every element's reactive power to one value.
    pub fn fill_kvar(&self, value: f64) -> Result<()> {
        self.fill_f64(value, |api, h, v| unsafe { (api.loads_set_kvar)(h, v) })
    }

    /// Name of each element.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(self.indices.len());
        for &idx in &self.indices {
            self.activate(idx)?;
            out.push(self.ctx.get_string(|api, h| unsafe { (api.loads_get_name)(h) })?);
        }
        Ok(out)
    }
}
