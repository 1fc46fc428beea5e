//! Active-circuit and active-bus interfaces.

use std::sync::Arc;

use crate::api::{Lines, Loads, Solution};
use crate::context::Context;
use crate::error::Result;
use crate::marshal::ComplexArray;

/// The active circuit of a context.
#[derive(Clone)]
pub struct Circuit {
    ctx: Arc<Context>,
}

impl Circuit {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Circuit { ctx }
    }

    /// Circuit name.
    pub fn name(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.circuit_get_name)(h) })
    }

    /// Number of buses.
    pub fn num_buses(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.circuit_get_num_buses)(h) })
    }

    /// Number of nodes across all buses.
    pub fn num_nodes(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.circuit_get_num_nodes)(h) })
    }

    /// Names of every bus, in bus order.
    pub fn all_bus_names(&self) -> Result<Vec<String>> {
        self.ctx
            .get_string_array(|api, h, p, c| unsafe { (api.circuit_get_all_bus_names)(h, p, c) })
    }

    /// Per-unit voltage magnitude of every node, in bus order.
    pub fn all_bus_vmag_pu(&self) -> Result<Vec<f64>> {
        Ok(self
            .ctx
            .get_f64(|api, h, p, c| unsafe { (api.circuit_get_all_bus_vmag_pu)(h, p, c) })?
            .into_vec())
    }

    /// Total circuit power as one complex (kW, kvar) value.
    pub fn total_power(&self) -> Result<ComplexArray> {
        self.ctx
            .get_complex(|api, h, p, c| unsafe { (api.circuit_get_total_power)(h, p, c) })
    }

    /// Make the named bus active; returns its index.
    pub fn set_active_bus(&self, name: &str) -> Result<i32> {
        let mut index = -1;
        self.ctx.set_string(name, |api, h, s| {
            index = unsafe { (api.circuit_set_active_bus)(h, s) };
        })?;
        Ok(index)
    }

    /// Make the bus at `index` active; returns the index back.
    pub fn set_active_bus_i(&self, index: i32) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.circuit_set_active_bus_i)(h, index) })
    }

    /// Activate the named bus and return the bus interface.
    pub fn bus(&self, name: &str) -> Result<Bus> {
        self.set_active_bus(name)?;
        Ok(self.active_bus())
    }

    /// The currently active bus.
    pub fn active_bus(&self) -> Bus {
        Bus { ctx: self.ctx.clone() }
    }

    /// Load collection of this circuit.
    pub fn loads(&self) -> Loads {
        Loads::new(self.ctx.clone())
    }

    /// Line collection of this circuit.
    pub fn lines(&self) -> Lines {
        Lines::new(self.ctx.clone())
    }

    /// Solution interface of this circuit.
    pub fn solution(&self) -> Solution {
        Solution::new(self.ctx.clone())
    }
}

/// The active bus of a circuit. Reads always reflect whichever bus is
/// active at call time.
#[derive(Clone, Debug)]
pub struct Bus {
    ctx: Arc<Context>,
}

impl Bus {
    /// Bus name.
    pub fn name(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.bus_get_name)(h) })
    }

    /// Number of nodes on this bus.
    pub fn num_nodes(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.bus_get_num_nodes)(h) })
    }

    /// Node numbers of this bus.
    pub fn nodes(&self) -> Result<Vec<i32>> {
        Ok(self
            .ctx
            .get_i32(|api, h, p, c| unsafe { (api.bus_get_nodes)(h, p, c) })?
            .into_vec())
    }

    /// Line-to-neutral base voltage, kV.
    pub fn kv_base(&self) -> Result<f64> {
        self.ctx.call(|api, h| unsafe { (api.bus_get_kv_base)(h) })
    }

    /// Complex node voltages. Fetched through the Global Result scratch
    /// buffer; representation follows the context's `complex_arrays`
    /// option.
    pub fn voltages(&self) -> Result<ComplexArray> {
        self.ctx.get_complex_gr(|api, h| unsafe { (api.bus_get_voltages_gr)(h) })
    }

    /// Node voltages as interleaved magnitude (V) and angle (degrees).
    pub fn vmag_angle(&self) -> Result<Vec<f64>> {
        Ok(self
            .ctx
            .get_f64(|api, h, p, c| unsafe { (api.bus_get_vmag_angle)(h, p, c) })?
            .into_vec())
    }
}
