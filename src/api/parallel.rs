//! Multi-actor pass-throughs.
//!
//! The engine owns its actor orchestration; this interface only relays
//! actor-count and actor-status queries.

use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

/// Pass-through to the engine's multi-actor machinery.
#[derive(Clone)]
pub struct Parallel {
    ctx: Arc<Context>,
}

impl Parallel {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Parallel { ctx }
    }

    /// CPU count reported by the engine.
    pub fn num_cpus(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.parallel_get_num_cpus)(h) })
    }

    /// The active actor (1-based).
    pub fn active_actor(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.parallel_get_active_actor)(h) })
    }

    /// Switch the active actor.
    pub fn set_active_actor(&self, actor: i32) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.parallel_set_active_actor)(h, actor) })
    }

    /// Status of every actor.
    pub fn actor_status(&self) -> Result<Vec<i32>> {
        Ok(self
            .ctx
            .get_i32(|api, h, p, c| unsafe { (api.parallel_get_actor_status)(h, p, c) })?
            .into_vec())
    }

    /// Create a new actor; returns its number and makes it active.
    pub fn create_actor(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.parallel_create_actor)(h) })
    }
}
