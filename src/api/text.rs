//! Command interpreter interface.

use std::sync::Arc;

use tracing::trace;

use crate::context::Context;
use crate::error::Result;

/// Pass-through to the engine's text command interpreter.
#[derive(Clone)]
pub struct Text {
    ctx: Arc<Context>,
}

impl Text {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Text { ctx }
    }

    /// Execute one command.
    pub fn command(&self, command: &str) -> Result<()> {
        trace!(command, "text command");
        self.ctx
            .set_string(command, |api, h, s| unsafe { (api.text_set_command)(h, s) })
    }

    /// Result text of the most recent command.
    pub fn result(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.text_get_result)(h) })
    }
}
