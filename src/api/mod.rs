//! The COM-shaped object model.
//!
//! [`Dss`] is the root handle; the interfaces hanging off it (`Text`,
//! `Circuit`, `Bus`, `Loads`, `Lines`, `Solution`, ...) are lightweight
//! clones sharing one [`Context`]. Every property is a plain method
//! resolved at compile time; there is no dynamic attribute dispatch.

mod circuit;
mod elements;
mod error_iface;
mod parallel;
mod solution;
mod text;

pub use circuit::{Bus, Circuit};
pub use elements::{Lines, LoadIter, Loads};
pub use error_iface::ErrorIface;
pub use parallel::Parallel;
pub use solution::{Solution, SolveMode};
pub use text::Text;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::{Context, Options};
use crate::error::Result;
use crate::events::EventKind;
use crate::ffi::Engine;

/// Root handle to one engine context.
#[derive(Clone)]
pub struct Dss {
    ctx: Arc<Context>,
}

impl Dss {
    /// Load the engine per the configuration and create a context.
    pub fn open(config: &EngineConfig) -> Result<Dss> {
        let engine = match &config.library_path {
            Some(path) => Engine::load(path)?,
            None => Engine::load_default()?,
        };
        Dss::with_engine(engine, config.options())
    }

    /// Create a context on an already-loaded engine.
    pub fn with_engine(engine: Arc<Engine>, options: Options) -> Result<Dss> {
        Ok(Dss { ctx: Arc::new(Context::new(engine, options)?) })
    }

    /// Create a context backed by the in-process stub engine.
    #[cfg(feature = "stub-engine")]
    pub fn stub() -> Result<Dss> {
        Dss::with_engine(crate::ffi::stub::engine(), Options::default())
    }

    /// The shared context.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Engine version string.
    pub fn version(&self) -> Result<String> {
        self.ctx.get_string(|api, h| unsafe { (api.dss_get_version)(h) })
    }

    /// Create a fresh circuit and return the circuit interface.
    pub fn new_circuit(&self, name: &str) -> Result<Circuit> {
        self.ctx
            .set_string(name, |api, h, s| unsafe { (api.dss_new_circuit)(h, s) })?;
        Ok(self.circuit())
    }

    /// Discard all circuit data in this context.
    pub fn clear_all(&self) -> Result<()> {
        self.ctx.call(|api, h| unsafe { (api.dss_clear_all)(h) })
    }

    /// Number of circuits currently defined in this context.
    pub fn num_circuits(&self) -> Result<i32> {
        self.ctx.call(|api, h| unsafe { (api.dss_get_num_circuits)(h) })
    }

    /// The command interpreter interface.
    pub fn text(&self) -> Text {
        Text::new(self.ctx.clone())
    }

    /// The active-circuit interface.
    pub fn circuit(&self) -> Circuit {
        Circuit::new(self.ctx.clone())
    }

    /// Manual error inspection interface.
    pub fn error(&self) -> ErrorIface {
        ErrorIface::new(self.ctx.clone())
    }

    /// Multi-actor pass-through interface.
    pub fn parallel(&self) -> Parallel {
        Parallel::new(self.ctx.clone())
    }

    /// Install the handler for one control-event kind. The handler
    /// receives the solver step number.
    pub fn on_event(&self, kind: EventKind, handler: impl FnMut(i32) + 'static) -> Result<()> {
        self.ctx.events.set(kind, Box::new(handler));
        self.ctx.call(|api, h| unsafe {
            (api.dss_set_event_callback)(
                h,
                kind.as_i32(),
                Some(crate::events::trampoline),
                self.ctx.events.user_ptr(kind),
            )
        })
    }

    /// Remove the handler for one control-event kind.
    pub fn off_event(&self, kind: EventKind) -> Result<()> {
        self.ctx.call(|api, h| unsafe {
            (api.dss_set_event_callback)(h, kind.as_i32(), None, std::ptr::null_mut())
        })?;
        self.ctx.events.clear(kind);
        Ok(())
    }
}

impl std::fmt::Debug for Dss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dss").field("context", &self.ctx).finish()
    }
}
