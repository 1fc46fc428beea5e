//! Safe Rust bindings for an OpenDSS-compatible distribution system
//! simulation engine.
//!
//! The engine is a native shared library exposing a flat C function table;
//! this crate wraps it in a COM-shaped object model: a [`Dss`] root handle
//! with `Text`, `Circuit`, `Bus`, `Loads`, `Lines` and `Solution`
//! interfaces hanging off it. All solving happens inside the engine; the
//! crate's job is marshaling (copying native result buffers into owned
//! arrays, matrices and strings) and error translation (surfacing the
//! engine's sticky error cell as [`Error::Engine`]).
//!
//! Behavior that the classic COM surface kept in process-wide globals
//! (the complex-array toggle, the exception-enable flag, the error cell)
//! is explicit per-context state here; see [`Options`]. Contexts are
//! independent: each one owns its own engine state and its own switches.
//!
//! ```no_run
//! use dss_rs::{Dss, EngineConfig};
//!
//! # fn main() -> dss_rs::Result<()> {
//! let dss = Dss::open(&EngineConfig::default())?;
//! let circuit = dss.new_circuit("feeder13")?;
//! dss.text().command("solve")?;
//! let voltages = circuit.bus("sourcebus")?.voltages()?;
//! println!("{} node voltages", voltages.len());
//! # Ok(())
//! # }
//! ```
//!
//! With the `python` feature, the same object model is exported as a
//! Python extension module.

pub mod api;
pub mod batch;
pub mod config;
mod context;
mod error;
pub mod events;
pub mod ffi;
pub mod marshal;
#[cfg(feature = "python")]
mod python_api;

pub use api::{
    Bus, Circuit, Dss, ErrorIface, Lines, LoadIter, Loads, Parallel, Solution, SolveMode, Text,
};
pub use batch::LoadBatch;
pub use config::EngineConfig;
pub use context::{Context, Options};
pub use error::{Error, Result};
pub use events::EventKind;
pub use ffi::Engine;
pub use marshal::{ComplexArray, Float64Buffer, Int32Buffer, NumericBuffer};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing output for the binding.
///
/// Honors `RUST_LOG`; defaults to `dss_rs=info`.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dss_rs=info")),
        )
        .with_target(false)
        .init();
}
