//! Native engine entry points.
//!
//! The engine is a shared library exposing a flat C function table: one
//! `ctx_<Class>_<Operation>` symbol per property or method, operating on an
//! opaque context pointer. [`ApiTable`] resolves the symbols this binding
//! consumes into plain function pointers; [`Engine`] keeps the library (and
//! therefore the pointers) alive behind an `Arc`.
//!
//! Array-returning entry points follow a single convention: the engine
//! allocates a result buffer, writes its address through an out-pointer and
//! fills a four-slot count `[elements, bytes, rows, cols]`. The caller
//! copies and then hands the buffer back through the matching
//! `ctx_DSS_Dispose_*` entry point. The Global Result variants (`*_GR`)
//! instead write into per-context scratch buffers whose addresses are
//! fetched once via `ctx_DSS_GetGRPointers`.

use std::env;
use std::ffi::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[cfg(feature = "stub-engine")]
pub mod stub;

/// Opaque engine context handle.
pub type Ctx = *mut c_void;

/// Control-event callback invoked by the engine during a solve.
pub type NativeEventFn = unsafe extern "C" fn(user: *mut c_void, step: i32);

/// Resolved function pointers for every native entry point this binding
/// uses. Field names are the snake_case of the exported symbol.
#[derive(Clone, Copy)]
pub struct ApiTable {
    pub ctx_new: unsafe extern "C" fn() -> Ctx,
    pub ctx_dispose: unsafe extern "C" fn(Ctx),

    pub error_get_number_ptr: unsafe extern "C" fn(Ctx) -> *mut i32,
    pub error_get_description: unsafe extern "C" fn(Ctx) -> *mut c_char,

    pub dss_get_version: unsafe extern "C" fn(Ctx) -> *mut c_char,
    pub dss_new_circuit: unsafe extern "C" fn(Ctx, *const c_char),
    pub dss_clear_all: unsafe extern "C" fn(Ctx),
    pub dss_get_num_circuits: unsafe extern "C" fn(Ctx) -> i32,

    #[allow(clippy::type_complexity)]
    pub dss_get_gr_pointers: unsafe extern "C" fn(
        Ctx,
        *mut *mut *mut *mut c_char,
        *mut *mut *mut f64,
        *mut *mut *mut i32,
        *mut *mut *mut i8,
        *mut *mut i32,
        *mut *mut i32,
        *mut *mut i32,
        *mut *mut i32,
    ),

    pub dss_dispose_pdouble: unsafe extern "C" fn(Ctx, *mut *mut f64),
    pub dss_dispose_pinteger: unsafe extern "C" fn(Ctx, *mut *mut i32),
    pub dss_dispose_pbyte: unsafe extern "C" fn(Ctx, *mut *mut i8),
    pub dss_dispose_ppansichar: unsafe extern "C" fn(Ctx, *mut *mut *mut c_char),
    pub dss_dispose_string: unsafe extern "C" fn(Ctx, *mut c_char),

    pub dss_set_event_callback:
        unsafe extern "C" fn(Ctx, i32, Option<NativeEventFn>, *mut c_void),

    pub text_set_command: unsafe extern "C" fn(Ctx, *const c_char),
    pub text_get_result: unsafe extern "C" fn(Ctx) -> *mut c_char,

    pub circuit_get_name: unsafe extern "C" fn(Ctx) -> *mut c_char,
    pub circuit_get_num_buses: unsafe extern "C" fn(Ctx) -> i32,
    pub circuit_get_num_nodes: unsafe extern "C" fn(Ctx) -> i32,
    pub circuit_get_all_bus_names: unsafe extern "C" fn(Ctx, *mut *mut *mut c_char, *mut i32),
    pub circuit_get_all_bus_vmag_pu: unsafe extern "C" fn(Ctx, *mut *mut f64, *mut i32),
    pub circuit_get_total_power: unsafe extern "C" fn(Ctx, *mut *mut f64, *mut i32),
    pub circuit_set_active_bus: unsafe extern "C" fn(Ctx, *const c_char) -> i32,
    pub circuit_set_active_bus_i: unsafe extern "C" fn(Ctx, i32) -> i32,

    pub bus_get_name: unsafe extern "C" fn(Ctx) -> *mut c_char,
    pub bus_get_num_nodes: unsafe extern "C" fn(Ctx) -> i32,
    pub bus_get_nodes: unsafe extern "C" fn(Ctx, *mut *mut i32, *mut i32),
    pub bus_get_kv_base: unsafe extern "C" fn(Ctx) -> f64,
    pub bus_get_voltages: unsafe extern "C" fn(Ctx, *mut *mut f64, *mut i32),
    pub bus_get_voltages_gr: unsafe extern "C" fn(Ctx),
    pub bus_get_vmag_angle: unsafe extern "C" fn(Ctx, *mut *mut f64, *mut i32),

    pub loads_get_first: unsafe extern "C" fn(Ctx) -> i32,
    pub loads_get_next: unsafe extern "C" fn(Ctx) -> i32,
    pub loads_get_count: unsafe extern "C" fn(Ctx) -> i32,
    pub loads_get_idx: unsafe extern "C" fn(Ctx) -> i32,
    pub loads_set_idx: unsafe extern "C" fn(Ctx, i32),
    pub loads_get_name: unsafe extern "C" fn(Ctx) -> *mut c_char,
    pub loads_set_name: unsafe extern "C" fn(Ctx, *const c_char),
    pub loads_get_all_names: unsafe extern "C" fn(Ctx, *mut *mut *mut c_char, *mut i32),
    pub loads_get_kw: unsafe extern "C" fn(Ctx) -> f64,
    pub loads_set_kw: unsafe extern "C" fn(Ctx, f64),
    pub loads_get_kvar: unsafe extern "C" fn(Ctx) -> f64,
    pub loads_set_kvar: unsafe extern "C" fn(Ctx, f64),

    pub lines_get_first: unsafe extern "C" fn(Ctx) -> i32,
    pub lines_get_next: unsafe extern "C" fn(Ctx) -> i32,
    pub lines_get_count: unsafe extern "C" fn(Ctx) -> i32,
    pub lines_get_idx: unsafe extern "C" fn(Ctx) -> i32,
    pub lines_set_idx: unsafe extern "C" fn(Ctx, i32),
    pub lines_get_name: unsafe extern "C" fn(Ctx) -> *mut c_char,
    pub lines_get_phases: unsafe extern "C" fn(Ctx) -> i32,
    pub lines_set_phases: unsafe extern "C" fn(Ctx, i32),
    pub lines_get_bus1: unsafe extern "C" fn(Ctx) -> *mut c_char,
    pub lines_set_bus1: unsafe extern "C" fn(Ctx, *const c_char),
    pub lines_get_bus2: unsafe extern "C" fn(Ctx) -> *mut c_char,
    pub lines_get_length: unsafe extern "C" fn(Ctx) -> f64,
    pub lines_set_length: unsafe extern "C" fn(Ctx, f64),
    pub lines_get_rmatrix: unsafe extern "C" fn(Ctx, *mut *mut f64, *mut i32),
    pub lines_set_rmatrix: unsafe extern "C" fn(Ctx, *const f64, i32),

    pub solution_solve: unsafe extern "C" fn(Ctx),
    pub solution_get_converged: unsafe extern "C" fn(Ctx) -> u16,
    pub solution_get_iterations: unsafe extern "C" fn(Ctx) -> i32,
    pub solution_get_mode: unsafe extern "C" fn(Ctx) -> i32,
    pub solution_set_mode: unsafe extern "C" fn(Ctx, i32),
    pub solution_get_tolerance: unsafe extern "C" fn(Ctx) -> f64,
    pub solution_set_tolerance: unsafe extern "C" fn(Ctx, f64),
    pub solution_get_load_mult: unsafe extern "C" fn(Ctx) -> f64,
    pub solution_set_load_mult: unsafe extern "C" fn(Ctx, f64),

    pub parallel_get_num_cpus: unsafe extern "C" fn(Ctx) -> i32,
    pub parallel_get_active_actor: unsafe extern "C" fn(Ctx) -> i32,
    pub parallel_set_active_actor: unsafe extern "C" fn(Ctx, i32),
    pub parallel_get_actor_status: unsafe extern "C" fn(Ctx, *mut *mut i32, *mut i32),
    pub parallel_create_actor: unsafe extern "C" fn(Ctx) -> i32,
}

macro_rules! sym {
    ($lib:expr, $name:literal) => {
        *unsafe { $lib.get(concat!($name, "\0").as_bytes()) }.map_err(|source| {
            Error::MissingSymbol { name: $name, source }
        })?
    };
}

impl ApiTable {
    /// Resolve every entry point from an already-loaded library.
    pub fn load(lib: &Library) -> Result<Self> {
        Ok(ApiTable {
            ctx_new: sym!(lib, "ctx_New"),
            ctx_dispose: sym!(lib, "ctx_Dispose"),
            error_get_number_ptr: sym!(lib, "ctx_Error_Get_NumberPtr"),
            error_get_description: sym!(lib, "ctx_Error_Get_Description"),
            dss_get_version: sym!(lib, "ctx_DSS_Get_Version"),
            dss_new_circuit: sym!(lib, "ctx_DSS_NewCircuit"),
            dss_clear_all: sym!(lib, "ctx_DSS_ClearAll"),
            dss_get_num_circuits: sym!(lib, "ctx_DSS_Get_NumCircuits"),
            dss_get_gr_pointers: sym!(lib, "ctx_DSS_GetGRPointers"),
            dss_dispose_pdouble: sym!(lib, "ctx_DSS_Dispose_PDouble"),
            dss_dispose_pinteger: sym!(lib, "ctx_DSS_Dispose_PInteger"),
            dss_dispose_pbyte: sym!(lib, "ctx_DSS_Dispose_PByte"),
            dss_dispose_ppansichar: sym!(lib, "ctx_DSS_Dispose_PPAnsiChar"),
            dss_dispose_string: sym!(lib, "ctx_DSS_Dispose_String"),
            dss_set_event_callback: sym!(lib, "ctx_DSS_Set_EventCallback"),
            text_set_command: sym!(lib, "ctx_Text_Set_Command"),
            text_get_result: sym!(lib, "ctx_Text_Get_Result"),
            circuit_get_name: sym!(lib, "ctx_Circuit_Get_Name"),
            circuit_get_num_buses: sym!(lib, "ctx_Circuit_Get_NumBuses"),
            circuit_get_num_nodes: sym!(lib, "ctx_Circuit_Get_NumNodes"),
            circuit_get_all_bus_names: sym!(lib, "ctx_Circuit_Get_AllBusNames"),
            circuit_get_all_bus_vmag_pu: sym!(lib, "ctx_Circuit_Get_AllBusVmagPu"),
            circuit_get_total_power: sym!(lib, "ctx_Circuit_Get_TotalPower"),
            circuit_set_active_bus: sym!(lib, "ctx_Circuit_SetActiveBus"),
            circuit_set_active_bus_i: sym!(lib, "ctx_Circuit_SetActiveBusi"),
            bus_get_name: sym!(lib, "ctx_Bus_Get_Name"),
            bus_get_num_nodes: sym!(lib, "ctx_Bus_Get_NumNodes"),
            bus_get_nodes: sym!(lib, "ctx_Bus_Get_Nodes"),
            bus_get_kv_base: sym!(lib, "ctx_Bus_Get_kVBase"),
            bus_get_voltages: sym!(lib, "ctx_Bus_Get_Voltages"),
            bus_get_voltages_gr: sym!(lib, "ctx_Bus_Get_Voltages_GR"),
            bus_get_vmag_angle: sym!(lib, "ctx_Bus_Get_VMagAngle"),
            loads_get_first: sym!(lib, "ctx_Loads_Get_First"),
            loads_get_next: sym!(lib, "ctx_Loads_Get_Next"),
            loads_get_count: sym!(lib, "ctx_Loads_Get_Count"),
            loads_get_idx: sym!(lib, "ctx_Loads_Get_idx"),
            loads_set_idx: sym!(lib, "ctx_Loads_Set_idx"),
            loads_get_name: sym!(lib, "ctx_Loads_Get_Name"),
            loads_set_name: sym!(lib, "ctx_Loads_Set_Name"),
            loads_get_all_names: sym!(lib, "ctx_Loads_Get_AllNames"),
            loads_get_kw: sym!(lib, "ctx_Loads_Get_kW"),
            loads_set_kw: sym!(lib, "ctx_Loads_Set_kW"),
            loads_get_kvar: sym!(lib, "ctx_Loads_Get_kvar"),
            loads_set_kvar: sym!(lib, "ctx_Loads_Set_kvar"),
            lines_get_first: sym!(lib, "ctx_Lines_Get_First"),
            lines_get_next: sym!(lib, "ctx_Lines_Get_Next"),
            lines_get_count: sym!(lib, "ctx_Lines_Get_Count"),
            lines_get_idx: sym!(lib, "ctx_Lines_Get_idx"),
            lines_set_idx: sym!(lib, "ctx_Lines_Set_idx"),
            lines_get_name: sym!(lib, "ctx_Lines_Get_Name"),
            lines_get_phases: sym!(lib, "ctx_Lines_Get_Phases"),
            lines_set_phases: sym!(lib, "ctx_Lines_Set_Phases"),
            lines_get_bus1: sym!(lib, "ctx_Lines_Get_Bus1"),
            lines_set_bus1: sym!(lib, "ctx_Lines_Set_Bus1"),
            lines_get_bus2: sym!(lib, "ctx_Lines_Get_Bus2"),
            lines_get_length: sym!(lib, "ctx_Lines_Get_Length"),
            lines_set_length: sym!(lib, "ctx_Lines_Set_Length"),
            lines_get_rmatrix: sym!(lib, "ctx_Lines_Get_Rmatrix"),
            lines_set_rmatrix: sym!(lib, "ctx_Lines_Set_Rmatrix"),
            solution_solve: sym!(lib, "ctx_Solution_Solve"),
            solution_get_converged: sym!(lib, "ctx_Solution_Get_Converged"),
            solution_get_iterations: sym!(lib, "ctx_Solution_Get_Iterations"),
            solution_get_mode: sym!(lib, "ctx_Solution_Get_Mode"),
            solution_set_mode: sym!(lib, "ctx_Solution_Set_Mode"),
            solution_get_tolerance: sym!(lib, "ctx_Solution_Get_Tolerance"),
            solution_set_tolerance: sym!(lib, "ctx_Solution_Set_Tolerance"),
            solution_get_load_mult: sym!(lib, "ctx_Solution_Get_LoadMult"),
            solution_set_load_mult: sym!(lib, "ctx_Solution_Set_LoadMult"),
            parallel_get_num_cpus: sym!(lib, "ctx_Parallel_Get_NumCPUs"),
            parallel_get_active_actor: sym!(lib, "ctx_Parallel_Get_ActiveActor"),
            parallel_set_active_actor: sym!(lib, "ctx_Parallel_Set_ActiveActor"),
            parallel_get_actor_status: sym!(lib, "ctx_Parallel_Get_ActorStatus"),
            parallel_create_actor: sym!(lib, "ctx_Parallel_CreateActor"),
        })
    }
}

/// Per-context Global Result scratch pointers, fetched once at context
/// creation. The data cells hold the address of the engine's most recent
/// scratch buffer for each element type; the count cells point at the
/// corresponding four-slot count quads.
#[derive(Clone, Copy)]
pub(crate) struct GrPointers {
    pub str_data: *mut *mut *mut c_char,
    pub f64_data: *mut *mut f64,
    pub i32_data: *mut *mut i32,
    pub i8_data: *mut *mut i8,
    pub str_count: *mut i32,
    pub f64_count: *mut i32,
    pub i32_count: *mut i32,
    pub i8_count: *mut i32,
}

impl GrPointers {
    pub(crate) fn null() -> Self {
        GrPointers {
            str_data: std::ptr::null_mut(),
            f64_data: std::ptr::null_mut(),
            i32_data: std::ptr::null_mut(),
            i8_data: std::ptr::null_mut(),
            str_count: std::ptr::null_mut(),
            f64_count: std::ptr::null_mut(),
            i32_count: std::ptr::null_mut(),
            i8_count: std::ptr::null_mut(),
        }
    }
}

/// Environment variable overriding the engine library location.
pub const LIBRARY_ENV: &str = "DSS_RS_LIB";

/// Default engine library file name for the current platform.
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY: &str = "dss_capi.dll";
/// Default engine library file name for the current platform.
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY: &str = "libdss_capi.dylib";
/// Default engine library file name for the current platform.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_LIBRARY: &str = "libdss_capi.so";

/// A loaded engine: the shared library plus its resolved function table.
///
/// `Engine` is cheap to share (`Arc`) and may back any number of contexts.
pub struct Engine {
    api: ApiTable,
    // Keeps the function pointers in `api` valid. `None` for the stub.
    _lib: Option<Library>,
    origin: String,
}

impl Engine {
    /// Load the engine from an explicit library path.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Engine>> {
        let path = path.as_ref();
        let lib = unsafe { Library::new(path) }?;
        let api = ApiTable::load(&lib)?;
        info!(path = %path.display(), "loaded engine library");
        Ok(Arc::new(Engine {
            api,
            _lib: Some(lib),
            origin: path.display().to_string(),
        }))
    }

    /// Load the engine from `DSS_RS_LIB` or the platform default name.
    pub fn load_default() -> Result<Arc<Engine>> {
        let path = env::var_os(LIBRARY_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY));
        debug!(path = %path.display(), "resolving engine library");
        Engine::load(path)
    }

    /// The resolved function table.
    pub(crate) fn api(&self) -> &ApiTable {
        &self.api
    }

    /// Where this engine came from (library path, or `"stub"`).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[cfg(feature = "stub-engine")]
    pub(crate) fn from_table(api: ApiTable, origin: &str) -> Arc<Engine> {
        Arc::new(Engine {
            api,
            _lib: None,
            origin: origin.to_string(),
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("origin", &self.origin).finish()
    }
}
