//! In-process stand-in engine.
//!
//! Implements the same `extern "C"` surface as the native library over a
//! deterministic miniature feeder, so the binding can be exercised (and CI
//! can run) without the real engine installed. The contract is mirrored
//! bit-for-bit: heap-allocated result buffers that must be handed back
//! through the dispose entry points, four-slot count quads, a sticky error
//! cell, Global Result scratch buffers, and control-event dispatch during
//! a solve.
//!
//! Allocation and disposal are counted per context so tests can assert the
//! copy-then-free discipline (see [`stats`]).

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

use tracing::trace;

use super::{ApiTable, Ctx, Engine, NativeEventFn};

/// Error number: no circuit has been created in this context.
pub const ERR_NO_CIRCUIT: i32 = 266;
/// Error number: command text was not recognized.
pub const ERR_UNKNOWN_COMMAND: i32 = 284;
/// Error number: bus name or index did not match any bus.
pub const ERR_BAD_BUS: i32 = 251;
/// Error number: a collection property was accessed with no active element.
pub const ERR_NO_ACTIVE_ELEMENT: i32 = 277;
/// Error number: element index out of range.
pub const ERR_BAD_INDEX: i32 = 278;
/// Error number: a property was assigned an inconsistent value.
pub const ERR_BAD_VALUE: i32 = 287;

/// Deterministic data the stub circuit is built from. Tests compare
/// binding results against these constants.
pub mod fixture {
    /// Bus names, in bus order.
    pub const BUS_NAMES: [&str; 3] = ["sourcebus", "bus1", "bus2"];
    /// Line-to-neutral base voltage per bus, kV.
    pub const BUS_KV_BASE: [f64; 3] = [66.395, 7.199, 7.199];
    /// Node numbers per bus.
    pub const BUS_NODES: [&[i32]; 3] = [&[1, 2, 3], &[1, 2, 3], &[1]];
    /// Complex node voltages per bus, interleaved re/im pairs.
    pub const BUS_VOLTAGES: [&[f64]; 3] = [
        &[66395.3, 0.0, -33197.6, -57500.4, -33197.6, 57500.4],
        &[7199.5, 0.0, -3599.8, -6234.7, -3599.8, 6234.7],
        &[7105.1, -41.3],
    ];
    /// Total node count across all buses.
    pub const TOTAL_NODES: i32 = 7;
    /// Load element names.
    pub const LOAD_NAMES: [&str; 2] = ["load1", "load2"];
    /// Load kW setpoints.
    pub const LOAD_KW: [f64; 2] = [120.0, 75.5];
    /// Load kvar setpoints.
    pub const LOAD_KVAR: [f64; 2] = [60.0, 30.2];
    /// Line element names.
    pub const LINE_NAMES: [&str; 2] = ["line1", "line2"];
    /// Phase count per line.
    pub const LINE_PHASES: [i32; 2] = [3, 1];
    /// Sending bus per line.
    pub const LINE_BUS1: [&str; 2] = ["sourcebus", "bus1"];
    /// Receiving bus per line.
    pub const LINE_BUS2: [&str; 2] = ["bus1", "bus2"];
    /// Line length, km.
    pub const LINE_LENGTH_KM: [f64; 2] = [1.5, 0.8];
    /// 3x3 resistance matrix of line1, column-major, ohms/km.
    pub const LINE1_RMATRIX: [f64; 9] = [
        0.0868, 0.0298, 0.0288, 0.0298, 0.0912, 0.0316, 0.0288, 0.0316, 0.0889,
    ];
    /// 1x1 resistance matrix of line2, ohms/km.
    pub const LINE2_RMATRIX: [f64; 1] = [0.2876];
    /// Total circuit power as one complex (kW, kvar) pair.
    pub const TOTAL_POWER: [f64; 2] = [-195.7, -90.4];
    /// Iteration count reported after a successful solve.
    pub const SOLVE_ITERATIONS: i32 = 5;
    /// CPU count reported by the Parallel interface.
    pub const NUM_CPUS: i32 = 8;
    /// Version string reported by the engine.
    pub const VERSION: &str = "DSS Stub Engine v0.9.2";
}

/// Allocation/disposal counters for one stub context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// float64 result buffers handed out.
    pub f64_allocated: u64,
    /// float64 result buffers disposed.
    pub f64_disposed: u64,
    /// int32 result buffers handed out.
    pub i32_allocated: u64,
    /// int32 result buffers disposed.
    pub i32_disposed: u64,
    /// Individual strings handed out.
    pub strings_allocated: u64,
    /// Individual strings disposed (first disposal only).
    pub strings_disposed: u64,
    /// Disposals of a string that had already been disposed.
    pub string_double_frees: u64,
    /// Disposals of a pointer this context never handed out.
    pub string_wild_frees: u64,
    /// String-array spines handed out.
    pub string_arrays_allocated: u64,
    /// String-array spines disposed.
    pub string_arrays_disposed: u64,
}

struct StubLoad {
    name: String,
    kw: f64,
    kvar: f64,
}

struct StubLine {
    name: String,
    phases: i32,
    bus1: String,
    bus2: String,
    length_km: f64,
    rmatrix: Vec<f64>,
}

struct StubCircuit {
    name: String,
    loads: Vec<StubLoad>,
    lines: Vec<StubLine>,
    active_bus: usize,
    // 1-based; 0 means no active element.
    active_load: usize,
    active_line: usize,
}

impl StubCircuit {
    fn new(name: &str) -> Self {
        let loads = fixture::LOAD_NAMES
            .iter()
            .enumerate()
            .map(|(i, n)| StubLoad {
                name: n.to_string(),
                kw: fixture::LOAD_KW[i],
                kvar: fixture::LOAD_KVAR[i],
            })
            .collect();
        let lines = fixture::LINE_NAMES
            .iter()
            .enumerate()
            .map(|(i, n)| StubLine {
                name: n.to_string(),
                phases: fixture::LINE_PHASES[i],
                bus1: fixture::LINE_BUS1[i].to_string(),
                bus2: fixture::LINE_BUS2[i].to_string(),
                length_km: fixture::LINE_LENGTH_KM[i],
                rmatrix: if i == 0 {
                    fixture::LINE1_RMATRIX.to_vec()
                } else {
                    fixture::LINE2_RMATRIX.to_vec()
                },
            })
            .collect();
        StubCircuit {
            name: name.to_string(),
            loads,
            lines,
            active_bus: 0,
            active_load: 0,
            active_line: 0,
        }
    }
}

struct StubSolution {
    converged: bool,
    iterations: i32,
    mode: i32,
    tolerance: f64,
    load_mult: f64,
}

struct StubState {
    error_code: i32,
    error_desc: String,
    circuit: Option<StubCircuit>,
    text_result: String,
    solution: StubSolution,
    actors: i32,
    active_actor: i32,
    callbacks: [Option<(NativeEventFn, usize)>; 3],

    gr_f64: Vec<f64>,
    gr_f64_ptr: *mut f64,
    gr_f64_cnt: [i32; 4],
    gr_i32: Vec<i32>,
    gr_i32_ptr: *mut i32,
    gr_i32_cnt: [i32; 4],
    gr_str_ptr: *mut *mut c_char,
    gr_str_cnt: [i32; 4],
    gr_i8_ptr: *mut i8,
    gr_i8_cnt: [i32; 4],

    stats: Stats,
    // string ptr -> number of disposals seen so far
    string_live: HashMap<usize, u32>,
}

impl StubState {
    fn new() -> Self {
        StubState {
            error_code: 0,
            error_desc: String::new(),
            circuit: None,
            text_result: String::new(),
            solution: StubSolution {
                converged: false,
                iterations: 0,
                mode: 0,
                tolerance: 1e-4,
                load_mult: 1.0,
            },
            actors: 1,
            active_actor: 1,
            callbacks: [None; 3],
            gr_f64: Vec::new(),
            gr_f64_ptr: ptr::null_mut(),
            gr_f64_cnt: [0; 4],
            gr_i32: Vec::new(),
            gr_i32_ptr: ptr::null_mut(),
            gr_i32_cnt: [0; 4],
            gr_str_ptr: ptr::null_mut(),
            gr_str_cnt: [0; 4],
            gr_i8_ptr: ptr::null_mut(),
            gr_i8_cnt: [0; 4],
            stats: Stats::default(),
            string_live: HashMap::new(),
        }
    }

    fn set_error(&mut self, code: i32, desc: impl Into<String>) {
        self.error_code = code;
        self.error_desc = desc.into();
    }

    fn circuit_or_err(&mut self) -> Option<&mut StubCircuit> {
        if self.circuit.is_none() {
            self.set_error(ERR_NO_CIRCUIT, "no circuit has been created");
        }
        self.circuit.as_mut()
    }

    fn alloc_string(&mut self, s: &str) -> *mut c_char {
        let raw = CString::new(s).unwrap_or_default().into_raw();
        self.stats.strings_allocated += 1;
        self.string_live.insert(raw as usize, 0);
        raw
    }

    fn alloc_f64(&mut self, data: &[f64], rows: i32, cols: i32, ptr_out: *mut *mut f64, cnt: *mut i32) {
        let n = data.len();
        unsafe {
            *cnt = n as i32;
            *cnt.add(1) = (n * std::mem::size_of::<f64>()) as i32;
            *cnt.add(2) = rows;
            *cnt.add(3) = cols;
        }
        if n == 0 {
            unsafe { *ptr_out = ptr::null_mut() };
            return;
        }
        let buf = unsafe { libc::malloc(n * std::mem::size_of::<f64>()) } as *mut f64;
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), buf, n) };
        self.stats.f64_allocated += 1;
        unsafe { *ptr_out = buf };
    }

    fn alloc_i32(&mut self, data: &[i32], ptr_out: *mut *mut i32, cnt: *mut i32) {
        let n = data.len();
        unsafe {
            *cnt = n as i32;
            *cnt.add(1) = (n * std::mem::size_of::<i32>()) as i32;
            *cnt.add(2) = 0;
            *cnt.add(3) = 0;
        }
        if n == 0 {
            unsafe { *ptr_out = ptr::null_mut() };
            return;
        }
        let buf = unsafe { libc::malloc(n * std::mem::size_of::<i32>()) } as *mut i32;
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), buf, n) };
        self.stats.i32_allocated += 1;
        unsafe { *ptr_out = buf };
    }

    fn alloc_string_array(&mut self, items: &[String], ptr_out: *mut *mut *mut c_char, cnt: *mut i32) {
        let n = items.len();
        unsafe {
            *cnt = n as i32;
            *cnt.add(1) = (n * std::mem::size_of::<*mut c_char>()) as i32;
            *cnt.add(2) = 0;
            *cnt.add(3) = 0;
        }
        if n == 0 {
            unsafe { *ptr_out = ptr::null_mut() };
            return;
        }
        let spine =
            unsafe { libc::malloc(n * std::mem::size_of::<*mut c_char>()) } as *mut *mut c_char;
        for (i, s) in items.iter().enumerate() {
            let elem = self.alloc_string(s);
            unsafe { *spine.add(i) = elem };
        }
        self.stats.string_arrays_allocated += 1;
        unsafe { *ptr_out = spine };
    }

    fn fill_gr_f64(&mut self, data: &[f64], rows: i32, cols: i32) {
        self.gr_f64 = data.to_vec();
        self.gr_f64_ptr = self.gr_f64.as_mut_ptr();
        self.gr_f64_cnt = [
            data.len() as i32,
            (data.len() * std::mem::size_of::<f64>()) as i32,
            rows,
            cols,
        ];
    }

    fn active_bus_voltages(&self) -> &'static [f64] {
        fixture::BUS_VOLTAGES[self.circuit.as_ref().map(|c| c.active_bus).unwrap_or(0)]
    }

    fn run_command(&mut self, cmd: &str) {
        let cmd = cmd.trim();
        let lower = cmd.to_ascii_lowercase();
        self.text_result.clear();
        if let Some(rest) = lower.strip_prefix("new circuit.") {
            let name = &cmd[cmd.len() - rest.len()..];
            self.build_circuit(name);
        } else if lower == "solve" {
            self.solve();
        } else if lower == "clear" {
            self.circuit = None;
        } else if lower == "version" {
            self.text_result = fixture::VERSION.to_string();
        } else {
            self.set_error(ERR_UNKNOWN_COMMAND, format!("unknown command: \"{cmd}\""));
        }
    }

    fn build_circuit(&mut self, name: &str) {
        trace!(name, "stub: creating circuit");
        self.circuit = Some(StubCircuit::new(name));
        self.solution.converged = false;
        self.solution.iterations = 0;
    }

    fn solve(&mut self) {
        if self.circuit.is_none() {
            self.set_error(ERR_NO_CIRCUIT, "no circuit has been created");
            return;
        }
        let callbacks = self.callbacks;
        let fire = |slot: Option<(NativeEventFn, usize)>, step: i32| {
            if let Some((cb, user)) = slot {
                unsafe { cb(user as *mut c_void, step) };
            }
        };
        fire(callbacks[0], 0);
        for step in 1..=fixture::SOLVE_ITERATIONS {
            fire(callbacks[1], step);
            fire(callbacks[2], step);
        }
        self.solution.converged = true;
        self.solution.iterations = fixture::SOLVE_ITERATIONS;
        trace!(iterations = self.solution.iterations, "stub: solve complete");
    }
}

unsafe fn state<'a>(ctx: Ctx) -> &'a mut StubState {
    &mut *(ctx as *mut StubState)
}

// ============================================================================
// extern "C" surface
// ============================================================================

unsafe extern "C" fn ctx_new() -> Ctx {
    Box::into_raw(Box::new(StubState::new())) as Ctx
}

unsafe extern "C" fn ctx_dispose(ctx: Ctx) {
    if ctx.is_null() {
        return;
    }
    let st = Box::from_raw(ctx as *mut StubState);
    // Reclaim any strings the caller never handed back.
    for (&raw, &frees) in st.string_live.iter() {
        if frees == 0 {
            drop(CString::from_raw(raw as *mut c_char));
        }
    }
}

unsafe extern "C" fn error_get_number_ptr(ctx: Ctx) -> *mut i32 {
    &mut state(ctx).error_code
}

unsafe extern "C" fn error_get_description(ctx: Ctx) -> *mut c_char {
    let st = state(ctx);
    let desc = st.error_desc.clone();
    st.alloc_string(&desc)
}

unsafe extern "C" fn dss_get_version(ctx: Ctx) -> *mut c_char {
    state(ctx).alloc_string(fixture::VERSION)
}

unsafe extern "C" fn dss_new_circuit(ctx: Ctx, name: *const c_char) {
    let name = decode_arg(name);
    state(ctx).build_circuit(&name);
}

unsafe extern "C" fn dss_clear_all(ctx: Ctx) {
    state(ctx).circuit = None;
}

unsafe extern "C" fn dss_get_num_circuits(ctx: Ctx) -> i32 {
    state(ctx).circuit.is_some() as i32
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn dss_get_gr_pointers(
    ctx: Ctx,
    str_data: *mut *mut *mut *mut c_char,
    f64_data: *mut *mut *mut f64,
    i32_data: *mut *mut *mut i32,
    i8_data: *mut *mut *mut i8,
    str_count: *mut *mut i32,
    f64_count: *mut *mut i32,
    i32_count: *mut *mut i32,
    i8_count: *mut *mut i32,
) {
    let st = state(ctx);
    *str_data = (&mut st.gr_str_ptr) as *mut *mut *mut c_char;
    *f64_data = (&mut st.gr_f64_ptr) as *mut *mut f64;
    *i32_data = (&mut st.gr_i32_ptr) as *mut *mut i32;
    *i8_data = (&mut st.gr_i8_ptr) as *mut *mut i8;
    *str_count = st.gr_str_cnt.as_mut_ptr();
    *f64_count = st.gr_f64_cnt.as_mut_ptr();
    *i32_count = st.gr_i32_cnt.as_mut_ptr();
    *i8_count = st.gr_i8_cnt.as_mut_ptr();
}

unsafe extern "C" fn dss_dispose_pdouble(ctx: Ctx, cell: *mut *mut f64) {
    if cell.is_null() || (*cell).is_null() {
        return;
    }
    libc::free(*cell as *mut c_void);
    *cell = ptr::null_mut();
    state(ctx).stats.f64_disposed += 1;
}

unsafe extern "C" fn dss_dispose_pinteger(ctx: Ctx, cell: *mut *mut i32) {
    if cell.is_null() || (*cell).is_null() {
        return;
    }
    libc::free(*cell as *mut c_void);
    *cell = ptr::null_mut();
    state(ctx).stats.i32_disposed += 1;
}

unsafe extern "C" fn dss_dispose_pbyte(_ctx: Ctx, cell: *mut *mut i8) {
    if cell.is_null() || (*cell).is_null() {
        return;
    }
    libc::free(*cell as *mut c_void);
    *cell = ptr::null_mut();
}

unsafe extern "C" fn dss_dispose_ppansichar(ctx: Ctx, cell: *mut *mut *mut c_char) {
    if cell.is_null() || (*cell).is_null() {
        return;
    }
    // Element strings are disposed individually via dispose_string; only
    // the spine is reclaimed here.
    libc::free(*cell as *mut c_void);
    *cell = ptr::null_mut();
    state(ctx).stats.string_arrays_disposed += 1;
}

unsafe extern "C" fn dss_dispose_string(ctx: Ctx, s: *mut c_char) {
    if s.is_null() {
        return;
    }
    let st = state(ctx);
    match st.string_live.get_mut(&(s as usize)) {
        None => st.stats.string_wild_frees += 1,
        Some(frees) if *frees == 0 => {
            drop(CString::from_raw(s));
            *frees = 1;
            st.stats.strings_disposed += 1;
        }
        Some(frees) => {
            *frees += 1;
            st.stats.string_double_frees += 1;
        }
    }
}

unsafe extern "C" fn dss_set_event_callback(
    ctx: Ctx,
    kind: i32,
    cb: Option<NativeEventFn>,
    user: *mut c_void,
) {
    if !(0..3).contains(&kind) {
        return;
    }
    state(ctx).callbacks[kind as usize] = cb.map(|f| (f, user as usize));
}

unsafe extern "C" fn text_set_command(ctx: Ctx, cmd: *const c_char) {
    let cmd = decode_arg(cmd);
    state(ctx).run_command(&cmd);
}

unsafe extern "C" fn text_get_result(ctx: Ctx) -> *mut c_char {
    let st = state(ctx);
    let result = st.text_result.clone();
    st.alloc_string(&result)
}

unsafe extern "C" fn circuit_get_name(ctx: Ctx) -> *mut c_char {
    let st = state(ctx);
    let name = match st.circuit_or_err() {
        Some(c) => c.name.clone(),
        None => String::new(),
    };
    st.alloc_string(&name)
}

unsafe extern "C" fn circuit_get_num_buses(ctx: Ctx) -> i32 {
    match state(ctx).circuit_or_err() {
        Some(_) => fixture::BUS_NAMES.len() as i32,
        None => 0,
    }
}

unsafe extern "C" fn circuit_get_num_nodes(ctx: Ctx) -> i32 {
    match state(ctx).circuit_or_err() {
        Some(_) => fixture::TOTAL_NODES,
        None => 0,
    }
}

unsafe extern "C" fn circuit_get_all_bus_names(ctx: Ctx, out: *mut *mut *mut c_char, cnt: *mut i32) {
    let st = state(ctx);
    let names: Vec<String> = match st.circuit_or_err() {
        Some(_) => fixture::BUS_NAMES.iter().map(|s| s.to_string()).collect(),
        None => Vec::new(),
    };
    st.alloc_string_array(&names, out, cnt);
}

unsafe extern "C" fn circuit_get_all_bus_vmag_pu(ctx: Ctx, out: *mut *mut f64, cnt: *mut i32) {
    let st = state(ctx);
    let data = match st.circuit_or_err() {
        Some(_) => all_bus_vmag_pu(),
        None => Vec::new(),
    };
    st.alloc_f64(&data, 0, 0, out, cnt);
}

unsafe extern "C" fn circuit_get_total_power(ctx: Ctx, out: *mut *mut f64, cnt: *mut i32) {
    let st = state(ctx);
    let data = match st.circuit_or_err() {
        Some(_) => fixture::TOTAL_POWER.to_vec(),
        None => Vec::new(),
    };
    st.alloc_f64(&data, 0, 0, out, cnt);
}

unsafe extern "C" fn circuit_set_active_bus(ctx: Ctx, name: *const c_char) -> i32 {
    let name = decode_arg(name);
    let st = state(ctx);
    if st.circuit_or_err().is_none() {
        return -1;
    }
    match fixture::BUS_NAMES.iter().position(|b| b.eq_ignore_ascii_case(&name)) {
        Some(i) => {
            st.circuit.as_mut().unwrap().active_bus = i;
            i as i32
        }
        None => {
            st.set_error(ERR_BAD_BUS, format!("bus \"{name}\" not found"));
            -1
        }
    }
}

unsafe extern "C" fn circuit_set_active_bus_i(ctx: Ctx, idx: i32) -> i32 {
    let st = state(ctx);
    if st.circuit_or_err().is_none() {
        return -1;
    }
    if !(0..fixture::BUS_NAMES.len() as i32).contains(&idx) {
        st.set_error(ERR_BAD_BUS, format!("bus index {idx} out of range"));
        return -1;
    }
    st.circuit.as_mut().unwrap().active_bus = idx as usize;
    idx
}

unsafe extern "C" fn bus_get_name(ctx: Ctx) -> *mut c_char {
    let st = state(ctx);
    let name = match st.circuit_or_err() {
        Some(c) => fixture::BUS_NAMES[c.active_bus].to_string(),
        None => String::new(),
    };
    st.alloc_string(&name)
}

unsafe extern "C" fn bus_get_num_nodes(ctx: Ctx) -> i32 {
    match state(ctx).circuit_or_err() {
        Some(c) => fixture::BUS_NODES[c.active_bus].len() as i32,
        None => 0,
    }
}

unsafe extern "C" fn bus_get_nodes(ctx: Ctx, out: *mut *mut i32, cnt: *mut i32) {
    let st = state(ctx);
    let data: Vec<i32> = match st.circuit_or_err() {
        Some(c) => fixture::BUS_NODES[c.active_bus].to_vec(),
        None => Vec::new(),
    };
    st.alloc_i32(&data, out, cnt);
}

unsafe extern "C" fn bus_get_kv_base(ctx: Ctx) -> f64 {
    match state(ctx).circuit_or_err() {
        Some(c) => fixture::BUS_KV_BASE[c.active_bus],
        None => 0.0,
    }
}

unsafe extern "C" fn bus_get_voltages(ctx: Ctx, out: *mut *mut f64, cnt: *mut i32) {
    let st = state(ctx);
    let data = if st.circuit_or_err().is_some() {
        st.active_bus_voltages().to_vec()
    } else {
        Vec::new()
    };
    st.alloc_f64(&data, 0, 0, out, cnt);
}

unsafe extern "C" fn bus_get_voltages_gr(ctx: Ctx) {
    let st = state(ctx);
    let data = if st.circuit_or_err().is_some() {
        st.active_bus_voltages().to_vec()
    } else {
        Vec::new()
    };
    st.fill_gr_f64(&data, 0, 0);
}

unsafe extern "C" fn bus_get_vmag_angle(ctx: Ctx, out: *mut *mut f64, cnt: *mut i32) {
    let st = state(ctx);
    let data = if st.circuit_or_err().is_some() {
        let pairs = st.active_bus_voltages();
        let mut polar = Vec::with_capacity(pairs.len());
        for p in pairs.chunks_exact(2) {
            polar.push(p[0].hypot(p[1]));
            polar.push(p[1].atan2(p[0]).to_degrees());
        }
        polar
    } else {
        Vec::new()
    };
    st.alloc_f64(&data, 0, 0, out, cnt);
}

fn all_bus_vmag_pu() -> Vec<f64> {
    let mut out = Vec::with_capacity(fixture::TOTAL_NODES as usize);
    for (b, pairs) in fixture::BUS_VOLTAGES.iter().enumerate() {
        let base = fixture::BUS_KV_BASE[b] * 1000.0;
        for p in pairs.chunks_exact(2) {
            out.push(p[0].hypot(p[1]) / base);
        }
    }
    out
}

// --- Loads ------------------------------------------------------------------

unsafe extern "C" fn loads_get_first(ctx: Ctx) -> i32 {
    let st = state(ctx);
    match st.circuit_or_err() {
        Some(c) if !c.loads.is_empty() => {
            c.active_load = 1;
            1
        }
        _ => 0,
    }
}

unsafe extern "C" fn loads_get_next(ctx: Ctx) -> i32 {
    let st = state(ctx);
    match st.circuit.as_mut() {
        Some(c) if c.active_load < c.loads.len() => {
            c.active_load += 1;
            c.active_load as i32
        }
        Some(c) => {
            c.active_load = 0;
            0
        }
        None => 0,
    }
}

unsafe extern "C" fn loads_get_count(ctx: Ctx) -> i32 {
    match state(ctx).circuit_or_err() {
        Some(c) => c.loads.len() as i32,
        None => 0,
    }
}

unsafe extern "C" fn loads_get_idx(ctx: Ctx) -> i32 {
    match state(ctx).circuit.as_ref() {
        Some(c) => c.active_load as i32,
        None => 0,
    }
}

unsafe extern "C" fn loads_set_idx(ctx: Ctx, idx: i32) {
    let st = state(ctx);
    match st.circuit_or_err() {
        Some(c) if (1..=c.loads.len() as i32).contains(&idx) => c.active_load = idx as usize,
        Some(_) => st.set_error(ERR_BAD_INDEX, format!("load index {idx} out of range")),
        None => {}
    }
}

unsafe fn with_active_load<R>(
    ctx: Ctx,
    default: R,
    f: impl FnOnce(&mut StubLoad) -> R,
) -> R {
    let st = state(ctx);
    match st.circuit_or_err() {
        Some(c) if c.active_load > 0 => {
            let idx = c.active_load - 1;
            f(&mut c.loads[idx])
        }
        Some(_) => {
            st.set_error(ERR_NO_ACTIVE_ELEMENT, "no active load element");
            default
        }
        None => default,
    }
}

unsafe extern "C" fn loads_get_name(ctx: Ctx) -> *mut c_char {
    let name = with_active_load(ctx, String::new(), |l| l.name.clone());
    state(ctx).alloc_string(&name)
}

unsafe extern "C" fn loads_set_name(ctx: Ctx, name: *const c_char) {
    let name = decode_arg(name);
    with_active_load(ctx, (), |l| l.name = name);
}

unsafe extern "C" fn loads_get_all_names(ctx: Ctx, out: *mut *mut *mut c_char, cnt: *mut i32) {
    let st = state(ctx);
    let names: Vec<String> = match st.circuit_or_err() {
        Some(c) => c.loads.iter().map(|l| l.name.clone()).collect(),
        None => Vec::new(),
    };
    st.alloc_string_array(&names, out, cnt);
}

unsafe extern "C" fn loads_get_kw(ctx: Ctx) -> f64 {
    with_active_load(ctx, 0.0, |l| l.kw)
}

unsafe extern "C" fn loads_set_kw(ctx: Ctx, kw: f64) {
    with_active_load(ctx, (), |l| l.kw = kw);
}

unsafe extern "C" fn loads_get_kvar(ctx: Ctx) -> f64 {
    with_active_load(ctx, 0.0, |l| l.kvar)
}

unsafe extern "C" fn loads_set_kvar(ctx: Ctx, kvar: f64) {
    with_active_load(ctx, (), |l| l.kvar = kvar);
}

// --- Lines ------------------------------------------------------------------

unsafe extern "C" fn lines_get_first(ctx: Ctx) -> i32 {
    let st = state(ctx);
    match st.circuit_or_err() {
        Some(c) if !c.lines.is_empty() => {
            c.active_line = 1;
            1
        }
        _ => 0,
    }
}

unsafe extern "C" fn lines_get_next(ctx: Ctx) -> i32 {
    let st = state(ctx);
    match st.circuit.as_mut() {
        Some(c) if c.active_line < c.lines.len() => {
            c.active_line += 1;
            c.active_line as i32
        }
        Some(c) => {
            c.active_line = 0;
            0
        }
        None => 0,
    }
}

unsafe extern "C" fn lines_get_count(ctx: Ctx) -> i32 {
    match state(ctx).circuit_or_err() {
        Some(c) => c.lines.len() as i32,
        None => 0,
    }
}

unsafe extern "C" fn lines_get_idx(ctx: Ctx) -> i32 {
    match state(ctx).circuit.as_ref() {
        Some(c) => c.active_line as i32,
        None => 0,
    }
}

unsafe extern "C" fn lines_set_idx(ctx: Ctx, idx: i32) {
    let st = state(ctx);
    match st.circuit_or_err() {
        Some(c) if (1..=c.lines.len() as i32).contains(&idx) => c.active_line = idx as usize,
        Some(_) => st.set_error(ERR_BAD_INDEX, format!("line index {idx} out of range")),
        None => {}
    }
}

unsafe fn with_active_line<R>(
    ctx: Ctx,
    default: R,
    f: impl FnOnce(&mut StubLine) -> R,
) -> R {
    let st = state(ctx);
    match st.circuit_or_err() {
        Some(c) if c.active_line > 0 => {
            let idx = c.active_line - 1;
            f(&mut c.lines[idx])
        }
        Some(_) => {
            st.set_error(ERR_NO_ACTIVE_ELEMENT, "no active line element");
            default
        }
        None => default,
    }
}

unsafe extern "C" fn lines_get_name(ctx: Ctx) -> *mut c_char {
    let name = with_active_line(ctx, String::new(), |l| l.name.clone());
    state(ctx).alloc_string(&name)
}

unsafe extern "C" fn lines_get_phases(ctx: Ctx) -> i32 {
    with_active_line(ctx, 0, |l| l.phases)
}

unsafe extern "C" fn lines_set_phases(ctx: Ctx, phases: i32) {
    if phases < 1 {
        state(ctx).set_error(ERR_BAD_VALUE, "phase count must be positive");
        return;
    }
    with_active_line(ctx, (), |l| l.phases = phases);
}

unsafe extern "C" fn lines_get_bus1(ctx: Ctx) -> *mut c_char {
    let name = with_active_line(ctx, String::new(), |l| l.bus1.clone());
    state(ctx).alloc_string(&name)
}

unsafe extern "C" fn lines_set_bus1(ctx: Ctx, name: *const c_char) {
    let name = decode_arg(name);
    with_active_line(ctx, (), |l| l.bus1 = name);
}

unsafe extern "C" fn lines_get_bus2(ctx: Ctx) -> *mut c_char {
    let name = with_active_line(ctx, String::new(), |l| l.bus2.clone());
    state(ctx).alloc_string(&name)
}

unsafe extern "C" fn lines_get_length(ctx: Ctx) -> f64 {
    with_active_line(ctx, 0.0, |l| l.length_km)
}

unsafe extern "C" fn lines_set_length(ctx: Ctx, km: f64) {
    with_active_line(ctx, (), |l| l.length_km = km);
}

unsafe extern "C" fn lines_get_rmatrix(ctx: Ctx, out: *mut *mut f64, cnt: *mut i32) {
    let (data, order) = with_active_line(ctx, (Vec::new(), 0), |l| (l.rmatrix.clone(), l.phases));
    state(ctx).alloc_f64(&data, order, order, out, cnt);
}

unsafe extern "C" fn lines_set_rmatrix(ctx: Ctx, data: *const f64, len: i32) {
    let values = if data.is_null() || len <= 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(data, len as usize).to_vec()
    };
    // Expected size depends on the active line's phase count.
    let expected = with_active_line(ctx, -1, |l| l.phases * l.phases);
    if expected < 0 {
        return;
    }
    if values.len() as i32 != expected {
        state(ctx).set_error(
            ERR_BAD_VALUE,
            format!("rmatrix needs {expected} values, got {}", values.len()),
        );
        return;
    }
    with_active_line(ctx, (), |l| l.rmatrix = values);
}

// --- Solution / Parallel ----------------------------------------------------

unsafe extern "C" fn solution_solve(ctx: Ctx) {
    state(ctx).solve();
}

unsafe extern "C" fn solution_get_converged(ctx: Ctx) -> u16 {
    state(ctx).solution.converged as u16
}

unsafe extern "C" fn solution_get_iterations(ctx: Ctx) -> i32 {
    state(ctx).solution.iterations
}

unsafe extern "C" fn solution_get_mode(ctx: Ctx) -> i32 {
    state(ctx).solution.mode
}

unsafe extern "C" fn solution_set_mode(ctx: Ctx, mode: i32) {
    let st = state(ctx);
    if (0..=5).contains(&mode) {
        st.solution.mode = mode;
    } else {
        st.set_error(ERR_BAD_VALUE, format!("solve mode {mode} not supported"));
    }
}

unsafe extern "C" fn solution_get_tolerance(ctx: Ctx) -> f64 {
    state(ctx).solution.tolerance
}

unsafe extern "C" fn solution_set_tolerance(ctx: Ctx, tol: f64) {
    state(ctx).solution.tolerance = tol;
}

unsafe extern "C" fn solution_get_load_mult(ctx: Ctx) -> f64 {
    state(ctx).solution.load_mult
}

unsafe extern "C" fn solution_set_load_mult(ctx: Ctx, mult: f64) {
    state(ctx).solution.load_mult = mult;
}

unsafe extern "C" fn parallel_get_num_cpus(_ctx: Ctx) -> i32 {
    fixture::NUM_CPUS
}

unsafe extern "C" fn parallel_get_active_actor(ctx: Ctx) -> i32 {
    state(ctx).active_actor
}

unsafe extern "C" fn parallel_set_active_actor(ctx: Ctx, actor: i32) {
    let st = state(ctx);
    if (1..=st.actors).contains(&actor) {
        st.active_actor = actor;
    } else {
        st.set_error(ERR_BAD_INDEX, format!("actor {actor} does not exist"));
    }
}

unsafe extern "C" fn parallel_get_actor_status(ctx: Ctx, out: *mut *mut i32, cnt: *mut i32) {
    let st = state(ctx);
    let statuses = vec![1i32; st.actors as usize];
    st.alloc_i32(&statuses, out, cnt);
}

unsafe extern "C" fn parallel_create_actor(ctx: Ctx) -> i32 {
    let st = state(ctx);
    st.actors += 1;
    st.active_actor = st.actors;
    st.actors
}

unsafe fn decode_arg(s: *const c_char) -> String {
    if s.is_null() {
        String::new()
    } else {
        CStr::from_ptr(s).to_string_lossy().into_owned()
    }
}

// ============================================================================
// Entry points for the binding
// ============================================================================

fn table() -> ApiTable {
    ApiTable {
        ctx_new,
        ctx_dispose,
        error_get_number_ptr,
        error_get_description,
        dss_get_version,
        dss_new_circuit,
        dss_clear_all,
        dss_get_num_circuits,
        dss_get_gr_pointers,
        dss_dispose_pdouble,
        dss_dispose_pinteger,
        dss_dispose_pbyte,
        dss_dispose_ppansichar,
        dss_dispose_string,
        dss_set_event_callback,
        text_set_command,
        text_get_result,
        circuit_get_name,
        circuit_get_num_buses,
        circuit_get_num_nodes,
        circuit_get_all_bus_names,
        circuit_get_all_bus_vmag_pu,
        circuit_get_total_power,
        circuit_set_active_bus,
        circuit_set_active_bus_i,
        bus_get_name,
        bus_get_num_nodes,
        bus_get_nodes,
        bus_get_kv_base,
        bus_get_voltages,
        bus_get_voltages_gr,
        bus_get_vmag_angle,
        loads_get_first,
        loads_get_next,
        loads_get_count,
        loads_get_idx,
        loads_set_idx,
        loads_get_name,
        loads_set_name,
        loads_get_all_names,
        loads_get_kw,
        loads_set_kw,
        loads_get_kvar,
        loads_set_kvar,
        lines_get_first,
        lines_get_next,
        lines_get_count,
        lines_get_idx,
        lines_set_idx,
        lines_get_name,
        lines_get_phases,
        lines_set_phases,
        lines_get_bus1,
        lines_set_bus1,
        lines_get_bus2,
        lines_get_length,
        lines_set_length,
        lines_get_rmatrix,
        lines_set_rmatrix,
        solution_solve,
        solution_get_converged,
        solution_get_iterations,
        solution_get_mode,
        solution_set_mode,
        solution_get_tolerance,
        solution_set_tolerance,
        solution_get_load_mult,
        solution_set_load_mult,
        parallel_get_num_cpus,
        parallel_get_active_actor,
        parallel_set_active_actor,
        parallel_get_actor_status,
        parallel_create_actor,
    }
}

/// Build an [`Engine`] backed by the in-process stub.
pub fn engine() -> Arc<Engine> {
    Engine::from_table(table(), "stub")
}

/// Snapshot of the allocation counters of a stub context.
///
/// # Safety
///
/// `ctx` must be a live context created by the stub engine.
pub unsafe fn stats(ctx: *mut c_void) -> Stats {
    state(ctx as Ctx).stats
}

/// Number of strings handed out by a stub context that have not been
/// disposed yet.
///
/// # Safety
///
/// `ctx` must be a live context created by the stub engine.
pub unsafe fn live_strings(ctx: *mut c_void) -> usize {
    state(ctx as Ctx)
        .string_live
        .values()
        .filter(|&&frees| frees == 0)
        .count()
}
