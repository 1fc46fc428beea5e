//! Python bindings: expose the object model as an extension module.
//!
//! Thin `#[pyclass]` wrappers over the `api` interfaces. Every attribute
//! is a statically generated getter/setter; arrays surface as NumPy
//! arrays, and complex-capable results follow the context's
//! `complex_arrays` option (complex dtype on, flat float pairs off).
//! Control events are registered per kind with a plain callable.

use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::api;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::events::EventKind;
use crate::marshal::ComplexArray;
use crate::SolveMode;

fn to_py(err: Error) -> PyErr {
    match &err {
        Error::Engine { number, message } => {
            PyRuntimeError::new_err(format!("[{number}] {message}"))
        }
        Error::NulByte(_)
        | Error::ShapeMismatch { .. }
        | Error::NotAMatrix
        | Error::OddPairCount { .. }
        | Error::UnknownSolveMode(_) => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

fn complex_to_object(py: Python<'_>, value: ComplexArray) -> PyObject {
    match value {
        ComplexArray::Complex(v) => v.into_pyarray(py).into_any().unbind(),
        ComplexArray::Pairs(v) => v.into_pyarray(py).into_any().unbind(),
    }
}

fn parse_event_kind(name: &str) -> PyResult<EventKind> {
    match name.to_ascii_lowercase().as_str() {
        "init" | "initcontrols" => Ok(EventKind::InitControls),
        "step" | "stepcontrols" => Ok(EventKind::StepControls),
        "check" | "checkcontrols" => Ok(EventKind::CheckControls),
        other => Err(PyValueError::new_err(format!(
            "unknown event kind '{other}' (expected 'init', 'step' or 'check')"
        ))),
    }
}

/// Root handle to one engine context.
#[pyclass(name = "DSS", unsendable)]
struct PyDss {
    inner: api::Dss,
}

#[pymethods]
impl PyDss {
    /// Load the engine library and create a context.
    #[new]
    #[pyo3(signature = (lib_path=None, complex_arrays=false, check_errors=true))]
    fn new(lib_path: Option<String>, complex_arrays: bool, check_errors: bool) -> PyResult<Self> {
        let config = EngineConfig {
            library_path: lib_path.map(Into::into),
            complex_arrays,
            check_errors,
        };
        Ok(PyDss { inner: api::Dss::open(&config).map_err(to_py)? })
    }

    /// Create a context backed by the in-process stub engine.
    #[cfg(feature = "stub-engine")]
    #[staticmethod]
    fn stub() -> PyResult<Self> {
        Ok(PyDss { inner: api::Dss::stub().map_err(to_py)? })
    }

    #[getter]
    fn version(&self) -> PyResult<String> {
        self.inner.version().map_err(to_py)
    }

    #[getter]
    fn complex_arrays(&self) -> bool {
        self.inner.context().options().complex_arrays
    }

    #[setter]
    fn set_complex_arrays(&self, on: bool) {
        self.inner.context().set_complex_arrays(on);
    }

    #[getter]
    fn check_errors(&self) -> bool {
        self.inner.context().options().check_errors
    }

    #[setter]
    fn set_check_errors(&self, on: bool) {
        self.inner.context().set_check_errors(on);
    }

    fn new_circuit(&self, name: &str) -> PyResult<PyCircuit> {
        Ok(PyCircuit { inner: self.inner.new_circuit(name).map_err(to_py)? })
    }

    fn clear_all(&self) -> PyResult<()> {
        self.inner.clear_all().map_err(to_py)
    }

    #[getter]
    fn num_circuits(&self) -> PyResult<i32> {
        self.inner.num_circuits().map_err(to_py)
    }

    #[getter]
    fn text(&self) -> PyText {
        PyText { inner: self.inner.text() }
    }

    #[getter]
    fn active_circuit(&self) -> PyCircuit {
        PyCircuit { inner: self.inner.circuit() }
    }

    #[getter]
    fn error(&self) -> PyErrorIface {
        PyErrorIface { inner: self.inner.error() }
    }

    #[getter]
    fn parallel(&self) -> PyParallel {
        PyParallel { inner: self.inner.parallel() }
    }

    /// Register a callable for one control-event kind ('init', 'step' or
    /// 'check'). The callable receives the solver step number.
    fn on_event(&self, kind: &str, callback: Py<PyAny>) -> PyResult<()> {
        let kind = parse_event_kind(kind)?;
        self.inner
            .on_event(kind, move |step| {
                Python::with_gil(|py| {
                    if let Err(err) = callback.call1(py, (step,)) {
                        tracing::error!(%err, "python event handler raised");
                    }
                });
            })
            .map_err(to_py)
    }

    /// Remove the callable for one control-event kind.
    fn off_event(&self, kind: &str) -> PyResult<()> {
        self.inner.off_event(parse_event_kind(kind)?).map_err(to_py)
    }

    fn __repr__(&self) -> PyResult<String> {
        Ok(format!("DSS(engine='{}')", self.inner.context().engine().origin()))
    }
}

/// Command interpreter.
#[pyclass(name = "Text", unsendable)]
struct PyText {
    inner: api::Text,
}

#[pymethods]
impl PyText {
    fn command(&self, command: &str) -> PyResult<()> {
        self.inner.command(command).map_err(to_py)
    }

    #[getter]
    fn result(&self) -> PyResult<String> {
        self.inner.result().map_err(to_py)
    }
}

/// The active circuit.
#[pyclass(name = "Circuit", unsendable)]
struct PyCircuit {
    inner: api::Circuit,
}

#[pymethods]
impl PyCircuit {
    #[getter]
    fn name(&self) -> PyResult<String> {
        self.inner.name().map_err(to_py)
    }

    #[getter]
    fn num_buses(&self) -> PyResult<i32> {
        self.inner.num_buses().map_err(to_py)
    }

    #[getter]
    fn num_nodes(&self) -> PyResult<i32> {
        self.inner.num_nodes().map_err(to_py)
    }

    #[getter]
    fn all_bus_names(&self) -> PyResult<Vec<String>> {
        self.inner.all_bus_names().map_err(to_py)
    }

    #[getter]
    fn all_bus_vmag_pu<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.inner.all_bus_vmag_pu().map_err(to_py)?.into_pyarray(py))
    }

    #[getter]
    fn total_power(&self, py: Python<'_>) -> PyResult<PyObject> {
        Ok(complex_to_object(py, self.inner.total_power().map_err(to_py)?))
    }

    fn set_active_bus(&self, name: &str) -> PyResult<i32> {
        self.inner.set_active_bus(name).map_err(to_py)
    }

    fn set_active_bus_i(&self, index: i32) -> PyResult<i32> {
        self.inner.set_active_bus_i(index).map_err(to_py)
    }

    fn bus(&self, name: &str) -> PyResult<PyBus> {
        Ok(PyBus { inner: self.inner.bus(name).map_err(to_py)? })
    }

    #[getter]
    fn active_bus(&self) -> PyBus {
        PyBus { inner: self.inner.active_bus() }
    }

    #[getter]
    fn loads(&self) -> PyLoads {
        PyLoads { inner: self.inner.loads() }
    }

    #[getter]
    fn lines(&self) -> PyLines {
        PyLines { inner: self.inner.lines() }
    }

    #[getter]
    fn solution(&self) -> PySolution {
        PySolution { inner: self.inner.solution() }
    }
}

/// The active bus.
#[pyclass(name = "Bus", unsendable)]
struct PyBus {
    inner: api::Bus,
}

#[pymethods]
impl PyBus {
    #[getter]
    fn name(&self) -> PyResult<String> {
        self.inner.name().map_err(to_py)
    }

    #[getter]
    fn num_nodes(&self) -> PyResult<i32> {
        self.inner.num_nodes().map_err(to_py)
    }

    #[getter]
    fn nodes<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<i32>>> {
        Ok(self.inner.nodes().map_err(to_py)?.into_pyarray(py))
    }

    #[getter]
    fn kv_base(&self) -> PyResult<f64> {
        self.inner.kv_base().map_err(to_py)
    }

    #[getter]
    fn voltages(&self, py: Python<'_>) -> PyResult<PyObject> {
        Ok(complex_to_object(py, self.inner.voltages().map_err(to_py)?))
    }

    #[getter]
    fn vmag_angle<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.inner.vmag_angle().map_err(to_py)?.into_pyarray(py))
    }
}

/// Load collection.
#[pyclass(name = "Loads", unsendable)]
struct PyLoads {
    inner: api::Loads,
}

#[pymethods]
impl PyLoads {
    fn first(&self) -> PyResult<i32> {
        self.inner.first().map_err(to_py)
    }

    fn next(&self) -> PyResult<i32> {
        self.inner.next().map_err(to_py)
    }

    #[getter]
    fn count(&self) -> PyResult<i32> {
        self.inner.count().map_err(to_py)
    }

    #[getter]
    fn idx(&self) -> PyResult<i32> {
        self.inner.idx().map_err(to_py)
    }

    #[setter]
    fn set_idx(&self, idx: i32) -> PyResult<()> {
        self.inner.set_idx(idx).map_err(to_py)
    }

    #[getter]
    fn name(&self) -> PyResult<String> {
        self.inner.name().map_err(to_py)
    }

    #[setter]
    fn set_name(&self, name: &str) -> PyResult<()> {
        self.inner.set_name(name).map_err(to_py)
    }

    #[getter]
    fn all_names(&self) -> PyResult<Vec<String>> {
        self.inner.all_names().map_err(to_py)
    }

    #[getter]
    fn kw(&self) -> PyResult<f64> {
        self.inner.kw().map_err(to_py)
    }

    #[setter]
    fn set_kw(&self, kw: f64) -> PyResult<()> {
        self.inner.set_kw(kw).map_err(to_py)
    }

    #[getter]
    fn kvar(&self) -> PyResult<f64> {
        self.inner.kvar().map_err(to_py)
    }

    #[setter]
    fn set_kvar(&self, kvar: f64) -> PyResult<()> {
        self.inner.set_kvar(kvar).map_err(to_py)
    }

    /// Group 1-based indices for vectorized access; groups every load
    /// when `indices` is omitted.
    #[pyo3(signature = (indices=None))]
    fn batch(&self, indices: Option<Vec<i32>>) -> PyResult<PyLoadBatch> {
        let batch = match indices {
            Some(idx) => self.inner.batch(idx),
            None => self.inner.batch_all().map_err(to_py)?,
        };
        Ok(PyLoadBatch { inner: batch })
    }
}

/// Vectorized access to a group of loads.
#[pyclass(name = "LoadBatch", unsendable)]
struct PyLoadBatch {
    inner: crate::batch::LoadBatch,
}

#[pymethods]
impl PyLoadBatch {
    fn __len__(&self) -> usize {
        self.inner.len()
    }

    #[getter]
    fn names(&self) -> PyResult<Vec<String>> {
        self.inner.names().map_err(to_py)
    }

    #[getter]
    fn kw<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.inner.kw().map_err(to_py)?.into_pyarray(py))
    }

    #[setter]
    fn set_kw(&self, values: Vec<f64>) -> PyResult<()> {
        self.inner.set_kw(&values).map_err(to_py)
    }

    #[getter]
    fn kvar<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.inner.kvar().map_err(to_py)?.into_pyarray(py))
    }

    #[setter]
    fn set_kvar(&self, values: Vec<f64>) -> PyResult<()> {
        self.inner.set_kvar(&values).map_err(to_py)
    }

    fn fill_kw(&self, value: f64) -> PyResult<()> {
        self.inner.fill_kw(value).map_err(to_py)
    }

    fn fill_kvar(&self, value: f64) -> PyResult<()> {
        self.inner.fill_kvar(value).map_err(to_py)
    }
}

/// Line collection.
#[pyclass(name = "Lines", unsendable)]
struct PyLines {
    inner: api::Lines,
}

#[pymethods]
impl PyLines {
    fn first(&self) -> PyResult<i32> {
        self.inner.first().map_err(to_py)
    }

    fn next(&self) -> PyResult<i32> {
        self.inner.next().map_err(to_py)
    }

    #[getter]
    fn count(&self) -> PyResult<i32> {
        self.inner.count().map_err(to_py)
    }

    #[getter]
    fn idx(&self) -> PyResult<i32> {
        self.inner.idx().map_err(to_py)
    }

    #[setter]
    fn set_idx(&self, idx: i32) -> PyResult<()> {
        self.inner.set_idx(idx).map_err(to_py)
    }

    #[getter]
    fn name(&self) -> PyResult<String> {
        self.inner.name().map_err(to_py)
    }

    #[getter]
    fn phases(&self) -> PyResult<i32> {
        self.inner.phases().map_err(to_py)
    }

    #[setter]
    fn set_phases(&self, phases: i32) -> PyResult<()> {
        self.inner.set_phases(phases).map_err(to_py)
    }

    #[getter]
    fn bus1(&self) -> PyResult<String> {
        self.inner.bus1().map_err(to_py)
    }

    #[setter]
    fn set_bus1(&self, bus: &str) -> PyResult<()> {
        self.inner.set_bus1(bus).map_err(to_py)
    }

    #[getter]
    fn bus2(&self) -> PyResult<String> {
        self.inner.bus2().map_err(to_py)
    }

    #[getter]
    fn length(&self) -> PyResult<f64> {
        self.inner.length().map_err(to_py)
    }

    #[setter]
    fn set_length(&self, km: f64) -> PyResult<()> {
        self.inner.set_length(km).map_err(to_py)
    }

    #[getter]
    fn rmatrix<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        Ok(self.inner.rmatrix().map_err(to_py)?.into_pyarray(py))
    }

    #[setter]
    fn set_rmatrix(&self, matrix: PyReadonlyArray2<'_, f64>) -> PyResult<()> {
        self.inner.set_rmatrix(&matrix.as_array().to_owned()).map_err(to_py)
    }
}

/// Solution interface.
#[pyclass(name = "Solution", unsendable)]
struct PySolution {
    inner: api::Solution,
}

#[pymethods]
impl PySolution {
    fn solve(&self) -> PyResult<()> {
        self.inner.solve().map_err(to_py)
    }

    #[getter]
    fn converged(&self) -> PyResult<bool> {
        self.inner.converged().map_err(to_py)
    }

    #[getter]
    fn iterations(&self) -> PyResult<i32> {
        self.inner.iterations().map_err(to_py)
    }

    #[getter]
    fn mode(&self) -> PyResult<i32> {
        Ok(self.inner.mode().map_err(to_py)?.as_raw())
    }

    #[setter]
    fn set_mode(&self, mode: i32) -> PyResult<()> {
        let mode = SolveMode::from_raw(mode)
            .ok_or_else(|| PyValueError::new_err(format!("unknown solve mode {mode}")))?;
        self.inner.set_mode(mode).map_err(to_py)
    }

    #[getter]
    fn tolerance(&self) -> PyResult<f64> {
        self.inner.tolerance().map_err(to_py)
    }

    #[setter]
    fn set_tolerance(&self, tolerance: f64) -> PyResult<()> {
        self.inner.set_tolerance(tolerance).map_err(to_py)
    }

    #[getter]
    fn load_mult(&self) -> PyResult<f64> {
        self.inner.load_mult().map_err(to_py)
    }

    #[setter]
    fn set_load_mult(&self, mult: f64) -> PyResult<()> {
        self.inner.set_load_mult(mult).map_err(to_py)
    }
}

/// Manual error inspection.
#[pyclass(name = "Error", unsendable)]
struct PyErrorIface {
    inner: api::ErrorIface,
}

#[pymethods]
impl PyErrorIface {
    /// Current error number; reading resets the cell.
    #[getter]
    fn number(&self) -> i32 {
        self.inner.number()
    }

    /// Current error description.
    #[getter]
    fn description(&self) -> String {
        self.inner.description()
    }
}

/// Multi-actor pass-throughs.
#[pyclass(name = "Parallel", unsendable)]
struct PyParallel {
    inner: api::Parallel,
}

#[pymethods]
impl PyParallel {
    #[getter]
    fn num_cpus(&self) -> PyResult<i32> {
        self.inner.num_cpus().map_err(to_py)
    }

    #[getter]
    fn active_actor(&self) -> PyResult<i32> {
        self.inner.active_actor().map_err(to_py)
    }

    #[setter]
    fn set_active_actor(&self, actor: i32) -> PyResult<()> {
        self.inner.set_active_actor(actor).map_err(to_py)
    }

    #[getter]
    fn actor_status<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<i32>>> {
        Ok(self.inner.actor_status().map_err(to_py)?.into_pyarray(py))
    }

    fn create_actor(&self) -> PyResult<i32> {
        self.inner.create_actor().map_err(to_py)
    }
}

/// Python module definition.
#[pymodule]
fn dss_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDss>()?;
    m.add_class::<PyText>()?;
    m.add_class::<PyCircuit>()?;
    m.add_class::<PyBus>()?;
    m.add_class::<PyLoads>()?;
    m.add_class::<PyLoadBatch>()?;
    m.add_class::<PyLines>()?;
    m.add_class::<PySolution>()?;
    m.add_class::<PyErrorIface>()?;
    m.add_class::<PyParallel>()?;
    m.add("__version__", crate::VERSION)?;
    Ok(())
}
