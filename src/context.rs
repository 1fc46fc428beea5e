//! Engine context handle.
//!
//! A [`Context`] owns one native engine context plus everything that the
//! source system kept in process-wide globals: the complex-array toggle,
//! the error-checking toggle, the error cell and the Global Result scratch
//! pointers. Contexts are independent; two contexts never share options or
//! error state.

use std::cell::Cell;
use std::ffi::{c_char, c_void, CString};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::events::EventSlots;
use crate::ffi::{ApiTable, Ctx, Engine, GrPointers};
use crate::marshal::{self, ComplexArray, Float64Buffer, Int32Buffer};

/// Per-context behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Return complex-capable results as `Complex64` values instead of
    /// interleaved float pairs.
    pub complex_arrays: bool,
    /// Check the engine's error cell after every call and surface a
    /// nonzero cell as [`Error::Engine`]. When off, callers inspect the
    /// error interface themselves.
    pub check_errors: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { complex_arrays: false, check_errors: true }
    }
}

/// One native engine context.
///
/// Holds a raw context handle, so a `Context` stays on the thread that
/// created it. Multi-core work goes through the engine's own actor
/// machinery (the Parallel interface), not through sharing contexts.
pub struct Context {
    engine: Arc<Engine>,
    handle: Ctx,
    error_ptr: *mut i32,
    gr: GrPointers,
    options: Cell<Options>,
    pub(crate) events: EventSlots,
}

impl Context {
    /// Create a fresh context on an engine.
    pub fn new(engine: Arc<Engine>, options: Options) -> Result<Context> {
        let api = *engine.api();
        let handle = unsafe { (api.ctx_new)() };
        if handle.is_null() {
            return Err(Error::ContextInit("engine returned a null context"));
        }
        let error_ptr = unsafe { (api.error_get_number_ptr)(handle) };
        if error_ptr.is_null() {
            unsafe { (api.ctx_dispose)(handle) };
            return Err(Error::ContextInit("error cell unavailable"));
        }
        let mut gr = GrPointers::null();
        unsafe {
            (api.dss_get_gr_pointers)(
                handle,
                &mut gr.str_data,
                &mut gr.f64_data,
                &mut gr.i32_data,
                &mut gr.i8_data,
                &mut gr.str_count,
                &mut gr.f64_count,
                &mut gr.i32_count,
                &mut gr.i8_count,
            )
        };
        if gr.f64_data.is_null() || gr.f64_count.is_null() {
            unsafe { (api.ctx_dispose)(handle) };
            return Err(Error::ContextInit("global result buffers unavailable"));
        }
        debug!(engine = engine.origin(), "created engine context");
        Ok(Context {
            engine,
            handle,
            error_ptr,
            gr,
            options: Cell::new(options),
            events: EventSlots::new(),
        })
    }

    /// Create a context backed by the in-process stub engine.
    #[cfg(feature = "stub-engine")]
    pub fn stub() -> Result<Context> {
        Context::new(crate::ffi::stub::engine(), Options::default())
    }

    /// The engine backing this context.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Current option values.
    pub fn options(&self) -> Options {
        self.options.get()
    }

    /// Replace the option values.
    pub fn set_options(&self, options: Options) {
        self.options.set(options);
    }

    /// Toggle complex-valued results.
    pub fn set_complex_arrays(&self, on: bool) {
        let mut o = self.options.get();
        o.complex_arrays = on;
        self.options.set(o);
    }

    /// Toggle the automatic error-cell check.
    pub fn set_check_errors(&self, on: bool) {
        let mut o = self.options.get();
        o.check_errors = on;
        self.options.set(o);
    }

    /// The raw native context handle, for interop with engine extensions.
    pub fn as_raw(&self) -> *mut c_void {
        self.handle
    }

    pub(crate) fn api(&self) -> &ApiTable {
        self.engine.api()
    }

    // --- error adapter ------------------------------------------------------

    /// Read and clear the error cell; fetch the description if nonzero.
    pub(crate) fn take_error(&self) -> Option<(i32, String)> {
        let number = unsafe { *self.error_ptr };
        if number == 0 {
            return None;
        }
        unsafe { *self.error_ptr = 0 };
        let api = self.api();
        let raw = unsafe { (api.error_get_description)(self.handle) };
        let message = unsafe { marshal::decode_string(raw) };
        unsafe { (api.dss_dispose_string)(self.handle, raw) };
        debug!(number, message = %message, "engine reported an error");
        Some((number, message))
    }

    /// Error cell value without clearing it.
    pub(crate) fn error_number_raw(&self) -> i32 {
        unsafe { *self.error_ptr }
    }

    /// Current error description without touching the cell.
    pub(crate) fn error_description_raw(&self) -> String {
        let api = self.api();
        let raw = unsafe { (api.error_get_description)(self.handle) };
        let message = unsafe { marshal::decode_string(raw) };
        unsafe { (api.dss_dispose_string)(self.handle, raw) };
        message
    }

    /// The automatic post-call check: honor `check_errors`.
    pub(crate) fn check_error(&self) -> Result<()> {
        if !self.options.get().check_errors {
            return Ok(());
        }
        match self.take_error() {
            None => Ok(()),
            Some((number, message)) => Err(Error::Engine { number, message }),
        }
    }

    // --- call plumbing ------------------------------------------------------

    /// Issue a scalar native call, then run the error check.
    pub(crate) fn call<R>(&self, f: impl FnOnce(&ApiTable, Ctx) -> R) -> Result<R> {
        let r = f(self.api(), self.handle);
        self.check_error()?;
        Ok(r)
    }

    /// Issue an array-filling call, copy the result, dispose the native
    /// buffer, then run the error check.
    pub(crate) fn get_f64(
        &self,
        fill: impl FnOnce(&ApiTable, Ctx, *mut *mut f64, *mut i32),
    ) -> Result<Float64Buffer> {
        let api = self.api();
        let mut ptr: *mut f64 = std::ptr::null_mut();
        let mut cnt = [0i32; 4];
        fill(api, self.handle, &mut ptr, cnt.as_mut_ptr());
        let copied = unsafe { marshal::copy_numeric(ptr, cnt) };
        unsafe { (api.dss_dispose_pdouble)(self.handle, &mut ptr) };
        self.check_error()?;
        copied
    }

    /// Same as [`Context::get_f64`], for int32 results.
    pub(crate) fn get_i32(
        &self,
        fill: impl FnOnce(&ApiTable, Ctx, *mut *mut i32, *mut i32),
    ) -> Result<Int32Buffer> {
        let api = self.api();
        let mut ptr: *mut i32 = std::ptr::null_mut();
        let mut cnt = [0i32; 4];
        fill(api, self.handle, &mut ptr, cnt.as_mut_ptr());
        let copied = unsafe { marshal::copy_numeric(ptr, cnt) };
        unsafe { (api.dss_dispose_pinteger)(self.handle, &mut ptr) };
        self.check_error()?;
        copied
    }

    /// Issue a Global Result call and copy straight out of the scratch
    /// buffer. No dispose; the engine reuses the buffer on the next call.
    pub(crate) fn get_f64_gr(&self, fill: impl FnOnce(&ApiTable, Ctx)) -> Result<Float64Buffer> {
        fill(self.api(), self.handle);
        let cnt = unsafe {
            [
                *self.gr.f64_count,
                *self.gr.f64_count.add(1),
                *self.gr.f64_count.add(2),
                *self.gr.f64_count.add(3),
            ]
        };
        let ptr = unsafe { *self.gr.f64_data };
        let copied = unsafe { marshal::copy_numeric(ptr, cnt) };
        self.check_error()?;
        copied
    }

    /// Complex-capable variant of [`Context::get_f64`]; the representation
    /// follows the `complex_arrays` option.
    pub(crate) fn get_complex(
        &self,
        fill: impl FnOnce(&ApiTable, Ctx, *mut *mut f64, *mut i32),
    ) -> Result<ComplexArray> {
        let pairs = self.get_f64(fill)?.into_vec();
        marshal::to_complex_array(pairs, self.options.get().complex_arrays)
    }

    /// Complex-capable variant of [`Context::get_f64_gr`].
    pub(crate) fn get_complex_gr(
        &self,
        fill: impl FnOnce(&ApiTable, Ctx),
    ) -> Result<ComplexArray> {
        let pairs = self.get_f64_gr(fill)?.into_vec();
        marshal::to_complex_array(pairs, self.options.get().complex_arrays)
    }

    /// Fetch a string result; the native pointer is disposed after the
    /// copy.
    pub(crate) fn get_string(
        &self,
        f: impl FnOnce(&ApiTable, Ctx) -> *mut c_char,
    ) -> Result<String> {
        let api = self.api();
        let raw = f(api, self.handle);
        let s = unsafe { marshal::decode_string(raw) };
        unsafe { (api.dss_dispose_string)(self.handle, raw) };
        self.check_error()?;
        Ok(s)
    }

    /// Fetch a string-array result. Each element pointer is disposed right
    /// after decoding, then the array spine is handed back.
    pub(crate) fn get_string_array(
        &self,
        fill: impl FnOnce(&ApiTable, Ctx, *mut *mut *mut c_char, *mut i32),
    ) -> Result<Vec<String>> {
        let api = self.api();
        let mut ptr: *mut *mut c_char = std::ptr::null_mut();
        let mut cnt = [0i32; 4];
        fill(api, self.handle, &mut ptr, cnt.as_mut_ptr());
        let mut out = Vec::new();
        if !ptr.is_null() && cnt[0] > 0 {
            out.reserve(cnt[0] as usize);
            for i in 0..cnt[0] as usize {
                let elem = unsafe { *ptr.add(i) };
                out.push(unsafe { marshal::decode_string(elem) });
                unsafe { (api.dss_dispose_string)(self.handle, elem) };
            }
        }
        unsafe { (api.dss_dispose_ppansichar)(self.handle, &mut ptr) };
        self.check_error()?;
        Ok(out)
    }

    /// Pass a string argument to the engine.
    pub(crate) fn set_string(
        &self,
        value: &str,
        f: impl FnOnce(&ApiTable, Ctx, *const c_char),
    ) -> Result<()> {
        let value = CString::new(value)?;
        f(self.api(), self.handle, value.as_ptr());
        self.check_error()
    }

    /// Pass a float array argument to the engine.
    pub(crate) fn set_f64_array(
        &self,
        values: &[f64],
        f: impl FnOnce(&ApiTable, Ctx, *const f64, i32),
    ) -> Result<()> {
        f(self.api(), self.handle, values.as_ptr(), values.len() as i32);
        self.check_error()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let api = *self.api();
        for kind in crate::events::EventKind::ALL {
            unsafe {
                (api.dss_set_event_callback)(self.handle, kind.as_i32(), None, std::ptr::null_mut())
            };
        }
        unsafe { (api.ctx_dispose)(self.handle) };
        debug!(engine = self.engine.origin(), "disposed engine context");
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("engine", &self.engine.origin())
            .field("options", &self.options.get())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "stub-engine"))]
mod tests {
    use super::*;
    use crate::ffi::stub;

    fn ctx_with_circuit() -> Context {
        let ctx = Context::stub().unwrap();
        ctx.set_string("demo", |api, h, s| unsafe { (api.dss_new_circuit)(h, s) })
            .unwrap();
        ctx
    }

    #[test]
    fn global_result_path_matches_classic_path() {
        let ctx = ctx_with_circuit();
        let classic = ctx
            .get_f64(|api, h, p, c| unsafe { (api.bus_get_voltages)(h, p, c) })
            .unwrap()
            .into_vec();
        let gr = ctx
            .get_f64_gr(|api, h| unsafe { (api.bus_get_voltages_gr)(h) })
            .unwrap()
            .into_vec();
        assert_eq!(classic, gr);
        assert_eq!(classic, stub::fixture::BUS_VOLTAGES[0].to_vec());
    }

    #[test]
    fn error_cell_is_raised_and_cleared() {
        let ctx = Context::stub().unwrap();
        let err = ctx
            .set_string("definitely not a command", |api, h, s| unsafe {
                (api.text_set_command)(h, s)
            })
            .unwrap_err();
        assert_eq!(err.engine_number(), Some(stub::ERR_UNKNOWN_COMMAND));
        // Cell was cleared by the check.
        assert_eq!(ctx.error_number_raw(), 0);
        // Subsequent calls are unaffected.
        ctx.set_string("demo", |api, h, s| unsafe { (api.dss_new_circuit)(h, s) })
            .unwrap();
    }

    #[test]
    fn unchecked_mode_leaves_the_cell_for_manual_inspection() {
        let ctx = Context::stub().unwrap();
        ctx.set_check_errors(false);
        ctx.set_string("bogus", |api, h, s| unsafe { (api.text_set_command)(h, s) })
            .unwrap();
        assert_eq!(ctx.error_number_raw(), stub::ERR_UNKNOWN_COMMAND);
        let (number, message) = ctx.take_error().unwrap();
        assert_eq!(number, stub::ERR_UNKNOWN_COMMAND);
        assert!(message.contains("bogus"));
        assert_eq!(ctx.error_number_raw(), 0);
    }

    #[test]
    fn contexts_do_not_share_options_or_errors() {
        let a = Context::stub().unwrap();
        let b = Context::stub().unwrap();
        a.set_complex_arrays(true);
        a.set_check_errors(false);
        assert!(!b.options().complex_arrays);
        assert!(b.options().check_errors);

        a.set_string("bogus", |api, h, s| unsafe { (api.text_set_command)(h, s) })
            .unwrap();
        assert_eq!(a.error_number_raw(), stub::ERR_UNKNOWN_COMMAND);
        assert_eq!(b.error_number_raw(), 0);
    }

    #[test]
    fn every_decoded_string_is_disposed_exactly_once() {
        let ctx = ctx_with_circuit();
        ctx.get_string(|api, h| unsafe { (api.dss_get_version)(h) }).unwrap();
        ctx.get_string_array(|api, h, p, c| unsafe { (api.circuit_get_all_bus_names)(h, p, c) })
            .unwrap();
        ctx.get_string(|api, h| unsafe { (api.circuit_get_name)(h) }).unwrap();

        let stats = unsafe { stub::stats(ctx.as_raw()) };
        assert!(stats.strings_allocated > 0);
        assert_eq!(stats.strings_allocated, stats.strings_disposed);
        assert_eq!(stats.string_double_frees, 0);
        assert_eq!(stats.string_wild_frees, 0);
        assert_eq!(unsafe { stub::live_strings(ctx.as_raw()) }, 0);
        assert_eq!(stats.string_arrays_allocated, stats.string_arrays_disposed);
    }

    #[test]
    fn null_string_array_decodes_to_an_empty_list() {
        let ctx = Context::stub().unwrap();
        ctx.set_check_errors(false);
        // No circuit exists, so the engine returns a null spine with a
        // zero count.
        let names = ctx
            .get_string_array(|api, h, p, c| unsafe { (api.circuit_get_all_bus_names)(h, p, c) })
            .unwrap();
        assert!(names.is_empty());
        ctx.take_error();
    }

    #[test]
    fn float_buffers_are_disposed_after_copy() {
        let ctx = ctx_with_circuit();
        ctx.get_f64(|api, h, p, c| unsafe { (api.bus_get_voltages)(h, p, c) }).unwrap();
        ctx.get_f64(|api, h, p, c| unsafe { (api.circuit_get_total_power)(h, p, c) })
            .unwrap();
        let stats = unsafe { stub::stats(ctx.as_raw()) };
        assert!(stats.f64_allocated > 0);
        assert_eq!(stats.f64_allocated, stats.f64_disposed);
    }

    #[test]
    fn complex_option_flips_the_representation() {
        let ctx = ctx_with_circuit();
        let pairs = ctx
            .get_complex(|api, h, p, c| unsafe { (api.bus_get_voltages)(h, p, c) })
            .unwrap();
        assert!(matches!(pairs, ComplexArray::Pairs(_)));

        ctx.set_complex_arrays(true);
        let complex = ctx
            .get_complex(|api, h, p, c| unsafe { (api.bus_get_voltages)(h, p, c) })
            .unwrap();
        assert!(matches!(complex, ComplexArray::Complex(_)));
        // Same underlying bytes either way.
        assert_eq!(pairs.into_pairs(), complex.into_pairs());
    }
}
