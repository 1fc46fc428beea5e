//! Typed control-event callbacks.
//!
//! The engine raises three kinds of control events while solving. Each
//! kind has one callback slot per context; registration passes a single
//! `extern "C"` trampoline to the engine together with the slot address,
//! and the trampoline relays dispatch to whatever Rust closure is
//! currently installed. Handlers are plain `FnMut(i32)` taking the solver
//! step number.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::error;

/// Control events raised by the engine during a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Control initialization, before the first iteration.
    InitControls,
    /// A solver step completed.
    StepControls,
    /// Control actions are being checked after a step.
    CheckControls,
}

impl EventKind {
    /// All kinds, in native id order.
    pub const ALL: [EventKind; 3] =
        [EventKind::InitControls, EventKind::StepControls, EventKind::CheckControls];

    /// Native event id.
    pub(crate) fn as_i32(self) -> i32 {
        match self {
            EventKind::InitControls => 0,
            EventKind::StepControls => 1,
            EventKind::CheckControls => 2,
        }
    }

    fn index(self) -> usize {
        self.as_i32() as usize
    }
}

pub(crate) type Handler = Box<dyn FnMut(i32)>;

/// One callback slot. Boxed by [`EventSlots`] so its address stays stable
/// for the lifetime of the context; the engine holds that address as the
/// trampoline's user pointer.
pub(crate) struct Slot {
    handler: Mutex<Option<Handler>>,
}

/// Per-context callback slots, one per [`EventKind`].
pub(crate) struct EventSlots {
    slots: [Box<Slot>; 3],
}

impl EventSlots {
    pub(crate) fn new() -> Self {
        EventSlots {
            slots: [
                Box::new(Slot { handler: Mutex::new(None) }),
                Box::new(Slot { handler: Mutex::new(None) }),
                Box::new(Slot { handler: Mutex::new(None) }),
            ],
        }
    }

    pub(crate) fn set(&self, kind: EventKind, handler: Handler) {
        *self.slots[kind.index()].handler.lock() = Some(handler);
    }

    pub(crate) fn clear(&self, kind: EventKind) {
        *self.slots[kind.index()].handler.lock() = None;
    }

    /// Stable address handed to the engine as the callback user pointer.
    pub(crate) fn user_ptr(&self, kind: EventKind) -> *mut c_void {
        &*self.slots[kind.index()] as *const Slot as *mut c_void
    }
}

/// Relays engine dispatch to the installed handler. Panics are contained
/// here; an unwinding handler must never cross back into the engine.
///
/// Re-registering a handler for the same kind from inside its own handler
/// deadlocks on the slot lock.
pub(crate) unsafe extern "C" fn trampoline(user: *mut c_void, step: i32) {
    let slot = &*(user as *const Slot);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        if let Some(handler) = slot.handler.lock().as_mut() {
            handler(step);
        }
    }));
    if outcome.is_err() {
        error!(step, "event handler panicked; panic contained at the native boundary");
    }
}
