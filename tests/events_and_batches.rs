//! Integration tests for control events, batches and manual error
//! inspection.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dss_rs::ffi::stub::{self, fixture};
use dss_rs::{Error, EventKind};

#[test]
fn event_handlers_fire_per_kind_during_solve() -> anyhow::Result<()> {
    let (dss, circuit) = common::dss_with_circuit();

    let init = Rc::new(Cell::new(0));
    let step = Rc::new(Cell::new(0));
    let check = Rc::new(Cell::new(0));
    {
        let init = init.clone();
        dss.on_event(EventKind::InitControls, move |_| init.set(init.get() + 1))?;
        let step = step.clone();
        dss.on_event(EventKind::StepControls, move |_| step.set(step.get() + 1))?;
        let check = check.clone();
        dss.on_event(EventKind::CheckControls, move |_| check.set(check.get() + 1))?;
    }

    circuit.solution().solve()?;
    assert_eq!(init.get(), 1);
    assert_eq!(step.get(), fixture::SOLVE_ITERATIONS);
    assert_eq!(check.get(), fixture::SOLVE_ITERATIONS);

    // Removing one kind leaves the others registered.
    dss.off_event(EventKind::StepControls)?;
    circuit.solution().solve()?;
    assert_eq!(init.get(), 2);
    assert_eq!(step.get(), fixture::SOLVE_ITERATIONS);
    assert_eq!(check.get(), 2 * fixture::SOLVE_ITERATIONS);
    Ok(())
}

#[test]
fn step_handler_receives_solver_step_numbers() -> anyhow::Result<()> {
    let (dss, circuit) = common::dss_with_circuit();
    let steps = Rc::new(RefCell::new(Vec::new()));
    {
        let steps = steps.clone();
        dss.on_event(EventKind::StepControls, move |step| steps.borrow_mut().push(step))?;
    }
    circuit.solution().solve()?;
    let expected: Vec<i32> = (1..=fixture::SOLVE_ITERATIONS).collect();
    assert_eq!(*steps.borrow(), expected);
    Ok(())
}

#[test]
fn unregistered_kinds_stay_silent() -> anyhow::Result<()> {
    let (dss, circuit) = common::dss_with_circuit();
    let init = Rc::new(Cell::new(0));
    {
        let init = init.clone();
        dss.on_event(EventKind::InitControls, move |_| init.set(init.get() + 1))?;
    }
    circuit.solution().solve()?;
    assert_eq!(init.get(), 1);
    // Step/check were never registered; only init fired.
    Ok(())
}

#[test]
fn batch_reads_every_grouped_element() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let batch = circuit.loads().batch_all()?;
    assert_eq!(batch.len(), fixture::LOAD_NAMES.len());
    assert_eq!(batch.names()?, fixture::LOAD_NAMES);
    assert_eq!(batch.kw()?, fixture::LOAD_KW);
    assert_eq!(batch.kvar()?, fixture::LOAD_KVAR);
    Ok(())
}

#[test]
fn batch_writes_per_element_and_uniform_values() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let loads = circuit.loads();
    let batch = loads.batch_all()?;

    batch.set_kw(&[10.0, 20.0])?;
    assert_eq!(batch.kw()?, [10.0, 20.0]);

    batch.fill_kvar(5.5)?;
    assert_eq!(batch.kvar()?, [5.5, 5.5]);

    // Element-wise writes are visible through the plain collection too.
    loads.set_idx(1)?;
    assert_eq!(loads.kw()?, 10.0);
    Ok(())
}

#[test]
fn batch_write_length_must_match() {
    let (_dss, circuit) = common::dss_with_circuit();
    let batch = circuit.loads().batch(vec![1, 2]);
    let err = batch.set_kw(&[1.0]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { expected: 2, got: 1 }));
}

#[test]
fn subset_batch_only_touches_its_members() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let loads = circuit.loads();
    let batch = loads.batch(vec![2]);
    batch.fill_kw(99.0)?;

    loads.set_idx(1)?;
    assert_eq!(loads.kw()?, fixture::LOAD_KW[0]);
    loads.set_idx(2)?;
    assert_eq!(loads.kw()?, 99.0);
    Ok(())
}

#[test]
fn manual_error_inspection_with_checking_disabled() -> anyhow::Result<()> {
    let dss = common::stub_dss();
    dss.context().set_check_errors(false);

    // The failed command does not surface as Err...
    dss.text().command("not a command at all")?;

    // ...but the error interface sees it. Description first: reading the
    // number resets the cell.
    let error = dss.error();
    assert!(error.description().contains("not a command"));
    assert_eq!(error.number(), stub::ERR_UNKNOWN_COMMAND);
    assert_eq!(error.number(), 0);
    Ok(())
}

#[test]
fn error_check_helper_clears_and_reports() {
    let dss = common::stub_dss();
    dss.context().set_check_errors(false);
    dss.text().command("bogus").unwrap();

    let err = dss.error().check().unwrap_err();
    assert_eq!(err.engine_number(), Some(stub::ERR_UNKNOWN_COMMAND));
    assert!(dss.error().check().is_ok());
}

#[test]
fn contexts_are_fully_isolated() -> anyhow::Result<()> {
    let a = common::stub_dss();
    let b = common::stub_dss();

    a.context().set_check_errors(false);
    a.text().command("broken")?;

    // Context B sees neither A's error state nor A's circuit.
    assert_eq!(b.error().number(), 0);
    b.new_circuit("only-in-b")?;
    assert_eq!(b.num_circuits()?, 1);
    assert_eq!(a.num_circuits()?, 0);
    Ok(())
}

#[test]
fn native_buffers_are_freed_across_a_full_walk() -> anyhow::Result<()> {
    let (dss, circuit) = common::dss_with_circuit();
    dss.version()?;
    circuit.all_bus_names()?;
    circuit.all_bus_vmag_pu()?;
    circuit.bus("bus2")?.voltages()?;
    circuit.loads().all_names()?;
    let lines = circuit.lines();
    lines.first()?;
    lines.rmatrix()?;

    let stats = unsafe { stub::stats(dss.context().as_raw()) };
    assert_eq!(stats.f64_allocated, stats.f64_disposed);
    assert_eq!(stats.i32_allocated, stats.i32_disposed);
    assert_eq!(stats.strings_allocated, stats.strings_disposed);
    assert_eq!(stats.string_double_frees, 0);
    assert_eq!(stats.string_wild_frees, 0);
    assert_eq!(unsafe { stub::live_strings(dss.context().as_raw()) }, 0);
    Ok(())
}
