//! Integration tests walking the object model against the stub engine.

mod common;

use approx::assert_relative_eq;
use dss_rs::ffi::stub::{self, fixture};
use dss_rs::{ComplexArray, Error, SolveMode};
use num_complex::Complex64;

#[test]
fn version_reports_the_engine_string() {
    let dss = common::stub_dss();
    assert_eq!(dss.version().unwrap(), fixture::VERSION);
}

#[test]
fn new_circuit_exposes_the_feeder() -> anyhow::Result<()> {
    let (dss, circuit) = common::dss_with_circuit();
    assert_eq!(circuit.name()?, "demo");
    assert_eq!(dss.num_circuits()?, 1);
    assert_eq!(circuit.num_buses()?, fixture::BUS_NAMES.len() as i32);
    assert_eq!(circuit.num_nodes()?, fixture::TOTAL_NODES);
    assert_eq!(circuit.all_bus_names()?, fixture::BUS_NAMES);
    Ok(())
}

#[test]
fn circuit_calls_without_a_circuit_fail_with_the_engine_code() {
    let dss = common::stub_dss();
    let err = dss.circuit().num_buses().unwrap_err();
    assert_eq!(err.engine_number(), Some(stub::ERR_NO_CIRCUIT));
}

#[test]
fn bus_properties_match_the_fixture() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let bus = circuit.bus("bus1")?;
    assert_eq!(bus.name()?, "bus1");
    assert_eq!(bus.num_nodes()?, 3);
    assert_eq!(bus.nodes()?, fixture::BUS_NODES[1]);
    assert_relative_eq!(bus.kv_base()?, fixture::BUS_KV_BASE[1]);
    Ok(())
}

#[test]
fn bus_voltages_follow_the_complex_toggle() -> anyhow::Result<()> {
    let (dss, circuit) = common::dss_with_circuit();
    let bus = circuit.bus("bus1")?;

    let pairs = bus.voltages()?;
    assert!(matches!(pairs, ComplexArray::Pairs(_)));
    assert_eq!(pairs.clone().into_pairs(), fixture::BUS_VOLTAGES[1]);

    dss.context().set_complex_arrays(true);
    let complex = bus.voltages()?;
    let expected: Vec<Complex64> = fixture::BUS_VOLTAGES[1]
        .chunks_exact(2)
        .map(|p| Complex64::new(p[0], p[1]))
        .collect();
    assert_eq!(complex.into_complex()?, expected);
    Ok(())
}

#[test]
fn vmag_angle_is_consistent_with_the_voltage_pairs() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let bus = circuit.bus("sourcebus")?;
    let polar = bus.vmag_angle()?;
    let pairs = fixture::BUS_VOLTAGES[0];
    assert_eq!(polar.len(), pairs.len());
    for (p, m) in pairs.chunks_exact(2).zip(polar.chunks_exact(2)) {
        assert_relative_eq!(m[0], p[0].hypot(p[1]), max_relative = 1e-12);
        assert_relative_eq!(m[1], p[1].atan2(p[0]).to_degrees(), max_relative = 1e-12);
    }
    Ok(())
}

#[test]
fn per_unit_magnitudes_cover_every_node() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let pu = circuit.all_bus_vmag_pu()?;
    assert_eq!(pu.len(), fixture::TOTAL_NODES as usize);
    let mut expected = Vec::new();
    for (b, pairs) in fixture::BUS_VOLTAGES.iter().enumerate() {
        let base = fixture::BUS_KV_BASE[b] * 1000.0;
        for p in pairs.chunks_exact(2) {
            expected.push(p[0].hypot(p[1]) / base);
        }
    }
    for (got, want) in pu.iter().zip(&expected) {
        assert_relative_eq!(*got, *want, max_relative = 1e-12);
    }
    Ok(())
}

#[test]
fn total_power_is_one_complex_pair() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let power = circuit.total_power()?;
    assert_eq!(power.len(), 1);
    assert_eq!(power.into_pairs(), fixture::TOTAL_POWER);
    Ok(())
}

#[test]
fn unknown_bus_surfaces_the_engine_error() {
    let (_dss, circuit) = common::dss_with_circuit();
    let err = circuit.bus("nowhere").unwrap_err();
    assert_eq!(err.engine_number(), Some(stub::ERR_BAD_BUS));
}

#[test]
fn loads_iterate_in_element_order() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let loads = circuit.loads();
    assert_eq!(loads.count()?, fixture::LOAD_NAMES.len() as i32);
    assert_eq!(loads.all_names()?, fixture::LOAD_NAMES);

    let mut names = Vec::new();
    let mut kws = Vec::new();
    for idx in loads.iter() {
        let idx = idx?;
        assert_eq!(loads.idx()?, idx);
        names.push(loads.name()?);
        kws.push(loads.kw()?);
    }
    assert_eq!(names, fixture::LOAD_NAMES);
    assert_eq!(kws, fixture::LOAD_KW);
    Ok(())
}

#[test]
fn load_setpoints_round_trip() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let loads = circuit.loads();
    loads.set_idx(2)?;
    loads.set_kw(88.25)?;
    loads.set_kvar(12.5)?;
    assert_eq!(loads.kw()?, 88.25);
    assert_eq!(loads.kvar()?, 12.5);
    // The other element is untouched.
    loads.set_idx(1)?;
    assert_eq!(loads.kw()?, fixture::LOAD_KW[0]);
    Ok(())
}

#[test]
fn load_property_without_active_element_fails() {
    let (_dss, circuit) = common::dss_with_circuit();
    // No First/Next/set_idx has run yet.
    let err = circuit.loads().kw().unwrap_err();
    assert_eq!(err.engine_number(), Some(stub::ERR_NO_ACTIVE_ELEMENT));
}

#[test]
fn line_rmatrix_is_a_column_major_square_matrix() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let lines = circuit.lines();
    assert_eq!(lines.first()?, 1);
    assert_eq!(lines.name()?, "line1");
    assert_eq!(lines.phases()?, 3);
    assert_eq!(lines.bus1()?, fixture::LINE_BUS1[0]);
    assert_eq!(lines.bus2()?, fixture::LINE_BUS2[0]);
    assert_relative_eq!(lines.length()?, fixture::LINE_LENGTH_KM[0]);

    let r = lines.rmatrix()?;
    assert_eq!(r.dim(), (3, 3));
    // Column-major flattening reproduces the native buffer.
    let mut flat = Vec::new();
    for col in r.columns() {
        flat.extend(col.iter().copied());
    }
    assert_eq!(flat, fixture::LINE1_RMATRIX);
    Ok(())
}

#[test]
fn line_rmatrix_round_trips_through_set() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let lines = circuit.lines();
    lines.set_idx(2)?;
    assert_eq!(lines.phases()?, 1);
    let replacement = ndarray::arr2(&[[0.41]]);
    lines.set_rmatrix(&replacement)?;
    assert_eq!(lines.rmatrix()?, replacement);
    Ok(())
}

#[test]
fn wrongly_sized_rmatrix_is_rejected_by_the_engine() {
    let (_dss, circuit) = common::dss_with_circuit();
    let lines = circuit.lines();
    lines.first().unwrap();
    // line1 has three phases; a 2x2 matrix is inconsistent.
    let bad = ndarray::arr2(&[[1.0, 2.0], [3.0, 4.0]]);
    let err = lines.set_rmatrix(&bad).unwrap_err();
    assert_eq!(err.engine_number(), Some(stub::ERR_BAD_VALUE));
}

#[test]
fn text_commands_execute_and_report_results() -> anyhow::Result<()> {
    let dss = common::stub_dss();
    let text = dss.text();
    text.command("new circuit.cmdline")?;
    assert_eq!(dss.circuit().name()?, "cmdline");

    text.command("version")?;
    assert_eq!(text.result()?, fixture::VERSION);

    let err = text.command("frobnicate everything").unwrap_err();
    assert_eq!(err.engine_number(), Some(stub::ERR_UNKNOWN_COMMAND));
    match err {
        Error::Engine { message, .. } => assert!(message.contains("frobnicate")),
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn solve_updates_solution_state() -> anyhow::Result<()> {
    let (_dss, circuit) = common::dss_with_circuit();
    let solution = circuit.solution();
    assert!(!solution.converged()?);

    solution.solve()?;
    assert!(solution.converged()?);
    assert_eq!(solution.iterations()?, fixture::SOLVE_ITERATIONS);

    assert_eq!(solution.mode()?, SolveMode::Snapshot);
    solution.set_mode(SolveMode::Daily)?;
    assert_eq!(solution.mode()?, SolveMode::Daily);

    solution.set_tolerance(1e-6)?;
    assert_eq!(solution.tolerance()?, 1e-6);
    solution.set_load_mult(1.2)?;
    assert_eq!(solution.load_mult()?, 1.2);
    Ok(())
}

#[test]
fn parallel_interface_relays_actor_queries() -> anyhow::Result<()> {
    let dss = common::stub_dss();
    let parallel = dss.parallel();
    assert_eq!(parallel.num_cpus()?, fixture::NUM_CPUS);
    assert_eq!(parallel.active_actor()?, 1);
    assert_eq!(parallel.actor_status()?, vec![1]);

    assert_eq!(parallel.create_actor()?, 2);
    assert_eq!(parallel.active_actor()?, 2);
    assert_eq!(parallel.actor_status()?.len(), 2);

    let err = parallel.set_active_actor(9).unwrap_err();
    assert_eq!(err.engine_number(), Some(stub::ERR_BAD_INDEX));
    Ok(())
}

#[test]
fn clear_all_discards_the_circuit() -> anyhow::Result<()> {
    let (dss, circuit) = common::dss_with_circuit();
    dss.clear_all()?;
    assert_eq!(dss.num_circuits()?, 0);
    assert!(circuit.num_buses().is_err());
    Ok(())
}
