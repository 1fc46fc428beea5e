//! Shared fixtures for integration tests against the stub engine.

use dss_rs::{Circuit, Dss};

/// Fresh stub-backed context with default options.
pub fn stub_dss() -> Dss {
    Dss::stub().expect("stub engine context")
}

/// Stub-backed context with the demo circuit already created.
pub fn dss_with_circuit() -> (Dss, Circuit) {
    let dss = stub_dss();
    let circuit = dss.new_circuit("demo").expect("create circuit");
    (dss, circuit)
}
