// elaborate.rs — Drive the passes from graph to simulator
//
// analyze → allocate write ports → lower → construct the simulator.
// Diagnostics from every phase are aggregated; any error-level entry
// stops the pipeline and leaves `simulator` empty, while warnings ride
// along with a successful result.
//
// Preconditions: the graph came out of `GraphBuilder::build` clean of
//   error diagnostics (the caller checks `BuildResult`).
// Postconditions: on success the simulator is ready to `run`.
// Failure modes: analysis or lowering errors, unreadable initializer
//   files.
// Side effects: reads initializer files.

use crate::analyze::analyze;
use crate::config::SimConfig;
use crate::diag::{has_errors, Diagnostic};
use crate::ir::Graph;
use crate::lower::lower;
use crate::ports::allocate_write_ports;
use crate::runtime::Simulator;

#[derive(Debug)]
pub struct ElaborateResult {
    pub simulator: Option<Simulator>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ElaborateResult {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

pub fn elaborate(graph: &Graph, config: &SimConfig) -> ElaborateResult {
    let mut diagnostics = Vec::new();

    let analysis = {
        let mut r = analyze(graph);
        diagnostics.append(&mut r.diagnostics);
        if has_errors(&diagnostics) {
            return ElaborateResult {
                simulator: None,
                diagnostics,
            };
        }
        r.analysis
    };

    let ports = allocate_write_ports(graph);

    let program = {
        let mut r = lower(graph, &analysis, &ports);
        diagnostics.append(&mut r.diagnostics);
        if has_errors(&diagnostics) {
            return ElaborateResult {
                simulator: None,
                diagnostics,
            };
        }
        r.program
    };

    match Simulator::new(program, config.clone()) {
        Ok(simulator) => ElaborateResult {
            simulator: Some(simulator),
            diagnostics,
        },
        Err(d) => {
            diagnostics.push(d);
            ElaborateResult {
                simulator: None,
                diagnostics,
            }
        }
    }
}
