// ports.rs — Static write-port allocation for register arrays
//
// Every (array, writer-unit) pair gets its own physical write port so the
// hardware backend never has to arbitrate between units. Indices are
// handed out in expression-creation order, giving the same assignment on
// every run. At commit time the highest-numbered port wins.
//
// Preconditions: the graph came out of `GraphBuilder::build`.
// Postconditions: every array that is written anywhere has a port for
//   each of its writer units; unwritten arrays still report one port.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;

use crate::id::{ArrayId, UnitId};
use crate::ir::{ExprKind, Graph};

#[derive(Debug)]
pub struct WritePortMap {
    assignments: HashMap<(ArrayId, UnitId), usize>,
    counts: HashMap<ArrayId, usize>,
}

impl WritePortMap {
    /// The port index assigned to a writer, if the unit writes the array.
    pub fn port_of(&self, array: ArrayId, unit: UnitId) -> Option<usize> {
        self.assignments.get(&(array, unit)).copied()
    }

    /// Number of write ports the array carries, minimum one.
    pub fn port_count(&self, array: ArrayId) -> usize {
        self.counts.get(&array).copied().unwrap_or(0).max(1)
    }
}

pub fn allocate_write_ports(graph: &Graph) -> WritePortMap {
    let mut assignments = HashMap::new();
    let mut counts: HashMap<ArrayId, usize> = HashMap::new();
    for e in graph.expr_ids() {
        if let ExprKind::Store { array, .. } = graph.expr(e).kind {
            let unit = graph.unit_of_expr(e);
            assignments.entry((array, unit)).or_insert_with(|| {
                let n = counts.entry(array).or_insert(0);
                let idx = *n;
                *n += 1;
                idx
            });
        }
    }
    WritePortMap {
        assignments,
        counts,
    }
}
