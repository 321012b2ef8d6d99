// analyze.rs — Cross-unit dependency analysis
//
// Three results feed lowering: which values cross a unit boundary and
// need a shared slot, each unit's upstream set, and a deterministic
// topological order for the combinational units. A cycle among
// combinational units cannot be scheduled and is a build error.
//
// Preconditions: the graph came out of `GraphBuilder::build`.
// Postconditions: `downstream_order` contains every combinational unit
//   exactly once when no cycle was diagnosed.
// Failure modes: combinational cycles and never-activated units produce
//   `Diagnostic` entries.
// Side effects: none.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::diag::{codes, Diagnostic};
use crate::id::{ExprId, UnitId};
use crate::ir::{BlockKind, ExprKind, Graph, UnitKind};

#[derive(Debug)]
pub struct Analysis {
    /// Values read outside their producing unit, in creation order.
    pub exposed: Vec<ExprId>,
    /// Shared-slot index for each exposed value.
    pub slot_of: HashMap<ExprId, usize>,
    /// Per unit (indexed like the unit arena): units it reads values or
    /// triggered flags from.
    pub upstreams: Vec<BTreeSet<UnitId>>,
    /// Combinational units in dependency order.
    pub downstream_order: Vec<UnitId>,
}

#[derive(Debug)]
pub struct AnalysisResult {
    pub analysis: Analysis,
    pub diagnostics: Vec<Diagnostic>,
}

/// A value is externally used when some user sits in a different unit.
/// Binds are skipped: a bind only records arguments for a later call, so
/// it reads nothing until the call fires in the caller's own cycle.
fn externally_used(graph: &Graph, e: ExprId) -> bool {
    let home = graph.unit_of_expr(e);
    graph.users_of(e).iter().any(|&u| {
        !matches!(graph.expr(u).kind, ExprKind::Bind { .. }) && graph.unit_of_expr(u) != home
    })
}

pub fn analyze(graph: &Graph) -> AnalysisResult {
    let mut diagnostics = Vec::new();

    // ── Exposure slots ───────────────────────────────────────────────────
    let mut exposed = Vec::new();
    let mut slot_of = HashMap::new();
    for e in graph.expr_ids() {
        if graph.expr(e).is_valued() && externally_used(graph, e) {
            slot_of.insert(e, exposed.len());
            exposed.push(e);
        }
    }

    // ── Upstream sets ────────────────────────────────────────────────────
    let mut upstreams: Vec<BTreeSet<UnitId>> = vec![BTreeSet::new(); graph.units.len()];
    for e in graph.expr_ids() {
        let home = graph.unit_of_expr(e);
        if let ExprKind::Triggered { unit } = graph.expr(e).kind {
            if unit != home {
                upstreams[home.index()].insert(unit);
            }
        }
        if matches!(graph.expr(e).kind, ExprKind::Bind { .. }) {
            continue;
        }
        for op in graph.expr(e).value_operands() {
            let from = graph.unit_of_expr(op);
            if from != home {
                upstreams[home.index()].insert(from);
            }
        }
    }

    // ── Topological order of combinational units ─────────────────────────
    let comb: Vec<UnitId> = graph
        .unit_ids()
        .filter(|u| !graph.unit(*u).is_sequential())
        .collect();
    let mut indeg: HashMap<UnitId, usize> = comb.iter().map(|u| (*u, 0)).collect();
    let mut succs: HashMap<UnitId, Vec<UnitId>> =
        comb.iter().map(|u| (*u, Vec::new())).collect();
    for &d in &comb {
        for &up in &upstreams[d.index()] {
            if let Some(s) = succs.get_mut(&up) {
                s.push(d);
                *indeg.get_mut(&d).expect("seeded above") += 1;
            }
        }
    }
    let mut queue: VecDeque<UnitId> = comb.iter().filter(|u| indeg[u] == 0).copied().collect();
    let mut downstream_order = Vec::with_capacity(comb.len());
    while let Some(u) = queue.pop_front() {
        downstream_order.push(u);
        for &s in &succs[&u] {
            let d = indeg.get_mut(&s).expect("seeded above");
            *d -= 1;
            if *d == 0 {
                queue.push_back(s);
            }
        }
    }
    if downstream_order.len() != comb.len() {
        let mut stuck: Vec<String> = comb
            .iter()
            .filter(|u| !downstream_order.contains(u))
            .map(|u| graph.unit(*u).name.clone())
            .collect();
        stuck.sort();
        let mut d = Diagnostic::error("combinational units form a dependency cycle")
            .with_code(codes::COMB_CYCLE)
            .with_hint("break the cycle with a register array or a sequential unit");
        for name in stuck {
            d = d.with_context(name);
        }
        diagnostics.push(d);
    }

    // ── Activation reachability warnings ─────────────────────────────────
    let mut called: BTreeSet<UnitId> = BTreeSet::new();
    for e in graph.expr_ids() {
        if let ExprKind::AsyncCall { bind } = graph.expr(e).kind {
            if let ExprKind::Bind { callee, .. } = graph.expr(bind).kind {
                called.insert(callee);
            }
        }
    }
    let mut cycled: BTreeSet<UnitId> = BTreeSet::new();
    for b in &graph.blocks {
        if matches!(b.kind, BlockKind::Cycled { .. }) {
            cycled.insert(b.owner);
        }
    }
    for u in graph.unit_ids() {
        if let UnitKind::Sequential {
            self_triggering, ..
        } = graph.unit(u).kind
        {
            if !self_triggering && !called.contains(&u) && !cycled.contains(&u) {
                diagnostics.push(
                    Diagnostic::warning("sequential unit is never activated")
                        .with_code(codes::UNIT_NEVER_ACTIVATED)
                        .with_context(graph.unit(u).name.clone())
                        .with_hint("add an async call, a cycled block, or mark it a driver"),
                );
            }
        }
    }

    AnalysisResult {
        analysis: Analysis {
            exposed,
            slot_of,
            upstreams,
            downstream_order,
        },
        diagnostics,
    }
}
