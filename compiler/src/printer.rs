// printer.rs — Deterministic text rendering of a graph
//
// One line per declaration or expression, arena order, two-space
// indents. Meant for debugging and snapshot tests; nothing parses this
// back.
//
// Preconditions: the graph came out of `GraphBuilder::build`.
// Postconditions: identical graphs render to identical text.
// Failure modes: none.
// Side effects: none.

use std::fmt::Write;

use crate::id::{BlockId, ExprId};
use crate::ir::{
    ArrayInit, BlockKind, BodyItem, Consumption, ExprKind, Graph, UnitKind,
};

pub fn print_graph(g: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "design {}", g.name);

    for a in &g.arrays {
        let init = match &a.init {
            ArrayInit::Zero => String::new(),
            ArrayInit::Words(ws) => format!(" init={} words", ws.len()),
            ArrayInit::HexFile(f) => format!(" init=hex:{}", f),
        };
        let _ = writeln!(out, "array {}: {}[{}]{}", a.name, a.elem, a.depth, init);
    }
    for m in &g.mems {
        let _ = writeln!(
            out,
            "memory {}: b{}[{}] latency={}",
            m.name, m.width, m.depth, m.latency
        );
    }

    for u in g.unit_ids() {
        let unit = g.unit(u);
        let kind = match &unit.kind {
            UnitKind::Sequential {
                self_triggering: true,
                ..
            } => "driver".to_string(),
            UnitKind::Sequential { consumption, .. } => match consumption {
                Consumption::Systolic => "sequential systolic".to_string(),
                Consumption::Backpressure => "sequential backpressure".to_string(),
            },
            UnitKind::Combinational => "combinational".to_string(),
        };
        let _ = writeln!(out, "unit {} ({})", unit.name, kind);
        for &p in unit.ports() {
            let decl = g.port(p);
            let _ = writeln!(out, "  port {}: {}", decl.name, decl.ty);
        }
        print_block(g, unit.body, 1, &mut out);
    }
    out
}

fn print_block(g: &Graph, b: BlockId, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    for item in &g.block(b).body {
        match item {
            BodyItem::Expr(e) => {
                let _ = writeln!(out, "{}{}", pad, render_expr(g, *e));
            }
            BodyItem::Block(inner) => {
                let head = match g.block(*inner).kind {
                    BlockKind::Guarded { cond } => format!("guard {} {{", r(cond)),
                    BlockKind::Cycled { cycle } => format!("at-cycle {} {{", cycle),
                    BlockKind::Root => "{{".to_string(),
                };
                let _ = writeln!(out, "{}{}", pad, head);
                print_block(g, *inner, depth + 1, out);
                let _ = writeln!(out, "{}}}", pad);
            }
        }
    }
}

fn r(e: ExprId) -> String {
    format!("%{}", e.0)
}

fn render_expr(g: &Graph, e: ExprId) -> String {
    let expr = g.expr(e);
    let lhs = format!("{} = ", r(e));
    match &expr.kind {
        ExprKind::IntImm { value } => format!("{}imm {} {}", lhs, expr.ty, value),
        ExprKind::Binary { op, lhs: a, rhs: b } => {
            format!("{}{} {}, {}", lhs, op, r(*a), r(*b))
        }
        ExprKind::Compare { op, lhs: a, rhs: b } => {
            format!("{}cmp.{} {}, {}", lhs, op, r(*a), r(*b))
        }
        ExprKind::Unary { op, x } => format!("{}{} {}", lhs, op, r(*x)),
        ExprKind::Select {
            cond,
            on_true,
            on_false,
        } => format!("{}select {}, {}, {}", lhs, r(*cond), r(*on_true), r(*on_false)),
        ExprKind::Slice { x, lo, hi } => format!("{}slice {}[{}:{}]", lhs, r(*x), hi, lo),
        ExprKind::Concat { msb, lsb } => format!("{}concat {}, {}", lhs, r(*msb), r(*lsb)),
        ExprKind::Cast { op, x } => format!("{}{} {} to {}", lhs, op, r(*x), expr.ty),
        ExprKind::Load { array, index } => {
            format!("{}load {}[{}]", lhs, g.array(*array).name, r(*index))
        }
        ExprKind::Store {
            array,
            index,
            value,
        } => format!("store {}[{}], {}", g.array(*array).name, r(*index), r(*value)),
        ExprKind::Pop { port } => format!("{}pop {}", lhs, g.port(*port).name),
        ExprKind::Peek { port } => format!("{}peek {}", lhs, g.port(*port).name),
        ExprKind::PortValid { port } => format!("{}valid {}", lhs, g.port(*port).name),
        ExprKind::Triggered { unit } => {
            format!("{}triggered {}", lhs, g.unit(*unit).name)
        }
        ExprKind::ValueValid { value } => format!("{}value-valid {}", lhs, r(*value)),
        ExprKind::Bind { callee, args } => {
            let args: Vec<String> = args
                .iter()
                .map(|(p, a)| format!("{}={}", g.port(*p).name, r(*a)))
                .collect();
            format!("{}bind {} ({})", lhs, g.unit(*callee).name, args.join(", "))
        }
        ExprKind::AsyncCall { bind } => format!("async-call {}", r(*bind)),
        ExprKind::WaitUntil { cond } => format!("wait-until {}", r(*cond)),
        ExprKind::Log { format: f, args } => {
            let args: Vec<String> = args.iter().map(|a| r(*a)).collect();
            format!("log \"{}\" [{}]", f, args.join(", "))
        }
        ExprKind::Finish => "finish".to_string(),
        ExprKind::MemReadReq { mem, addr } => {
            format!("{}mem-read {}[{}]", lhs, g.mem(*mem).name, r(*addr))
        }
        ExprKind::MemWriteReq { mem, addr, data } => format!(
            "{}mem-write {}[{}], {}",
            lhs,
            g.mem(*mem).name,
            r(*addr),
            r(*data)
        ),
        ExprKind::MemRespValid { mem } => {
            format!("{}mem-resp-valid {}", lhs, g.mem(*mem).name)
        }
        ExprKind::MemRespData { mem } => {
            format!("{}mem-resp-data {}", lhs, g.mem(*mem).name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::ir::BinOp;
    use crate::types::DataType;

    #[test]
    fn renders_units_in_arena_order() {
        let mut b = GraphBuilder::new("demo");
        let drv = b.driver("drv");
        let arr = b.array("cnt", DataType::UInt(8), 1);
        b.body(drv, |b| {
            let z = b.uimm(1, 0);
            let cur = b.load(arr, z);
            let one = b.uimm(8, 1);
            let next = b.binary(BinOp::Add, cur, one);
            b.store(arr, z, next);
        });
        let graph = b.build().into_graph().unwrap();
        let text = print_graph(&graph);
        assert!(text.starts_with("design demo\n"));
        assert!(text.contains("array cnt: u8[1]\n"));
        assert!(text.contains("unit drv (driver)\n"));
        assert!(text.contains("  %1 = load cnt[%0]\n"));
        assert!(text.contains("  %3 = add %1, %2\n"));
        assert!(text.contains("  store cnt[%0], %3\n"));
    }

    #[test]
    fn identical_graphs_render_identically() {
        let build = || {
            let mut b = GraphBuilder::new("twice");
            let drv = b.driver("drv");
            b.body(drv, |b| {
                let z = b.uimm(8, 0);
                b.log("{}", &[z]);
            });
            b.build().into_graph().unwrap()
        };
        assert_eq!(print_graph(&build()), print_graph(&build()));
    }
}
