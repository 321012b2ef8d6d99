// builder.rs — Explicit graph-construction context
//
// The builder is the only way to make a `Graph`. It owns the arenas while
// the design is being described, tracks the insertion point as a stack of
// open blocks, and validates as it goes; violations become diagnostics
// rather than panics, and `finish` hands back the graph together with
// everything collected.
//
// Preconditions: ids passed in were allocated by this builder.
// Postconditions: the users-of table covers every data operand.
// Failure modes: expression constructors called with no open unit body
//   panic (API misuse, not a design error).
// Side effects: none outside the builder.

use crate::diag::{codes, Diagnostic};
use crate::id::{ArrayId, BlockId, ExprId, MemId, PortId, UnitId};
use crate::ir::{
    ArrayDecl, ArrayInit, BinOp, Block, BlockKind, BodyItem, CastOp, CmpOp, Consumption, Expr,
    ExprKind, Graph, MemDecl, PortDecl, UnOp, Unit, UnitKind,
};
use crate::types::DataType;

const DEFAULT_CREDIT_WIDTH: u16 = 8;

/// Output of graph construction: the graph plus everything the builder
/// diagnosed along the way. Elaboration refuses graphs with errors.
#[derive(Debug)]
pub struct BuildResult {
    pub graph: Graph,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildResult {
    pub fn into_graph(self) -> Result<Graph, Vec<Diagnostic>> {
        if crate::diag::has_errors(&self.diagnostics) {
            Err(self.diagnostics)
        } else {
            Ok(self.graph)
        }
    }
}

#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    diagnostics: Vec<Diagnostic>,
    /// Open blocks, innermost last. Empty between unit bodies.
    insert: Vec<BlockId>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graph: Graph {
                name: name.into(),
                units: Vec::new(),
                ports: Vec::new(),
                arrays: Vec::new(),
                mems: Vec::new(),
                blocks: Vec::new(),
                exprs: Vec::new(),
                users: Vec::new(),
            },
            diagnostics: Vec::new(),
            insert: Vec::new(),
        }
    }

    // ── Units, ports, state ──────────────────────────────────────────────

    fn add_unit(&mut self, name: impl Into<String>, kind: UnitKind) -> UnitId {
        let id = UnitId(self.graph.units.len() as u32);
        let body = BlockId(self.graph.blocks.len() as u32);
        self.graph.blocks.push(Block {
            kind: BlockKind::Root,
            owner: id,
            body: Vec::new(),
        });
        self.graph.units.push(Unit {
            name: name.into(),
            kind,
            body,
        });
        id
    }

    /// A sequential unit with the given port-consumption discipline.
    pub fn unit(&mut self, name: impl Into<String>, consumption: Consumption) -> UnitId {
        self.add_unit(
            name,
            UnitKind::Sequential {
                ports: Vec::new(),
                credit_width: DEFAULT_CREDIT_WIDTH,
                consumption,
                self_triggering: false,
            },
        )
    }

    /// A self-triggering sequential unit: one seeded activation per cycle.
    pub fn driver(&mut self, name: impl Into<String>) -> UnitId {
        self.add_unit(
            name,
            UnitKind::Sequential {
                ports: Vec::new(),
                credit_width: DEFAULT_CREDIT_WIDTH,
                consumption: Consumption::Systolic,
                self_triggering: true,
            },
        )
    }

    /// A combinational unit, activated when any upstream unit triggers.
    pub fn downstream(&mut self, name: impl Into<String>) -> UnitId {
        self.add_unit(name, UnitKind::Combinational)
    }

    pub fn set_credit_width(&mut self, unit: UnitId, width: u16) {
        match &mut self.graph.units[unit.index()].kind {
            UnitKind::Sequential { credit_width, .. } => *credit_width = width,
            UnitKind::Combinational => {
                let name = self.graph.unit(unit).name.clone();
                self.diagnostics.push(
                    Diagnostic::error("combinational unit has no credit counter")
                        .with_context(name),
                );
            }
        }
    }

    pub fn port(&mut self, unit: UnitId, name: impl Into<String>, ty: DataType) -> PortId {
        let name = name.into();
        self.check_width(ty.bits(), &name);
        let id = PortId(self.graph.ports.len() as u32);
        self.graph.ports.push(PortDecl {
            name: name.clone(),
            owner: unit,
            ty,
        });
        match &mut self.graph.units[unit.index()].kind {
            UnitKind::Sequential { ports, .. } => ports.push(id),
            UnitKind::Combinational => {
                let uname = self.graph.unit(unit).name.clone();
                self.diagnostics.push(
                    Diagnostic::error(format!("port '{}' on combinational unit", name))
                        .with_context(uname),
                );
            }
        }
        id
    }

    pub fn array(&mut self, name: impl Into<String>, elem: DataType, depth: usize) -> ArrayId {
        self.array_with_init(name, elem, depth, ArrayInit::Zero)
    }

    pub fn array_init(
        &mut self,
        name: impl Into<String>,
        elem: DataType,
        words: Vec<u64>,
    ) -> ArrayId {
        let depth = words.len();
        self.array_with_init(name, elem, depth, ArrayInit::Words(words))
    }

    pub fn array_from_hex(
        &mut self,
        name: impl Into<String>,
        elem: DataType,
        depth: usize,
        file: impl Into<String>,
    ) -> ArrayId {
        self.array_with_init(name, elem, depth, ArrayInit::HexFile(file.into()))
    }

    fn array_with_init(
        &mut self,
        name: impl Into<String>,
        elem: DataType,
        depth: usize,
        init: ArrayInit,
    ) -> ArrayId {
        let name = name.into();
        self.check_width(elem.bits(), &name);
        let id = ArrayId(self.graph.arrays.len() as u32);
        self.graph.arrays.push(ArrayDecl {
            name,
            elem,
            depth,
            init,
        });
        id
    }

    pub fn memory(
        &mut self,
        name: impl Into<String>,
        width: u16,
        depth: usize,
        latency: usize,
    ) -> MemId {
        self.memory_with_init(name, width, depth, latency, ArrayInit::Zero)
    }

    pub fn memory_with_init(
        &mut self,
        name: impl Into<String>,
        width: u16,
        depth: usize,
        latency: usize,
        init: ArrayInit,
    ) -> MemId {
        let name = name.into();
        self.check_width(width, &name);
        let id = MemId(self.graph.mems.len() as u32);
        self.graph.mems.push(MemDecl {
            name,
            width,
            depth,
            latency,
            init,
        });
        id
    }

    // ── Insertion points ─────────────────────────────────────────────────

    /// Open a unit's root body for construction.
    pub fn enter(&mut self, unit: UnitId) {
        assert!(
            self.insert.is_empty(),
            "enter() with a unit body already open"
        );
        self.insert.push(self.graph.unit(unit).body);
    }

    /// Close the innermost open block.
    pub fn exit(&mut self) {
        self.insert.pop().expect("exit() with no open block");
    }

    /// Describe a unit's body within a closure.
    pub fn body(&mut self, unit: UnitId, f: impl FnOnce(&mut Self)) {
        self.enter(unit);
        f(self);
        self.exit();
    }

    fn open_block(&mut self, kind: BlockKind) -> BlockId {
        let parent = self.cur_block();
        let owner = self.graph.block(parent).owner;
        let id = BlockId(self.graph.blocks.len() as u32);
        self.graph.blocks.push(Block {
            kind,
            owner,
            body: Vec::new(),
        });
        self.graph.blocks[parent.index()]
            .body
            .push(BodyItem::Block(id));
        self.insert.push(id);
        id
    }

    /// A block guarded by a 1-bit condition.
    pub fn guarded(&mut self, cond: ExprId, f: impl FnOnce(&mut Self)) {
        self.open_block(BlockKind::Guarded { cond });
        f(self);
        self.exit();
    }

    /// A block that runs only on the named cycle, which also seeds an
    /// activation for the enclosing unit at that cycle.
    pub fn at_cycle(&mut self, cycle: usize, f: impl FnOnce(&mut Self)) {
        self.open_block(BlockKind::Cycled { cycle });
        f(self);
        self.exit();
    }

    fn cur_block(&self) -> BlockId {
        *self
            .insert
            .last()
            .expect("expression constructed with no open unit body")
    }

    fn current_unit(&self) -> UnitId {
        self.graph.block(self.cur_block()).owner
    }

    // ── Expression constructors ──────────────────────────────────────────

    fn add_expr(&mut self, kind: ExprKind, ty: DataType) -> ExprId {
        let parent = self.cur_block();
        let id = ExprId(self.graph.exprs.len() as u32);
        let expr = Expr { kind, ty, parent };
        for op in expr.value_operands() {
            self.graph.users[op.index()].push(id);
        }
        self.graph.exprs.push(expr);
        self.graph.users.push(Vec::new());
        self.graph.blocks[parent.index()]
            .body
            .push(BodyItem::Expr(id));
        id
    }

    fn check_width(&mut self, bits: u16, what: &str) {
        if bits == 0 || bits > 64 {
            self.diagnostics.push(
                Diagnostic::error(format!("width {} is outside the supported 1..=64", bits))
                    .with_code(codes::WIDTH_UNSUPPORTED)
                    .with_context(what.to_string()),
            );
        }
    }

    pub fn imm(&mut self, ty: DataType, value: u64) -> ExprId {
        self.check_width(ty.bits(), "immediate");
        self.add_expr(ExprKind::IntImm { value }, ty)
    }

    /// Shorthand for an unsigned immediate.
    pub fn uimm(&mut self, width: u16, value: u64) -> ExprId {
        self.imm(DataType::UInt(width), value)
    }

    /// Result keeps the lhs interpretation at the wider of the two widths.
    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let lt = self.graph.expr(lhs).ty.clone();
        let w = lt.bits().max(self.graph.expr(rhs).ty.bits());
        let ty = match lt {
            DataType::Int(_) => DataType::Int(w),
            DataType::UInt(_) => DataType::UInt(w),
            _ => DataType::Bits(w),
        };
        self.add_expr(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn compare(&mut self, op: CmpOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add_expr(ExprKind::Compare { op, lhs, rhs }, DataType::Bits(1))
    }

    pub fn unary(&mut self, op: UnOp, x: ExprId) -> ExprId {
        let ty = self.graph.expr(x).ty.clone();
        self.add_expr(ExprKind::Unary { op, x }, ty)
    }

    pub fn select(&mut self, cond: ExprId, on_true: ExprId, on_false: ExprId) -> ExprId {
        let ty = self.graph.expr(on_true).ty.clone();
        self.add_expr(
            ExprKind::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
        )
    }

    pub fn slice(&mut self, x: ExprId, lo: u16, hi: u16) -> ExprId {
        let xw = self.graph.expr(x).ty.bits();
        if lo > hi || hi >= xw {
            self.diagnostics.push(
                Diagnostic::error(format!("slice {}..={} out of range for width {}", lo, hi, xw))
                    .with_code(codes::WIDTH_UNSUPPORTED)
                    .with_context(self.graph.expr_label(x)),
            );
        }
        let w = hi.saturating_sub(lo) + 1;
        self.add_expr(ExprKind::Slice { x, lo, hi }, DataType::Bits(w))
    }

    pub fn concat(&mut self, msb: ExprId, lsb: ExprId) -> ExprId {
        let w = self.graph.expr(msb).ty.bits() + self.graph.expr(lsb).ty.bits();
        self.check_width(w, "concat");
        self.add_expr(ExprKind::Concat { msb, lsb }, DataType::Bits(w))
    }

    pub fn cast(&mut self, op: CastOp, x: ExprId, ty: DataType) -> ExprId {
        self.check_width(ty.bits(), "cast");
        self.add_expr(ExprKind::Cast { op, x }, ty)
    }

    pub fn load(&mut self, array: ArrayId, index: ExprId) -> ExprId {
        let ty = self.graph.array(array).elem.clone();
        self.add_expr(ExprKind::Load { array, index }, ty)
    }

    pub fn store(&mut self, array: ArrayId, index: ExprId, value: ExprId) -> ExprId {
        let elem = self.graph.array(array).elem.clone();
        let vty = self.graph.expr(value).ty.clone();
        if !elem.accepts(&vty) {
            let name = self.graph.array(array).name.clone();
            self.diagnostics.push(
                Diagnostic::error(format!(
                    "cannot write {} ({} bits) into array of {} ({} bits)",
                    vty,
                    vty.bits(),
                    elem,
                    elem.bits()
                ))
                .with_code(codes::ARRAY_WRITE_TYPE)
                .with_context(name),
            );
        }
        self.add_expr(
            ExprKind::Store {
                array,
                index,
                value,
            },
            DataType::Bits(1),
        )
    }

    fn check_port_owner(&mut self, port: PortId, what: &str) {
        let owner = self.graph.port(port).owner;
        if owner != self.current_unit() {
            let pname = self.graph.port(port).name.clone();
            let here = self.graph.unit(self.current_unit()).name.clone();
            self.diagnostics.push(
                Diagnostic::error(format!(
                    "{} of port '{}' outside its owning unit",
                    what, pname
                ))
                .with_code(codes::FOREIGN_PORT_OP)
                .with_context(here),
            );
        }
    }

    /// Pop the port's head value. Stalls the cycle if the port is empty.
    pub fn pop(&mut self, port: PortId) -> ExprId {
        self.check_port_owner(port, "pop");
        let ty = self.graph.port(port).ty.clone();
        self.add_expr(ExprKind::Pop { port }, ty)
    }

    pub fn peek(&mut self, port: PortId) -> ExprId {
        self.check_port_owner(port, "peek");
        let ty = self.graph.port(port).ty.clone();
        self.add_expr(ExprKind::Peek { port }, ty)
    }

    pub fn port_valid(&mut self, port: PortId) -> ExprId {
        self.check_port_owner(port, "valid probe");
        self.add_expr(ExprKind::PortValid { port }, DataType::Bits(1))
    }

    /// Probe another unit's triggered flag. Combinational readers only:
    /// sequential units execute while the flags are still being set, so a
    /// sequential reader's answer would depend on execution order.
    pub fn triggered(&mut self, unit: UnitId) -> ExprId {
        let here = self.current_unit();
        if self.graph.unit(here).is_sequential() {
            let name = self.graph.unit(here).name.clone();
            self.diagnostics.push(
                Diagnostic::error("triggered probe in a sequential unit")
                    .with_code(codes::SEQ_TRIGGER_PROBE)
                    .with_hint("move the probe into a combinational unit")
                    .with_context(name),
            );
        }
        self.add_expr(ExprKind::Triggered { unit }, DataType::Bits(1))
    }

    pub fn value_valid(&mut self, value: ExprId) -> ExprId {
        self.add_expr(ExprKind::ValueValid { value }, DataType::Bits(1))
    }

    /// Record argument values for the callee's ports. Pure until consumed
    /// by `async_call`; a bind alone moves no data.
    pub fn bind(&mut self, callee: UnitId, args: &[(PortId, ExprId)]) -> ExprId {
        for (port, arg) in args {
            let decl = self.graph.port(*port).clone();
            if decl.owner != callee {
                self.diagnostics.push(
                    Diagnostic::error(format!(
                        "bound port '{}' does not belong to callee '{}'",
                        decl.name,
                        self.graph.unit(callee).name
                    ))
                    .with_code(codes::FOREIGN_PORT_OP)
                    .with_context(self.graph.unit(callee).name.clone()),
                );
            }
            let aty = self.graph.expr(*arg).ty.clone();
            if !decl.ty.accepts(&aty) {
                self.diagnostics.push(
                    Diagnostic::error(format!(
                        "argument of type {} bound to port '{}' of type {}",
                        aty, decl.name, decl.ty
                    ))
                    .with_code(codes::PORT_ARG_TYPE)
                    .with_context(self.graph.unit(callee).name.clone()),
                );
            }
        }
        self.add_expr(
            ExprKind::Bind {
                callee,
                args: args.to_vec(),
            },
            DataType::Bits(1),
        )
    }

    /// Push every bound value and enqueue exactly one activation for the
    /// callee on the next cycle. The binding must cover every port.
    pub fn async_call(&mut self, bind: ExprId) -> ExprId {
        match &self.graph.expr(bind).kind {
            ExprKind::Bind { callee, args } => {
                let callee = *callee;
                let mut bound: Vec<PortId> = args.iter().map(|(p, _)| *p).collect();
                bound.sort();
                let dup = bound.windows(2).any(|w| w[0] == w[1]);
                let mut expected: Vec<PortId> = self.graph.unit(callee).ports().to_vec();
                expected.sort();
                if dup || bound != expected {
                    let missing: Vec<String> = expected
                        .iter()
                        .filter(|p| !bound.contains(p))
                        .map(|p| self.graph.port(*p).name.clone())
                        .collect();
                    let msg = if dup {
                        "async call binds a port more than once".to_string()
                    } else {
                        format!("async call leaves ports unbound: {}", missing.join(", "))
                    };
                    self.diagnostics.push(
                        Diagnostic::error(msg)
                            .with_code(codes::BIND_INCOMPLETE)
                            .with_context(self.graph.unit(callee).name.clone()),
                    );
                }
            }
            _ => {
                self.diagnostics.push(
                    Diagnostic::error("async call target is not a binding")
                        .with_code(codes::BIND_INCOMPLETE)
                        .with_context(self.graph.expr_label(bind)),
                );
            }
        }
        self.add_expr(ExprKind::AsyncCall { bind }, DataType::Bits(1))
    }

    /// Stall the cycle until the condition holds. Sequential units only.
    pub fn wait_until(&mut self, cond: ExprId) -> ExprId {
        let here = self.current_unit();
        if !self.graph.unit(here).is_sequential() {
            let name = self.graph.unit(here).name.clone();
            self.diagnostics.push(
                Diagnostic::error("wait-until in a combinational unit")
                    .with_code(codes::COMB_STALL_OP)
                    .with_context(name),
            );
        }
        self.add_expr(ExprKind::WaitUntil { cond }, DataType::Bits(1))
    }

    /// A formatted log line; `{}` placeholders consume args in order.
    pub fn log(&mut self, format: impl Into<String>, args: &[ExprId]) -> ExprId {
        self.add_expr(
            ExprKind::Log {
                format: format.into(),
                args: args.to_vec(),
            },
            DataType::Bits(1),
        )
    }

    pub fn finish(&mut self) -> ExprId {
        self.add_expr(ExprKind::Finish, DataType::Bits(1))
    }

    pub fn mem_read(&mut self, mem: MemId, addr: ExprId) -> ExprId {
        self.add_expr(ExprKind::MemReadReq { mem, addr }, DataType::Bits(1))
    }

    pub fn mem_write(&mut self, mem: MemId, addr: ExprId, data: ExprId) -> ExprId {
        self.add_expr(ExprKind::MemWriteReq { mem, addr, data }, DataType::Bits(1))
    }

    pub fn mem_resp_valid(&mut self, mem: MemId) -> ExprId {
        self.add_expr(ExprKind::MemRespValid { mem }, DataType::Bits(1))
    }

    pub fn mem_resp_data(&mut self, mem: MemId) -> ExprId {
        let w = self.graph.mem(mem).width;
        self.add_expr(ExprKind::MemRespData { mem }, DataType::Bits(w))
    }

    // ── Finish ───────────────────────────────────────────────────────────

    pub fn build(self) -> BuildResult {
        assert!(self.insert.is_empty(), "build() with a unit body still open");
        BuildResult {
            graph: self.graph,
            diagnostics: self.diagnostics,
        }
    }
}
