// ir.rs — The hardware graph: units, ports, arrays, blocks, expressions
//
// Everything lives in flat arenas owned by `Graph` and is referenced by
// the `u32` newtype ids from `id.rs`. Use edges (which expressions read a
// given expression) are kept in a separate adjacency table rather than as
// back-pointers on the nodes, so nodes stay plain data.
//
// Preconditions: ids passed to accessors were allocated by the graph's
//   builder.
// Postconditions: accessors never mutate.
// Failure modes: out-of-range ids panic (builder bug, not user error).
// Side effects: none.

use std::fmt;

use crate::id::{ArrayId, BlockId, ExprId, MemId, PortId, UnitId};
use crate::types::DataType;

// ── Units ────────────────────────────────────────────────────────────────

/// How a sequential unit consumes its input ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// Port pops appear explicitly in the body and may stall mid-cycle.
    Systolic,
    /// The body runs only when every port holds a value; pops are atomic.
    Backpressure,
}

/// The two unit flavors share one node type; the variant field carries
/// what differs.
#[derive(Debug, Clone)]
pub enum UnitKind {
    Sequential {
        ports: Vec<PortId>,
        /// Width of the activation-credit counter; the pending queue
        /// saturates at `2^credit_width - 1`.
        credit_width: u16,
        consumption: Consumption,
        /// Seed one activation every cycle (driver convention).
        self_triggering: bool,
    },
    /// Credit-free combinational logic, activated when any upstream
    /// sequential unit triggered this cycle.
    Combinational,
}

#[derive(Debug, Clone)]
pub struct Unit {
    pub name: String,
    pub kind: UnitKind,
    pub body: BlockId,
}

impl Unit {
    pub fn is_sequential(&self) -> bool {
        matches!(self.kind, UnitKind::Sequential { .. })
    }

    pub fn ports(&self) -> &[PortId] {
        match &self.kind {
            UnitKind::Sequential { ports, .. } => ports,
            UnitKind::Combinational => &[],
        }
    }
}

// ── Ports, arrays, memories ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PortDecl {
    pub name: String,
    pub owner: UnitId,
    pub ty: DataType,
}

/// Initial contents of a register array.
#[derive(Debug, Clone)]
pub enum ArrayInit {
    Zero,
    Words(Vec<u64>),
    /// Hex file resolved against the config's resource base at elaboration.
    HexFile(String),
}

#[derive(Debug, Clone)]
pub struct ArrayDecl {
    pub name: String,
    pub elem: DataType,
    pub depth: usize,
    pub init: ArrayInit,
}

/// An asynchronous memory component. Latency is delegated to a timing
/// model at elaboration; `latency` parameterizes the default fixed model.
#[derive(Debug, Clone)]
pub struct MemDecl {
    pub name: String,
    pub width: u16,
    pub depth: usize,
    pub latency: usize,
    pub init: ArrayInit,
}

// ── Blocks ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum BlockKind {
    /// A unit's body.
    Root,
    /// Executes only when `cond` evaluates nonzero.
    Guarded { cond: ExprId },
    /// Executes only on the named cycle; also seeds an activation for the
    /// enclosing unit at that cycle (testbench convention).
    Cycled { cycle: usize },
}

#[derive(Debug, Clone)]
pub enum BodyItem {
    Expr(ExprId),
    Block(BlockId),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub owner: UnitId,
    pub body: Vec<BodyItem>,
}

// ── Operators ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Bitwise complement within the operand width.
    Not,
    /// Two's-complement negation within the operand width.
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    ZExt,
    SExt,
    BitCast,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::BitAnd => "and",
            BinOp::BitOr => "or",
            BinOp::BitXor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
        })
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        })
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnOp::Not => "not",
            UnOp::Neg => "neg",
        })
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::BitCast => "bitcast",
        })
    }
}

// ── Expressions ──────────────────────────────────────────────────────────

/// Closed sum of every operation a unit body can contain.
#[derive(Debug, Clone)]
pub enum ExprKind {
    IntImm { value: u64 },
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    Compare { op: CmpOp, lhs: ExprId, rhs: ExprId },
    Unary { op: UnOp, x: ExprId },
    Select { cond: ExprId, on_true: ExprId, on_false: ExprId },
    Slice { x: ExprId, lo: u16, hi: u16 },
    Concat { msb: ExprId, lsb: ExprId },
    Cast { op: CastOp, x: ExprId },
    /// Combinational array read against last cycle's committed state.
    Load { array: ArrayId, index: ExprId },
    /// Array write, staged at the half cycle and committed at cycle end.
    Store { array: ArrayId, index: ExprId, value: ExprId },
    /// Pop the port's head; stalls the cycle when the port is empty.
    Pop { port: PortId },
    /// Read the port's head without consuming it.
    Peek { port: PortId },
    /// Whether the port currently holds a value.
    PortValid { port: PortId },
    /// Whether the named unit triggered this cycle.
    Triggered { unit: UnitId },
    /// Whether an exposed value's producer has run this cycle.
    ValueValid { value: ExprId },
    /// Record per-port argument values for a later async call. Carries no
    /// data dependency of its own; only the async call makes it effectful.
    Bind { callee: UnitId, args: Vec<(PortId, ExprId)> },
    /// Push every bound value to the callee's ports and enqueue exactly
    /// one activation for the next cycle.
    AsyncCall { bind: ExprId },
    /// Stall the cycle until `cond` holds.
    WaitUntil { cond: ExprId },
    /// Formatted log line; `{}` placeholders consume `args` in order.
    Log { format: String, args: Vec<ExprId> },
    /// Issue an asynchronous read request; yields the accept flag.
    MemReadReq { mem: MemId, addr: ExprId },
    /// Issue an asynchronous write request; yields the accept flag.
    MemWriteReq { mem: MemId, addr: ExprId, data: ExprId },
    /// Whether a response is waiting on the component. Pure.
    MemRespValid { mem: MemId },
    /// Payload of the waiting response. Pure; consumption is staged and
    /// lands when the reading unit's cycle commits.
    MemRespData { mem: MemId },
    /// End the simulation normally.
    Finish,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: DataType,
    pub parent: BlockId,
}

impl Expr {
    /// Whether the expression produces a value other expressions can read.
    pub fn is_valued(&self) -> bool {
        !matches!(
            self.kind,
            ExprKind::Store { .. }
                | ExprKind::AsyncCall { .. }
                | ExprKind::WaitUntil { .. }
                | ExprKind::Log { .. }
                | ExprKind::Finish
        )
    }

    /// Expression operands read as data, in evaluation order.
    pub fn value_operands(&self) -> Vec<ExprId> {
        match &self.kind {
            ExprKind::IntImm { .. }
            | ExprKind::Pop { .. }
            | ExprKind::Peek { .. }
            | ExprKind::PortValid { .. }
            | ExprKind::Triggered { .. }
            | ExprKind::MemRespValid { .. }
            | ExprKind::MemRespData { .. }
            | ExprKind::Finish => Vec::new(),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Compare { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            ExprKind::Unary { x, .. }
            | ExprKind::Slice { x, .. }
            | ExprKind::Cast { x, .. } => vec![*x],
            ExprKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![*cond, *on_true, *on_false],
            ExprKind::Concat { msb, lsb } => vec![*msb, *lsb],
            ExprKind::Load { index, .. } => vec![*index],
            ExprKind::Store { index, value, .. } => vec![*index, *value],
            ExprKind::ValueValid { value } => vec![*value],
            ExprKind::Bind { args, .. } => args.iter().map(|(_, e)| *e).collect(),
            ExprKind::AsyncCall { bind } => vec![*bind],
            ExprKind::WaitUntil { cond } => vec![*cond],
            ExprKind::Log { args, .. } => args.clone(),
            ExprKind::MemReadReq { addr, .. } => vec![*addr],
            ExprKind::MemWriteReq { addr, data, .. } => vec![*addr, *data],
        }
    }
}

// ── Graph ────────────────────────────────────────────────────────────────

/// The complete design: flat arenas plus the users-of adjacency table.
#[derive(Debug, Clone)]
pub struct Graph {
    pub name: String,
    pub units: Vec<Unit>,
    pub ports: Vec<PortDecl>,
    pub arrays: Vec<ArrayDecl>,
    pub mems: Vec<MemDecl>,
    pub blocks: Vec<Block>,
    pub exprs: Vec<Expr>,
    /// `users[e]` lists every expression that reads `e` as data, in
    /// creation order.
    pub(crate) users: Vec<Vec<ExprId>>,
}

impl Graph {
    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.index()]
    }

    pub fn port(&self, id: PortId) -> &PortDecl {
        &self.ports[id.index()]
    }

    pub fn array(&self, id: ArrayId) -> &ArrayDecl {
        &self.arrays[id.index()]
    }

    pub fn mem(&self, id: MemId) -> &MemDecl {
        &self.mems[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn users_of(&self, id: ExprId) -> &[ExprId] {
        &self.users[id.index()]
    }

    /// The unit whose body contains the expression.
    pub fn unit_of_expr(&self, id: ExprId) -> UnitId {
        self.block(self.expr(id).parent).owner
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        (0..self.units.len() as u32).map(UnitId)
    }

    pub fn expr_ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        (0..self.exprs.len() as u32).map(ExprId)
    }

    /// Human-readable identity for panic and log messages: `unit.%n`.
    pub fn expr_label(&self, id: ExprId) -> String {
        format!("{}.%{}", self.unit(self.unit_of_expr(id)).name, id.0)
    }
}
