// runtime.rs — Cycle-accurate execution of a lowered program
//
// Time advances in integer stamps, 100 per cycle. Units execute at the
// cycle boundary against last cycle's committed state; everything they
// produce (array writes, port pushes and pops, activations, log lines,
// exposures) is journaled per execution and committed only when the unit
// completes. A stall discards the journal, so a stalled cycle leaves
// credit and port state untouched. Staged effects land on the half edge
// and become visible at the next cycle boundary, which is what makes the
// execution order of sequential units within a cycle unobservable.
//
// Preconditions: the program came out of `lower` with no error
//   diagnostics.
// Postconditions: `run` leaves committed state consistent with the last
//   completed cycle.
// Failure modes: reading an exposed value before its producer ran this
//   cycle panics with the value's identity; out-of-range array accesses
//   panic with the array's name.
// Side effects: log lines to stdout when `echo_log` is set.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use crate::config::{load_hex_file, SimConfig};
use crate::diag::{codes, Diagnostic};
use crate::id::{ArrayId, MemId, PortId, UnitId};
use crate::ir::ArrayInit;
use crate::lower::{Inst, Operand, SimProgram};
use crate::memory::{FixedLatency, MemComponent, TimingModel};
use crate::value::{self, Word};

const STAMP_PER_CYCLE: usize = 100;

// ── Exit conditions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// A unit executed the finish intrinsic.
    Finished,
    /// The configured cycle budget ran out.
    MaxCycles,
    /// No unit triggered for the configured number of consecutive cycles.
    Idle,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub exit: ExitKind,
    pub cycles: usize,
}

// ── Committed and staged state ───────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct StagedWrite {
    addr: usize,
    value: Word,
}

#[derive(Debug)]
struct ArrayState {
    name: String,
    payload: Vec<Word>,
    /// One staging lane per write port; committed in ascending port
    /// order so the highest port's write lands last and wins.
    staged: Vec<Vec<StagedWrite>>,
}

#[derive(Debug, Default)]
struct PortQueue {
    payload: VecDeque<Word>,
    staged_push: Vec<Word>,
    staged_pops: usize,
}

#[derive(Debug, Default)]
struct Journal {
    writes: Vec<(ArrayId, usize, StagedWrite)>,
    pops: HashMap<PortId, usize>,
    calls: Vec<(UnitId, Vec<(PortId, Word)>)>,
    exposes: Vec<(usize, Word)>,
    resp_consumes: Vec<MemId>,
    logs: Vec<String>,
    finish: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Stalled,
}

struct SimState {
    stamp: usize,
    arrays: Vec<ArrayState>,
    queues: Vec<PortQueue>,
    pending: Vec<VecDeque<usize>>,
    triggered: Vec<bool>,
    shared: Vec<Option<Word>>,
    mems: Vec<MemComponent>,
    /// Per-memory response consumes staged this cycle, applied at tick.
    staged_resp: Vec<usize>,
    next_req_id: u64,
    log: Vec<String>,
    echo: bool,
}

// ── Simulator ────────────────────────────────────────────────────────────

pub struct Simulator {
    program: SimProgram,
    state: SimState,
    config: SimConfig,
    exec_order: Vec<UnitId>,
    rng: Option<StdRng>,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("program", &self.program.name)
            .field("stamp", &self.state.stamp)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    pub fn new(program: SimProgram, config: SimConfig) -> Result<Self, Diagnostic> {
        let mut arrays = Vec::with_capacity(program.arrays.len());
        for spec in &program.arrays {
            let words = init_words(spec.depth, &spec.init, &config, &spec.name)?;
            arrays.push(ArrayState {
                name: spec.name.clone(),
                payload: words.into_iter().map(|w| Word::new(spec.width, w)).collect(),
                staged: vec![Vec::new(); spec.write_ports],
            });
        }

        let mut mems = Vec::with_capacity(program.mems.len());
        for spec in &program.mems {
            let words = init_words(spec.depth, &spec.init, &config, &spec.name)?;
            let mut comp = MemComponent::new(
                spec.name.clone(),
                spec.width,
                spec.depth,
                Box::new(FixedLatency::new(spec.latency)),
            );
            comp.backing_mut().copy_from_slice(&words);
            mems.push(comp);
        }

        let mut pending: Vec<VecDeque<usize>> = vec![VecDeque::new(); program.units.len()];
        for lu in &program.units {
            for &cycle in &lu.activations {
                enqueue_due(&mut pending[lu.unit.index()], cycle * STAMP_PER_CYCLE);
            }
        }

        let state = SimState {
            stamp: 0,
            arrays,
            queues: program.ports.iter().map(|_| PortQueue::default()).collect(),
            pending,
            triggered: vec![false; program.units.len()],
            shared: vec![None; program.shared.len()],
            staged_resp: vec![0; mems.len()],
            mems,
            next_req_id: 0,
            log: Vec::new(),
            echo: config.echo_log,
        };

        let exec_order = program.exec_order.clone();
        let rng = config
            .random_order
            .then(|| StdRng::seed_from_u64(config.seed));

        Ok(Self {
            program,
            state,
            config,
            exec_order,
            rng,
        })
    }

    pub fn run(&mut self) -> RunReport {
        let mut idle_streak = 0usize;
        for cycle in 1..=self.config.max_cycles {
            self.state.stamp = cycle * STAMP_PER_CYCLE;

            for flag in &mut self.state.triggered {
                *flag = false;
            }
            for slot in &mut self.state.shared {
                *slot = None;
            }

            // Drivers get one fresh activation per cycle, credit-capped
            // like any other caller.
            for lu in &self.program.units {
                if lu.self_triggering && self.state.pending[lu.unit.index()].len() < lu.credit_cap
                {
                    enqueue_due(&mut self.state.pending[lu.unit.index()], self.state.stamp);
                }
            }

            let stamp = self.state.stamp;
            for m in &mut self.state.mems {
                m.pump(stamp);
            }

            if let Some(rng) = &mut self.rng {
                self.exec_order.shuffle(rng);
            }

            let mut finished = false;
            for i in 0..self.exec_order.len() {
                let uid = self.exec_order[i];
                let matured = self.state.pending[uid.index()]
                    .front()
                    .is_some_and(|&due| due <= self.state.stamp);
                if !matured {
                    continue;
                }
                if let Some(fin) = self.run_unit(uid, true) {
                    finished |= fin;
                }
            }

            for i in 0..self.program.downstream_order.len() {
                let uid = self.program.downstream_order[i];
                let active = self.program.units[uid.index()]
                    .upstreams
                    .iter()
                    .any(|up| self.state.triggered[up.index()]);
                if !active {
                    continue;
                }
                if let Some(fin) = self.run_unit(uid, false) {
                    finished |= fin;
                }
            }

            if finished {
                return RunReport {
                    exit: ExitKind::Finished,
                    cycles: cycle,
                };
            }

            if self.state.triggered.iter().any(|&t| t) {
                idle_streak = 0;
            } else {
                idle_streak += 1;
                if self
                    .config
                    .idle_threshold
                    .is_some_and(|th| idle_streak >= th)
                {
                    return RunReport {
                        exit: ExitKind::Idle,
                        cycles: cycle,
                    };
                }
            }

            self.state.tick();
        }
        RunReport {
            exit: ExitKind::MaxCycles,
            cycles: self.config.max_cycles,
        }
    }

    /// Execute one unit against committed state. Returns `Some(finish)`
    /// when the unit completed and committed, `None` when it stalled.
    fn run_unit(&mut self, uid: UnitId, consume_credit: bool) -> Option<bool> {
        let unit = &self.program.units[uid.index()];
        let mut locals = vec![Word::zero(1); unit.locals];
        let mut journal = Journal::default();
        let outcome = self.state.exec(
            &unit.body,
            &mut locals,
            &mut journal,
            &self.program,
            &unit.name,
        );
        match outcome {
            Outcome::Done => {
                if consume_credit {
                    self.state.pending[uid.index()].pop_front();
                }
                self.state.triggered[uid.index()] = true;
                let finish = journal.finish;
                self.state.commit(journal, &self.program);
                Some(finish)
            }
            Outcome::Stalled => None,
        }
    }

    // ── Observers for tests and the CLI ──────────────────────────────────

    pub fn array_word(&self, array: ArrayId, index: usize) -> Word {
        self.state.arrays[array.index()].payload[index]
    }

    pub fn port_depth(&self, port: PortId) -> usize {
        self.state.queues[port.index()].payload.len()
    }

    pub fn pending_len(&self, unit: UnitId) -> usize {
        self.state.pending[unit.index()].len()
    }

    pub fn was_triggered(&self, unit: UnitId) -> bool {
        self.state.triggered[unit.index()]
    }

    pub fn log(&self) -> &[String] {
        &self.state.log
    }

    pub fn mem_backing(&self, mem: MemId) -> &[u64] {
        self.state.mems[mem.index()].backing()
    }

    /// Swap a memory's timing model before the first cycle.
    pub fn set_timing_model(&mut self, mem: MemId, model: Box<dyn TimingModel>) {
        self.state.mems[mem.index()].set_model(model);
    }

    /// SHA-256 over committed array and port state, for conformance and
    /// order-independence checks.
    pub fn state_digest(&self) -> String {
        let mut h = Sha256::new();
        for a in &self.state.arrays {
            h.update(a.name.as_bytes());
            for w in &a.payload {
                h.update(w.width().to_le_bytes());
                h.update(w.raw().to_le_bytes());
            }
        }
        for q in &self.state.queues {
            h.update((q.payload.len() as u64).to_le_bytes());
            for w in &q.payload {
                h.update(w.raw().to_le_bytes());
            }
        }
        let digest = h.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

fn init_words(
    depth: usize,
    init: &ArrayInit,
    config: &SimConfig,
    name: &str,
) -> Result<Vec<u64>, Diagnostic> {
    let mut words = vec![0u64; depth];
    match init {
        ArrayInit::Zero => {}
        ArrayInit::Words(vs) => {
            for (slot, v) in words.iter_mut().zip(vs) {
                *slot = *v;
            }
        }
        ArrayInit::HexFile(file) => {
            let path = config.resource_base.join(file);
            load_hex_file(&mut words, &path).map_err(|e| {
                Diagnostic::error(format!("cannot initialize '{}': {}", name, e))
                    .with_code(codes::INIT_FILE)
                    .with_context(file.clone())
            })?;
        }
    }
    Ok(words)
}

/// Insert a due stamp keeping the queue sorted. Seeded fixed-cycle stamps
/// and call-driven next-cycle stamps interleave, so the front must always
/// be the earliest due activation.
fn enqueue_due(q: &mut VecDeque<usize>, due: usize) {
    let at = q.partition_point(|&d| d <= due);
    q.insert(at, due);
}

// ── Execution ────────────────────────────────────────────────────────────

impl SimState {
    fn read(&self, op: Operand, locals: &[Word], prog: &SimProgram) -> Word {
        match op {
            Operand::Local(i) => locals[i],
            Operand::Const(w) => w,
            Operand::Shared(s) => self.shared[s].unwrap_or_else(|| {
                panic!(
                    "value {} read before its producing unit '{}' ran this cycle",
                    prog.shared[s].label,
                    prog.units[prog.shared[s].producer.index()].name
                )
            }),
        }
    }

    fn exec(
        &mut self,
        body: &[Inst],
        locals: &mut [Word],
        j: &mut Journal,
        prog: &SimProgram,
        unit_name: &str,
    ) -> Outcome {
        for inst in body {
            match inst {
                Inst::Binary {
                    dst,
                    op,
                    signed,
                    width,
                    lhs,
                    rhs,
                } => {
                    let (a, b) = (self.read(*lhs, locals, prog), self.read(*rhs, locals, prog));
                    locals[*dst] = value::binary(*op, *signed, a, b, *width);
                }
                Inst::Compare {
                    dst,
                    op,
                    signed,
                    lhs,
                    rhs,
                } => {
                    let (a, b) = (self.read(*lhs, locals, prog), self.read(*rhs, locals, prog));
                    locals[*dst] = value::compare(*op, *signed, a, b);
                }
                Inst::Unary { dst, op, width, x } => {
                    let x = self.read(*x, locals, prog);
                    locals[*dst] = value::unary(*op, x, *width);
                }
                Inst::Select {
                    dst,
                    cond,
                    on_true,
                    on_false,
                } => {
                    let c = self.read(*cond, locals, prog);
                    locals[*dst] = if c.as_bool() {
                        self.read(*on_true, locals, prog)
                    } else {
                        self.read(*on_false, locals, prog)
                    };
                }
                Inst::Slice { dst, x, lo, hi } => {
                    let x = self.read(*x, locals, prog);
                    locals[*dst] = value::slice(x, *lo, *hi);
                }
                Inst::Concat { dst, msb, lsb } => {
                    let (m, l) = (self.read(*msb, locals, prog), self.read(*lsb, locals, prog));
                    locals[*dst] = value::concat(m, l);
                }
                Inst::Cast { dst, op, width, x } => {
                    let x = self.read(*x, locals, prog);
                    locals[*dst] = value::cast(*op, x, *width);
                }
                Inst::Load { dst, array, index } => {
                    let idx = self.read(*index, locals, prog).raw() as usize;
                    let a = &self.arrays[array.index()];
                    locals[*dst] = *a.payload.get(idx).unwrap_or_else(|| {
                        panic!(
                            "read of '{}' out of range: {} >= {}",
                            a.name,
                            idx,
                            a.payload.len()
                        )
                    });
                }
                Inst::Store {
                    array,
                    port,
                    index,
                    value,
                } => {
                    let idx = self.read(*index, locals, prog).raw() as usize;
                    let v = self.read(*value, locals, prog);
                    let a = &self.arrays[array.index()];
                    if idx >= a.payload.len() {
                        panic!(
                            "write to '{}' out of range: {} >= {}",
                            a.name,
                            idx,
                            a.payload.len()
                        );
                    }
                    j.writes.push((
                        *array,
                        *port,
                        StagedWrite {
                            addr: idx,
                            value: v,
                        },
                    ));
                }
                Inst::Pop { dst, port } => {
                    let skip = j.pops.get(port).copied().unwrap_or(0);
                    match self.queues[port.index()].payload.get(skip) {
                        Some(&w) => {
                            *j.pops.entry(*port).or_insert(0) += 1;
                            locals[*dst] = w;
                        }
                        None => return Outcome::Stalled,
                    }
                }
                Inst::Peek { dst, port } => {
                    let skip = j.pops.get(port).copied().unwrap_or(0);
                    match self.queues[port.index()].payload.get(skip) {
                        Some(&w) => locals[*dst] = w,
                        None => return Outcome::Stalled,
                    }
                }
                Inst::Valid { dst, port } => {
                    let skip = j.pops.get(port).copied().unwrap_or(0);
                    locals[*dst] = Word::bool(self.queues[port.index()].payload.len() > skip);
                }
                Inst::Triggered { dst, unit } => {
                    locals[*dst] = Word::bool(self.triggered[unit.index()]);
                }
                Inst::ValueValid { dst, slot } => {
                    locals[*dst] = Word::bool(self.shared[*slot].is_some());
                }
                Inst::Expose { slot, src } => {
                    let w = self.read(*src, locals, prog);
                    j.exposes.push((*slot, w));
                }
                Inst::AsyncCall { callee, pushes } => {
                    let resolved = pushes
                        .iter()
                        .map(|&(p, op)| (p, self.read(op, locals, prog)))
                        .collect();
                    j.calls.push((*callee, resolved));
                }
                Inst::WaitUntil { cond } => {
                    if !self.read(*cond, locals, prog).as_bool() {
                        return Outcome::Stalled;
                    }
                }
                Inst::Log { format, args } => {
                    let words: Vec<Word> =
                        args.iter().map(|&a| self.read(a, locals, prog)).collect();
                    let text = render(format, &words);
                    j.logs.push(format!(
                        "@{:>4} [{}] {}",
                        self.stamp / STAMP_PER_CYCLE,
                        unit_name,
                        text
                    ));
                }
                Inst::Finish => j.finish = true,
                Inst::MemReadReq { dst, mem, addr } => {
                    let addr = self.read(*addr, locals, prog).raw() as usize;
                    let id = self.next_req_id;
                    self.next_req_id += 1;
                    let ok = self.mems[mem.index()].issue(id, addr, None, self.stamp);
                    locals[*dst] = Word::bool(ok);
                }
                Inst::MemWriteReq {
                    dst,
                    mem,
                    addr,
                    data,
                } => {
                    let addr = self.read(*addr, locals, prog).raw() as usize;
                    let data = self.read(*data, locals, prog).raw();
                    let id = self.next_req_id;
                    self.next_req_id += 1;
                    let ok = self.mems[mem.index()].issue(id, addr, Some(data), self.stamp);
                    locals[*dst] = Word::bool(ok);
                }
                Inst::MemRespValid { dst, mem } => {
                    locals[*dst] = Word::bool(self.mems[mem.index()].resp_valid());
                }
                Inst::MemRespData { dst, mem, width } => {
                    let m = &self.mems[mem.index()];
                    let resp = m.front().unwrap_or_else(|| {
                        panic!("response fetched from '{}' with none waiting", m.name)
                    });
                    locals[*dst] = Word::new(*width, resp.data);
                    if !j.resp_consumes.contains(mem) {
                        j.resp_consumes.push(*mem);
                    }
                }
                Inst::Guard { cond, body } => {
                    if self.read(*cond, locals, prog).as_bool() {
                        if self.exec(body, locals, j, prog, unit_name) == Outcome::Stalled {
                            return Outcome::Stalled;
                        }
                    }
                }
                Inst::AtCycle { cycle, body } => {
                    if self.stamp / STAMP_PER_CYCLE == *cycle {
                        if self.exec(body, locals, j, prog, unit_name) == Outcome::Stalled {
                            return Outcome::Stalled;
                        }
                    }
                }
            }
        }
        Outcome::Done
    }

    /// Land a completed execution's journal. Pushes, pops, and response
    /// consumes stay staged until the cycle's tick; exposures are visible
    /// immediately.
    fn commit(&mut self, j: Journal, prog: &SimProgram) {
        for (array, port, w) in j.writes {
            self.arrays[array.index()].staged[port].push(w);
        }
        for (port, n) in j.pops {
            self.queues[port.index()].staged_pops += n;
        }
        let due = self.stamp - self.stamp % STAMP_PER_CYCLE + STAMP_PER_CYCLE;
        for (callee, pushes) in j.calls {
            for (p, w) in pushes {
                self.queues[p.index()].staged_push.push(w);
            }
            let cap = prog.units[callee.index()].credit_cap;
            let q = &mut self.pending[callee.index()];
            // The credit counter saturates; an activation past the cap
            // is dropped while the data still lands in the ports.
            if q.len() < cap {
                enqueue_due(q, due);
            }
        }
        for (slot, w) in j.exposes {
            self.shared[slot] = Some(w);
        }
        for m in j.resp_consumes {
            self.staged_resp[m.index()] += 1;
        }
        for line in j.logs {
            if self.echo {
                println!("{}", line);
            }
            self.log.push(line);
        }
    }

    /// Cycle-end register update: array staging lanes land in ascending
    /// port order (highest port wins), then port pops, then pushes, then
    /// staged memory-response consumes.
    fn tick(&mut self) {
        for a in &mut self.arrays {
            for lane in &mut a.staged {
                for w in lane.drain(..) {
                    a.payload[w.addr] = w.value;
                }
            }
        }
        for q in &mut self.queues {
            for _ in 0..q.staged_pops {
                q.payload.pop_front();
            }
            q.staged_pops = 0;
            q.payload.extend(q.staged_push.drain(..));
        }
        for (i, n) in self.staged_resp.iter_mut().enumerate() {
            for _ in 0..*n {
                self.mems[i].consume_front();
            }
            *n = 0;
        }
    }
}

fn render(format: &str, args: &[Word]) -> String {
    let mut out = String::new();
    let mut parts = format.split("{}");
    let mut args = args.iter();
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        match args.next() {
            Some(w) => out.push_str(&w.raw().to_string()),
            None => out.push_str("{}"),
        }
        out.push_str(part);
    }
    out
}
