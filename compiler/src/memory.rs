// memory.rs — Asynchronous memory components and their timing seam
//
// A memory component owns its backing words and a response queue; when a
// request completes is decided by a `TimingModel`, the interface real
// timing engines plug into. Requests are issued during unit execution,
// completions are pumped at the start of each cycle, and responses stay
// queued until the cycle-end tick applies the readers' consumes.
//
// Preconditions: request ids are unique per simulation.
// Postconditions: every accepted request produces exactly one response;
//   write data reaches the backing store at completion, not at issue.
// Failure modes: out-of-range addresses complete with zero data (reads)
//   or are dropped (writes).
// Side effects: none outside the component.

use std::collections::{BTreeMap, HashMap, VecDeque};

/// An outstanding request, stamped with its issue time.
#[derive(Debug, Clone)]
pub struct MemRequest {
    pub id: u64,
    pub addr: usize,
    pub is_write: bool,
    pub data: u64,
    pub issued_stamp: usize,
}

/// A completed request waiting to be fetched.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: u64,
    pub addr: usize,
    pub data: u64,
    pub is_write: bool,
    pub issued_stamp: usize,
}

/// Decides when requests complete. Real engines (DRAM timing cores) sit
/// behind this seam; the simulator only ships `FixedLatency`.
pub trait TimingModel {
    /// Accept the request, or refuse it because the engine is busy.
    fn issue(&mut self, req: &MemRequest) -> bool;

    /// Ids of requests complete once time reaches `stamp`, oldest first.
    fn drain(&mut self, stamp: usize) -> Vec<u64>;
}

// ── FixedLatency ─────────────────────────────────────────────────────────

/// Every request completes exactly `latency` cycles after issue.
#[derive(Debug)]
pub struct FixedLatency {
    latency_cycles: usize,
    due: BTreeMap<usize, Vec<u64>>,
}

impl FixedLatency {
    pub fn new(latency_cycles: usize) -> Self {
        Self {
            latency_cycles,
            due: BTreeMap::new(),
        }
    }
}

impl TimingModel for FixedLatency {
    fn issue(&mut self, req: &MemRequest) -> bool {
        let ready = req.issued_stamp + self.latency_cycles * 100;
        self.due.entry(ready).or_default().push(req.id);
        true
    }

    fn drain(&mut self, stamp: usize) -> Vec<u64> {
        let later = self.due.split_off(&(stamp + 1));
        let ready = std::mem::replace(&mut self.due, later);
        ready.into_values().flatten().collect()
    }
}

// ── MemComponent ─────────────────────────────────────────────────────────

pub struct MemComponent {
    pub name: String,
    pub width: u16,
    backing: Vec<u64>,
    model: Box<dyn TimingModel>,
    inflight: HashMap<u64, MemRequest>,
    responses: VecDeque<Response>,
}

impl MemComponent {
    pub fn new(name: impl Into<String>, width: u16, depth: usize, model: Box<dyn TimingModel>) -> Self {
        Self {
            name: name.into(),
            width,
            backing: vec![0; depth],
            model,
            inflight: HashMap::new(),
            responses: VecDeque::new(),
        }
    }

    pub fn backing_mut(&mut self) -> &mut [u64] {
        &mut self.backing
    }

    pub fn backing(&self) -> &[u64] {
        &self.backing
    }

    /// Swap in a different timing model. Outstanding requests are lost,
    /// so do this before the first cycle.
    pub fn set_model(&mut self, model: Box<dyn TimingModel>) {
        self.model = model;
    }

    /// Issue a request; `write` carries the data for writes. Returns the
    /// accept flag the issuing expression yields.
    pub fn issue(&mut self, id: u64, addr: usize, write: Option<u64>, stamp: usize) -> bool {
        let req = MemRequest {
            id,
            addr,
            is_write: write.is_some(),
            data: write.unwrap_or(0),
            issued_stamp: stamp,
        };
        if self.model.issue(&req) {
            self.inflight.insert(id, req);
            true
        } else {
            false
        }
    }

    /// Move everything the model says is done into the response queue.
    /// Reads capture the backing word now; writes update it now.
    pub fn pump(&mut self, stamp: usize) {
        for id in self.model.drain(stamp) {
            let req = match self.inflight.remove(&id) {
                Some(r) => r,
                None => continue,
            };
            let data = if req.is_write {
                if let Some(slot) = self.backing.get_mut(req.addr) {
                    *slot = req.data;
                }
                req.data
            } else {
                self.backing.get(req.addr).copied().unwrap_or(0)
            };
            self.responses.push_back(Response {
                id: req.id,
                addr: req.addr,
                data,
                is_write: req.is_write,
                issued_stamp: req.issued_stamp,
            });
        }
    }

    pub fn resp_valid(&self) -> bool {
        !self.responses.is_empty()
    }

    pub fn front(&self) -> Option<&Response> {
        self.responses.front()
    }

    /// Drop the front response. Called at the cycle-end tick, never
    /// during execution.
    pub fn consume_front(&mut self) {
        self.responses.pop_front();
    }

    pub fn outstanding(&self) -> usize {
        self.inflight.len()
    }
}

impl std::fmt::Debug for MemComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemComponent")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("depth", &self.backing.len())
            .field("inflight", &self.inflight.len())
            .field("responses", &self.responses.len())
            .finish()
    }
}
