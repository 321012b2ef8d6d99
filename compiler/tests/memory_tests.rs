// Asynchronous memory scenarios run through the full simulator: issue
// timing, response polling and consumption, write completion, and the
// pluggable timing-model seam.

use scc::builder::GraphBuilder;
use scc::config::SimConfig;
use scc::elaborate::elaborate;
use scc::ir::{ArrayInit, Graph};
use scc::memory::{MemRequest, TimingModel};
use scc::runtime::{ExitKind, Simulator};

fn simulator(graph: &Graph, max_cycles: usize) -> Simulator {
    let config = SimConfig {
        max_cycles,
        ..Default::default()
    };
    let r = elaborate(graph, &config);
    assert!(!r.has_errors(), "{:?}", r.diagnostics);
    r.simulator.expect("no simulator")
}

#[test]
fn read_response_arrives_after_the_fixed_latency() {
    let mut b = GraphBuilder::new("romread");
    let drv = b.driver("drv");
    let rom = b.memory_with_init(
        "rom",
        32,
        8,
        5,
        ArrayInit::Words(vec![0x10, 0x20, 0x30, 0x40]),
    );
    b.body(drv, |b| {
        b.at_cycle(1, |b| {
            let addr = b.uimm(3, 2);
            let ok = b.mem_read(rom, addr);
            b.log("ok={}", &[ok]);
        });
        let v = b.mem_resp_valid(rom);
        b.log("v={}", &[v]);
        b.guarded(v, |b| {
            let d = b.mem_resp_data(rom);
            b.log("d={}", &[d]);
            b.finish();
        });
    });

    let graph = b.build().into_graph().unwrap();
    let mut s = simulator(&graph, 20);
    let report = s.run();

    // Issued at cycle 1, five cycles of latency: the completion is
    // pumped at the start of cycle 6 and visible that same cycle.
    assert_eq!(report.exit, ExitKind::Finished);
    assert_eq!(report.cycles, 6);
    assert!(s.log().contains(&"@   1 [drv] ok=1".to_string()));
    assert!(s.log().contains(&"@   5 [drv] v=0".to_string()));
    assert!(s.log().contains(&"@   6 [drv] v=1".to_string()));
    assert!(s.log().contains(&"@   6 [drv] d=48".to_string()));
}

#[test]
fn write_updates_backing_at_completion_not_at_issue() {
    let mut b = GraphBuilder::new("memwrite");
    let drv = b.driver("drv");
    let ram = b.memory("ram", 32, 8, 2);
    b.body(drv, |b| {
        b.at_cycle(1, |b| {
            let addr = b.uimm(3, 5);
            let data = b.uimm(32, 0xAB);
            let ok = b.mem_write(ram, addr, data);
            b.log("ok={}", &[ok]);
        });
        let v = b.mem_resp_valid(ram);
        b.guarded(v, |b| {
            let d = b.mem_resp_data(ram);
            b.log("done={}", &[d]);
        });
    });

    let graph = b.build().into_graph().unwrap();
    let mut s = simulator(&graph, 6);
    s.run();

    assert_eq!(s.mem_backing(ram)[5], 0xAB);
    let done: Vec<_> = s.log().iter().filter(|l| l.contains("done=")).collect();
    assert_eq!(done, ["@   3 [drv] done=171"]);
}

#[test]
fn interleaved_reads_complete_in_issue_order() {
    let mut b = GraphBuilder::new("two_reads");
    let drv = b.driver("drv");
    let rom = b.memory_with_init(
        "rom",
        32,
        8,
        3,
        ArrayInit::Words(vec![0, 0x11, 0, 0x33]),
    );
    b.body(drv, |b| {
        b.at_cycle(1, |b| {
            let a = b.uimm(3, 1);
            let _ = b.mem_read(rom, a);
        });
        b.at_cycle(2, |b| {
            let a = b.uimm(3, 3);
            let _ = b.mem_read(rom, a);
        });
        let v = b.mem_resp_valid(rom);
        b.guarded(v, |b| {
            let d = b.mem_resp_data(rom);
            b.log("d={}", &[d]);
        });
    });

    let graph = b.build().into_graph().unwrap();
    let mut s = simulator(&graph, 8);
    s.run();

    let data: Vec<_> = s.log().iter().filter(|l| l.contains("d=")).collect();
    assert_eq!(data, ["@   4 [drv] d=17", "@   5 [drv] d=51"]);
}

#[test]
fn one_response_is_shared_by_readers_in_the_same_cycle() {
    let mut b = GraphBuilder::new("fanout");
    let issuer = b.driver("issuer");
    let watch_a = b.driver("watch_a");
    let watch_b = b.driver("watch_b");
    let rom = b.memory_with_init("rom", 32, 8, 1, ArrayInit::Words(vec![0x5A]));

    b.body(issuer, |b| {
        b.at_cycle(1, |b| {
            let addr = b.uimm(3, 0);
            let _ = b.mem_read(rom, addr);
        });
    });
    b.body(watch_a, |b| {
        let v = b.mem_resp_valid(rom);
        b.guarded(v, |b| {
            let d = b.mem_resp_data(rom);
            b.log("a={}", &[d]);
        });
    });
    b.body(watch_b, |b| {
        let v = b.mem_resp_valid(rom);
        b.guarded(v, |b| {
            let d = b.mem_resp_data(rom);
            b.log("b={}", &[d]);
        });
    });

    let graph = b.build().into_graph().unwrap();
    let mut s = simulator(&graph, 3);
    s.run();

    // The consume lands at the cycle's end, so both watchers of cycle 2
    // observe the same response regardless of their execution order.
    assert!(s.log().contains(&"@   2 [watch_a] a=90".to_string()));
    assert!(s.log().contains(&"@   2 [watch_b] b=90".to_string()));
    assert_eq!(s.log().len(), 2);
}

#[test]
fn a_refusing_timing_model_rejects_the_issue() {
    struct Refusenik;
    impl TimingModel for Refusenik {
        fn issue(&mut self, _req: &MemRequest) -> bool {
            false
        }
        fn drain(&mut self, _stamp: usize) -> Vec<u64> {
            Vec::new()
        }
    }

    let mut b = GraphBuilder::new("busy");
    let drv = b.driver("drv");
    let ram = b.memory("ram", 32, 8, 1);
    b.body(drv, |b| {
        b.at_cycle(1, |b| {
            let addr = b.uimm(3, 0);
            let ok = b.mem_read(ram, addr);
            b.log("ok={}", &[ok]);
        });
        let v = b.mem_resp_valid(ram);
        b.guarded(v, |b| {
            let d = b.mem_resp_data(ram);
            b.log("d={}", &[d]);
        });
    });

    let graph = b.build().into_graph().unwrap();
    let mut s = simulator(&graph, 4);
    s.set_timing_model(ram, Box::new(Refusenik));
    s.run();

    assert!(s.log().contains(&"@   1 [drv] ok=0".to_string()));
    assert!(s.log().iter().all(|l| !l.contains("d=")));
}
