use clap::Parser;
use std::path::PathBuf;

use scc::builder::GraphBuilder;
use scc::config::SimConfig;
use scc::diag::DiagLevel;
use scc::elaborate::elaborate;
use scc::ir::{BinOp, CmpOp, Graph};
use scc::printer::print_graph;
use scc::types::DataType;

#[derive(Debug, Clone, clap::ValueEnum)]
enum Demo {
    /// A driver counting in a register array until it finishes.
    Counter,
    /// Fibonacci through two register arrays with a log per cycle.
    Fib,
    /// A read issued against a fixed-latency memory, polled to completion.
    Memread,
}

#[derive(Parser, Debug)]
#[command(
    name = "scc",
    version,
    about = "Stagecraft Compiler Collection — builds pipeline graphs and runs their cycle-accurate simulators"
)]
struct Cli {
    /// Built-in demo design to run
    #[arg(long, value_enum, default_value_t = Demo::Counter)]
    demo: Demo,

    /// JSON config file (fields override the defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override: maximum cycles
    #[arg(long)]
    cycles: Option<usize>,

    /// Override: idle-exit threshold in cycles
    #[arg(long)]
    idle_threshold: Option<usize>,

    /// Shuffle sequential execution order every cycle
    #[arg(long)]
    random_order: bool,

    /// Seed for the order shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Print the graph before running
    #[arg(long)]
    print_ir: bool,

    /// Print the committed-state digest after running
    #[arg(long)]
    digest: bool,

    /// Print elaboration phases
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match SimConfig::from_json_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("scc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => SimConfig::default(),
    };
    if let Some(n) = cli.cycles {
        config.max_cycles = n;
    }
    if let Some(n) = cli.idle_threshold {
        config.idle_threshold = Some(n);
    }
    if cli.random_order {
        config.random_order = true;
    }
    if let Some(s) = cli.seed {
        config.seed = s;
    }
    config.echo_log = true;

    let graph = match build_demo(&cli.demo) {
        Ok(g) => g,
        Err(diags) => {
            for d in &diags {
                eprintln!("scc: {}", d);
            }
            std::process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("scc: demo   = {:?}", cli.demo);
        eprintln!(
            "scc: design = {} ({} units, {} arrays, {} memories)",
            graph.name,
            graph.units.len(),
            graph.arrays.len(),
            graph.mems.len()
        );
    }
    if cli.print_ir {
        print!("{}", print_graph(&graph));
    }

    let result = elaborate(&graph, &config);
    for d in &result.diagnostics {
        eprintln!("scc: {}", d);
    }
    if result
        .diagnostics
        .iter()
        .any(|d| d.level == DiagLevel::Error)
    {
        std::process::exit(1);
    }
    let mut sim = match result.simulator {
        Some(s) => s,
        None => {
            eprintln!("scc: elaboration produced no simulator");
            std::process::exit(1);
        }
    };

    let report = sim.run();
    eprintln!(
        "scc: exit = {:?} after {} cycles",
        report.exit, report.cycles
    );
    if cli.digest {
        println!("{}", sim.state_digest());
    }
}

fn build_demo(demo: &Demo) -> Result<Graph, Vec<scc::diag::Diagnostic>> {
    match demo {
        Demo::Counter => build_counter(),
        Demo::Fib => build_fib(),
        Demo::Memread => build_memread(),
    }
}

fn build_counter() -> Result<Graph, Vec<scc::diag::Diagnostic>> {
    let mut b = GraphBuilder::new("counter");
    let drv = b.driver("drv");
    let cnt = b.array("cnt", DataType::UInt(32), 1);
    b.body(drv, |b| {
        let zero = b.uimm(1, 0);
        let cur = b.load(cnt, zero);
        let one = b.uimm(32, 1);
        let next = b.binary(BinOp::Add, cur, one);
        b.store(cnt, zero, next);
        b.log("cnt={}", &[cur]);
        let limit = b.uimm(32, 20);
        let done = b.compare(CmpOp::Ge, cur, limit);
        b.guarded(done, |b| {
            b.finish();
        });
    });
    b.build().into_graph()
}

fn build_fib() -> Result<Graph, Vec<scc::diag::Diagnostic>> {
    let mut b = GraphBuilder::new("fib");
    let drv = b.driver("drv");
    let a = b.array_init("a", DataType::UInt(64), vec![0]);
    let c = b.array_init("b", DataType::UInt(64), vec![1]);
    b.body(drv, |b| {
        let zero = b.uimm(1, 0);
        let x = b.load(a, zero);
        let y = b.load(c, zero);
        let next = b.binary(BinOp::Add, x, y);
        b.store(a, zero, y);
        b.store(c, zero, next);
        b.log("fib={}", &[x]);
        let limit = b.uimm(64, 1_000_000);
        let done = b.compare(CmpOp::Gt, x, limit);
        b.guarded(done, |b| {
            b.finish();
        });
    });
    b.build().into_graph()
}

fn build_memread() -> Result<Graph, Vec<scc::diag::Diagnostic>> {
    let mut b = GraphBuilder::new("memread");
    let drv = b.driver("drv");
    let mem = b.memory_with_init(
        "rom",
        32,
        8,
        5,
        scc::ir::ArrayInit::Words(vec![0x10, 0x20, 0x30, 0x40]),
    );
    b.body(drv, |b| {
        b.at_cycle(1, |b| {
            let addr = b.uimm(3, 2);
            let ok = b.mem_read(mem, addr);
            b.log("issued, accepted={}", &[ok]);
        });
        let ready = b.mem_resp_valid(mem);
        b.log("resp_valid={}", &[ready]);
        b.guarded(ready, |b| {
            let data = b.mem_resp_data(mem);
            b.log("data={}", &[data]);
            b.finish();
        });
    });
    b.build().into_graph()
}
