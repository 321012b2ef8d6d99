// scc — Stagecraft Compiler Collection
//
// Library root. A design is described through `builder::GraphBuilder`,
// checked and lowered by `elaborate`, and executed by `runtime`.

pub mod analyze;
pub mod builder;
pub mod config;
pub mod diag;
pub mod elaborate;
pub mod id;
pub mod ir;
pub mod lower;
pub mod memory;
pub mod ports;
pub mod printer;
pub mod runtime;
pub mod types;
pub mod value;
