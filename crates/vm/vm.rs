//! # ledger-vm
//!
//! The narrow privileged capability surface the EVM byte-code interpreter
//! is handed (`spec.md` §9 "Design Notes": "Express this as a narrow
//! privileged capability object ... not inheritance or friendship"). The
//! interpreter itself is an external collaborator (`spec.md` §1) — this
//! crate only specifies the `Host` trait it is driven through, plus a
//! minimal in-crate stand-in (`MinimalHost`, `MinimalInterpreter`) used by
//! this engine's own tests.
//!
//! Shaped after the `WorldState`/`Contract`/`Storage`/`Code` trait split in
//! `examples/other_examples/941aa36a_openethereum-openethereum__bin-ethrun-src-exec-state.rs.rs`,
//! collapsed into a single mutable capability object since the real engine's
//! `AccountCache` (`ledger-blockchain`) is the thing that implements it.

pub mod host;
pub mod interpreter;

pub use host::{Host, HostError, MinimalHost};
pub use interpreter::{CallOutcome, CreateOutcome, Interpreter, MinimalInterpreter};
