// ide/src/lib.rs

//! Interactive contract workbench
//!
//! This crate provides:
//! - Configuration for the session, simulated chain and checker
//! - Runtime wiring of a session to its collaborators
//! - A line-oriented command interpreter driving the session

pub mod config;
pub mod repl;
pub mod runtime;

pub use config::IdeConfig;
pub use repl::{Command, CommandError, Repl, RunArgs};
pub use runtime::Ide;

/// Contract written into new workspaces
pub const SAMPLE_CONTRACT: &str = r#"scilla_version 0

(* Counter with an owner and a resettable count *)
library Counter

contract Counter (owner : ByStr20, start : Uint32)

field count : Uint32 = start
field last_caller : ByStr20 = owner

transition Set (value : Uint32)
  count := value;
  last_caller := _sender
end

transition Deposit ()
  accept
end

transition Reset ()
  count := Uint32 0
end

transition Fail ()
  throw
end
"#;
