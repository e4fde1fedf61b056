//! DVD navigation virtual machine.
//!
//! `command` interprets the 8-byte VM instructions found in PGC command
//! tables and button definitions, `machine` runs the playback state machine
//! (domains, PGCs, programs, cells) on top of it.

pub mod command;
pub mod link;
pub mod machine;
pub mod registers;
pub mod state;

use thiserror::Error;

use crate::ifo::IfoError;

pub use command::{eval_command, eval_commands, MAX_STEPS};
pub use link::{Link, LinkCmd};
pub use machine::{MenuId, Vm};
pub use registers::{Clock, ManualClock, Registers, SystemClock};
pub use state::{Domain, DvdState, Position};

#[derive(Debug, Error)]
pub enum VmError {
    #[error("command table did not finish after {steps} instructions")]
    Runaway { steps: u32 },
    #[error(transparent)]
    Ifo(#[from] IfoError),
    #[error("VM invariant violated: {0}")]
    Invariant(String),
    #[error("VM has not been started")]
    NotStarted,
}

pub type VmResult<T> = Result<T, VmError>;
