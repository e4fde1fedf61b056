//! Control transfer produced by the interpreter and consumed by the state machine.

use std::fmt;

use serde::Serialize;

/// Link, jump and call directives. Values 0..=16 match the link
/// sub-instruction codes stored in VM commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum LinkCmd {
    NoLink = 0,

    TopC = 1,
    NextC = 2,
    PrevC = 3,

    TopPg = 5,
    NextPg = 6,
    PrevPg = 7,

    TopPgc = 9,
    NextPgc = 10,
    PrevPgc = 11,
    GoUpPgc = 12,
    TailPgc = 13,

    Rsm = 16,

    PgcN,
    PttN,
    PgN,
    CN,

    Exit,

    JumpTt,
    JumpVtsTt,
    JumpVtsPtt,

    JumpSsFp,
    JumpSsVmgmMenu,
    JumpSsVtsm,
    JumpSsVmgmPgc,

    CallSsFp,
    CallSsVmgmMenu,
    CallSsVtsm,
    CallSsVmgmPgc,

    PlayThis,
}

impl LinkCmd {
    /// Maps a 5-bit link sub-instruction code. Unassigned codes yield `None`.
    pub fn from_subinstruction(code: u8) -> Option<Self> {
        use LinkCmd::*;
        Some(match code {
            0 => NoLink,
            1 => TopC,
            2 => NextC,
            3 => PrevC,
            5 => TopPg,
            6 => NextPg,
            7 => PrevPg,
            9 => TopPgc,
            10 => NextPgc,
            11 => PrevPgc,
            12 => GoUpPgc,
            13 => TailPgc,
            16 => Rsm,
            _ => return None,
        })
    }

    pub fn is_call(self) -> bool {
        matches!(
            self,
            LinkCmd::CallSsFp | LinkCmd::CallSsVmgmMenu | LinkCmd::CallSsVtsm | LinkCmd::CallSsVmgmPgc
        )
    }
}

/// One directive with its operands. The meaning of `data1..3` depends on the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Link {
    pub command: LinkCmd,
    pub data1: u16,
    pub data2: u16,
    pub data3: u16,
}

impl Link {
    pub const fn new(command: LinkCmd) -> Self {
        Self {
            command,
            data1: 0,
            data2: 0,
            data3: 0,
        }
    }

    pub const fn with(command: LinkCmd, data1: u16) -> Self {
        Self {
            command,
            data1,
            data2: 0,
            data3: 0,
        }
    }

    pub const fn play_this() -> Self {
        Self::new(LinkCmd::PlayThis)
    }

    pub const fn exit() -> Self {
        Self::new(LinkCmd::Exit)
    }

    /// Block offset carried by a terminal `PlayThis`.
    pub fn block(&self) -> u32 {
        u32::from(self.data1) | (u32::from(self.data2) << 16)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}, {}, {})", self.command, self.data1, self.data2, self.data3)
    }
}
