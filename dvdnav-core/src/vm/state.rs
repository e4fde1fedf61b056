//! Playback position and resume bookkeeping of the state machine.

use std::sync::Arc;

use serde::Serialize;

use crate::ifo::Pgc;

use super::registers::Registers;

/// Coarse playback mode. Values match the on-disc domain flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Domain {
    FirstPlay = 1,
    VtsTitle = 2,
    Vmgm = 4,
    VtsMenu = 8,
}

impl Domain {
    pub fn is_menu(self) -> bool {
        matches!(self, Domain::Vmgm | Domain::VtsMenu)
    }

    /// Whether playback data lives in the title set (as opposed to `VIDEO_TS.VOB`).
    pub fn in_title_set(self) -> bool {
        matches!(self, Domain::VtsTitle | Domain::VtsMenu)
    }
}

/// Snapshot taken by `CallSS` and restored by `RSM`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResumeInfo {
    /// 0 when nothing can be resumed.
    pub vts_n: u8,
    pub pgc_n: u16,
    /// 0 resumes at the start of the program.
    pub cell_n: u16,
    pub block_n: u32,
    /// SPRM 4..=8.
    pub regs: [u16; 5],
}

#[derive(Debug, Clone)]
pub struct DvdState {
    pub registers: Registers,
    pub domain: Domain,
    /// Loaded title set, 0 for none.
    pub vts_n: u8,
    pub pgc: Option<Arc<Pgc>>,
    /// Number of `pgc` in the PGCIT it came from, 0 for the first play PGC.
    pub pgc_n: u16,
    pub pg_n: u16,
    pub cell_n: u16,
    /// Bumped on every cell (re)entry so replaying a cell is visible.
    pub cell_restart: u32,
    /// Block offset inside the cell.
    pub block_n: u32,
    pub resume: ResumeInfo,
}

impl DvdState {
    pub fn new(registers: Registers) -> Self {
        Self {
            registers,
            domain: Domain::FirstPlay,
            vts_n: 0,
            pgc: None,
            pgc_n: 0,
            pg_n: 0,
            cell_n: 0,
            cell_restart: 0,
            block_n: 0,
            resume: ResumeInfo::default(),
        }
    }
}

/// What the navigator compares between steps to detect changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub button: u16,
    pub vts: u8,
    pub domain: Option<Domain>,
    pub spu_channel: u16,
    pub audio_channel: u16,
    pub angle_channel: u16,
    pub hop_channel: u32,
    pub cell: u16,
    pub cell_restart: u32,
    pub cell_start: u32,
    /// Still length in seconds, 0xFF = until skipped.
    pub still: u8,
    pub block: u32,
}
