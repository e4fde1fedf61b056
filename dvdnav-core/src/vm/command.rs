//! VM instruction interpreter.
//!
//! An instruction is a big-endian 64-bit word. Bits 63..61 select the class:
//!
//! | class | layout |
//! |-------|--------|
//! | 0 | if (v1) special: NOP, Goto, Break, SetTmpPML |
//! | 1 | if (v1) link, or if (v2) jump/call when bit 60 is set |
//! | 2 | if (v2) system set, then optional link |
//! | 3 | if (v3) set (v1), then optional link |
//! | 4 | set (v2), then if (v4) link sub-instruction |
//! | 5 | if (v5) { set (v2), link sub-instruction } |
//! | 6 | if (v5) set (v2), then link sub-instruction |

use rand::rngs::StdRng;
use rand::Rng;

use crate::bits::extract_bits;

use super::link::{Link, LinkCmd};
use super::registers::{
    Registers, SPRM_ANGLE, SPRM_AUDIO_STREAM, SPRM_HIGHLIGHT_BUTTON, SPRM_NAV_TIMER, SPRM_PARENTAL_LEVEL,
    SPRM_SPU_STREAM, SPRM_TIMER_PGC,
};
use super::{VmError, VmResult};

/// Executed instruction cap for one command table evaluation.
pub const MAX_STEPS: u32 = 100_000;

/// Outcome of a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    /// 1-based line; past the end of the table terminates it.
    Goto(u16),
    Link(Link),
}

/// Evaluates a command table from its first line.
///
/// Returns the first link any instruction produces, or `None` when execution
/// falls off the end of the table.
pub fn eval_commands(commands: &[u64], regs: &mut Registers, rng: &mut StdRng) -> VmResult<Option<Link>> {
    let mut line = 0usize;
    let mut steps = 0u32;
    while line < commands.len() {
        if steps >= MAX_STEPS {
            tracing::error!(target: "dvdnav::vm", "command table exceeded {} steps at line {}", MAX_STEPS, line + 1);
            return Err(VmError::Runaway { steps });
        }
        steps += 1;

        let mut cmd = Command {
            instruction: commands[line],
            regs: &mut *regs,
            rng: &mut *rng,
        };
        match cmd.execute() {
            // goto line 0 falls through
            Flow::Next | Flow::Goto(0) => line += 1,
            Flow::Goto(target) => line = usize::from(target).saturating_sub(1),
            Flow::Link(link) => {
                tracing::trace!(target: "dvdnav::vm", "line {} -> {}", line + 1, link);
                return Ok(Some(link));
            }
        }
    }
    Ok(None)
}

/// Evaluates a single instruction, as used for button and cell commands.
pub fn eval_command(instruction: u64, regs: &mut Registers, rng: &mut StdRng) -> VmResult<Option<Link>> {
    eval_commands(&[instruction], regs, rng)
}

struct Command<'a> {
    instruction: u64,
    regs: &'a mut Registers,
    rng: &'a mut StdRng,
}

impl Command<'_> {
    fn bits(&self, start: u8, count: u8) -> u16 {
        extract_bits(self.instruction, start, count) as u16
    }

    fn flag(&self, bit: u8) -> bool {
        self.bits(bit, 1) != 0
    }

    fn execute(&mut self) -> Flow {
        match self.bits(63, 3) {
            0 => {
                let cond = self.if_v1();
                self.special(cond)
            }
            1 => {
                let link = if self.flag(60) {
                    let cond = self.if_v2();
                    self.jump(cond)
                } else {
                    let cond = self.if_v1();
                    self.link(cond)
                };
                link.map_or(Flow::Next, Flow::Link)
            }
            2 => {
                let cond = self.if_v2();
                self.system_set(cond).map_or(Flow::Next, Flow::Link)
            }
            3 => {
                let cond = self.if_v3();
                self.set_v1(cond);
                let link = if self.bits(51, 4) != 0 { self.link(cond) } else { None };
                link.map_or(Flow::Next, Flow::Link)
            }
            4 => {
                self.set_v2(true);
                let cond = self.if_v4();
                self.link_subins(cond).map_or(Flow::Next, Flow::Link)
            }
            5 => {
                let cond = self.if_v5();
                self.set_v2(cond);
                self.link_subins(cond).map_or(Flow::Next, Flow::Link)
            }
            6 => {
                let cond = self.if_v5();
                self.set_v2(cond);
                self.link_subins(true).map_or(Flow::Next, Flow::Link)
            }
            class => {
                tracing::warn!(
                    target: "dvdnav::vm",
                    "unknown instruction class {} in {:016x}, skipped",
                    class,
                    self.instruction
                );
                Flow::Next
            }
        }
    }

    // ========================================================================
    // Operand addressing
    // ========================================================================

    fn reg(&self, selector: u16) -> u16 {
        self.regs.read_selector(selector as u8)
    }

    /// 16-bit immediate at `start`, or a register selector in its low byte.
    fn reg_or_data(&self, immediate: bool, start: u8) -> u16 {
        if immediate {
            self.bits(start, 16)
        } else {
            self.reg(self.bits(start - 8, 8))
        }
    }

    /// 7-bit immediate, or a GPRM number in the low nibble.
    fn reg_or_data_2(&self, immediate: bool, start: u8) -> u16 {
        if immediate {
            self.bits(start - 1, 7)
        } else {
            self.regs.gprm(self.bits(start - 4, 4) as usize)
        }
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    fn compare(op: u16, a: u16, b: u16) -> bool {
        match op {
            1 => a & b != 0,
            2 => a == b,
            3 => a != b,
            4 => a >= b,
            5 => a > b,
            6 => a <= b,
            7 => a < b,
            _ => true,
        }
    }

    fn if_v1(&self) -> bool {
        match self.bits(54, 3) {
            0 => true,
            op => Self::compare(op, self.reg(self.bits(39, 8)), self.reg_or_data(self.flag(55), 31)),
        }
    }

    fn if_v2(&self) -> bool {
        match self.bits(54, 3) {
            0 => true,
            op => Self::compare(op, self.reg(self.bits(15, 8)), self.reg(self.bits(7, 8))),
        }
    }

    fn if_v3(&self) -> bool {
        match self.bits(54, 3) {
            0 => true,
            op => Self::compare(op, self.reg(self.bits(47, 8)), self.reg_or_data(self.flag(55), 15)),
        }
    }

    fn if_v4(&self) -> bool {
        match self.bits(54, 3) {
            0 => true,
            op => Self::compare(op, self.reg(self.bits(51, 4)), self.reg_or_data(self.flag(55), 31)),
        }
    }

    fn if_v5(&self) -> bool {
        match self.bits(54, 3) {
            0 => true,
            op if self.flag(60) => Self::compare(op, self.reg(self.bits(31, 8)), self.reg(self.bits(23, 8))),
            op => Self::compare(op, self.reg(self.bits(39, 8)), self.reg_or_data(self.flag(55), 15)),
        }
    }

    // ========================================================================
    // Special, link and jump instructions
    // ========================================================================

    fn special(&mut self, cond: bool) -> Flow {
        if !cond {
            return Flow::Next;
        }
        match self.bits(51, 4) {
            0 => Flow::Next,
            1 => Flow::Goto(self.bits(7, 8)),
            // past any table, ends evaluation
            2 => Flow::Goto(256),
            3 => {
                let level = self.bits(11, 4);
                tracing::debug!(target: "dvdnav::vm", "temporary parental level {}", level);
                self.regs.set_sprm(SPRM_PARENTAL_LEVEL, level);
                Flow::Goto(self.bits(7, 8))
            }
            op => {
                tracing::warn!(target: "dvdnav::vm", "unknown special instruction {} ignored", op);
                Flow::Next
            }
        }
    }

    fn link_subins(&self, cond: bool) -> Option<Link> {
        let button = self.bits(15, 6);
        let code = self.bits(4, 5) as u8;
        let Some(command) = LinkCmd::from_subinstruction(code) else {
            tracing::warn!(target: "dvdnav::vm", "unknown link sub-instruction {} ignored", code);
            return None;
        };
        cond.then_some(Link::with(command, button))
    }

    fn link(&self, cond: bool) -> Option<Link> {
        let button = self.bits(15, 6);
        let link = match self.bits(51, 4) {
            1 => return self.link_subins(cond),
            4 => Link::with(LinkCmd::PgcN, self.bits(14, 15)),
            5 => Link {
                command: LinkCmd::PttN,
                data1: self.bits(9, 10),
                data2: button,
                data3: 0,
            },
            6 => Link {
                command: LinkCmd::PgN,
                data1: self.bits(6, 7),
                data2: button,
                data3: 0,
            },
            7 => Link {
                command: LinkCmd::CN,
                data1: self.bits(7, 8),
                data2: button,
                data3: 0,
            },
            _ => return None,
        };
        cond.then_some(link)
    }

    fn jump(&self, cond: bool) -> Option<Link> {
        let link = match self.bits(51, 4) {
            1 => Link::exit(),
            2 => Link::with(LinkCmd::JumpTt, self.bits(22, 7)),
            3 => Link::with(LinkCmd::JumpVtsTt, self.bits(22, 7)),
            5 => Link {
                command: LinkCmd::JumpVtsPtt,
                data1: self.bits(22, 7),
                data2: self.bits(41, 10),
                data3: 0,
            },
            6 => match self.bits(23, 2) {
                0 => Link::new(LinkCmd::JumpSsFp),
                1 => Link::with(LinkCmd::JumpSsVmgmMenu, self.bits(19, 4)),
                2 => Link {
                    command: LinkCmd::JumpSsVtsm,
                    data1: self.bits(31, 8),
                    data2: self.bits(39, 8),
                    data3: self.bits(19, 4),
                },
                _ => Link::with(LinkCmd::JumpSsVmgmPgc, self.bits(46, 15)),
            },
            8 => match self.bits(23, 2) {
                0 => Link::with(LinkCmd::CallSsFp, self.bits(31, 8)),
                1 => Link {
                    command: LinkCmd::CallSsVmgmMenu,
                    data1: self.bits(19, 4),
                    data2: self.bits(31, 8),
                    data3: 0,
                },
                2 => Link {
                    command: LinkCmd::CallSsVtsm,
                    data1: self.bits(19, 4),
                    data2: self.bits(31, 8),
                    data3: 0,
                },
                _ => Link {
                    command: LinkCmd::CallSsVmgmPgc,
                    data1: self.bits(46, 15),
                    data2: self.bits(31, 8),
                    data3: 0,
                },
            },
            _ => return None,
        };
        cond.then_some(link)
    }

    // ========================================================================
    // Set instructions
    // ========================================================================

    fn system_set(&mut self, cond: bool) -> Option<Link> {
        let immediate = self.flag(60);
        match self.bits(59, 4) {
            1 => {
                // audio, subpicture and angle, each enabled by its own flag byte
                for (i, sprm) in [(1u8, SPRM_AUDIO_STREAM), (2, SPRM_SPU_STREAM), (3, SPRM_ANGLE)] {
                    if self.flag(63 - (2 + i) * 8) {
                        let data = self.reg_or_data_2(immediate, 47 - i * 8);
                        if cond {
                            self.regs.set_sprm(sprm, data);
                        }
                    }
                }
            }
            2 => {
                let timer = self.reg_or_data(immediate, 47);
                let pgc = self.bits(23, 8);
                if cond {
                    self.regs.set_sprm(SPRM_NAV_TIMER, timer);
                    self.regs.set_sprm(SPRM_TIMER_PGC, pgc);
                }
            }
            3 => {
                let data = self.reg_or_data(immediate, 47);
                let gprm = self.bits(19, 4) as usize;
                self.regs.set_counter_mode(gprm, self.flag(23));
                if cond {
                    self.regs.set_gprm(gprm, data);
                }
            }
            6 => {
                let button = self.reg_or_data(immediate, 31);
                if cond {
                    self.regs.set_sprm(SPRM_HIGHLIGHT_BUTTON, button);
                }
            }
            _ => {}
        }
        if self.bits(51, 4) != 0 {
            self.link(cond)
        } else {
            None
        }
    }

    fn set_v1(&mut self, cond: bool) {
        let op = self.bits(59, 4);
        let reg = self.bits(35, 4) as usize;
        let reg2 = self.bits(19, 4) as usize;
        let data = self.reg_or_data(self.flag(60), 31);
        if cond {
            self.set_op(op, reg, reg2, data);
        }
    }

    fn set_v2(&mut self, cond: bool) {
        let op = self.bits(59, 4);
        let reg = self.bits(51, 4) as usize;
        let reg2 = self.bits(35, 4) as usize;
        let data = self.reg_or_data(self.flag(60), 47);
        if cond {
            self.set_op(op, reg, reg2, data);
        }
    }

    fn set_op(&mut self, op: u16, reg: usize, reg2: usize, data: u16) {
        let current = u32::from(self.regs.gprm(reg));
        let data32 = u32::from(data);
        let value = match op {
            0 => return,
            1 => data,
            2 => {
                self.regs.set_gprm(reg2, current as u16);
                data
            }
            3 => (current + data32).min(0xFFFF) as u16,
            4 => current.saturating_sub(data32) as u16,
            5 => (current * data32).min(0xFFFF) as u16,
            6 => current.checked_div(data32).map_or(0xFFFF, |v| v as u16),
            7 => current.checked_rem(data32).map_or(0xFFFF, |v| v as u16),
            8 => {
                let span = f64::from(data.saturating_sub(1));
                let u: f64 = self.rng.random();
                1 + (span * u).round() as u16
            }
            9 => current as u16 & data,
            10 => current as u16 | data,
            11 => current as u16 ^ data,
            op => {
                tracing::warn!(target: "dvdnav::vm", "unknown set operation {} ignored", op);
                return;
            }
        };
        self.regs.set_gprm(reg, value);
    }
}
