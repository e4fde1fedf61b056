//! Playback state machine.
//!
//! `process_command` consumes a `Link` and walks the PGC / program / cell
//! hierarchy until it reaches a cell to play (`PlayThis`) or `Exit`. The
//! `play_*` helpers run PGC pre, post and cell command tables on the way and
//! may produce a new link, which the loop then follows.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::NavConfig;
use crate::disc::DiscImage;
use crate::ifo::attributes::VideoAttr;
use crate::ifo::pgc::{BLOCK_MODE_FIRST_CELL, BLOCK_MODE_IN_BLOCK, BLOCK_MODE_NOT_IN_BLOCK, BLOCK_TYPE_ANGLE_BLOCK};
use crate::ifo::time::PTS_HZ;
use crate::ifo::{self, IfoError, Pgc, PgciUt, Pgcit, StrictnessPolicy, VmgiHandle, VtsiHandle};

use super::command;
use super::link::{Link, LinkCmd};
use super::registers::{
    Clock, Registers, SystemClock, SPRM_ANGLE, SPRM_AUDIO_STREAM, SPRM_MENU_LANG, SPRM_PART, SPRM_SPU_STREAM,
    SPRM_TITLE, SPRM_TITLE_PGC, SPRM_VIDEO_PREF, SPRM_VTS_TITLE,
};
use super::state::{Domain, DvdState, Position};
use super::{VmError, VmResult};

/// Hop increment of a seek, as opposed to a plain jump.
pub const HOP_SEEK: u32 = 0x1000;

/// PGCs entered by one `process_command` before the chain is declared broken.
const MAX_PGC_ENTRIES: u32 = 256;

/// Menu entry ids of the PGCI search pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MenuId {
    Escape = 0,
    Title = 2,
    Root = 3,
    Subpicture = 4,
    Audio = 5,
    Angle = 6,
    Part = 7,
}

/// Subpicture presentation variant on a 16:9 source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpMode {
    Widescreen,
    Letterbox,
    PanScan,
}

pub struct Vm {
    disc: Arc<DiscImage>,
    config: NavConfig,
    policy: Arc<dyn StrictnessPolicy>,
    vmgi: VmgiHandle,
    vtsi: Option<VtsiHandle>,
    state: DvdState,
    rng: StdRng,
    hop_channel: u32,
    stopped: bool,
    pgc_entries: u32,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("state", &self.state)
            .field("hop_channel", &self.hop_channel)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl Vm {
    pub fn new(disc: Arc<DiscImage>, config: NavConfig) -> VmResult<Self> {
        Self::with_clock(disc, config, Arc::new(SystemClock::new()))
    }

    /// Builds a VM whose GPRM counters run on `clock`.
    pub fn with_clock(disc: Arc<DiscImage>, config: NavConfig, clock: Arc<dyn Clock>) -> VmResult<Self> {
        let policy = config.policy();
        let vmgi = ifo::open(&disc.vmg, 0, policy.as_ref())?
            .into_vmgi()
            .ok_or(IfoError::WrongVariant {
                title: 0,
                found: "VTSI",
            })?;
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let registers = Registers::with_defaults(clock, &config);
        tracing::info!(
            target: "dvdnav::vm",
            "video manager loaded: {} titles in {} title sets",
            vmgi.tt_srpt.titles.len(),
            vmgi.mat.vmg_nr_of_title_sets
        );
        Ok(Self {
            disc,
            config,
            policy,
            vmgi,
            vtsi: None,
            state: DvdState::new(registers),
            rng,
            hop_channel: 0,
            stopped: true,
            pgc_entries: 0,
        })
    }

    /// Back to power-on state. The video manager stays loaded.
    pub fn reset(&mut self) {
        let mut registers = self.state.registers.clone();
        registers.reset(&self.config);
        self.state = DvdState::new(registers);
        self.vtsi = None;
        self.hop_channel = 0;
    }

    /// Starts (or restarts after a stop) from the first play PGC.
    pub fn start(&mut self) -> VmResult<bool> {
        if self.stopped {
            self.reset();
            self.stopped = false;
        }
        self.set_fp_pgc()?;
        let link = self.play_pgc()?;
        self.process_command(link)?;
        Ok(!self.stopped)
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn state(&self) -> &DvdState {
        &self.state
    }

    pub fn registers(&self) -> &Registers {
        &self.state.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.state.registers
    }

    pub fn vmgi(&self) -> &VmgiHandle {
        &self.vmgi
    }

    pub fn vtsi(&self) -> Option<&VtsiHandle> {
        self.vtsi.as_ref()
    }

    pub fn hop_channel(&self) -> u32 {
        self.hop_channel
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    fn pgc(&self) -> VmResult<Arc<Pgc>> {
        self.state
            .pgc
            .clone()
            .ok_or_else(|| VmError::Invariant("no PGC loaded".to_string()))
    }

    fn hop(&mut self, jumped: bool, amount: u32) -> bool {
        if jumped {
            self.hop_channel = self.hop_channel.wrapping_add(amount);
        }
        jumped
    }

    fn set_button(&mut self, button: u16) {
        if button != 0 {
            self.state.registers.set_highlighted_button(button);
        }
    }

    // ========================================================================
    // User navigation
    // ========================================================================

    pub fn jump_pg(&mut self, pg_n: u16) -> VmResult<bool> {
        self.state.pg_n = pg_n;
        let link = self.play_pg()?;
        self.process_command(link)?;
        Ok(self.hop(true, 1))
    }

    /// Seeks to a block of a cell.
    pub fn jump_cell_block(&mut self, cell_n: u16, block_n: u32) -> VmResult<bool> {
        self.state.cell_n = cell_n;
        let link = self.play_cell()?;
        self.process_command(link)?;
        // angle blocks may have moved us to another cell
        if self.state.cell_n == cell_n {
            self.state.block_n = block_n;
        }
        Ok(self.hop(true, HOP_SEEK))
    }

    /// Plays a program of a title directly. Jumps made by the PGC pre commands
    /// are ignored, as some discs use them to bounce back to a menu.
    pub fn jump_title_program(&mut self, title: u16, pgc_n: u16, pg_n: u16) -> VmResult<bool> {
        if !self.set_prog(title, pgc_n, pg_n)? {
            return Ok(false);
        }
        self.enter_program_skipping_jumps()?;
        Ok(self.hop(true, 1))
    }

    pub fn jump_title_part(&mut self, title: u16, part: u16) -> VmResult<bool> {
        if !self.set_ptt(title, part)? {
            return Ok(false);
        }
        self.enter_program_skipping_jumps()?;
        Ok(self.hop(true, 1))
    }

    fn enter_program_skipping_jumps(&mut self) -> VmResult<()> {
        let link = self.play_pgc_pg(self.state.pg_n)?;
        let link = if link.command != LinkCmd::PlayThis {
            tracing::debug!(target: "dvdnav::vm", "ignoring pre command jump {}", link);
            self.play_pg()?
        } else {
            link
        };
        self.process_command(link)?;
        Ok(())
    }

    pub fn jump_top_pg(&mut self) -> VmResult<bool> {
        let link = self.play_pg()?;
        self.process_command(link)?;
        Ok(self.hop(true, 1))
    }

    pub fn jump_next_pg(&mut self) -> VmResult<bool> {
        let pgc = self.pgc()?;
        if self.state.pg_n >= u16::from(pgc.nr_of_programs) {
            let link = self.play_pgc_post()?;
            self.process_command(link)?;
            return Ok(self.hop(true, 1));
        }
        self.jump_pg(self.state.pg_n + 1)
    }

    pub fn jump_prev_pg(&mut self) -> VmResult<bool> {
        if self.state.pg_n > 1 {
            return self.jump_pg(self.state.pg_n - 1);
        }
        // first program: last program of the previous PGC
        let pgc = self.pgc()?;
        if pgc.prev_pgc_nr == 0 || !self.set_pgcn(pgc.prev_pgc_nr) {
            return Ok(false);
        }
        let link = self.play_pgc()?;
        self.process_command(link)?;
        let last = self.pgc()?.nr_of_programs;
        self.jump_pg(u16::from(last))
    }

    pub fn jump_up(&mut self) -> VmResult<bool> {
        let pgc = self.pgc()?;
        if pgc.goup_pgc_nr == 0 || !self.set_pgcn(pgc.goup_pgc_nr) {
            return Ok(false);
        }
        let link = self.play_pgc()?;
        self.process_command(link)?;
        Ok(self.hop(true, 1))
    }

    /// Calls a menu. `Escape` resumes when already in a menu, otherwise it
    /// acts as `Root`.
    pub fn jump_menu(&mut self, menu: MenuId) -> VmResult<bool> {
        if menu == MenuId::Escape && self.state.domain != Domain::VtsTitle && self.jump_resume()? {
            return Ok(true);
        }
        let menu = if menu == MenuId::Escape { MenuId::Root } else { menu };
        let old_domain = self.state.domain;
        match old_domain {
            Domain::FirstPlay => return Ok(false),
            Domain::VtsTitle => self.set_rsm_info(0, self.state.block_n),
            Domain::VtsMenu | Domain::Vmgm => {}
        }
        match menu {
            MenuId::Title => {
                if self.vmgi.pgci_ut.is_none() {
                    return Ok(false);
                }
                self.state.domain = Domain::Vmgm;
            }
            _ => {
                if self.vtsi.as_ref().is_none_or(|v| v.pgci_ut.is_none()) {
                    return Ok(false);
                }
                self.state.domain = Domain::VtsMenu;
            }
        }
        if self.current_pgcit().is_some() && self.set_menu(menu as u8) {
            let link = self.play_pgc()?;
            self.process_command(link)?;
            return Ok(self.hop(true, 1));
        }
        self.state.domain = old_domain;
        Ok(false)
    }

    pub fn jump_resume(&mut self) -> VmResult<bool> {
        if self.state.resume.vts_n == 0 {
            return Ok(false);
        }
        let jumped = self.process_command(Link::new(LinkCmd::Rsm))?;
        Ok(self.hop(jumped, 1))
    }

    /// Runs one instruction, typically a button command. `true` when it jumped.
    pub fn exec_cmd(&mut self, instruction: u64) -> VmResult<bool> {
        match command::eval_command(instruction, &mut self.state.registers, &mut self.rng)? {
            Some(link) => {
                let jumped = self.process_command(link)?;
                Ok(self.hop(jumped, 1))
            }
            None => Ok(false),
        }
    }

    /// Leaves the current cell, running its cell command.
    pub fn get_next_cell(&mut self) -> VmResult<()> {
        let link = self.play_cell_post()?;
        self.process_command(link)?;
        Ok(())
    }

    /// Records the VOBU being played so a later `RSM` resumes there.
    pub fn set_block(&mut self, block_n: u32) {
        self.state.block_n = block_n;
    }

    pub fn set_angle(&mut self, angle: u16) -> bool {
        let (_, available) = self.angle_info();
        if angle == 0 || angle > available {
            return false;
        }
        self.state.registers.set_sprm(SPRM_ANGLE, angle);
        true
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn position(&self) -> Option<Position> {
        let pgc = self.state.pgc.as_ref()?;
        let cell = pgc.cell(usize::from(self.state.cell_n))?;
        let regs = &self.state.registers;

        let mut still = cell.still_time;
        if self.state.cell_n == u16::from(pgc.nr_of_cells) {
            still = still.saturating_add(pgc.still_time);
        }
        // Some discs mark a still only by a single VOBU cell that lasts far
        // longer than its data rate allows.
        if still == 0 && cell.first_sector == cell.last_vobu_start_sector {
            let size = u64::from(cell.last_sector.saturating_sub(cell.first_sector));
            let seconds = cell.playback_time.to_pts() / PTS_HZ;
            if seconds != 0 && size / seconds <= 30 {
                still = seconds.min(0xFF) as u8;
            }
        }

        Some(Position {
            button: regs.highlighted_button(),
            vts: self.state.vts_n,
            domain: Some(self.state.domain),
            spu_channel: regs.sprm(SPRM_SPU_STREAM),
            audio_channel: regs.sprm(SPRM_AUDIO_STREAM),
            angle_channel: regs.sprm(SPRM_ANGLE),
            hop_channel: self.hop_channel,
            cell: self.state.cell_n,
            cell_restart: self.state.cell_restart,
            cell_start: cell.first_sector,
            still,
            block: self.state.block_n,
        })
    }

    pub fn current_menu(&self) -> Option<u8> {
        let pgcit = self.current_pgcit()?;
        let srp = pgcit.srps.get(usize::from(self.state.pgc_n).checked_sub(1)?)?;
        Some(srp.entry_id & 0x0F)
    }

    /// `(title, part)` of the current program.
    pub fn current_title_part(&self) -> Option<(u16, u16)> {
        let vtsi = self.vtsi.as_ref()?;
        let pgc_n = self.state.pgc_n;
        let pg_n = self.state.pg_n;
        for (ttn, title) in vtsi.vts_ptt_srpt.titles.iter().enumerate() {
            for (part, ptt) in title.ptts.iter().enumerate() {
                if ptt.pgcn != pgc_n {
                    continue;
                }
                let found = if ptt.pgn == pg_n {
                    Some(part)
                } else if part > 0 && ptt.pgn > pg_n && title.ptts[part - 1].pgn < pg_n {
                    Some(part - 1)
                } else {
                    None
                };
                if let Some(part) = found {
                    let title = self.find_title(self.state.vts_n, (ttn + 1) as u16);
                    return Some((title, (part + 1) as u16));
                }
            }
        }
        tracing::debug!(target: "dvdnav::vm", "no chapter holds pgc {} program {}", pgc_n, pg_n);
        None
    }

    /// `(current, available)` angles. Outside a title there is one angle.
    pub fn angle_info(&self) -> (u16, u16) {
        if self.state.domain != Domain::VtsTitle {
            return (1, 1);
        }
        let regs = &self.state.registers;
        let Some(title) = self.vmgi.tt_srpt.title(usize::from(regs.sprm(SPRM_TITLE))) else {
            return (1, 1);
        };
        if title.title_set_nr != self.state.vts_n || u16::from(title.vts_ttn) != regs.sprm(SPRM_VTS_TITLE) {
            return (1, 1);
        }
        (regs.angle(), u16::from(title.nr_of_angles))
    }

    /// Physical audio stream of logical stream `audio_n`.
    pub fn audio_stream(&self, audio_n: u16) -> Option<u8> {
        let pgc = self.state.pgc.as_ref()?;
        let in_title = self.state.domain == Domain::VtsTitle;
        let audio_n = if in_title { usize::from(audio_n) } else { 0 };
        let stream = pgc
            .audio_control
            .get(audio_n)
            .filter(|control| **control & 0x8000 != 0)
            .map(|control| ((control >> 8) & 0x07) as u8);
        if in_title {
            stream
        } else {
            Some(stream.unwrap_or(0))
        }
    }

    /// Physical subpicture stream of logical stream `subp_n`.
    pub fn subp_stream(&self, subp_n: u16, mode: SubpMode) -> Option<u8> {
        let pgc = self.state.pgc.as_ref()?;
        let in_title = self.state.domain == Domain::VtsTitle;
        let subp_n = if in_title { usize::from(subp_n) } else { 0 };
        let aspect = self.video_attr().display_aspect_ratio;
        let stream = pgc
            .subp_control
            .get(subp_n)
            .filter(|control| **control & 0x8000_0000 != 0)
            .and_then(|control| match (aspect, mode) {
                (0, _) => Some((control >> 24) & 0x1F),
                (3, SubpMode::Widescreen) => Some((control >> 16) & 0x1F),
                (3, SubpMode::Letterbox) => Some((control >> 8) & 0x1F),
                (3, SubpMode::PanScan) => Some(control & 0x1F),
                _ => None,
            })
            .map(|s| s as u8);
        if in_title {
            stream
        } else {
            Some(stream.unwrap_or(0))
        }
    }

    /// Selected audio stream, or the first available one.
    pub fn audio_active_stream(&self) -> Option<u8> {
        let selected = self.state.registers.sprm(SPRM_AUDIO_STREAM);
        self.audio_stream(selected).or_else(|| {
            let pgc = self.state.pgc.as_ref()?;
            (0..8u16)
                .filter(|n| pgc.audio_control[usize::from(*n)] & 0x8000 != 0)
                .find_map(|n| self.audio_stream(n))
        })
    }

    /// Selected subpicture stream, or the first available one. Bit 7 of the
    /// result is set in titles when the stream is hidden except for forced
    /// subpictures.
    pub fn subp_active_stream(&self, mode: SubpMode) -> Option<u8> {
        let spst = self.state.registers.sprm(SPRM_SPU_STREAM);
        let stream = self.subp_stream(spst & !0x40, mode).or_else(|| {
            let pgc = self.state.pgc.as_ref()?;
            (0..32u16)
                .filter(|n| pgc.subp_control[usize::from(*n)] & 0x8000_0000 != 0)
                .find_map(|n| self.subp_stream(n, mode))
        })?;
        if self.state.domain == Domain::VtsTitle && spst & 0x40 == 0 {
            Some(stream | 0x80)
        } else {
            Some(stream)
        }
    }

    pub fn video_attr(&self) -> VideoAttr {
        match (self.state.domain, self.vtsi.as_ref()) {
            (Domain::VtsTitle, Some(vtsi)) => vtsi.mat.vts_video_attr,
            (Domain::VtsMenu, Some(vtsi)) => vtsi.mat.vtsm_video_attr,
            _ => self.vmgi.mat.vmgm_video_attr,
        }
    }

    /// Display aspect (0 = 4:3, 3 = 16:9), mirrored into SPRM 14.
    pub fn video_aspect(&mut self) -> Option<u8> {
        let aspect = self.video_attr().display_aspect_ratio;
        if aspect != 0 && aspect != 3 {
            tracing::warn!(target: "dvdnav::vm", "unexpected display aspect ratio {}", aspect);
            return None;
        }
        let pref = self.state.registers.sprm(SPRM_VIDEO_PREF) & !(0x3 << 10);
        self.state
            .registers
            .set_sprm(SPRM_VIDEO_PREF, pref | (u16::from(aspect) << 10));
        Some(aspect)
    }

    pub fn video_scale_permission(&self) -> u8 {
        self.video_attr().permitted_df
    }

    // ========================================================================
    // Playback
    // ========================================================================

    fn eval(&mut self, commands: &[u64]) -> VmResult<Option<Link>> {
        if commands.is_empty() {
            return Ok(None);
        }
        command::eval_commands(commands, &mut self.state.registers, &mut self.rng)
    }

    fn enter_pgc(&mut self) -> VmResult<()> {
        self.pgc_entries += 1;
        if self.pgc_entries > MAX_PGC_ENTRIES {
            return Err(VmError::Invariant(format!(
                "PGC chain entered {MAX_PGC_ENTRIES} PGCs without reaching a cell"
            )));
        }
        Ok(())
    }

    fn play_pgc(&mut self) -> VmResult<Link> {
        self.play_pgc_pg(1)
    }

    fn play_pgc_pg(&mut self, pg_n: u16) -> VmResult<Link> {
        self.enter_pgc()?;
        // set before the pre commands, a CallSS among them snapshots it
        self.state.pg_n = pg_n;
        self.state.cell_n = 0;
        self.state.block_n = 0;

        let pgc = self.pgc()?;
        if let Some(link) = self.eval(pgc.pre_cmds())? {
            return Ok(link);
        }
        self.play_pg()
    }

    fn play_pgc_post(&mut self) -> VmResult<Link> {
        let pgc = self.pgc()?;
        if let Some(link) = self.eval(pgc.post_cmds())? {
            return Ok(link);
        }
        if !self.set_pgcn(pgc.next_pgc_nr) {
            return Ok(Link::exit());
        }
        self.play_pgc()
    }

    fn play_pg(&mut self) -> VmResult<Link> {
        let pgc = self.pgc()?;
        if self.state.pg_n > u16::from(pgc.nr_of_programs) {
            return self.play_pgc_post();
        }
        let cell = match pgc.program_entry_cell(usize::from(self.state.pg_n)) {
            Some(cell) => cell,
            None => {
                tracing::warn!(target: "dvdnav::vm", "program {} does not exist, playing program 1", self.state.pg_n);
                self.state.pg_n = 1;
                pgc.program_entry_cell(1)
                    .ok_or_else(|| VmError::Invariant("PGC without programs".to_string()))?
            }
        };
        self.state.cell_n = u16::from(cell);
        self.play_cell()
    }

    fn play_cell(&mut self) -> VmResult<Link> {
        let pgc = self.pgc()?;
        if self.state.cell_n == 0 {
            tracing::warn!(target: "dvdnav::vm", "link to cell 0, playing cell 1");
            self.state.cell_n = 1;
        }
        if self.state.cell_n > u16::from(pgc.nr_of_cells) {
            return self.play_pgc_post();
        }

        let Some(&cell) = pgc.cell(usize::from(self.state.cell_n)) else {
            // lenient decoding keeps PGCs whose cell table is missing or short
            tracing::warn!(target: "dvdnav::vm", "cell {} is missing from the cell table", self.state.cell_n);
            return self.play_pgc_post();
        };
        match cell.block_mode {
            BLOCK_MODE_NOT_IN_BLOCK => {}
            BLOCK_MODE_FIRST_CELL if cell.block_type == BLOCK_TYPE_ANGLE_BLOCK => {
                let offset = self.state.registers.angle().saturating_sub(1);
                let target = self.state.cell_n.saturating_add(offset);
                let valid = pgc
                    .cell(usize::from(target))
                    .is_some_and(|c| c.block_mode != BLOCK_MODE_NOT_IN_BLOCK && c.block_type == BLOCK_TYPE_ANGLE_BLOCK);
                if valid {
                    self.state.cell_n = target;
                } else if self.config.strict {
                    return Err(VmError::Invariant(format!(
                        "angle {} leaves the angle block at cell {}",
                        offset + 1,
                        self.state.cell_n
                    )));
                } else {
                    tracing::warn!(
                        target: "dvdnav::vm",
                        "invalid angle block: angle {} from cell {}, staying on the first angle",
                        offset + 1,
                        self.state.cell_n
                    );
                }
            }
            BLOCK_MODE_FIRST_CELL => {
                tracing::warn!(target: "dvdnav::vm", "unknown block type {} at cell {}", cell.block_type, self.state.cell_n);
            }
            _ => {
                tracing::debug!(target: "dvdnav::vm", "entered block at cell {} instead of its first cell", self.state.cell_n);
            }
        }

        if !self.set_pgn()? {
            return self.play_pgc_post();
        }
        self.state.cell_restart = self.state.cell_restart.wrapping_add(1);
        self.state.block_n = 0;
        Ok(Link::play_this())
    }

    fn play_cell_post(&mut self) -> VmResult<Link> {
        let pgc = self.pgc()?;
        let cell = *pgc
            .cell(usize::from(self.state.cell_n))
            .ok_or_else(|| VmError::Invariant(format!("cell {} is not in the PGC", self.state.cell_n)))?;

        // still time is handled by the navigator before this point
        if cell.cell_cmd_nr != 0 {
            match pgc.cell_cmds().get(usize::from(cell.cell_cmd_nr) - 1) {
                Some(&cmd) => {
                    if let Some(link) = self.eval(&[cmd])? {
                        return Ok(link);
                    }
                }
                None => tracing::debug!(target: "dvdnav::vm", "cell command {} does not exist", cell.cell_cmd_nr),
            }
        }

        if cell.block_mode != BLOCK_MODE_NOT_IN_BLOCK && cell.block_type == BLOCK_TYPE_ANGLE_BLOCK {
            // skip the other angles of the block
            self.state.cell_n += 1;
            while pgc
                .cell(usize::from(self.state.cell_n))
                .is_some_and(|c| c.block_mode >= BLOCK_MODE_IN_BLOCK)
            {
                self.state.cell_n += 1;
            }
        } else {
            if cell.block_mode != BLOCK_MODE_NOT_IN_BLOCK {
                tracing::warn!(target: "dvdnav::vm", "unknown block type {} at cell {}", cell.block_type, self.state.cell_n);
            }
            self.state.cell_n += 1;
        }

        if !self.set_pgn()? {
            return self.play_pgc_post();
        }
        self.play_cell()
    }

    // ========================================================================
    // Link processing
    // ========================================================================

    /// Follows `link` until a cell is ready to play. `false` when no jump
    /// happened (a plain button update) or the VM stopped.
    pub fn process_command(&mut self, mut link: Link) -> VmResult<bool> {
        self.pgc_entries = 0;
        while link.command != LinkCmd::PlayThis {
            tracing::trace!(target: "dvdnav::vm", "process {}", link);
            link = match link.command {
                LinkCmd::NoLink => {
                    self.set_button(link.data1);
                    return Ok(false);
                }
                LinkCmd::TopC => {
                    self.set_button(link.data1);
                    self.play_cell()?
                }
                LinkCmd::NextC => {
                    self.set_button(link.data1);
                    self.state.cell_n += 1;
                    self.play_cell()?
                }
                LinkCmd::PrevC => {
                    self.set_button(link.data1);
                    if self.state.cell_n > 1 {
                        self.state.cell_n -= 1;
                    } else {
                        tracing::warn!(target: "dvdnav::vm", "PrevC on the first cell");
                    }
                    self.play_cell()?
                }
                LinkCmd::TopPg => {
                    self.set_button(link.data1);
                    self.play_pg()?
                }
                LinkCmd::NextPg => {
                    self.set_button(link.data1);
                    self.state.pg_n += 1;
                    self.play_pg()?
                }
                LinkCmd::PrevPg => {
                    self.set_button(link.data1);
                    if self.state.pg_n > 1 {
                        self.state.pg_n -= 1;
                    } else {
                        tracing::warn!(target: "dvdnav::vm", "PrevPG on the first program");
                    }
                    self.play_pg()?
                }
                LinkCmd::TopPgc => {
                    self.set_button(link.data1);
                    self.play_pgc()?
                }
                LinkCmd::NextPgc | LinkCmd::PrevPgc | LinkCmd::GoUpPgc => {
                    self.set_button(link.data1);
                    let pgc = self.pgc()?;
                    let target = match link.command {
                        LinkCmd::NextPgc => pgc.next_pgc_nr,
                        LinkCmd::PrevPgc => pgc.prev_pgc_nr,
                        _ => pgc.goup_pgc_nr,
                    };
                    if self.set_pgcn(target) {
                        self.play_pgc()?
                    } else {
                        Link::exit()
                    }
                }
                LinkCmd::TailPgc => {
                    self.set_button(link.data1);
                    self.play_pgc_post()?
                }
                LinkCmd::Rsm => self.resume(link.data1)?,
                LinkCmd::PgcN => {
                    if self.set_pgcn(link.data1) {
                        self.play_pgc()?
                    } else {
                        tracing::warn!(target: "dvdnav::vm", "link to missing PGC {}", link.data1);
                        Link::exit()
                    }
                }
                LinkCmd::PttN => {
                    if self.state.domain != Domain::VtsTitle {
                        tracing::warn!(target: "dvdnav::vm", "LinkPTTN outside a title");
                    }
                    self.set_button(link.data2);
                    let vts_ttn = self.state.registers.sprm(SPRM_VTS_TITLE);
                    if self.set_vts_ptt(self.state.vts_n, vts_ttn, link.data1)? {
                        self.play_pg()?
                    } else {
                        Link::exit()
                    }
                }
                LinkCmd::PgN => {
                    self.set_button(link.data2);
                    self.state.pg_n = link.data1;
                    self.play_pg()?
                }
                LinkCmd::CN => {
                    self.set_button(link.data2);
                    self.state.cell_n = link.data1;
                    self.play_cell()?
                }
                LinkCmd::Exit => {
                    tracing::info!(target: "dvdnav::vm", "playback stopped");
                    self.stopped = true;
                    return Ok(false);
                }
                LinkCmd::JumpTt => {
                    self.expect_domain(link, &[Domain::Vmgm, Domain::FirstPlay]);
                    if self.set_tt(link.data1)? {
                        self.play_pgc()?
                    } else {
                        Link::exit()
                    }
                }
                LinkCmd::JumpVtsTt => {
                    self.expect_domain(link, &[Domain::VtsMenu, Domain::VtsTitle]);
                    if self.set_vts_ptt(self.state.vts_n, link.data1, 1)? {
                        self.play_pgc()?
                    } else {
                        Link::exit()
                    }
                }
                LinkCmd::JumpVtsPtt => {
                    self.expect_domain(link, &[Domain::VtsMenu, Domain::VtsTitle]);
                    if self.set_vts_ptt(self.state.vts_n, link.data1, link.data2)? {
                        self.play_pgc_pg(self.state.pg_n)?
                    } else {
                        Link::exit()
                    }
                }
                LinkCmd::JumpSsFp => {
                    self.expect_domain(link, &[Domain::Vmgm, Domain::VtsMenu]);
                    self.set_fp_pgc()?;
                    self.play_pgc()?
                }
                LinkCmd::JumpSsVmgmMenu => {
                    self.expect_domain(link, &[Domain::FirstPlay, Domain::Vmgm, Domain::VtsMenu]);
                    self.enter_vmgm(|vm| vm.set_menu(link.data1 as u8))?
                }
                LinkCmd::JumpSsVmgmPgc => {
                    self.expect_domain(link, &[Domain::FirstPlay, Domain::Vmgm, Domain::VtsMenu]);
                    self.enter_vmgm(|vm| vm.set_pgcn(link.data1))?
                }
                LinkCmd::JumpSsVtsm => self.jump_vtsm(link)?,
                LinkCmd::CallSsFp => {
                    self.expect_domain(link, &[Domain::VtsTitle]);
                    self.set_rsm_info(link.data1, 0);
                    self.set_fp_pgc()?;
                    self.play_pgc()?
                }
                LinkCmd::CallSsVmgmMenu => {
                    self.expect_domain(link, &[Domain::VtsTitle]);
                    if self.vmgi.pgci_ut.is_none() {
                        Link::exit()
                    } else {
                        self.set_rsm_info(link.data2, 0);
                        self.enter_vmgm(|vm| vm.set_menu(link.data1 as u8))?
                    }
                }
                LinkCmd::CallSsVtsm => {
                    self.expect_domain(link, &[Domain::VtsTitle]);
                    if self.vtsi.as_ref().is_none_or(|v| v.pgci_ut.is_none()) {
                        Link::exit()
                    } else {
                        self.set_rsm_info(link.data2, 0);
                        self.state.domain = Domain::VtsMenu;
                        self.play_menu(link.data1 as u8)?
                    }
                }
                LinkCmd::CallSsVmgmPgc => {
                    self.expect_domain(link, &[Domain::VtsTitle]);
                    if self.vmgi.pgci_ut.is_none() {
                        Link::exit()
                    } else {
                        self.set_rsm_info(link.data2, 0);
                        self.enter_vmgm(|vm| vm.set_pgcn(link.data1))?
                    }
                }
                LinkCmd::PlayThis => unreachable!("loop condition"),
            };
        }
        self.state.block_n = link.block();
        Ok(true)
    }

    fn expect_domain(&self, link: Link, allowed: &[Domain]) {
        if !allowed.contains(&self.state.domain) {
            tracing::debug!(target: "dvdnav::vm", "{} from unexpected domain {:?}", link, self.state.domain);
        }
    }

    /// Switches to the VMGM domain and selects a PGC there.
    fn enter_vmgm(&mut self, select: impl FnOnce(&mut Self) -> bool) -> VmResult<Link> {
        if self.vmgi.pgci_ut.is_none() {
            return Ok(Link::exit());
        }
        self.state.domain = Domain::Vmgm;
        if !select(self) {
            tracing::warn!(target: "dvdnav::vm", "video manager menu PGC not found");
            return Ok(Link::exit());
        }
        self.play_pgc()
    }

    fn play_menu(&mut self, menu: u8) -> VmResult<Link> {
        if !self.set_menu(menu) {
            tracing::warn!(target: "dvdnav::vm", "menu {} not found in {:?}", menu, self.state.domain);
            return Ok(Link::exit());
        }
        self.play_pgc()
    }

    fn jump_vtsm(&mut self, link: Link) -> VmResult<Link> {
        let vts_n = link.data1 as u8;
        if vts_n != 0 {
            if vts_n != self.state.vts_n {
                self.expect_domain(link, &[Domain::Vmgm, Domain::FirstPlay]);
                self.open_vtsi(vts_n)?;
            } else {
                self.expect_domain(link, &[Domain::VtsMenu, Domain::Vmgm, Domain::FirstPlay]);
            }
            if self.vtsi.as_ref().is_none_or(|v| v.pgci_ut.is_none()) {
                return Ok(Link::exit());
            }
            self.state.domain = Domain::VtsMenu;
        } else {
            self.expect_domain(link, &[Domain::VtsMenu]);
        }
        self.state.registers.set_sprm(SPRM_VTS_TITLE, link.data2);
        let title = self.find_title(self.state.vts_n, link.data2);
        self.state.registers.set_sprm(SPRM_TITLE, title);
        self.play_menu(link.data3 as u8)
    }

    fn resume(&mut self, button: u16) -> VmResult<Link> {
        let rsm = self.state.resume;
        if rsm.vts_n == 0 {
            tracing::warn!(target: "dvdnav::vm", "resume without resume information");
            return Ok(Link::exit());
        }
        self.state.domain = Domain::VtsTitle;
        self.open_vtsi(rsm.vts_n)?;
        if !self.set_pgcn(rsm.pgc_n) {
            tracing::warn!(target: "dvdnav::vm", "resume PGC {} is gone", rsm.pgc_n);
            return Ok(Link::exit());
        }
        for (i, value) in rsm.regs.iter().enumerate() {
            self.state.registers.set_sprm(SPRM_TITLE + i, *value);
        }
        self.set_button(button);

        if rsm.cell_n == 0 {
            self.state.pg_n = 1;
            return self.play_pg();
        }
        self.state.cell_n = rsm.cell_n;
        if !self.set_pgn()? {
            return Ok(Link::new(LinkCmd::TailPgc));
        }
        Ok(Link {
            command: LinkCmd::PlayThis,
            data1: (rsm.block_n & 0xFFFF) as u16,
            data2: (rsm.block_n >> 16) as u16,
            data3: 0,
        })
    }

    // ========================================================================
    // Position setters
    // ========================================================================

    fn load_vtsi(&self, vts_n: u8) -> VmResult<VtsiHandle> {
        let files = self.disc.title_set(vts_n).ok_or_else(|| IfoError::CannotOpenTitle {
            title: vts_n,
            reason: "title set is not on the disc".to_string(),
        })?;
        let handle = ifo::open(files, vts_n, self.policy.as_ref())?;
        handle.into_vtsi().ok_or_else(|| {
            IfoError::WrongVariant {
                title: vts_n,
                found: "VMGI",
            }
            .into()
        })
    }

    fn install_vtsi(&mut self, vts_n: u8, vtsi: VtsiHandle) {
        tracing::info!(target: "dvdnav::vm", "title set {} opened", vts_n);
        self.vtsi = Some(vtsi);
        self.state.vts_n = vts_n;
    }

    fn open_vtsi(&mut self, vts_n: u8) -> VmResult<()> {
        if self.state.vts_n == vts_n && self.vtsi.is_some() {
            return Ok(());
        }
        let vtsi = self.load_vtsi(vts_n)?;
        self.install_vtsi(vts_n, vtsi);
        Ok(())
    }

    fn set_tt(&mut self, tt: u16) -> VmResult<bool> {
        self.set_ptt(tt, 1)
    }

    fn set_ptt(&mut self, tt: u16, ptt: u16) -> VmResult<bool> {
        let Some(title) = self.vmgi.tt_srpt.title(usize::from(tt)) else {
            tracing::warn!(target: "dvdnav::vm", "title {} does not exist", tt);
            return Ok(false);
        };
        let (vts_n, vts_ttn) = (title.title_set_nr, u16::from(title.vts_ttn));
        self.set_vts_ptt(vts_n, vts_ttn, ptt)
    }

    /// Moves to a part of a title set title. Registers and position change
    /// together, and only when the whole target resolves.
    fn set_vts_ptt(&mut self, vts_n: u8, vts_ttn: u16, part: u16) -> VmResult<bool> {
        let loaded = self.vtsi_for(vts_n)?;
        let vtsi = loaded.as_ref().or(self.vtsi.as_ref()).ok_or_else(|| VmError::Invariant("no VTSI".to_string()))?;
        let Some(ptt) = vtsi
            .vts_ptt_srpt
            .title(usize::from(vts_ttn))
            .and_then(|t| t.part(usize::from(part)))
            .copied()
        else {
            tracing::debug!(target: "dvdnav::vm", "vts {} title {} has no part {}", vts_n, vts_ttn, part);
            return Ok(false);
        };
        let Some(pgc) = vtsi.vts_pgcit.pgc(usize::from(ptt.pgcn)).cloned() else {
            return Ok(false);
        };
        let ttn = self.find_title(vts_n, vts_ttn);
        if ttn == 0 {
            return Ok(false);
        }

        if let Some(vtsi) = loaded {
            self.install_vtsi(vts_n, vtsi);
        }
        let regs = &mut self.state.registers;
        regs.set_sprm(SPRM_TITLE_PGC, ptt.pgcn);
        regs.set_sprm(SPRM_PART, part);
        regs.set_sprm(SPRM_TITLE, ttn);
        regs.set_sprm(SPRM_VTS_TITLE, vts_ttn);
        self.state.domain = Domain::VtsTitle;
        self.state.pgc = Some(pgc);
        self.state.pgc_n = ptt.pgcn;
        self.state.pg_n = ptt.pgn;
        Ok(true)
    }

    fn set_prog(&mut self, tt: u16, pgc_n: u16, pg_n: u16) -> VmResult<bool> {
        let Some(title) = self.vmgi.tt_srpt.title(usize::from(tt)) else {
            return Ok(false);
        };
        let (vts_n, vts_ttn) = (title.title_set_nr, u16::from(title.vts_ttn));

        let loaded = self.vtsi_for(vts_n)?;
        let vtsi = loaded.as_ref().or(self.vtsi.as_ref()).ok_or_else(|| VmError::Invariant("no VTSI".to_string()))?;
        if vtsi.vts_ptt_srpt.title(usize::from(vts_ttn)).is_none() {
            return Ok(false);
        }
        let Some(pgc) = vtsi.vts_pgcit.pgc(usize::from(pgc_n)).cloned() else {
            return Ok(false);
        };
        let ttn = self.find_title(vts_n, vts_ttn);

        if let Some(vtsi) = loaded {
            self.install_vtsi(vts_n, vtsi);
        }
        let regs = &mut self.state.registers;
        regs.set_sprm(SPRM_TITLE_PGC, pgc_n);
        regs.set_sprm(SPRM_TITLE, ttn);
        regs.set_sprm(SPRM_VTS_TITLE, vts_ttn);
        self.state.domain = Domain::VtsTitle;
        self.state.pgc = Some(pgc);
        self.state.pgc_n = pgc_n;
        self.state.pg_n = pg_n;
        let part = self.current_title_part().map_or(0, |(_, part)| part);
        self.state.registers.set_sprm(SPRM_PART, part);
        Ok(true)
    }

    /// Decodes `vts_n` unless it is already loaded.
    fn vtsi_for(&self, vts_n: u8) -> VmResult<Option<VtsiHandle>> {
        if vts_n == self.state.vts_n && self.vtsi.is_some() {
            Ok(None)
        } else {
            self.load_vtsi(vts_n).map(Some)
        }
    }

    fn set_fp_pgc(&mut self) -> VmResult<()> {
        self.state.domain = Domain::FirstPlay;
        match self.vmgi.first_play_pgc.clone() {
            Some(pgc) => {
                self.state.pgc = Some(pgc);
                self.state.pgc_n = 0;
                Ok(())
            }
            None => {
                // no first play PGC: start at the first video manager menu
                self.state.domain = Domain::Vmgm;
                if self.set_pgcn(1) {
                    Ok(())
                } else {
                    Err(VmError::Invariant("disc has neither a first play PGC nor menus".to_string()))
                }
            }
        }
    }

    fn set_pgcn(&mut self, pgc_n: u16) -> bool {
        let Some(pgc) = self
            .current_pgcit()
            .and_then(|pgcit| pgcit.pgc(usize::from(pgc_n)))
            .cloned()
        else {
            return false;
        };
        self.state.pgc = Some(pgc);
        self.state.pgc_n = pgc_n;
        self.state.pg_n = 1;
        if self.state.domain == Domain::VtsTitle {
            self.state.registers.set_sprm(SPRM_TITLE_PGC, pgc_n);
        }
        true
    }

    /// Derives the program from the current cell. `false` past the last cell.
    fn set_pgn(&mut self) -> VmResult<bool> {
        let pgc = self.pgc()?;
        let cell_n = self.state.cell_n;
        let programs = usize::from(pgc.nr_of_programs).min(pgc.program_map.len());
        let mut new_pg = 0;
        while new_pg < programs && cell_n >= u16::from(pgc.program_map[new_pg]) {
            new_pg += 1;
        }
        if new_pg == programs && cell_n > u16::from(pgc.nr_of_cells) {
            return Ok(false);
        }
        self.state.pg_n = new_pg as u16;

        if self.state.domain == Domain::VtsTitle {
            let ttn = usize::from(self.state.registers.sprm(SPRM_TITLE));
            if ttn > self.vmgi.tt_srpt.titles.len() {
                return Ok(false);
            }
            if let Some((_, part)) = self.current_title_part() {
                self.state.registers.set_sprm(SPRM_PART, part);
            }
        }
        Ok(true)
    }

    /// Snapshot for a later `RSM`. Must run before the domain changes.
    fn set_rsm_info(&mut self, cell_n: u16, block_n: u32) {
        let rsm = &mut self.state.resume;
        rsm.cell_n = if cell_n != 0 { cell_n } else { self.state.cell_n };
        rsm.block_n = block_n;
        rsm.vts_n = self.state.vts_n;
        rsm.pgc_n = self.state.pgc_n;
        for (i, slot) in rsm.regs.iter_mut().enumerate() {
            *slot = self.state.registers.sprm(SPRM_TITLE + i);
        }
        tracing::debug!(target: "dvdnav::vm", "resume point saved: {:?}", rsm);
    }

    // ========================================================================
    // Table lookups
    // ========================================================================

    /// Global title number of a title set title, 0 when there is none.
    fn find_title(&self, vts_n: u8, vts_ttn: u16) -> u16 {
        self.vmgi
            .tt_srpt
            .titles
            .iter()
            .position(|t| t.title_set_nr == vts_n && u16::from(t.vts_ttn) == vts_ttn)
            .map_or(0, |i| (i + 1) as u16)
    }

    /// PGC number holding menu `id` in the current domain, 0 when absent.
    fn find_menu(&self, id: u8) -> u16 {
        let Some(pgcit) = self.current_pgcit() else {
            return 0;
        };
        match pgcit.srps.iter().position(|srp| srp.entry_id & 0x7F == id) {
            Some(i) => (i + 1) as u16,
            None => {
                tracing::debug!(target: "dvdnav::vm", "no menu with entry id {}", id);
                0
            }
        }
    }

    fn set_menu(&mut self, menu: u8) -> bool {
        let pgc_n = self.find_menu(menu);
        self.set_pgcn(pgc_n)
    }

    fn current_pgcit(&self) -> Option<&Pgcit> {
        let lang = self.state.registers.sprm(SPRM_MENU_LANG);
        match self.state.domain {
            Domain::VtsTitle => self.vtsi.as_ref().map(|v| &v.vts_pgcit),
            Domain::VtsMenu => self.vtsi.as_ref().and_then(|v| menu_pgcit(v.pgci_ut.as_ref(), lang)),
            Domain::Vmgm | Domain::FirstPlay => menu_pgcit(self.vmgi.pgci_ut.as_ref(), lang),
        }
    }
}

/// Menu PGCIT for a language, falling back to the first language unit.
fn menu_pgcit(pgci_ut: Option<&PgciUt>, lang: u16) -> Option<&Pgcit> {
    let ut = pgci_ut?;
    let lu = ut.lus.iter().find(|lu| lu.lang_code == lang).or_else(|| {
        let first = ut.lus.first();
        if let Some(lu) = first {
            tracing::debug!(
                target: "dvdnav::vm",
                "menu language {} not found, using {}",
                ifo::attributes::lang_to_string(lang),
                ifo::attributes::lang_to_string(lu.lang_code)
            );
        }
        first
    })?;
    Some(&lu.pgcit)
}
