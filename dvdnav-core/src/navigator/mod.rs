//! Block-change navigator.
//!
//! Drives the VM and the byte source and turns what changed since the last
//! call into one [`Event`] per [`Navigator::next_event`]. Changes are checked
//! in a fixed priority order: stop, hop, highlight, wait, title set or domain,
//! cell, palette, subpicture stream, audio stream, still, and finally the
//! next NAV packet. Steps that produce nothing (leaving a cell, skipping the
//! video data of a VOBU) are looped over internally.
//!
//! `next_event` is cancel safe. Fetches happen before any state is touched,
//! so dropping the future mid-read leaves the navigator where the call found
//! it, apart from steps that already completed without an event.

mod highlight;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::config::NavConfig;
use crate::disc::{load_disc, DiscError};
use crate::ifo::Pgc;
use crate::nav::{self, decode_nav_packet, Dsi, NavError, Pci, SRI_END_OF_CELL};
use crate::source::{ByteSource, SourceError, VobFile};
use crate::vm::machine::{SubpMode, HOP_SEEK};
use crate::vm::{Domain, Position, Vm, VmError};

pub use highlight::{HighlightArea, HighlightMode};

#[derive(Debug, Error)]
pub enum NavigatorError {
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Disc(#[from] DiscError),
    #[error("bad NAV packet: {0}")]
    Nav(#[from] NavError),
    #[error("next VOBU at {offset:+} from sector {from} is outside {file}")]
    BadVobuAddress { file: VobFile, from: u32, offset: i64 },
    #[error("no VOB is open")]
    NoFile,
    #[error("no menu highlight in the current VOBU")]
    NoHighlight,
    #[error("button {0} does not exist")]
    NoSuchButton(u16),
    #[error("no button at {x},{y}")]
    NoButtonAt { x: u16, y: u16 },
    #[error("a button of this menu was already activated")]
    MenuLeft,
}

/// Timing of the cell just entered, in 90 kHz ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CellChange {
    pub cell_n: u16,
    pub pg_n: u16,
    pub cell_length: u64,
    pub pg_length: u64,
    pub pgc_length: u64,
    /// Start of the cell within its PGC.
    pub cell_start: u64,
    /// Start of the program within its PGC.
    pub pg_start: u64,
}

/// A NAV pack and the rest of its VOBU.
#[derive(Debug, Clone)]
pub struct NavPacket {
    pub file: VobFile,
    pub sector: u32,
    pub pci: Pci,
    pub dsi: Dsi,
    /// Sectors following the NAV pack up to the end of the VOBU.
    pub video: Bytes,
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Playback ended. The next call starts over from first play.
    Stop,
    /// A jump or seek happened; buffered data is stale.
    HopChannel,
    Highlight { button: u16 },
    /// The application should drain its buffers and call `skip_wait`.
    Wait,
    VtsChange { old_vts: u8, new_vts: u8, domain: Domain },
    CellChange(CellChange),
    SpuClutChange { palette: [u32; 16] },
    SpuStreamChange {
        logical: u16,
        wide: Option<u8>,
        letterbox: Option<u8>,
        pan_scan: Option<u8>,
    },
    AudioStreamChange { logical: u16, physical: Option<u8> },
    /// Still picture in seconds, 0xFF until `skip_still`.
    StillFrame { length: u8 },
    NavPacket(Box<NavPacket>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Stop => "stop",
            Event::HopChannel => "hop_channel",
            Event::Highlight { .. } => "highlight",
            Event::Wait => "wait",
            Event::VtsChange { .. } => "vts_change",
            Event::CellChange(_) => "cell_change",
            Event::SpuClutChange { .. } => "spu_clut_change",
            Event::SpuStreamChange { .. } => "spu_stream_change",
            Event::AudioStreamChange { .. } => "audio_stream_change",
            Event::StillFrame { .. } => "still_frame",
            Event::NavPacket(_) => "nav_packet",
        }
    }
}

/// Where the VOBU after the current one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextVobu {
    /// Sectors relative to the current NAV pack.
    Offset(i64),
    EndOfCell,
}

impl NextVobu {
    /// Decodes an angle table address: bit 31 set means backwards.
    fn from_angle_address(address: u32) -> Self {
        let distance = i64::from(address & SRI_END_OF_CELL);
        if address & 0x8000_0000 != 0 {
            NextVobu::Offset(-distance)
        } else if distance == i64::from(SRI_END_OF_CELL) {
            NextVobu::EndOfCell
        } else {
            NextVobu::Offset(distance)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Vobu {
    start: u32,
    /// Sectors after the NAV pack.
    length: u32,
    next: NextVobu,
    /// Sectors of this VOBU already handed out.
    block: u32,
}

impl Vobu {
    /// Nothing read yet; the next step reads the NAV pack at `start`.
    fn at(start: u32) -> Self {
        Self {
            start,
            length: 0,
            next: NextVobu::Offset(0),
            block: 0,
        }
    }
}

/// Length and successor of the VOBU whose NAV pack sits at `sector`,
/// following the angle tables for `angle`.
fn resolve_vobu(sector: u32, pci: &Pci, dsi: &Dsi, angle: u16) -> Vobu {
    let mut vobu = Vobu {
        start: sector,
        length: dsi.dsi_gi.vobu_ea,
        next: match dsi.next_vobu() {
            Some(next) => NextVobu::Offset(i64::from(next)),
            None => NextVobu::EndOfCell,
        },
        block: 0,
    };
    let slot = usize::from(angle.clamp(1, 9) - 1);
    let non_seamless = pci.nsml_agl_dsta[slot];
    let seamless = dsi.sml_agli[slot].address;
    if non_seamless != 0 {
        if non_seamless & SRI_END_OF_CELL != 0 {
            vobu.next = NextVobu::from_angle_address(non_seamless);
        }
    } else if seamless != 0 {
        // interleaved: play to the end of the ILVU, then jump to the same
        // ILVU of the selected angle
        vobu.length = dsi.sml_pbi.ilvu_ea;
        vobu.next = NextVobu::from_angle_address(seamless);
    }
    vobu
}

/// Cell and program timing, summed from the PGC's cell table.
fn cell_change(pgc: &Pgc, cell_n: u16, pg_n: u16) -> CellChange {
    let ticks = |n: usize| pgc.cell(n).map_or(0, |c| c.playback_time.to_pts());
    let cells = usize::from(pgc.nr_of_cells);
    let first = pgc.program_entry_cell(usize::from(pg_n)).map_or(1, usize::from);
    let last = if pg_n < u16::from(pgc.nr_of_programs) {
        pgc.program_entry_cell(usize::from(pg_n) + 1)
            .map_or(cells, |next| usize::from(next).saturating_sub(1))
    } else {
        cells
    };
    CellChange {
        cell_n,
        pg_n,
        cell_length: ticks(usize::from(cell_n)),
        pg_length: (first..=last).map(ticks).sum(),
        pgc_length: pgc.playback_time.to_pts(),
        cell_start: (1..usize::from(cell_n)).map(ticks).sum(),
        pg_start: (1..first).map(ticks).sum(),
    }
}

/// VOB sector space holding the data of a domain.
fn domain_file(vts: u8, domain: Domain) -> VobFile {
    match domain {
        Domain::FirstPlay | Domain::Vmgm => VobFile::vmgm(),
        Domain::VtsMenu => VobFile::menu(vts),
        Domain::VtsTitle => VobFile::title(vts),
    }
}

/// Position fields that must be re-announced after a title set or cell change.
#[derive(Debug, Clone, Copy, Default)]
struct Refresh {
    cell: bool,
    spu: bool,
    audio: bool,
}

pub struct Navigator {
    vm: Vm,
    source: Arc<dyn ByteSource>,
    started: bool,
    /// Position as last announced to the caller.
    current: Position,
    refresh: Refresh,
    spu_clut_changed: bool,
    sync_wait: bool,
    /// Set by `skip_wait`/`skip_still`, cleared only when a cell is left.
    sync_wait_skip: bool,
    skip_still: bool,
    file: Option<VobFile>,
    vobu: Vobu,
    pci: Pci,
    dsi: Dsi,
    /// NAV pack whose button command already ran.
    last_cmd_nav_lbn: Option<u32>,
    /// Elapsed time in the cell at the last NAV pack, 90 kHz ticks.
    cell_elapsed: u64,
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("started", &self.started)
            .field("current", &self.current)
            .field("file", &self.file)
            .field("vobu", &self.vobu)
            .field("sync_wait", &self.sync_wait)
            .finish()
    }
}

impl Navigator {
    /// Loads the disc from `source` and prepares a VM for it.
    pub async fn open(source: Arc<dyn ByteSource>, config: NavConfig) -> Result<Self, NavigatorError> {
        let policy = config.policy();
        let disc = load_disc(source.as_ref(), policy.as_ref()).await?;
        let vm = Vm::new(Arc::new(disc), config)?;
        Ok(Self::with_vm(vm, source))
    }

    pub fn with_vm(vm: Vm, source: Arc<dyn ByteSource>) -> Self {
        Self {
            vm,
            source,
            started: false,
            current: Position::default(),
            refresh: Refresh::default(),
            spu_clut_changed: false,
            sync_wait: false,
            sync_wait_skip: false,
            skip_still: false,
            file: None,
            vobu: Vobu::at(0),
            pci: Pci::default(),
            dsi: Dsi::default(),
            last_cmd_nav_lbn: None,
            cell_elapsed: 0,
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// The VM, for user navigation (menus, chapters, angles). Jumps made
    /// through it show up as a `HopChannel` event.
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    pub fn current_file(&self) -> Option<VobFile> {
        self.file
    }

    /// PCI of the last NAV packet.
    pub fn pci(&self) -> &Pci {
        &self.pci
    }

    /// DSI of the last NAV packet.
    pub fn dsi(&self) -> &Dsi {
        &self.dsi
    }

    pub fn is_waiting(&self) -> bool {
        self.sync_wait
    }

    pub fn cell_elapsed(&self) -> u64 {
        self.cell_elapsed
    }

    /// Elapsed time in the PGC: earlier cells plus the time into this one.
    pub fn pgc_elapsed(&self) -> u64 {
        let state = self.vm.state();
        let before = state.pgc.as_ref().map_or(0, |pgc| {
            (1..usize::from(state.cell_n))
                .filter_map(|n| pgc.cell(n))
                .map(|c| c.playback_time.to_pts())
                .sum()
        });
        before + self.cell_elapsed
    }

    /// Ends the current still picture. The cell is left on the next step.
    pub fn skip_still(&mut self) {
        self.current.still = 0;
        self.skip_still = true;
        self.sync_wait = false;
        self.sync_wait_skip = true;
    }

    /// Acknowledges a `Wait` event.
    pub fn skip_wait(&mut self) {
        self.sync_wait = false;
        self.sync_wait_skip = true;
    }

    pub async fn next_event(&mut self) -> Result<Event, NavigatorError> {
        loop {
            if let Some(event) = self.step().await? {
                tracing::trace!(target: "dvdnav::navigator", "event {}", event.name());
                return Ok(event);
            }
        }
    }

    async fn step(&mut self) -> Result<Option<Event>, NavigatorError> {
        if !self.started {
            self.vm.start()?;
            self.started = true;
        }
        if self.vm.is_stopped() {
            self.close();
            return Ok(Some(Event::Stop));
        }

        let next = self
            .vm
            .position()
            .ok_or_else(|| VmError::Invariant("playing without a current cell".to_string()))?;

        if self.current.hop_channel != next.hop_channel {
            return self.hop(next).await.map(Some);
        }

        if self.current.button != next.button {
            self.current.button = next.button;
            return Ok(Some(Event::Highlight { button: next.button }));
        }

        if self.sync_wait {
            return Ok(Some(Event::Wait));
        }

        if self.current.vts != next.vts || self.current.domain != next.domain {
            return self.change_vts(&next).map(Some);
        }

        if self.refresh.cell
            || self.current.cell != next.cell
            || self.current.cell_restart != next.cell_restart
            || self.current.cell_start != next.cell_start
        {
            return self.change_cell(&next).map(Some);
        }

        if self.spu_clut_changed {
            self.spu_clut_changed = false;
            let palette = self.vm.state().pgc.as_ref().map_or([0; 16], |pgc| pgc.palette);
            return Ok(Some(Event::SpuClutChange { palette }));
        }

        if self.refresh.spu || self.current.spu_channel != next.spu_channel {
            self.refresh.spu = false;
            self.current.spu_channel = next.spu_channel;
            return Ok(Some(Event::SpuStreamChange {
                logical: next.spu_channel,
                wide: self.vm.subp_active_stream(SubpMode::Widescreen),
                letterbox: self.vm.subp_active_stream(SubpMode::Letterbox),
                pan_scan: self.vm.subp_active_stream(SubpMode::PanScan),
            }));
        }

        if self.refresh.audio || self.current.audio_channel != next.audio_channel {
            self.refresh.audio = false;
            self.current.audio_channel = next.audio_channel;
            return Ok(Some(Event::AudioStreamChange {
                logical: next.audio_channel,
                physical: self.vm.audio_active_stream(),
            }));
        }

        if self.current.still != 0 {
            return Ok(Some(Event::StillFrame {
                length: self.current.still,
            }));
        }

        if self.vobu.block >= self.vobu.length {
            return match self.vobu.next {
                NextVobu::EndOfCell => {
                    self.leave_cell(&next)?;
                    Ok(None)
                }
                NextVobu::Offset(offset) => self.read_nav(offset).await.map(Some),
            };
        }

        // the video data went out with the NAV packet
        self.vobu.block = self.vobu.length;
        Ok(None)
    }

    /// Forgets everything announced, so a restart announces it again.
    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            tracing::debug!(target: "dvdnav::navigator", "closing {}", file);
        }
        self.started = false;
        self.current = Position::default();
        self.refresh = Refresh::default();
        self.sync_wait = false;
        self.sync_wait_skip = false;
        self.skip_still = false;
        self.vobu = Vobu::at(0);
        self.last_cmd_nav_lbn = None;
    }

    async fn hop(&mut self, next: Position) -> Result<Event, NavigatorError> {
        let seek = next.hop_channel.wrapping_sub(self.current.hop_channel) >= HOP_SEEK;
        let mut block = next.block;
        let mut packet = None;
        if seek && self.vm.angle_info().1 > 1 {
            // the first VOBU after a seek in a multi angle title may belong
            // to another angle
            let domain = next.domain.unwrap_or(Domain::VtsTitle);
            let file = domain_file(next.vts, domain);
            let sector = next.cell_start + next.block;
            let packets = self.source.read_nav_packet(file, sector).await?;
            let (pci, dsi) = decode_nav_packet(&packets)?;
            let vobu = resolve_vobu(sector, &pci, &dsi, self.vm.angle_info().0);
            if let NextVobu::Offset(offset) = vobu.next {
                match u32::try_from(i64::from(sector) + offset)
                    .ok()
                    .and_then(|start| start.checked_sub(next.cell_start))
                {
                    Some(skipped) => block = skipped,
                    None => tracing::warn!(
                        target: "dvdnav::navigator",
                        "angle seek: next VOBU {:+} from {} leaves the cell",
                        offset,
                        sector
                    ),
                }
            }
            packet = Some((pci, dsi));
        }

        if let Some((pci, dsi)) = packet {
            self.pci = pci;
            self.dsi = dsi;
            self.vm.set_block(block);
        }
        self.current.hop_channel = next.hop_channel;
        self.vobu = Vobu::at(next.cell_start + block);
        self.sync_wait = false;
        Ok(Event::HopChannel)
    }

    fn change_vts(&mut self, next: &Position) -> Result<Event, NavigatorError> {
        let domain = next
            .domain
            .ok_or_else(|| VmError::Invariant("position without a domain".to_string()))?;
        let file = domain_file(next.vts, domain);
        if let Some(old) = self.file.replace(file) {
            tracing::debug!(target: "dvdnav::navigator", "closing {}", old);
        }
        tracing::info!(target: "dvdnav::navigator", "playing {} in {:?}", file, domain);

        let old_vts = self.current.vts;
        self.current.vts = next.vts;
        self.current.domain = next.domain;
        self.spu_clut_changed = true;
        self.refresh = Refresh {
            cell: true,
            spu: true,
            audio: true,
        };
        Ok(Event::VtsChange {
            old_vts,
            new_vts: next.vts,
            domain,
        })
    }

    fn change_cell(&mut self, next: &Position) -> Result<Event, NavigatorError> {
        let state = self.vm.state();
        let pgc = state
            .pgc
            .as_ref()
            .ok_or_else(|| VmError::Invariant("cell change without a PGC".to_string()))?;
        let change = cell_change(pgc, state.cell_n, state.pg_n);
        tracing::debug!(
            target: "dvdnav::navigator",
            "cell {} (program {}) at sector {}",
            change.cell_n,
            change.pg_n,
            next.cell_start
        );

        self.current.cell = next.cell;
        self.current.cell_restart = next.cell_restart;
        self.current.cell_start = next.cell_start;
        self.current.block = next.block;
        // mid cell resumes start at the resumed VOBU
        self.vobu = Vobu::at(next.cell_start + next.block);
        self.cell_elapsed = 0;
        self.spu_clut_changed = true;
        self.refresh = Refresh {
            cell: false,
            spu: true,
            audio: true,
        };
        Ok(Event::CellChange(change))
    }

    /// End of the last VOBU of the cell.
    fn leave_cell(&mut self, next: &Position) -> Result<(), NavigatorError> {
        self.current.still = next.still;
        // stills and menus are shown too briefly unless the application
        // catches up first
        if (self.current.still != 0 || self.pci.hli.hl_gi.hli_ss != 0) && !self.sync_wait_skip {
            self.sync_wait = true;
        }
        if self.current.still == 0 || self.skip_still {
            self.vm.get_next_cell()?;
            self.current.still = 0;
            self.skip_still = false;
            self.sync_wait_skip = false;
        }
        Ok(())
    }

    async fn read_nav(&mut self, offset: i64) -> Result<Event, NavigatorError> {
        let file = self.file.ok_or(NavigatorError::NoFile)?;
        let sector = u32::try_from(i64::from(self.vobu.start) + offset).map_err(|_| NavigatorError::BadVobuAddress {
            file,
            from: self.vobu.start,
            offset,
        })?;

        let packets = self.source.read_nav_packet(file, sector).await?;
        let (pci, dsi) = decode_nav_packet(&packets)?;
        if self.vm.config().check_nav_packets {
            nav::report_violations(&pci, &dsi);
        }
        if dsi.dsi_gi.nv_pck_lbn != sector {
            tracing::debug!(
                target: "dvdnav::navigator",
                "NAV pack at sector {} claims sector {}",
                sector,
                dsi.dsi_gi.nv_pck_lbn
            );
        }
        let vobu = resolve_vobu(sector, &pci, &dsi, self.vm.angle_info().0);
        let video = self.source.read_video_chunk(file, sector + 1, vobu.length).await?;

        self.vm.set_block(sector.saturating_sub(self.current.cell_start));
        self.vobu = vobu;
        if self.last_cmd_nav_lbn == Some(pci.pci_gi.nv_pck_lbn) {
            // back at the menu whose button ran: buttons work again
            self.last_cmd_nav_lbn = None;
        }
        let gi = &pci.hli.hl_gi;
        if gi.hli_ss == 1 && gi.fosl_btnn != 0 && gi.fosl_btnn <= gi.btn_ns {
            self.vm.registers_mut().set_highlighted_button(u16::from(gi.fosl_btnn));
        }
        self.cell_elapsed = dsi.dsi_gi.c_eltm.to_pts();
        self.pci = pci.clone();
        self.dsi = dsi.clone();

        Ok(Event::NavPacket(Box::new(NavPacket {
            file,
            sector,
            pci,
            dsi,
            video,
        })))
    }
}
