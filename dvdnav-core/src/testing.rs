//! Synthetic disc images for unit tests.
//!
//! `DiscBuilder` lays out a VMG and one title set per `TitleSpec`, each
//! table in its own sector, and renders VOB images with a NAV pack at the
//! start of every VOBU so the navigator can run against a `MemorySource`.

use std::sync::Arc;

use bytes::Bytes;

use crate::config::NavConfig;
use crate::disc::DiscImage;
use crate::ifo::pgc::{BLOCK_MODE_FIRST_CELL, BLOCK_MODE_NOT_IN_BLOCK, PGC_SIZE};
use crate::ifo::{IfoFiles, DVD_BLOCK_LEN};
use crate::nav::dsi::DSI_BYTES;
use crate::nav::pci::{MAX_BUTTONS, PCI_BYTES};
use crate::nav::SRI_END_OF_CELL;
use crate::navigator::Navigator;
use crate::source::{ByteSource, MemorySource, VobFile};
use crate::vm::{ManualClock, Vm};

const VMGI_MAT_SIZE: usize = 0x200;
const VTSI_MAT_SIZE: usize = 0x3D8;
const FIRST_PLAY_OFFSET: usize = 0x400;
const VTS_ATTRIBUTES_SIZE: usize = 542;

fn bcd(v: u32) -> u8 {
    (((v / 10) % 10) << 4 | (v % 10)) as u8
}

/// Playback time at 29.97 fps with no frames.
fn dvd_time(seconds: u32) -> [u8; 4] {
    [bcd(seconds / 3600), bcd((seconds / 60) % 60), bcd(seconds % 60), 0xC0]
}

fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

fn pad_to_sector(buf: &mut Vec<u8>) {
    let rem = buf.len() % DVD_BLOCK_LEN;
    if rem != 0 {
        buf.resize(buf.len() + DVD_BLOCK_LEN - rem, 0);
    }
}

/// Appends `table` at the next sector boundary and returns its sector.
fn append_table(ifo: &mut Vec<u8>, table: &[u8]) -> u32 {
    pad_to_sector(ifo);
    let sector = (ifo.len() / DVD_BLOCK_LEN) as u32;
    ifo.extend_from_slice(table);
    sector
}

// ============================================================================
// NAV packets
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonSpec {
    x_start: u16,
    x_end: u16,
    y_start: u16,
    y_end: u16,
    up: u8,
    down: u8,
    left: u8,
    right: u8,
    auto: bool,
    cmd: u64,
}

impl ButtonSpec {
    pub fn new(x_start: u16, x_end: u16, y_start: u16, y_end: u16) -> Self {
        Self {
            x_start,
            x_end,
            y_start,
            y_end,
            ..Default::default()
        }
    }

    pub fn nav(mut self, up: u8, down: u8, left: u8, right: u8) -> Self {
        self.up = up;
        self.down = down;
        self.left = left;
        self.right = right;
        self
    }

    pub fn cmd(mut self, cmd: u64) -> Self {
        self.cmd = cmd;
        self
    }

    pub fn auto(mut self) -> Self {
        self.auto = true;
        self
    }

    fn encode(&self, out: &mut [u8]) {
        let x = (u32::from(self.x_start & 0x3FF) << 12) | u32::from(self.x_end & 0x3FF);
        let y = (u32::from(self.auto) << 22) | (u32::from(self.y_start & 0x3FF) << 12) | u32::from(self.y_end & 0x3FF);
        out[0..3].copy_from_slice(&x.to_be_bytes()[1..]);
        out[3..6].copy_from_slice(&y.to_be_bytes()[1..]);
        out[6] = self.up & 0x3F;
        out[7] = self.down & 0x3F;
        out[8] = self.left & 0x3F;
        out[9] = self.right & 0x3F;
        out[10..18].copy_from_slice(&self.cmd.to_be_bytes());
    }
}

#[derive(Debug, Clone, Default)]
pub struct PciSpec {
    lbn: u32,
    buttons: Vec<ButtonSpec>,
    highlight: Option<u8>,
    force_select: u8,
    force_action: u8,
}

impl PciSpec {
    pub fn lbn(mut self, lbn: u32) -> Self {
        self.lbn = lbn;
        self
    }

    pub fn button(mut self, button: ButtonSpec) -> Self {
        self.buttons.push(button);
        self
    }

    /// Overrides `hli_ss`, which otherwise is 1 when buttons exist.
    pub fn highlight(mut self, status: u8) -> Self {
        self.highlight = Some(status);
        self
    }

    pub fn force_select(mut self, button: u8) -> Self {
        self.force_select = button;
        self
    }

    pub fn force_action(mut self, button: u8) -> Self {
        self.force_action = button;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; PCI_BYTES];
        put_u32(&mut out, 0, self.lbn);
        let count = self.buttons.len().min(MAX_BUTTONS);
        let status = self.highlight.unwrap_or(u8::from(count > 0));
        put_u16(&mut out, 96, u16::from(status & 0x03));
        if count > 0 {
            out[110] = 1 << 4;
            out[113] = count as u8;
            out[116] = self.force_select;
            out[117] = self.force_action;
        }
        for (i, button) in self.buttons.iter().take(count).enumerate() {
            let at = 142 + i * 18;
            button.encode(&mut out[at..at + 18]);
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DsiSpec {
    lbn: u32,
    vobu_ea: u32,
    next_vobu: u32,
    cell_id: u8,
    ilvu_ea: u32,
    angles: [u32; 9],
}

impl DsiSpec {
    /// NAV pack at `lbn` whose VOBU ends `vobu_ea` sectors later. The next
    /// VOBU defaults to the sector right after it.
    pub fn new(lbn: u32, vobu_ea: u32) -> Self {
        Self {
            lbn,
            vobu_ea,
            next_vobu: vobu_ea + 1,
            cell_id: 1,
            ilvu_ea: 0,
            angles: [0; 9],
        }
    }

    pub fn next_vobu(mut self, next: u32) -> Self {
        self.next_vobu = next;
        self
    }

    pub fn end_of_cell(mut self) -> Self {
        self.next_vobu = SRI_END_OF_CELL;
        self
    }

    pub fn cell_id(mut self, cell_id: u8) -> Self {
        self.cell_id = cell_id;
        self
    }

    pub fn ilvu_ea(mut self, ilvu_ea: u32) -> Self {
        self.ilvu_ea = ilvu_ea;
        self
    }

    pub fn angle(mut self, index: usize, address: u32) -> Self {
        self.angles[index] = address;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; DSI_BYTES];
        put_u32(&mut out, 4, self.lbn);
        put_u32(&mut out, 8, self.vobu_ea);
        put_u16(&mut out, 24, 1);
        out[27] = self.cell_id;
        put_u32(&mut out, 34, self.ilvu_ea);
        for (i, &address) in self.angles.iter().enumerate() {
            put_u32(&mut out, 180 + i * 6, address);
        }
        put_u32(&mut out, 314, self.next_vobu);
        out
    }
}

/// One 2048-byte NAV pack: pack header, system header, PCI and DSI packets.
pub fn nav_sector(pci: &PciSpec, dsi: &DsiSpec) -> Bytes {
    let mut s = Vec::with_capacity(DVD_BLOCK_LEN);
    s.extend_from_slice(&[0x00, 0x00, 0x01, 0xBA, 0x44, 0x00, 0x04, 0x00, 0x04, 0x01, 0x01, 0x89, 0xC3, 0xF8]);
    s.extend_from_slice(&[0x00, 0x00, 0x01, 0xBB, 0x00, 0x12]);
    s.extend_from_slice(&[0x80, 0x11, 0x8B, 0x01, 0x04, 0xE1, 0xFF, 0xB9, 0xE0, 0x00, 0xB8, 0xC0, 0x20, 0xBD, 0xE0, 0x3A, 0xBF, 0xE0]);
    s.extend_from_slice(&[0x00, 0x00, 0x01, 0xBF, 0x03, 0xD4, 0x00]);
    s.extend_from_slice(&pci.encode());
    s.extend_from_slice(&[0x00, 0x00, 0x01, 0xBF, 0x03, 0xFA, 0x01]);
    s.extend_from_slice(&dsi.encode());
    debug_assert_eq!(s.len(), DVD_BLOCK_LEN);
    Bytes::from(s)
}

// ============================================================================
// Program chains
// ============================================================================

#[derive(Debug, Clone)]
pub struct CellSpec {
    first: u32,
    last: u32,
    still: u8,
    block_mode: u8,
    block_type: u8,
    seconds: u32,
    vobus: u32,
    command: u8,
    pci: PciSpec,
}

impl CellSpec {
    pub fn new(first: u32, last: u32) -> Self {
        Self {
            first,
            last,
            still: 0,
            block_mode: BLOCK_MODE_NOT_IN_BLOCK,
            block_type: 0,
            seconds: 0,
            vobus: 1,
            command: 0,
            pci: PciSpec::default(),
        }
    }

    pub fn still(mut self, still: u8) -> Self {
        self.still = still;
        self
    }

    pub fn block(mut self, mode: u8, block_type: u8) -> Self {
        self.block_mode = mode;
        self.block_type = block_type;
        self
    }

    pub fn seconds(mut self, seconds: u32) -> Self {
        self.seconds = seconds;
        self
    }

    /// Splits the cell into `n` equally sized VOBUs.
    pub fn vobus(mut self, n: u32) -> Self {
        self.vobus = n.max(1);
        self
    }

    /// 1-based index into the PGC's cell command table.
    pub fn command(mut self, n: u8) -> Self {
        self.command = n;
        self
    }

    /// Highlight information carried by every NAV pack of the cell.
    pub fn pci(mut self, pci: PciSpec) -> Self {
        self.pci = pci;
        self
    }

    fn vobu_starts(&self) -> Vec<u32> {
        let len = self.last - self.first + 1;
        let n = self.vobus.min(len);
        (0..n).map(|i| self.first + i * len / n).collect()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let starts = self.vobu_starts();
        let last_vobu = starts.last().copied().unwrap_or(self.first);
        out.push((self.block_mode << 6) | ((self.block_type & 0x03) << 4));
        out.push(0);
        out.push(self.still);
        out.push(self.command);
        out.extend_from_slice(&dvd_time(self.seconds));
        out.extend_from_slice(&self.first.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&last_vobu.to_be_bytes());
        out.extend_from_slice(&self.last.to_be_bytes());
    }

    fn starts_program(&self) -> bool {
        self.block_mode == BLOCK_MODE_NOT_IN_BLOCK || self.block_mode == BLOCK_MODE_FIRST_CELL
    }
}

#[derive(Debug, Clone)]
pub struct PgcSpec {
    cells: Vec<CellSpec>,
    programs: Option<Vec<u8>>,
    pre: Vec<u64>,
    post: Vec<u64>,
    cell_cmds: Vec<u64>,
    next: u16,
    prev: u16,
    goup: u16,
    still: u8,
    audio: [u16; 8],
    subp: [u32; 32],
    cell_table: bool,
}

impl PgcSpec {
    pub fn new(cells: Vec<CellSpec>) -> Self {
        Self {
            cells,
            programs: None,
            pre: Vec::new(),
            post: Vec::new(),
            cell_cmds: Vec::new(),
            next: 0,
            prev: 0,
            goup: 0,
            still: 0,
            audio: [0; 8],
            subp: [0; 32],
            cell_table: true,
        }
    }

    /// Leaves the cell playback offset at zero while keeping the cell count.
    pub fn without_cell_table(mut self) -> Self {
        self.cell_table = false;
        self
    }

    /// Entry cell of each program. Defaults to every cell outside an angle
    /// block plus the first cell of each block.
    pub fn programs(mut self, programs: Vec<u8>) -> Self {
        self.programs = Some(programs);
        self
    }

    pub fn pre(mut self, cmds: Vec<u64>) -> Self {
        self.pre = cmds;
        self
    }

    pub fn post(mut self, cmds: Vec<u64>) -> Self {
        self.post = cmds;
        self
    }

    pub fn cell_cmds(mut self, cmds: Vec<u64>) -> Self {
        self.cell_cmds = cmds;
        self
    }

    pub fn links(mut self, next: u16, prev: u16, goup: u16) -> Self {
        self.next = next;
        self.prev = prev;
        self.goup = goup;
        self
    }

    pub fn still(mut self, still: u8) -> Self {
        self.still = still;
        self
    }

    pub fn audio(mut self, index: usize, control: u16) -> Self {
        self.audio[index] = control;
        self
    }

    pub fn subp(mut self, index: usize, control: u32) -> Self {
        self.subp[index] = control;
        self
    }

    fn program_map(&self) -> Vec<u8> {
        match &self.programs {
            Some(map) => map.clone(),
            None => self
                .cells
                .iter()
                .enumerate()
                .filter(|(_, c)| c.starts_program())
                .map(|(i, _)| (i + 1) as u8)
                .collect(),
        }
    }

    fn nr_of_programs(&self) -> usize {
        self.program_map().len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let map = self.program_map();
        let seconds: u32 = self.cells.iter().map(|c| c.seconds).sum();
        let mut out = vec![0u8; PGC_SIZE];
        out[2] = map.len() as u8;
        out[3] = self.cells.len() as u8;
        out[4..8].copy_from_slice(&dvd_time(seconds));
        for (i, &ctl) in self.audio.iter().enumerate() {
            put_u16(&mut out, 12 + i * 2, ctl);
        }
        for (i, &ctl) in self.subp.iter().enumerate() {
            put_u32(&mut out, 28 + i * 4, ctl);
        }
        put_u16(&mut out, 156, self.next);
        put_u16(&mut out, 158, self.prev);
        put_u16(&mut out, 160, self.goup);
        if !map.is_empty() {
            out[163] = self.still;
        }

        let total = self.pre.len() + self.post.len() + self.cell_cmds.len();
        if total > 0 {
            let at = out.len() as u16;
            put_u16(&mut out, 228, at);
            let last_byte = (8 + 8 * total - 1) as u16;
            for v in [self.pre.len() as u16, self.post.len() as u16, self.cell_cmds.len() as u16, last_byte] {
                out.extend_from_slice(&v.to_be_bytes());
            }
            for cmd in self.pre.iter().chain(&self.post).chain(&self.cell_cmds) {
                out.extend_from_slice(&cmd.to_be_bytes());
            }
        }
        if !map.is_empty() {
            let at = out.len() as u16;
            put_u16(&mut out, 230, at);
            out.extend_from_slice(&map);
            if out.len() % 2 == 1 {
                out.push(0);
            }
            if self.cell_table {
                let at = out.len() as u16;
                put_u16(&mut out, 232, at);
                for cell in &self.cells {
                    cell.encode(&mut out);
                }
            }
            let at = out.len() as u16;
            put_u16(&mut out, 234, at);
            for (i, _) in self.cells.iter().enumerate() {
                out.extend_from_slice(&[0x00, 0x01, 0x00, (i + 1) as u8]);
            }
        }
        out
    }
}

/// PGCIT of `(entry_id, pgc)` pairs.
fn encode_pgcit(entries: &[(u8, &PgcSpec)]) -> Vec<u8> {
    let header = 8 + 8 * entries.len();
    let pgcs: Vec<Vec<u8>> = entries.iter().map(|(_, pgc)| pgc.encode()).collect();
    let total = header + pgcs.iter().map(Vec::len).sum::<usize>();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&((total - 1) as u32).to_be_bytes());
    let mut start = header;
    for ((entry_id, _), pgc) in entries.iter().zip(&pgcs) {
        out.extend_from_slice(&[*entry_id, 0, 0, 0]);
        out.extend_from_slice(&(start as u32).to_be_bytes());
        start += pgc.len();
    }
    for pgc in &pgcs {
        out.extend_from_slice(pgc);
    }
    out
}

/// Menu table with a single English language unit.
fn encode_pgci_ut(menus: &[(u8, PgcSpec)]) -> Vec<u8> {
    let entries: Vec<(u8, &PgcSpec)> = menus.iter().map(|(id, pgc)| (0x80 | id, pgc)).collect();
    let pgcit = encode_pgcit(&entries);
    let mut out = Vec::with_capacity(16 + pgcit.len());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&((16 + pgcit.len() - 1) as u32).to_be_bytes());
    out.extend_from_slice(b"en");
    out.extend_from_slice(&[0x00, 0x80]);
    out.extend_from_slice(&16u32.to_be_bytes());
    out.extend_from_slice(&pgcit);
    out
}

fn domain_cells<'a>(pgcs: impl IntoIterator<Item = &'a PgcSpec>) -> Vec<&'a CellSpec> {
    pgcs.into_iter().flat_map(|p| p.cells.iter()).collect()
}

fn encode_c_adt(cells: &[&CellSpec]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 12 * cells.len());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&((8 + 12 * cells.len() - 1) as u32).to_be_bytes());
    for (i, cell) in cells.iter().enumerate() {
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&[(i + 1) as u8, 0]);
        out.extend_from_slice(&cell.first.to_be_bytes());
        out.extend_from_slice(&cell.last.to_be_bytes());
    }
    out
}

fn encode_vobu_admap(cells: &[&CellSpec]) -> Vec<u8> {
    let mut starts: Vec<u32> = cells.iter().flat_map(|c| c.vobu_starts()).collect();
    starts.sort_unstable();
    starts.dedup();
    let mut out = Vec::with_capacity(4 + 4 * starts.len());
    out.extend_from_slice(&((4 + 4 * starts.len() - 1) as u32).to_be_bytes());
    for s in starts {
        out.extend_from_slice(&s.to_be_bytes());
    }
    out
}

/// VOB image holding every cell of `pgcs`, NAV packs at each VOBU start.
fn render_vob<'a>(pgcs: impl IntoIterator<Item = &'a PgcSpec>) -> Vec<u8> {
    let pgcs: Vec<&PgcSpec> = pgcs.into_iter().collect();
    let sectors = pgcs
        .iter()
        .flat_map(|p| p.cells.iter())
        .map(|c| c.last as usize + 1)
        .max()
        .unwrap_or(0);
    let mut vob = vec![0u8; sectors * DVD_BLOCK_LEN];
    for pgc in pgcs {
        for (i, cell) in pgc.cells.iter().enumerate() {
            let starts = cell.vobu_starts();
            for (j, &start) in starts.iter().enumerate() {
                let end = starts.get(j + 1).map_or(cell.last, |&next| next - 1);
                let mut dsi = DsiSpec::new(start, end - start).cell_id((i + 1) as u8);
                dsi = match starts.get(j + 1) {
                    Some(&next) => dsi.next_vobu(next - start),
                    None => dsi.end_of_cell(),
                };
                let sector = nav_sector(&cell.pci.clone().lbn(start), &dsi);
                let at = start as usize * DVD_BLOCK_LEN;
                vob[at..at + DVD_BLOCK_LEN].copy_from_slice(&sector);
            }
        }
    }
    vob
}

fn sectors_of(data: &[u8]) -> u32 {
    data.len().div_ceil(DVD_BLOCK_LEN) as u32
}

// ============================================================================
// Title sets and discs
// ============================================================================

#[derive(Debug, Clone)]
pub struct TitleSpec {
    pgcs: Vec<PgcSpec>,
    angles: u8,
    parts: Option<Vec<(u16, u16)>>,
    menus: Vec<(u8, PgcSpec)>,
    widescreen: bool,
    audio_langs: Vec<&'static str>,
    subp_langs: Vec<&'static str>,
}

impl TitleSpec {
    pub fn new(pgcs: Vec<PgcSpec>) -> Self {
        Self {
            pgcs,
            angles: 1,
            parts: None,
            menus: Vec::new(),
            widescreen: false,
            audio_langs: Vec::new(),
            subp_langs: Vec::new(),
        }
    }

    /// One PGC of `cells` ten-sector cells, one chapter per cell.
    pub fn linear(cells: u32) -> Self {
        let cells = (0..cells).map(|i| CellSpec::new(i * 10, i * 10 + 9)).collect();
        Self::new(vec![PgcSpec::new(cells)])
    }

    pub fn angles(mut self, angles: u8) -> Self {
        self.angles = angles;
        self
    }

    /// `(pgcn, pgn)` of each part. Defaults to one part per program of PGC 1.
    pub fn parts(mut self, parts: Vec<(u16, u16)>) -> Self {
        self.parts = Some(parts);
        self
    }

    pub fn menu(mut self, menu_id: u8, pgc: PgcSpec) -> Self {
        self.menus.push((menu_id, pgc));
        self
    }

    pub fn widescreen(mut self) -> Self {
        self.widescreen = true;
        self
    }

    pub fn audio_language(mut self, lang: &'static str) -> Self {
        self.audio_langs.push(lang);
        self
    }

    pub fn subp_language(mut self, lang: &'static str) -> Self {
        self.subp_langs.push(lang);
        self
    }

    fn part_list(&self) -> Vec<(u16, u16)> {
        if let Some(parts) = &self.parts {
            return parts.clone();
        }
        let programs = self.pgcs.first().map_or(0, PgcSpec::nr_of_programs);
        if programs == 0 {
            return vec![(1, 1)];
        }
        (1..=programs as u16).map(|pg| (1, pg)).collect()
    }

    fn encode_ptt_srpt(&self) -> Vec<u8> {
        let parts = self.part_list();
        let mut out = Vec::with_capacity(12 + 4 * parts.len());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&((12 + 4 * parts.len() - 1) as u32).to_be_bytes());
        out.extend_from_slice(&12u32.to_be_bytes());
        for (pgcn, pgn) in parts {
            out.extend_from_slice(&pgcn.to_be_bytes());
            out.extend_from_slice(&pgn.to_be_bytes());
        }
        out
    }

    fn video_attr(&self) -> [u8; 2] {
        let aspect = if self.widescreen { 3 } else { 0 };
        [0x40 | (aspect << 2), 0x00]
    }

    /// VTS IFO, menu VOB and title VOB.
    fn build(&self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let mut ifo = vec![0u8; VTSI_MAT_SIZE];
        ifo[..12].copy_from_slice(b"DVDVIDEO-VTS");
        ifo[0x21] = 0x10;
        put_u32(&mut ifo, 0x80, (VTSI_MAT_SIZE - 1) as u32);

        let title_entries: Vec<(u8, &PgcSpec)> = self
            .pgcs
            .iter()
            .enumerate()
            .map(|(i, pgc)| (if i == 0 { 0x81 } else { 0x01 }, pgc))
            .collect();
        let title_cells = domain_cells(&self.pgcs);
        let menu_cells = domain_cells(self.menus.iter().map(|(_, p)| p));

        let ptt_srpt = append_table(&mut ifo, &self.encode_ptt_srpt());
        let pgcit = append_table(&mut ifo, &encode_pgcit(&title_entries));
        let pgci_ut = if self.menus.is_empty() {
            0
        } else {
            append_table(&mut ifo, &encode_pgci_ut(&self.menus))
        };
        let c_adt = append_table(&mut ifo, &encode_c_adt(&title_cells));
        let vobu_admap = append_table(&mut ifo, &encode_vobu_admap(&title_cells));
        let (menu_c_adt, menu_vobu_admap) = if self.menus.is_empty() {
            (0, 0)
        } else {
            (
                append_table(&mut ifo, &encode_c_adt(&menu_cells)),
                append_table(&mut ifo, &encode_vobu_admap(&menu_cells)),
            )
        };
        pad_to_sector(&mut ifo);

        let menu_vob = render_vob(self.menus.iter().map(|(_, p)| p));
        let title_vob = render_vob(&self.pgcs);
        let ifo_sectors = sectors_of(&ifo);
        let menu_sectors = sectors_of(&menu_vob);
        let title_sectors = sectors_of(&title_vob).max(1);

        put_u32(&mut ifo, 0x0C, 2 * ifo_sectors + menu_sectors + title_sectors - 1);
        put_u32(&mut ifo, 0x1C, ifo_sectors - 1);
        put_u32(&mut ifo, 0xC0, if menu_sectors > 0 { ifo_sectors } else { 0 });
        put_u32(&mut ifo, 0xC4, ifo_sectors + menu_sectors);
        put_u32(&mut ifo, 0xC8, ptt_srpt);
        put_u32(&mut ifo, 0xCC, pgcit);
        put_u32(&mut ifo, 0xD0, pgci_ut);
        put_u32(&mut ifo, 0xD8, menu_c_adt);
        put_u32(&mut ifo, 0xDC, menu_vobu_admap);
        put_u32(&mut ifo, 0xE0, c_adt);
        put_u32(&mut ifo, 0xE4, vobu_admap);

        ifo[0x100..0x102].copy_from_slice(&self.video_attr());
        ifo[0x200..0x202].copy_from_slice(&self.video_attr());
        ifo[0x203] = self.audio_langs.len().min(8) as u8;
        for (i, lang) in self.audio_langs.iter().take(8).enumerate() {
            let at = 0x204 + i * 8;
            ifo[at] = 0x04;
            ifo[at + 1] = 0x01;
            ifo[at + 2..at + 4].copy_from_slice(&lang.as_bytes()[..2]);
        }
        ifo[0x255] = self.subp_langs.len().min(32) as u8;
        for (i, lang) in self.subp_langs.iter().take(32).enumerate() {
            let at = 0x256 + i * 6;
            ifo[at] = 0x01;
            ifo[at + 2..at + 4].copy_from_slice(&lang.as_bytes()[..2]);
        }
        (ifo, menu_vob, title_vob)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscBuilder {
    first_play: Option<PgcSpec>,
    menus: Vec<(u8, PgcSpec)>,
    titles: Vec<TitleSpec>,
    dropped: Vec<u8>,
}

/// Rendered disc: IFO images and VOBs.
#[derive(Debug, Clone)]
pub struct BuiltDisc {
    pub vmg: Bytes,
    /// IFO of title set `n` at `n - 1`.
    pub vts: Vec<Bytes>,
    pub vobs: Vec<(VobFile, Bytes)>,
    dropped: Vec<u8>,
}

impl DiscBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_play(mut self, pgc: PgcSpec) -> Self {
        self.first_play = Some(pgc);
        self
    }

    pub fn vmgm_menu(mut self, menu_id: u8, pgc: PgcSpec) -> Self {
        self.menus.push((menu_id, pgc));
        self
    }

    /// Adds a title in its own title set.
    pub fn title(mut self, title: TitleSpec) -> Self {
        self.titles.push(title);
        self
    }

    /// Leaves both IFO copies of title set `vts` off the disc.
    pub fn drop_title_set_files(&mut self, vts: u8) {
        self.dropped.push(vts);
    }

    fn encode_tt_srpt(&self) -> Vec<u8> {
        let n = self.titles.len();
        let mut out = Vec::with_capacity(8 + 12 * n);
        out.extend_from_slice(&(n as u16).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&((8 + 12 * n - 1) as u32).to_be_bytes());
        for (i, title) in self.titles.iter().enumerate() {
            out.push(0);
            out.push(title.angles);
            out.extend_from_slice(&(title.part_list().len() as u16).to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
            out.push((i + 1) as u8);
            out.push(1);
            out.extend_from_slice(&0u32.to_be_bytes());
        }
        out
    }

    fn encode_vts_atrt(&self) -> Vec<u8> {
        let n = self.titles.len();
        let mut out = Vec::new();
        out.extend_from_slice(&(n as u16).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&((8 + 4 * n + VTS_ATTRIBUTES_SIZE * n - 1) as u32).to_be_bytes());
        for i in 0..n {
            out.extend_from_slice(&((8 + 4 * n + VTS_ATTRIBUTES_SIZE * i) as u32).to_be_bytes());
        }
        for _ in 0..n {
            let mut record = vec![0u8; VTS_ATTRIBUTES_SIZE];
            put_u32(&mut record, 0, (VTS_ATTRIBUTES_SIZE - 1) as u32);
            out.extend_from_slice(&record);
        }
        out
    }

    fn build_vmg(&self) -> (Vec<u8>, Vec<u8>) {
        let mut ifo = vec![0u8; VMGI_MAT_SIZE];
        ifo[..12].copy_from_slice(b"DVDVIDEO-VMG");
        ifo[0x21] = 0x10;
        put_u16(&mut ifo, 0x26, 1);
        put_u16(&mut ifo, 0x28, 1);
        ifo[0x2A] = 1;
        put_u16(&mut ifo, 0x3E, self.titles.len() as u16);
        ifo[0x40..0x4A].copy_from_slice(b"DVDNAVTEST");
        ifo[0x100] = 0x40;

        let mut last_byte = DVD_BLOCK_LEN - 1;
        if let Some(fp) = &self.first_play {
            let pgc = fp.encode();
            ifo.resize(FIRST_PLAY_OFFSET, 0);
            ifo.extend_from_slice(&pgc);
            put_u32(&mut ifo, 0x84, FIRST_PLAY_OFFSET as u32);
            last_byte = last_byte.max(ifo.len() - 1);
        }
        put_u32(&mut ifo, 0x80, last_byte as u32);

        let menu_cells = domain_cells(self.menus.iter().map(|(_, p)| p));
        let tt_srpt = append_table(&mut ifo, &self.encode_tt_srpt());
        let pgci_ut = if self.menus.is_empty() {
            0
        } else {
            append_table(&mut ifo, &encode_pgci_ut(&self.menus))
        };
        let vts_atrt = append_table(&mut ifo, &self.encode_vts_atrt());
        let (c_adt, vobu_admap) = if self.menus.is_empty() {
            (0, 0)
        } else {
            (
                append_table(&mut ifo, &encode_c_adt(&menu_cells)),
                append_table(&mut ifo, &encode_vobu_admap(&menu_cells)),
            )
        };
        pad_to_sector(&mut ifo);

        let vob = render_vob(self.menus.iter().map(|(_, p)| p));
        let ifo_sectors = sectors_of(&ifo);
        let vob_sectors = sectors_of(&vob);
        put_u32(&mut ifo, 0x0C, 2 * ifo_sectors + vob_sectors.max(1) - 1);
        put_u32(&mut ifo, 0x1C, ifo_sectors - 1);
        put_u32(&mut ifo, 0xC0, if vob_sectors > 0 { ifo_sectors } else { 0 });
        put_u32(&mut ifo, 0xC4, tt_srpt);
        put_u32(&mut ifo, 0xC8, pgci_ut);
        put_u32(&mut ifo, 0xD0, vts_atrt);
        put_u32(&mut ifo, 0xD8, c_adt);
        put_u32(&mut ifo, 0xDC, vobu_admap);
        (ifo, vob)
    }

    pub fn build(&self) -> BuiltDisc {
        let (vmg, vmgm_vob) = self.build_vmg();
        let mut vobs = Vec::new();
        if !vmgm_vob.is_empty() {
            vobs.push((VobFile::vmgm(), Bytes::from(vmgm_vob)));
        }
        let mut vts = Vec::with_capacity(self.titles.len());
        for (i, title) in self.titles.iter().enumerate() {
            let n = (i + 1) as u8;
            let (ifo, menu_vob, title_vob) = title.build();
            vts.push(Bytes::from(ifo));
            if !menu_vob.is_empty() {
                vobs.push((VobFile::menu(n), Bytes::from(menu_vob)));
            }
            if !title_vob.is_empty() {
                vobs.push((VobFile::title(n), Bytes::from(title_vob)));
            }
        }
        BuiltDisc {
            vmg: Bytes::from(vmg),
            vts,
            vobs,
            dropped: self.dropped.clone(),
        }
    }
}

impl BuiltDisc {
    fn kept(&self, vts: u8) -> bool {
        !self.dropped.contains(&vts)
    }

    pub fn into_image(self) -> DiscImage {
        let title_sets = self
            .vts
            .iter()
            .enumerate()
            .map(|(i, data)| {
                if self.kept((i + 1) as u8) {
                    IfoFiles {
                        ifo: Some(data.clone()),
                        bup: Some(data.clone()),
                    }
                } else {
                    IfoFiles::default()
                }
            })
            .collect();
        DiscImage {
            vmg: IfoFiles {
                ifo: Some(self.vmg.clone()),
                bup: Some(self.vmg),
            },
            title_sets,
        }
    }

    /// Navigator over this disc with a seeded VM and a stopped clock.
    pub fn navigator(self) -> Navigator {
        let source: Arc<dyn ByteSource> = Arc::new(self.source());
        let config = NavConfig {
            random_seed: Some(1),
            ..NavConfig::default()
        };
        let vm = Vm::with_clock(Arc::new(self.into_image()), config, Arc::new(ManualClock::new()))
            .expect("synthetic disc opens");
        Navigator::with_vm(vm, source)
    }

    pub fn source(&self) -> MemorySource {
        let mut source = MemorySource::new();
        source.insert_ifo(0, false, self.vmg.clone());
        source.insert_ifo(0, true, self.vmg.clone());
        for (i, data) in self.vts.iter().enumerate() {
            let n = (i + 1) as u8;
            if self.kept(n) {
                source.insert_ifo(n, false, data.clone());
                source.insert_ifo(n, true, data.clone());
            }
        }
        for (file, data) in &self.vobs {
            source.insert_vob(*file, data.clone());
        }
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::ByteCursor;
    use crate::ifo::{IfoHandle, Strict};
    use crate::nav::{decode_nav_packet, split_nav_pack};

    #[test]
    fn built_disc_passes_strict_checks() {
        let disc = DiscBuilder::new()
            .first_play(PgcSpec::new(vec![]).pre(vec![0x3002_0000_0001_0000]))
            .vmgm_menu(2, PgcSpec::new(vec![CellSpec::new(0, 4)]))
            .title(
                TitleSpec::new(vec![
                    PgcSpec::new(vec![CellSpec::new(0, 9).vobus(3), CellSpec::new(10, 19)]).links(2, 0, 0),
                    PgcSpec::new(vec![CellSpec::new(20, 29)]),
                ])
                .menu(3, PgcSpec::new(vec![CellSpec::new(0, 4)]))
                .audio_language("en")
                .subp_language("de"),
            )
            .title(TitleSpec::linear(2).widescreen())
            .build();

        let vmgi = IfoHandle::parse(disc.vmg.clone(), &Strict).expect("vmgi").into_vmgi().expect("vmgi");
        assert!(vmgi.first_play_pgc.is_some());
        assert_eq!(vmgi.tt_srpt.titles[1].title_set_nr, 2);
        assert_eq!(vmgi.menu_vobu_admap.map(|m| m.vobu_start_sectors), Some(vec![0]));

        let vtsi = IfoHandle::parse(disc.vts[0].clone(), &Strict).expect("vtsi").into_vtsi().expect("vtsi");
        assert_eq!(vtsi.vts_pgcit.len(), 2);
        assert_eq!(vtsi.vts_vobu_admap.vobu_start_sectors, vec![0, 3, 6, 10, 20]);
        assert_eq!(vtsi.mat.vts_audio_attr[0].language(), "en");
        assert_eq!(vtsi.mat.vts_subp_attr[0].language(), "de");
        assert_eq!(vtsi.vts_pgcit.pgc(1).and_then(|p| p.cell(1)).map(|c| c.last_vobu_start_sector), Some(6));

        let wide = IfoHandle::parse(disc.vts[1].clone(), &Strict).expect("vtsi").into_vtsi().expect("vtsi");
        assert_eq!(wide.mat.vts_video_attr.display_aspect_ratio, 3);
    }

    #[test]
    fn vob_carries_nav_packs_per_vobu() {
        let disc = DiscBuilder::new()
            .title(TitleSpec::new(vec![PgcSpec::new(vec![CellSpec::new(0, 9).vobus(2)])]))
            .build();
        let (_, vob) = disc.vobs.iter().find(|(f, _)| *f == VobFile::title(1)).expect("title vob");
        assert_eq!(vob.len(), 10 * DVD_BLOCK_LEN);

        let first = split_nav_pack(&vob.slice(..DVD_BLOCK_LEN)).expect("nav");
        let (_, dsi) = decode_nav_packet(&first).expect("decode");
        assert_eq!((dsi.dsi_gi.vobu_ea, dsi.next_vobu()), (4, Some(5)));

        let second = split_nav_pack(&vob.slice(5 * DVD_BLOCK_LEN..6 * DVD_BLOCK_LEN)).expect("nav");
        let (pci, dsi) = decode_nav_packet(&second).expect("decode");
        assert_eq!(pci.pci_gi.nv_pck_lbn, 5);
        assert_eq!(dsi.next_vobu(), None);
    }

    #[test]
    fn pgc_offsets_are_relative() {
        let bytes = PgcSpec::new(vec![CellSpec::new(0, 9)]).post(vec![1]).encode();
        let c = ByteCursor::new(bytes.clone());
        let pgc = crate::ifo::pgc::read_pgc(&c, 0, &Strict).expect("pgc");
        assert_eq!(pgc.command_tbl_offset as usize, PGC_SIZE);
        assert_eq!(pgc.post_cmds(), &[1]);
        assert_eq!(pgc.cell_position_offset as usize + 4, bytes.len());
    }
}
