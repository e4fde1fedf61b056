//! Program chains and the tables that index them.
//!
//! A PGC is a 236-byte header followed by up to four sub-tables, each found
//! at a byte offset relative to the PGC's own start. Search pointers in a
//! PGCIT may share one PGC; those entries share the same `Arc<Pgc>`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::bits::ByteCursor;
use crate::schema::{Count, Field, Record, Schema, Value};

use super::check::{Checker, StrictnessPolicy};
use super::time::DvdTime;
use super::IfoError;

pub const PGC_SIZE: usize = 236;
pub const PGC_COMMAND_TBL_SIZE: usize = 8;
pub const COMMAND_DATA_SIZE: usize = 8;
pub const CELL_PLAYBACK_SIZE: usize = 24;
pub const CELL_POSITION_SIZE: usize = 4;
pub const PGCIT_SIZE: usize = 8;
pub const PGCI_SRP_SIZE: usize = 8;
pub const PGCI_UT_SIZE: usize = 8;
pub const PGCI_LU_SIZE: usize = 8;

pub const BLOCK_MODE_NOT_IN_BLOCK: u8 = 0;
pub const BLOCK_MODE_FIRST_CELL: u8 = 1;
pub const BLOCK_MODE_IN_BLOCK: u8 = 2;
pub const BLOCK_MODE_LAST_CELL: u8 = 3;

pub const BLOCK_TYPE_NONE: u8 = 0;
pub const BLOCK_TYPE_ANGLE_BLOCK: u8 = 1;

/// Pre, post and cell commands of one PGC, as raw 64-bit instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable {
    pub pre_cmds: Vec<u64>,
    pub post_cmds: Vec<u64>,
    pub cell_cmds: Vec<u64>,
    pub last_byte: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellPlayback {
    pub block_mode: u8,
    pub block_type: u8,
    pub seamless_play: bool,
    pub interleaved: bool,
    pub stc_discontinuity: bool,
    pub seamless_angle: bool,
    pub playback_mode: bool,
    pub restricted: bool,
    pub cell_type: u8,
    /// 0xFF = infinite.
    pub still_time: u8,
    /// 1-based index into the cell command table, 0 = none.
    pub cell_cmd_nr: u8,
    pub playback_time: DvdTime,
    pub first_sector: u32,
    pub first_ilvu_end_sector: u32,
    pub last_vobu_start_sector: u32,
    pub last_sector: u32,
}

impl CellPlayback {
    pub fn is_angle_block_start(&self) -> bool {
        self.block_mode == BLOCK_MODE_FIRST_CELL && self.block_type == BLOCK_TYPE_ANGLE_BLOCK
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellPosition {
    pub vob_id_nr: u16,
    pub cell_nr: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pgc {
    pub nr_of_programs: u8,
    pub nr_of_cells: u8,
    pub playback_time: DvdTime,
    pub prohibited_ops: u32,
    pub audio_control: [u16; 8],
    pub subp_control: [u32; 32],
    pub next_pgc_nr: u16,
    pub prev_pgc_nr: u16,
    pub goup_pgc_nr: u16,
    pub pg_playback_mode: u8,
    /// 0xFF = infinite.
    pub still_time: u8,
    /// YCrCb sub-picture palette.
    pub palette: [u32; 16],
    pub command_tbl_offset: u16,
    pub program_map_offset: u16,
    pub cell_playback_offset: u16,
    pub cell_position_offset: u16,
    pub command_tbl: Option<CommandTable>,
    /// Entry cell (1-based) of each program.
    pub program_map: Vec<u8>,
    pub cell_playback: Vec<CellPlayback>,
    pub cell_position: Vec<CellPosition>,
}

impl Pgc {
    pub fn pre_cmds(&self) -> &[u64] {
        self.command_tbl.as_ref().map_or(&[], |t| &t.pre_cmds)
    }

    pub fn post_cmds(&self) -> &[u64] {
        self.command_tbl.as_ref().map_or(&[], |t| &t.post_cmds)
    }

    pub fn cell_cmds(&self) -> &[u64] {
        self.command_tbl.as_ref().map_or(&[], |t| &t.cell_cmds)
    }

    /// Cell playback entry for a 1-based cell number.
    pub fn cell(&self, cell_n: usize) -> Option<&CellPlayback> {
        cell_n.checked_sub(1).and_then(|i| self.cell_playback.get(i))
    }

    /// Entry cell for a 1-based program number.
    pub fn program_entry_cell(&self, pg_n: usize) -> Option<u8> {
        pg_n.checked_sub(1).and_then(|i| self.program_map.get(i).copied())
    }
}

/// One search pointer in a PGC information table.
#[derive(Debug, Clone)]
pub struct PgciSrp {
    /// Bit 7 marks a title entry PGC, bits 3-0 the menu id in menu tables.
    pub entry_id: u8,
    pub block_mode: u8,
    pub block_type: u8,
    pub ptl_id_mask: u16,
    pub pgc_start_byte: u32,
    pub pgc: Arc<Pgc>,
}

#[derive(Debug, Clone, Default)]
pub struct Pgcit {
    pub last_byte: u32,
    pub srps: Vec<PgciSrp>,
}

impl Pgcit {
    /// PGC for a 1-based PGC number.
    pub fn pgc(&self, pgc_n: usize) -> Option<&Arc<Pgc>> {
        pgc_n.checked_sub(1).and_then(|i| self.srps.get(i)).map(|s| &s.pgc)
    }

    pub fn len(&self) -> usize {
        self.srps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.srps.is_empty()
    }
}

/// Menu PGCIT for one language.
#[derive(Debug, Clone)]
pub struct PgciLu {
    pub lang_code: u16,
    pub lang_extension: u8,
    /// Which menus exist (0x80 root/title, 0x40 sub-picture, 0x20 audio, 0x10 angle, 0x08 PTT).
    pub exists: u8,
    pub lang_start_byte: u32,
    pub pgcit: Arc<Pgcit>,
}

#[derive(Debug, Clone, Default)]
pub struct PgciUt {
    pub last_byte: u32,
    pub lus: Vec<PgciLu>,
}

// ============================================================================
// Decoding
// ============================================================================

/// Reads the PGC whose header starts at byte `offset` of `data`.
pub fn read_pgc(data: &ByteCursor, offset: usize, policy: &dyn StrictnessPolicy) -> Result<Pgc, IfoError> {
    let check = Checker::new(policy, "pgc");
    let mut c = data.sub_cursor(offset, PGC_SIZE)?;

    check.zero("zero_1", c.read_u16()?)?;
    let mut pgc = Pgc {
        nr_of_programs: c.read_u8()?,
        nr_of_cells: c.read_u8()?,
        playback_time: DvdTime::from_bytes(c.read_array()?),
        prohibited_ops: c.read_u32()?,
        ..Default::default()
    };
    for slot in pgc.audio_control.iter_mut() {
        *slot = c.read_u16()?;
    }
    for slot in pgc.subp_control.iter_mut() {
        *slot = c.read_u32()?;
    }
    pgc.next_pgc_nr = c.read_u16()?;
    pgc.prev_pgc_nr = c.read_u16()?;
    pgc.goup_pgc_nr = c.read_u16()?;
    pgc.pg_playback_mode = c.read_u8()?;
    pgc.still_time = c.read_u8()?;
    for slot in pgc.palette.iter_mut() {
        *slot = c.read_u32()?;
    }
    pgc.command_tbl_offset = c.read_u16()?;
    pgc.program_map_offset = c.read_u16()?;
    pgc.cell_playback_offset = c.read_u16()?;
    pgc.cell_position_offset = c.read_u16()?;

    check.value(
        pgc.nr_of_programs <= pgc.nr_of_cells,
        "nr_of_programs <= nr_of_cells",
        format_args!("{} > {}", pgc.nr_of_programs, pgc.nr_of_cells),
    )?;
    for (i, &ctl) in pgc.audio_control.iter().enumerate() {
        if ctl & 0x8000 == 0 {
            check.zero(&format!("audio_control[{i}]"), ctl)?;
        }
    }
    for (i, &ctl) in pgc.subp_control.iter().enumerate() {
        if ctl & 0x8000_0000 == 0 {
            check.zero(&format!("subp_control[{i}]"), ctl)?;
        }
    }
    if pgc.nr_of_programs == 0 {
        check.zero("still_time", pgc.still_time)?;
        check.zero("pg_playback_mode", pgc.pg_playback_mode)?;
        check.value(pgc.program_map_offset == 0, "program_map_offset == 0", pgc.program_map_offset)?;
        check.value(pgc.cell_playback_offset == 0, "cell_playback_offset == 0", pgc.cell_playback_offset)?;
        check.value(pgc.cell_position_offset == 0, "cell_position_offset == 0", pgc.cell_position_offset)?;
    } else {
        check.value(pgc.program_map_offset != 0, "program_map_offset != 0", 0)?;
        check.value(pgc.cell_playback_offset != 0, "cell_playback_offset != 0", 0)?;
        check.value(pgc.cell_position_offset != 0, "cell_position_offset != 0", 0)?;
    }

    if pgc.command_tbl_offset != 0 {
        pgc.command_tbl = Some(read_command_table(
            data,
            offset + pgc.command_tbl_offset as usize,
            policy,
        )?);
    }
    if pgc.program_map_offset != 0 && pgc.nr_of_programs > 0 {
        let map = data.sub_cursor(offset + pgc.program_map_offset as usize, pgc.nr_of_programs as usize)?;
        pgc.program_map = map.data().to_vec();
    }
    if pgc.cell_playback_offset != 0 && pgc.nr_of_cells > 0 {
        pgc.cell_playback = read_cell_playback_table(
            data,
            offset + pgc.cell_playback_offset as usize,
            pgc.nr_of_cells as usize,
            policy,
        )?;
    }
    if pgc.cell_position_offset != 0 && pgc.nr_of_cells > 0 {
        pgc.cell_position = read_cell_position_table(
            data,
            offset + pgc.cell_position_offset as usize,
            pgc.nr_of_cells as usize,
            policy,
        )?;
    }

    Ok(pgc)
}

/// Command table header and its three command lists. Each list is sized by
/// a count decoded earlier in the same record.
fn command_table_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let commands = |count: &'static str| {
            Field::Array(
                Box::new(Field::U64),
                Count::computed(move |table: &Record| table.uint(count) as usize),
            )
        };
        Schema::new("pgc_command_tbl")
            .field("nr_of_pre", Field::U16)
            .field("nr_of_post", Field::U16)
            .field("nr_of_cell", Field::U16)
            .field("last_byte", Field::U16)
            .field("pre_cmds", commands("nr_of_pre"))
            .field("post_cmds", commands("nr_of_post"))
            .field("cell_cmds", commands("nr_of_cell"))
    })
}

fn read_command_table(
    data: &ByteCursor,
    offset: usize,
    policy: &dyn StrictnessPolicy,
) -> Result<CommandTable, IfoError> {
    let check = Checker::new(policy, "pgc_command_tbl");
    let mut c = data.sub_cursor(offset, data.len().saturating_sub(offset))?;
    let table = command_table_schema().decode(&mut c)?;
    let last_byte = table.uint("last_byte") as u16;

    let total = ["nr_of_pre", "nr_of_post", "nr_of_cell"]
        .iter()
        .map(|name| table.uint(name) as usize)
        .sum::<usize>();
    check.value(total <= 255, "nr_of_pre + nr_of_post + nr_of_cell <= 255", total)?;
    check.value(
        total * COMMAND_DATA_SIZE + PGC_COMMAND_TBL_SIZE <= last_byte as usize + 1,
        "commands fit in last_byte",
        format_args!("{total} commands, last_byte {last_byte}"),
    )?;

    let commands = |name: &str| table.list(name).iter().filter_map(Value::as_uint).collect::<Vec<u64>>();
    Ok(CommandTable {
        pre_cmds: commands("pre_cmds"),
        post_cmds: commands("post_cmds"),
        cell_cmds: commands("cell_cmds"),
        last_byte,
    })
}

fn read_cell_playback_table(
    data: &ByteCursor,
    offset: usize,
    count: usize,
    policy: &dyn StrictnessPolicy,
) -> Result<Vec<CellPlayback>, IfoError> {
    let check = Checker::new(policy, "cell_playback");
    let mut c = data.sub_cursor(offset, count * CELL_PLAYBACK_SIZE)?;
    let mut cells = Vec::with_capacity(count);
    for _ in 0..count {
        let flags = c.read_u8()?;
        let flags2 = c.read_u8()?;
        let cell = CellPlayback {
            block_mode: flags >> 6,
            block_type: (flags >> 4) & 0x03,
            seamless_play: flags & 0x08 != 0,
            interleaved: flags & 0x04 != 0,
            stc_discontinuity: flags & 0x02 != 0,
            seamless_angle: flags & 0x01 != 0,
            playback_mode: flags2 & 0x40 != 0,
            restricted: flags2 & 0x20 != 0,
            cell_type: flags2 & 0x1F,
            still_time: c.read_u8()?,
            cell_cmd_nr: c.read_u8()?,
            playback_time: DvdTime::from_bytes(c.read_array()?),
            first_sector: c.read_u32()?,
            first_ilvu_end_sector: c.read_u32()?,
            last_vobu_start_sector: c.read_u32()?,
            last_sector: c.read_u32()?,
        };
        check.zero("zero_1", flags2 & 0x80)?;
        // Relaxed to <= for discs whose last cell is a single VOBU.
        check.value(
            cell.last_vobu_start_sector <= cell.last_sector,
            "last_vobu_start_sector <= last_sector",
            format_args!("{} > {}", cell.last_vobu_start_sector, cell.last_sector),
        )?;
        check.value(
            cell.first_sector <= cell.last_vobu_start_sector,
            "first_sector <= last_vobu_start_sector",
            format_args!("{} > {}", cell.first_sector, cell.last_vobu_start_sector),
        )?;
        cells.push(cell);
    }
    Ok(cells)
}

fn read_cell_position_table(
    data: &ByteCursor,
    offset: usize,
    count: usize,
    policy: &dyn StrictnessPolicy,
) -> Result<Vec<CellPosition>, IfoError> {
    let check = Checker::new(policy, "cell_position");
    let mut c = data.sub_cursor(offset, count * CELL_POSITION_SIZE)?;
    let mut positions = Vec::with_capacity(count);
    for _ in 0..count {
        let vob_id_nr = c.read_u16()?;
        check.zero("zero_1", c.read_u8()?)?;
        let cell_nr = c.read_u8()?;
        positions.push(CellPosition { vob_id_nr, cell_nr });
    }
    Ok(positions)
}

/// Reads a PGC information table starting at byte `offset`.
pub fn read_pgcit(data: &ByteCursor, offset: usize, policy: &dyn StrictnessPolicy) -> Result<Pgcit, IfoError> {
    let check = Checker::new(policy, "pgcit");
    let mut c = data.sub_cursor(offset, PGCIT_SIZE)?;
    let nr = c.read_u16()? as usize;
    check.zero("zero_1", c.read_u16()?)?;
    let last_byte = c.read_u32()?;
    check.value(nr < 10_000, "nr_of_pgci_srp < 10000", nr)?;

    let mut c = data.sub_cursor(offset + PGCIT_SIZE, nr * PGCI_SRP_SIZE)?;
    let mut shared: HashMap<u32, Arc<Pgc>> = HashMap::new();
    let mut srps = Vec::with_capacity(nr);
    for _ in 0..nr {
        let entry_id = c.read_u8()?;
        let bits = c.read_u8()?;
        let ptl_id_mask = c.read_u16()?;
        let pgc_start_byte = c.read_u32()?;
        check.zero("unknown1", bits & 0x0F)?;
        check.value(
            pgc_start_byte as usize + PGC_SIZE <= last_byte as usize + 1,
            "pgc_start_byte + PGC_SIZE <= last_byte + 1",
            pgc_start_byte,
        )?;

        let pgc = match shared.get(&pgc_start_byte) {
            Some(pgc) => Arc::clone(pgc),
            None => {
                let pgc = Arc::new(read_pgc(data, offset + pgc_start_byte as usize, policy)?);
                shared.insert(pgc_start_byte, Arc::clone(&pgc));
                pgc
            }
        };
        srps.push(PgciSrp {
            entry_id,
            block_mode: bits >> 6,
            block_type: (bits >> 4) & 0x03,
            ptl_id_mask,
            pgc_start_byte,
            pgc,
        });
    }
    Ok(Pgcit { last_byte, srps })
}

/// Reads a menu PGCI unit table starting at byte `offset`.
pub fn read_pgci_ut(data: &ByteCursor, offset: usize, policy: &dyn StrictnessPolicy) -> Result<PgciUt, IfoError> {
    let check = Checker::new(policy, "pgci_ut");
    let mut c = data.sub_cursor(offset, PGCI_UT_SIZE)?;
    let nr = c.read_u16()? as usize;
    check.zero("zero_1", c.read_u16()?)?;
    let last_byte = c.read_u32()?;
    check.value(nr != 0, "nr_of_lus != 0", nr)?;
    check.value(nr < 100, "nr_of_lus < 100", nr)?;

    let mut c = data.sub_cursor(offset + PGCI_UT_SIZE, nr * PGCI_LU_SIZE)?;
    let mut shared: HashMap<u32, Arc<Pgcit>> = HashMap::new();
    let mut lus = Vec::with_capacity(nr);
    for _ in 0..nr {
        let lang_code = c.read_u16()?;
        let lang_extension = c.read_u8()?;
        let exists = c.read_u8()?;
        let lang_start_byte = c.read_u32()?;
        check.value(exists & 0x07 == 0, "exists & 0x07 == 0", exists)?;

        let pgcit = match shared.get(&lang_start_byte) {
            Some(p) => Arc::clone(p),
            None => {
                let p = Arc::new(read_pgcit(data, offset + lang_start_byte as usize, policy)?);
                shared.insert(lang_start_byte, Arc::clone(&p));
                p
            }
        };
        lus.push(PgciLu {
            lang_code,
            lang_extension,
            exists,
            lang_start_byte,
            pgcit,
        });
    }
    Ok(PgciUt { last_byte, lus })
}
