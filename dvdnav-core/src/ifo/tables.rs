//! Search pointer, parental, attribute, address and time map tables.
//!
//! Every table starts with a small header ending in `last_byte`, the offset of
//! its final byte relative to the table start. Entry counts stored on disc are
//! not always consistent with `last_byte`; where they disagree the count is
//! clamped to what actually fits and the anomaly is reported.

use bytes::Bytes;

use crate::bits::ByteCursor;

use super::attributes::{
    audio_table_schema, read_audio_attr, read_subp_attrs, read_video_attr, AudioAttr, SubpAttr, VideoAttr,
    SUBP_ATTR_SIZE,
};
use super::check::{Checker, StrictnessPolicy};
use super::IfoError;

pub const TT_SRPT_SIZE: usize = 8;
pub const TITLE_INFO_SIZE: usize = 12;
pub const VTS_PTT_SRPT_SIZE: usize = 8;
pub const PTT_INFO_SIZE: usize = 4;
pub const PTL_MAIT_SIZE: usize = 8;
pub const PTL_MAIT_COUNTRY_SIZE: usize = 8;
pub const PTL_LEVELS: usize = 8;
pub const VTS_ATRT_SIZE: usize = 8;
pub const VTS_ATTRIBUTES_SIZE: usize = 542;
pub const VTS_ATTRIBUTES_MIN_SIZE: usize = 356;
pub const TXTDT_MGI_SIZE: usize = 20;
pub const C_ADT_SIZE: usize = 8;
pub const CELL_ADR_SIZE: usize = 12;
pub const VOBU_ADMAP_SIZE: usize = 4;
pub const VTS_TMAPT_SIZE: usize = 8;
pub const VTS_TMAP_SIZE: usize = 4;

/// Bytes described by a header's `last_byte`, minus the header itself.
fn info_length(last_byte: u32, header: usize) -> usize {
    (last_byte as usize + 1).saturating_sub(header)
}

// ============================================================================
// Title search pointers (VMGI)
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TitleInfo {
    /// Playback type flags; bit 6 marks multi-PGC or random titles.
    pub pb_ty: u8,
    pub nr_of_angles: u8,
    pub nr_of_ptts: u16,
    pub parental_id: u16,
    pub title_set_nr: u8,
    pub vts_ttn: u8,
    pub title_set_sector: u32,
}

impl TitleInfo {
    pub fn is_multi_or_random_pgc(&self) -> bool {
        self.pb_ty & 0x40 != 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TtSrpt {
    pub last_byte: u32,
    pub titles: Vec<TitleInfo>,
}

impl TtSrpt {
    /// Title for a 1-based title number.
    pub fn title(&self, ttn: usize) -> Option<&TitleInfo> {
        ttn.checked_sub(1).and_then(|i| self.titles.get(i))
    }
}

pub fn read_tt_srpt(data: &ByteCursor, offset: usize, policy: &dyn StrictnessPolicy) -> Result<TtSrpt, IfoError> {
    let check = Checker::new(policy, "tt_srpt");
    let mut c = data.sub_cursor(offset, TT_SRPT_SIZE)?;
    let mut nr = c.read_u16()? as usize;
    check.zero("zero_1", c.read_u16()?)?;
    let last_byte = c.read_u32()?;

    let available = info_length(last_byte, TT_SRPT_SIZE) / TITLE_INFO_SIZE;
    if nr > available {
        tracing::debug!(target: "dvdnav::ifo", "tt_srpt: {} titles but room for {}, truncating", nr, available);
        nr = available;
    }
    check.value(nr != 0, "nr_of_srpts != 0", nr)?;
    check.value(nr < 100, "nr_of_srpts < 100", nr)?;

    let mut c = data.sub_cursor(offset + TT_SRPT_SIZE, nr * TITLE_INFO_SIZE)?;
    let mut titles = Vec::with_capacity(nr);
    for _ in 0..nr {
        let title = TitleInfo {
            pb_ty: c.read_u8()?,
            nr_of_angles: c.read_u8()?,
            nr_of_ptts: c.read_u16()?,
            parental_id: c.read_u16()?,
            title_set_nr: c.read_u8()?,
            vts_ttn: c.read_u8()?,
            title_set_sector: c.read_u32()?,
        };
        check.zero("pb_ty.zero_1", title.pb_ty & 0x80)?;
        check.value(
            (1..10).contains(&title.nr_of_angles),
            "1 <= nr_of_angles < 10",
            title.nr_of_angles,
        )?;
        // nr_of_ptts may legitimately be 0.
        check.value(title.nr_of_ptts < 1000, "nr_of_ptts < 1000", title.nr_of_ptts)?;
        check.value(
            (1..100).contains(&title.title_set_nr),
            "1 <= title_set_nr < 100",
            title.title_set_nr,
        )?;
        check.value((1..100).contains(&title.vts_ttn), "1 <= vts_ttn < 100", title.vts_ttn)?;
        titles.push(title);
    }
    Ok(TtSrpt { last_byte, titles })
}

// ============================================================================
// Part-of-title search pointers (VTSI)
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartOfTitle {
    pub pgcn: u16,
    pub pgn: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtuPtt {
    pub ptts: Vec<PartOfTitle>,
}

impl TtuPtt {
    pub fn nr_of_ptts(&self) -> usize {
        self.ptts.len()
    }

    /// Part for a 1-based part number.
    pub fn part(&self, pttn: usize) -> Option<&PartOfTitle> {
        pttn.checked_sub(1).and_then(|i| self.ptts.get(i))
    }
}

#[derive(Debug, Clone, Default)]
pub struct VtsPttSrpt {
    pub last_byte: u32,
    pub titles: Vec<TtuPtt>,
}

impl VtsPttSrpt {
    /// Parts of a 1-based VTS title number.
    pub fn title(&self, vts_ttn: usize) -> Option<&TtuPtt> {
        vts_ttn.checked_sub(1).and_then(|i| self.titles.get(i))
    }
}

/// Reads the PTT table. The number of parts per title is not stored; it is
/// the distance to the next title's offset (or to `last_byte + 1`) over 4.
pub fn read_vts_ptt_srpt(
    data: &ByteCursor,
    offset: usize,
    policy: &dyn StrictnessPolicy,
) -> Result<VtsPttSrpt, IfoError> {
    let check = Checker::new(policy, "vts_ptt_srpt");
    let mut c = data.sub_cursor(offset, VTS_PTT_SRPT_SIZE)?;
    let mut nr = c.read_u16()? as usize;
    check.zero("zero_1", c.read_u16()?)?;
    let last_byte = c.read_u32()?;
    check.value(nr != 0, "nr_of_srpts != 0", nr)?;
    check.value(nr < 100, "nr_of_srpts < 100", nr)?;

    let room = info_length(last_byte, VTS_PTT_SRPT_SIZE) / 4;
    if nr > room {
        tracing::debug!(target: "dvdnav::ifo", "vts_ptt_srpt: {} titles but room for {}", nr, room);
        nr = room;
    }

    let mut c = data.sub_cursor(offset + VTS_PTT_SRPT_SIZE, nr * 4)?;
    let mut offsets = Vec::with_capacity(nr);
    for i in 0..nr {
        let ttu = c.read_u32()?;
        if ttu as u64 + PTT_INFO_SIZE as u64 > last_byte as u64 + 1 {
            tracing::warn!(
                target: "dvdnav::ifo",
                "vts_ptt_srpt: title {} points past the table, keeping {} titles",
                i + 1,
                i
            );
            break;
        }
        offsets.push(ttu);
    }

    let mut titles = Vec::with_capacity(offsets.len());
    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).map_or(last_byte as i64 + 1, |&next| next as i64);
        let span = (end - start as i64).max(0) as usize;
        check.value(span % PTT_INFO_SIZE == 0, "ptt span is a multiple of 4", span)?;
        let count = span / PTT_INFO_SIZE;

        if count == 0 {
            tracing::debug!(target: "dvdnav::ifo", "title {} has no parts, using PGC 1 program 1", i + 1);
            titles.push(TtuPtt {
                ptts: vec![PartOfTitle { pgcn: 1, pgn: 1 }],
            });
            continue;
        }

        let mut c = data.sub_cursor(offset + start as usize, count * PTT_INFO_SIZE)?;
        let mut ptts = Vec::with_capacity(count);
        for _ in 0..count {
            let ptt = PartOfTitle {
                pgcn: c.read_u16()?,
                pgn: c.read_u16()?,
            };
            check.value((1..1000).contains(&ptt.pgcn), "1 <= pgcn < 1000", ptt.pgcn)?;
            check.value((1..100).contains(&ptt.pgn), "1 <= pgn < 100", ptt.pgn)?;
            ptts.push(ptt);
        }
        titles.push(TtuPtt { ptts });
    }
    Ok(VtsPttSrpt { last_byte, titles })
}

// ============================================================================
// Parental management
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtlMaitCountry {
    pub country_code: u16,
    pub pf_ptl_mai_start_byte: u16,
    /// `pf_ptl_mai[vts][level]`, VTS 0 being the VMG, level 0 the least strict.
    pub pf_ptl_mai: Vec<[u16; PTL_LEVELS]>,
}

#[derive(Debug, Clone, Default)]
pub struct PtlMait {
    pub nr_of_vtss: u16,
    pub last_byte: u32,
    pub countries: Vec<PtlMaitCountry>,
}

pub fn read_ptl_mait(data: &ByteCursor, offset: usize, policy: &dyn StrictnessPolicy) -> Result<PtlMait, IfoError> {
    let check = Checker::new(policy, "ptl_mait");
    let mut c = data.sub_cursor(offset, PTL_MAIT_SIZE)?;
    let nr_countries = c.read_u16()? as usize;
    let nr_of_vtss = c.read_u16()?;
    let last_byte = c.read_u32()?;

    check.value((1..100).contains(&nr_countries), "1 <= nr_of_countries < 100", nr_countries)?;
    check.value((1..100).contains(&nr_of_vtss), "1 <= nr_of_vtss < 100", nr_of_vtss)?;
    check.value(
        nr_countries * PTL_MAIT_COUNTRY_SIZE <= info_length(last_byte, PTL_MAIT_SIZE),
        "countries fit in last_byte",
        last_byte,
    )?;

    let columns = nr_of_vtss as usize + 1;
    let matrix_len = columns * PTL_LEVELS * 2;
    let mut c = data.sub_cursor(offset + PTL_MAIT_SIZE, nr_countries * PTL_MAIT_COUNTRY_SIZE)?;
    let mut countries = Vec::with_capacity(nr_countries);
    for _ in 0..nr_countries {
        let country_code = c.read_u16()?;
        check.zero("zero_1", c.read_u16()?)?;
        let start = c.read_u16()?;
        check.zero("zero_2", c.read_u16()?)?;
        check.value(
            start as usize + matrix_len <= last_byte as usize + 1,
            "pf_ptl_mai fits in last_byte",
            start,
        )?;

        // Stored level-major with the strictest level first.
        let mut m = data.sub_cursor(offset + start as usize, matrix_len)?;
        let mut raw = Vec::with_capacity(columns * PTL_LEVELS);
        for _ in 0..columns * PTL_LEVELS {
            raw.push(m.read_u16()?);
        }
        let pf_ptl_mai = (0..columns)
            .map(|vts| {
                let mut row = [0u16; PTL_LEVELS];
                for (level, slot) in row.iter_mut().enumerate() {
                    *slot = raw[(PTL_LEVELS - 1 - level) * columns + vts];
                }
                row
            })
            .collect();

        countries.push(PtlMaitCountry {
            country_code,
            pf_ptl_mai_start_byte: start,
            pf_ptl_mai,
        });
    }
    Ok(PtlMait {
        nr_of_vtss,
        last_byte,
        countries,
    })
}

// ============================================================================
// VTS attribute table
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VtsAttributes {
    pub last_byte: u32,
    pub vts_cat: u32,
    pub vtsm_vobs_attr: VideoAttr,
    pub nr_of_vtsm_audio_streams: u8,
    pub vtsm_audio_attr: AudioAttr,
    pub nr_of_vtsm_subp_streams: u8,
    pub vtsm_subp_attr: Option<SubpAttr>,
    pub vtstt_vobs_video_attr: VideoAttr,
    pub nr_of_vtstt_audio_streams: u8,
    pub vtstt_audio_attr: Vec<AudioAttr>,
    pub nr_of_vtstt_subp_streams: u8,
    /// Only the entries the record actually stores; short records carry fewer than 32.
    pub vtstt_subp_attr: Vec<SubpAttr>,
}

#[derive(Debug, Clone, Default)]
pub struct VtsAtrt {
    pub last_byte: u32,
    pub vtss: Vec<VtsAttributes>,
}

pub fn read_vts_atrt(
    data: &ByteCursor,
    offset: usize,
    expected_vtss: u16,
    policy: &dyn StrictnessPolicy,
) -> Result<VtsAtrt, IfoError> {
    let check = Checker::new(policy, "vts_atrt");
    let mut c = data.sub_cursor(offset, VTS_ATRT_SIZE)?;
    let nr = c.read_u16()? as usize;
    check.zero("zero_1", c.read_u16()?)?;
    let last_byte = c.read_u32()?;
    check.value((1..100).contains(&nr), "1 <= nr_of_vtss < 100", nr)?;
    check.value(
        nr == expected_vtss as usize,
        "nr_of_vtss matches the VMGI",
        format_args!("{nr} vs {expected_vtss}"),
    )?;
    check.value(
        nr * (4 + VTS_ATTRIBUTES_MIN_SIZE) + VTS_ATRT_SIZE < last_byte as usize + 1,
        "attributes fit in last_byte",
        last_byte,
    )?;

    let mut c = data.sub_cursor(offset + VTS_ATRT_SIZE, nr * 4)?;
    let mut vtss = Vec::with_capacity(nr);
    for _ in 0..nr {
        let start = c.read_u32()? as usize;
        check.value(
            start + VTS_ATTRIBUTES_MIN_SIZE < last_byte as usize + 1,
            "vts_atrt entry fits in last_byte",
            start,
        )?;
        vtss.push(read_vts_attributes(data, offset + start, policy)?);
    }
    Ok(VtsAtrt { last_byte, vtss })
}

fn read_vts_attributes(
    data: &ByteCursor,
    offset: usize,
    policy: &dyn StrictnessPolicy,
) -> Result<VtsAttributes, IfoError> {
    let check = Checker::new(policy, "vts_attributes");
    let mut c = data.sub_cursor(offset, VTS_ATTRIBUTES_MIN_SIZE)?;
    let mut attrs = VtsAttributes {
        last_byte: c.read_u32()?,
        vts_cat: c.read_u32()?,
        vtsm_vobs_attr: read_video_attr(&mut c)?,
        ..Default::default()
    };
    check.zero("zero_1", c.read_u8()?)?;
    attrs.nr_of_vtsm_audio_streams = c.read_u8()?;
    attrs.vtsm_audio_attr = read_audio_attr(&mut c)?;
    check.zero_bytes("zero_2", &c.read_bytes(56)?)?;
    check.zero_bytes("zero_3", &c.read_bytes(16)?)?;
    check.zero("zero_4", c.read_u8()?)?;
    attrs.nr_of_vtsm_subp_streams = c.read_u8()?;
    let has_vtsm_subp = attrs.nr_of_vtsm_subp_streams > 0;
    attrs.vtsm_subp_attr = read_subp_attrs(&mut c, 1)?.into_iter().next().filter(|_| has_vtsm_subp);
    check.zero_bytes("zero_5", &c.read_bytes(27 * SUBP_ATTR_SIZE)?)?;
    check.zero_bytes("zero_6", &c.read_bytes(2)?)?;
    attrs.vtstt_vobs_video_attr = read_video_attr(&mut c)?;
    check.zero("zero_7", c.read_u8()?)?;
    attrs.nr_of_vtstt_audio_streams = c.read_u8()?;
    let audio = audio_table_schema(8).decode(&mut c)?;
    attrs.vtstt_audio_attr = audio
        .list("attrs")
        .iter()
        .filter_map(|v| v.as_record())
        .map(AudioAttr::from_record)
        .collect();
    check.zero_bytes("zero_8", &c.read_bytes(16)?)?;
    check.zero("zero_9", c.read_u8()?)?;
    attrs.nr_of_vtstt_subp_streams = c.read_u8()?;

    check.value(attrs.nr_of_vtsm_audio_streams <= 1, "nr_of_vtsm_audio_streams <= 1", attrs.nr_of_vtsm_audio_streams)?;
    check.value(attrs.nr_of_vtsm_subp_streams <= 1, "nr_of_vtsm_subp_streams <= 1", attrs.nr_of_vtsm_subp_streams)?;
    check.value(
        attrs.nr_of_vtstt_audio_streams <= 8,
        "nr_of_vtstt_audio_streams <= 8",
        attrs.nr_of_vtstt_audio_streams,
    )?;
    for (i, a) in attrs.vtstt_audio_attr.iter().enumerate().skip(attrs.nr_of_vtstt_audio_streams as usize) {
        check.value(*a == AudioAttr::default(), "unused vtstt_audio_attr is zero", i)?;
    }
    check.value(
        attrs.nr_of_vtstt_subp_streams <= 32,
        "nr_of_vtstt_subp_streams <= 32",
        attrs.nr_of_vtstt_subp_streams,
    )?;

    // The minimum record stores one sub-picture attribute; longer ones up to 32.
    let stored = (info_length(attrs.last_byte, VTS_ATTRIBUTES_MIN_SIZE) / SUBP_ATTR_SIZE + 1).min(32);
    check.value(
        attrs.nr_of_vtstt_subp_streams as usize <= stored,
        "nr_of_vtstt_subp_streams <= stored attributes",
        format_args!("{} > {}", attrs.nr_of_vtstt_subp_streams, stored),
    )?;
    let mut c = data.sub_cursor(
        offset + VTS_ATTRIBUTES_MIN_SIZE - SUBP_ATTR_SIZE,
        stored * SUBP_ATTR_SIZE,
    )?;
    attrs.vtstt_subp_attr = read_subp_attrs(&mut c, stored)?;
    Ok(attrs)
}

// ============================================================================
// Text data manager
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TxtdtMgi {
    pub disc_name: String,
    pub nr_of_text_data: u16,
    pub last_byte: u32,
    /// Language units, undecoded.
    pub body: Bytes,
}

pub fn read_txtdt_mgi(data: &ByteCursor, offset: usize) -> Result<TxtdtMgi, IfoError> {
    let mut c = data.sub_cursor(offset, TXTDT_MGI_SIZE)?;
    let disc_name = c.read_string(12)?;
    c.forward(2)?;
    let nr_of_text_data = c.read_u16()?;
    let last_byte = c.read_u32()?;
    let body_len = info_length(last_byte, TXTDT_MGI_SIZE);
    let available = data.len().saturating_sub(offset + TXTDT_MGI_SIZE);
    let body = data
        .sub_cursor(offset + TXTDT_MGI_SIZE, body_len.min(available))?
        .data()
        .clone();
    Ok(TxtdtMgi {
        disc_name,
        nr_of_text_data,
        last_byte,
        body,
    })
}

// ============================================================================
// Cell address table
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellAdr {
    pub vob_id: u16,
    pub cell_id: u8,
    pub start_sector: u32,
    pub last_sector: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CAdt {
    pub nr_of_vobs: u16,
    pub last_byte: u32,
    pub cells: Vec<CellAdr>,
}

pub fn read_c_adt(data: &ByteCursor, offset: usize, policy: &dyn StrictnessPolicy) -> Result<CAdt, IfoError> {
    let check = Checker::new(policy, "c_adt");
    let mut c = data.sub_cursor(offset, C_ADT_SIZE)?;
    let mut nr_of_vobs = c.read_u16()?;
    check.zero("zero_1", c.read_u16()?)?;
    let last_byte = c.read_u32()?;
    check.value(nr_of_vobs > 0, "nr_of_vobs > 0", nr_of_vobs)?;

    let entries = info_length(last_byte, C_ADT_SIZE) / CELL_ADR_SIZE;
    if entries < nr_of_vobs as usize {
        tracing::debug!(
            target: "dvdnav::ifo",
            "c_adt: nr_of_vobs {} exceeds {} entries, clamping",
            nr_of_vobs,
            entries
        );
        nr_of_vobs = entries as u16;
    }

    let mut c = data.sub_cursor(offset + C_ADT_SIZE, entries * CELL_ADR_SIZE)?;
    let mut cells = Vec::with_capacity(entries);
    for _ in 0..entries {
        let vob_id = c.read_u16()?;
        let cell_id = c.read_u8()?;
        check.zero("cell_adr.zero_1", c.read_u8()?)?;
        let cell = CellAdr {
            vob_id,
            cell_id,
            start_sector: c.read_u32()?,
            last_sector: c.read_u32()?,
        };
        check.value(cell.vob_id > 0, "vob_id > 0", cell.vob_id)?;
        check.value(cell.vob_id <= nr_of_vobs, "vob_id <= nr_of_vobs", cell.vob_id)?;
        check.value(cell.cell_id > 0, "cell_id > 0", cell.cell_id)?;
        check.value(
            cell.start_sector <= cell.last_sector,
            "start_sector <= last_sector",
            format_args!("{} > {}", cell.start_sector, cell.last_sector),
        )?;
        cells.push(cell);
    }
    Ok(CAdt {
        nr_of_vobs,
        last_byte,
        cells,
    })
}

// ============================================================================
// VOBU address map
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct VobuAdmap {
    pub last_byte: u32,
    /// First sector of every VOBU, ascending.
    pub vobu_start_sectors: Vec<u32>,
}

pub fn read_vobu_admap(
    data: &ByteCursor,
    offset: usize,
    policy: &dyn StrictnessPolicy,
) -> Result<VobuAdmap, IfoError> {
    let check = Checker::new(policy, "vobu_admap");
    let mut c = data.sub_cursor(offset, VOBU_ADMAP_SIZE)?;
    let last_byte = c.read_u32()?;
    let len = info_length(last_byte, VOBU_ADMAP_SIZE);
    check.value(len % 4 == 0, "info_length % 4 == 0", len)?;

    let count = len / 4;
    let mut c = data.sub_cursor(offset + VOBU_ADMAP_SIZE, count * 4)?;
    let vobu_start_sectors = (0..count).map(|_| c.read_u32()).collect::<Result<Vec<_>, _>>()?;
    Ok(VobuAdmap {
        last_byte,
        vobu_start_sectors,
    })
}

// ============================================================================
// Time map table
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tmap {
    /// Seconds per entry.
    pub tmu: u8,
    /// Sector offsets; bit 31 flags a discontinuity.
    pub map_ent: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Tmapt {
    pub last_byte: u32,
    pub tmaps: Vec<Tmap>,
}

pub fn read_vts_tmapt(data: &ByteCursor, offset: usize, policy: &dyn StrictnessPolicy) -> Result<Tmapt, IfoError> {
    let check = Checker::new(policy, "vts_tmapt");
    let mut c = data.sub_cursor(offset, VTS_TMAPT_SIZE)?;
    let nr = c.read_u16()? as usize;
    check.zero("zero_1", c.read_u16()?)?;
    let last_byte = c.read_u32()?;

    let mut c = data.sub_cursor(offset + VTS_TMAPT_SIZE, nr * 4)?;
    let mut tmaps = Vec::with_capacity(nr);
    for _ in 0..nr {
        let start = offset + c.read_u32()? as usize;
        let mut m = data.sub_cursor(start, VTS_TMAP_SIZE)?;
        let tmu = m.read_u8()?;
        check.zero("tmap.zero_1", m.read_u8()?)?;
        let entries = m.read_u16()? as usize;
        let mut m = data.sub_cursor(start + VTS_TMAP_SIZE, entries * 4)?;
        let map_ent = (0..entries).map(|_| m.read_u32()).collect::<Result<Vec<_>, _>>()?;
        tmaps.push(Tmap { tmu, map_ent });
    }
    Ok(Tmapt { last_byte, tmaps })
}
