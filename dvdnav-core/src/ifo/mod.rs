//! IFO (navigation metadata) reader.
//!
//! One IFO is either the Video Manager (`VIDEO_TS.IFO`, title 0) or a Video
//! Title Set (`VTS_XX_0.IFO`, titles 1..=99). The two variants carry
//! different mandatory tables, so they are separate handle types:
//!
//! | variant | mandatory                                   | optional |
//! |---------|---------------------------------------------|----------|
//! | VMGI    | `tt_srpt`, `vts_atrt`                       | first play PGC, menus, `ptl_mait`, `txtdt_mgi`, menu cell/VOBU maps |
//! | VTSI    | `vts_ptt_srpt`, `vts_pgcit`, `vts_c_adt`, `vts_vobu_admap` | menus, `vts_tmapt`, menu cell/VOBU maps |

pub mod attributes;
pub mod check;
pub mod mat;
pub mod pgc;
pub mod tables;
pub mod time;

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bits::{ByteCursor, CursorError};
use crate::schema::SchemaError;

pub use check::{Lenient, Strict, StrictnessPolicy, Violation, ViolationKind};
pub use mat::{VmgiMat, VtsiMat};
pub use pgc::{CellPlayback, CellPosition, CommandTable, Pgc, PgciLu, PgciSrp, PgciUt, Pgcit};
pub use tables::{
    CAdt, CellAdr, PartOfTitle, PtlMait, PtlMaitCountry, Tmap, Tmapt, TitleInfo, TtSrpt, TtuPtt,
    TxtdtMgi, VobuAdmap, VtsAtrt, VtsAttributes, VtsPttSrpt,
};
pub use time::{DvdTime, FrameRate};

/// Logical block size of every DVD file.
pub const DVD_BLOCK_LEN: usize = 2048;

pub const VMG_IDENTIFIER: &str = "DVDVIDEO-VMG";
pub const VTS_IDENTIFIER: &str = "DVDVIDEO-VTS";

#[derive(Debug, Error)]
pub enum IfoError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("unknown IFO identifier {0:?}")]
    BadMagic(String),
    #[error("mandatory table {0} is absent")]
    MissingTable(&'static str),
    #[error("failed to decode {table}: {source}")]
    Table {
        table: &'static str,
        #[source]
        source: Box<IfoError>,
    },
    #[error("title {title} holds a {found} IFO")]
    WrongVariant { title: u8, found: &'static str },
    #[error("strict mode: {0}")]
    Strict(Violation),
    #[error("cannot open title {title}: {reason}")]
    CannotOpenTitle { title: u8, reason: String },
}

impl IfoError {
    fn in_table(self, table: &'static str) -> Self {
        match self {
            e @ IfoError::Strict(_) => e,
            e @ IfoError::Table { .. } => e,
            e => IfoError::Table {
                table,
                source: Box::new(e),
            },
        }
    }
}

// ============================================================================
// Handles
// ============================================================================

#[derive(Debug, Clone)]
pub struct VmgiHandle {
    pub mat: VmgiMat,
    pub first_play_pgc: Option<Arc<Pgc>>,
    pub tt_srpt: TtSrpt,
    pub pgci_ut: Option<PgciUt>,
    pub ptl_mait: Option<PtlMait>,
    pub vts_atrt: VtsAtrt,
    pub txtdt_mgi: Option<TxtdtMgi>,
    pub menu_c_adt: Option<CAdt>,
    pub menu_vobu_admap: Option<VobuAdmap>,
}

#[derive(Debug, Clone)]
pub struct VtsiHandle {
    pub mat: VtsiMat,
    pub vts_ptt_srpt: VtsPttSrpt,
    pub vts_pgcit: Pgcit,
    pub pgci_ut: Option<PgciUt>,
    pub vts_tmapt: Option<Tmapt>,
    pub menu_c_adt: Option<CAdt>,
    pub menu_vobu_admap: Option<VobuAdmap>,
    pub vts_c_adt: CAdt,
    pub vts_vobu_admap: VobuAdmap,
}

#[derive(Debug, Clone)]
pub enum IfoHandle {
    Vmgi(Box<VmgiHandle>),
    Vtsi(Box<VtsiHandle>),
}

impl IfoHandle {
    /// Decode one IFO image, picking the variant from its identifier.
    pub fn parse(data: Bytes, policy: &dyn StrictnessPolicy) -> Result<Self, IfoError> {
        let cursor = ByteCursor::new(data);
        let magic = cursor.sub_cursor(0, 12)?.read_string(12)?;
        match magic.as_str() {
            VMG_IDENTIFIER => Ok(IfoHandle::Vmgi(Box::new(read_vmgi(&cursor, policy)?))),
            VTS_IDENTIFIER => Ok(IfoHandle::Vtsi(Box::new(read_vtsi(&cursor, policy)?))),
            _ => Err(IfoError::BadMagic(magic)),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            IfoHandle::Vmgi(_) => "VMGI",
            IfoHandle::Vtsi(_) => "VTSI",
        }
    }

    pub fn into_vmgi(self) -> Option<VmgiHandle> {
        match self {
            IfoHandle::Vmgi(h) => Some(*h),
            IfoHandle::Vtsi(_) => None,
        }
    }

    pub fn into_vtsi(self) -> Option<VtsiHandle> {
        match self {
            IfoHandle::Vtsi(h) => Some(*h),
            IfoHandle::Vmgi(_) => None,
        }
    }
}

/// Raw bytes of one IFO and its backup, either of which may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IfoFiles {
    #[serde(skip)]
    pub ifo: Option<Bytes>,
    #[serde(skip)]
    pub bup: Option<Bytes>,
}

/// On-disc file name of the IFO for `title` (0 = video manager).
pub fn ifo_file_name(title: u8, backup: bool) -> String {
    let ext = if backup { "BUP" } else { "IFO" };
    if title == 0 {
        format!("VIDEO_TS.{ext}")
    } else {
        format!("VTS_{title:02}_0.{ext}")
    }
}

/// Open title `title` from its IFO, falling back to the `.BUP` copy once.
pub fn open(files: &IfoFiles, title: u8, policy: &dyn StrictnessPolicy) -> Result<IfoHandle, IfoError> {
    let attempt = |data: &Option<Bytes>, backup: bool| -> Result<IfoHandle, IfoError> {
        let data = data.clone().ok_or_else(|| IfoError::CannotOpenTitle {
            title,
            reason: format!("{} not available", ifo_file_name(title, backup)),
        })?;
        let handle = IfoHandle::parse(data, policy)?;
        let expected_vmg = title == 0;
        match (&handle, expected_vmg) {
            (IfoHandle::Vmgi(_), true) | (IfoHandle::Vtsi(_), false) => Ok(handle),
            _ => Err(IfoError::WrongVariant {
                title,
                found: handle.variant_name(),
            }),
        }
    };

    match attempt(&files.ifo, false) {
        Ok(handle) => Ok(handle),
        Err(primary) => {
            tracing::warn!(
                target: "dvdnav::ifo",
                "{} unusable ({}), trying backup",
                ifo_file_name(title, false),
                primary
            );
            attempt(&files.bup, true).map_err(|backup| IfoError::CannotOpenTitle {
                title,
                reason: format!("{primary}; backup: {backup}"),
            })
        }
    }
}

// ============================================================================
// Variant assembly
// ============================================================================

fn mandatory<T>(
    table: &'static str,
    sector: u32,
    read: impl FnOnce(usize) -> Result<T, IfoError>,
) -> Result<T, IfoError> {
    if sector == 0 {
        return Err(IfoError::MissingTable(table));
    }
    read(sector as usize * DVD_BLOCK_LEN).map_err(|e| e.in_table(table))
}

fn optional<T>(
    table: &'static str,
    sector: u32,
    read: impl FnOnce(usize) -> Result<T, IfoError>,
) -> Result<Option<T>, IfoError> {
    if sector == 0 {
        return Ok(None);
    }
    match read(sector as usize * DVD_BLOCK_LEN) {
        Ok(v) => Ok(Some(v)),
        Err(e @ IfoError::Strict(_)) => Err(e),
        Err(e) => {
            tracing::warn!(target: "dvdnav::ifo", "ignoring unreadable optional {}: {}", table, e);
            Ok(None)
        }
    }
}

fn read_vmgi(data: &ByteCursor, policy: &dyn StrictnessPolicy) -> Result<VmgiHandle, IfoError> {
    let mat = mat::read_vmgi_mat(&mut data.clone(), policy)?;

    let first_play_pgc = if mat.first_play_pgc != 0 {
        match pgc::read_pgc(data, mat.first_play_pgc as usize, policy) {
            Ok(pgc) => Some(Arc::new(pgc)),
            Err(e @ IfoError::Strict(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(target: "dvdnav::ifo", "ignoring unreadable first play PGC: {}", e);
                None
            }
        }
    } else {
        None
    };

    let tt_srpt = mandatory("tt_srpt", mat.tt_srpt, |o| tables::read_tt_srpt(data, o, policy))?;
    let pgci_ut = optional("vmgm_pgci_ut", mat.vmgm_pgci_ut, |o| pgc::read_pgci_ut(data, o, policy))?;
    let ptl_mait = optional("ptl_mait", mat.ptl_mait, |o| tables::read_ptl_mait(data, o, policy))?;
    let vts_atrt = mandatory("vts_atrt", mat.vts_atrt, |o| {
        tables::read_vts_atrt(data, o, mat.vmg_nr_of_title_sets, policy)
    })?;
    let txtdt_mgi = optional("txtdt_mgi", mat.txtdt_mgi, |o| tables::read_txtdt_mgi(data, o))?;
    let menu_c_adt = optional("vmgm_c_adt", mat.vmgm_c_adt, |o| tables::read_c_adt(data, o, policy))?;
    let menu_vobu_admap = optional("vmgm_vobu_admap", mat.vmgm_vobu_admap, |o| {
        tables::read_vobu_admap(data, o, policy)
    })?;

    tracing::debug!(
        target: "dvdnav::ifo",
        "VMGI: {} titles, {} title sets",
        tt_srpt.titles.len(),
        mat.vmg_nr_of_title_sets
    );

    Ok(VmgiHandle {
        mat,
        first_play_pgc,
        tt_srpt,
        pgci_ut,
        ptl_mait,
        vts_atrt,
        txtdt_mgi,
        menu_c_adt,
        menu_vobu_admap,
    })
}

fn read_vtsi(data: &ByteCursor, policy: &dyn StrictnessPolicy) -> Result<VtsiHandle, IfoError> {
    let mat = mat::read_vtsi_mat(&mut data.clone(), policy)?;

    let vts_ptt_srpt = mandatory("vts_ptt_srpt", mat.vts_ptt_srpt, |o| {
        tables::read_vts_ptt_srpt(data, o, policy)
    })?;
    let vts_pgcit = mandatory("vts_pgcit", mat.vts_pgcit, |o| pgc::read_pgcit(data, o, policy))?;
    let pgci_ut = optional("vtsm_pgci_ut", mat.vtsm_pgci_ut, |o| pgc::read_pgci_ut(data, o, policy))?;
    let vts_tmapt = optional("vts_tmapt", mat.vts_tmapt, |o| tables::read_vts_tmapt(data, o, policy))?;
    let menu_c_adt = optional("vtsm_c_adt", mat.vtsm_c_adt, |o| tables::read_c_adt(data, o, policy))?;
    let menu_vobu_admap = optional("vtsm_vobu_admap", mat.vtsm_vobu_admap, |o| {
        tables::read_vobu_admap(data, o, policy)
    })?;
    let vts_c_adt = mandatory("vts_c_adt", mat.vts_c_adt, |o| tables::read_c_adt(data, o, policy))?;
    let vts_vobu_admap = mandatory("vts_vobu_admap", mat.vts_vobu_admap, |o| {
        tables::read_vobu_admap(data, o, policy)
    })?;

    Ok(VtsiHandle {
        mat,
        vts_ptt_srpt,
        vts_pgcit,
        pgci_ut,
        vts_tmapt,
        menu_c_adt,
        menu_vobu_admap,
        vts_c_adt,
        vts_vobu_admap,
    })
}
