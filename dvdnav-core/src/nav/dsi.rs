//! Data Search Information: VOBU addressing, seamless angles and search tables.

use crate::bits::ByteCursor;
use crate::ifo::check::{Violation, ViolationKind};
use crate::ifo::time::DvdTime;

use super::NavError;

/// DSI payload length after the sub-stream id byte.
pub const DSI_BYTES: usize = 1017;
const DSI_PADDING: usize = 471;

/// `vobu_sri.next_vobu` when the VOBU is the last one of its cell.
pub const SRI_END_OF_CELL: u32 = 0x3FFF_FFFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DsiGi {
    pub nv_pck_scr: u32,
    /// Sector of this NAV pack, relative to the start of the VOB.
    pub nv_pck_lbn: u32,
    /// Last sector of this VOBU, relative to the NAV pack.
    pub vobu_ea: u32,
    pub vobu_1stref_ea: u32,
    pub vobu_2ndref_ea: u32,
    pub vobu_3rdref_ea: u32,
    pub vobu_vob_idn: u16,
    pub zero1: u8,
    pub vobu_c_idn: u8,
    /// Elapsed time within the cell.
    pub c_eltm: DvdTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VobA {
    pub stp_ptm1: u32,
    pub stp_ptm2: u32,
    pub gap_len1: u32,
    pub gap_len2: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmlPbi {
    pub category: u16,
    /// End of the interleaved unit, relative to the NAV pack.
    pub ilvu_ea: u32,
    pub ilvu_sa: u32,
    pub size: u16,
    pub vob_v_s_s_ptm: u32,
    pub vob_v_e_e_ptm: u32,
    pub vob_a: [VobA; 8],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmlAgliData {
    /// Relative start of the same ILVU in another angle, bit 31 = backwards.
    pub address: u32,
    pub size: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VobuSri {
    pub next_video: u32,
    pub fwda: [u32; 19],
    pub next_vobu: u32,
    pub prev_vobu: u32,
    pub bwda: [u32; 19],
    pub prev_video: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synci {
    pub a_synca: [u16; 8],
    pub sp_synca: [u32; 32],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dsi {
    pub dsi_gi: DsiGi,
    pub sml_pbi: SmlPbi,
    pub sml_agli: [SmlAgliData; 9],
    pub vobu_sri: VobuSri,
    pub synci: Synci,
}

impl Dsi {
    /// Relative offset of the next VOBU, or `None` at the end of the cell.
    pub fn next_vobu(&self) -> Option<u32> {
        match self.vobu_sri.next_vobu & SRI_END_OF_CELL {
            SRI_END_OF_CELL => None,
            next => Some(next),
        }
    }

    pub fn validate(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.dsi_gi.zero1 != 0 {
            out.push(Violation {
                kind: ViolationKind::NonZero,
                table: "dsi",
                check: "dsi_gi.zero1".to_string(),
                detail: self.dsi_gi.zero1.to_string(),
            });
        }
        out
    }
}

/// Decodes a DSI payload (the bytes after the 0x01 sub-stream id).
pub fn parse_dsi(bytes: &[u8]) -> Result<Dsi, NavError> {
    if bytes.len() < DSI_BYTES {
        return Err(NavError::ShortPacket {
            packet: "dsi",
            len: bytes.len(),
            expected: DSI_BYTES,
        });
    }
    let mut c = ByteCursor::new(bytes.to_vec());
    let mut dsi = Dsi {
        dsi_gi: DsiGi {
            nv_pck_scr: c.read_u32()?,
            nv_pck_lbn: c.read_u32()?,
            vobu_ea: c.read_u32()?,
            vobu_1stref_ea: c.read_u32()?,
            vobu_2ndref_ea: c.read_u32()?,
            vobu_3rdref_ea: c.read_u32()?,
            vobu_vob_idn: c.read_u16()?,
            zero1: c.read_u8()?,
            vobu_c_idn: c.read_u8()?,
            c_eltm: DvdTime::from_bytes(c.read_array()?),
        },
        ..Default::default()
    };

    let pbi = &mut dsi.sml_pbi;
    pbi.category = c.read_u16()?;
    pbi.ilvu_ea = c.read_u32()?;
    pbi.ilvu_sa = c.read_u32()?;
    pbi.size = c.read_u16()?;
    pbi.vob_v_s_s_ptm = c.read_u32()?;
    pbi.vob_v_e_e_ptm = c.read_u32()?;
    for a in pbi.vob_a.iter_mut() {
        *a = VobA {
            stp_ptm1: c.read_u32()?,
            stp_ptm2: c.read_u32()?,
            gap_len1: c.read_u32()?,
            gap_len2: c.read_u32()?,
        };
    }

    for agl in dsi.sml_agli.iter_mut() {
        *agl = SmlAgliData {
            address: c.read_u32()?,
            size: c.read_u16()?,
        };
    }

    let sri = &mut dsi.vobu_sri;
    sri.next_video = c.read_u32()?;
    for slot in sri.fwda.iter_mut() {
        *slot = c.read_u32()?;
    }
    sri.next_vobu = c.read_u32()?;
    sri.prev_vobu = c.read_u32()?;
    for slot in sri.bwda.iter_mut() {
        *slot = c.read_u32()?;
    }
    sri.prev_video = c.read_u32()?;

    for slot in dsi.synci.a_synca.iter_mut() {
        *slot = c.read_u16()?;
    }
    for slot in dsi.synci.sp_synca.iter_mut() {
        *slot = c.read_u32()?;
    }
    debug_assert_eq!(c.position() + DSI_PADDING, DSI_BYTES);
    Ok(dsi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::DsiSpec;

    #[test]
    fn decodes_addressing() {
        let bytes = DsiSpec::new(500, 9).next_vobu(10).encode();
        let dsi = parse_dsi(&bytes).expect("dsi");
        assert_eq!(dsi.dsi_gi.nv_pck_lbn, 500);
        assert_eq!(dsi.dsi_gi.vobu_ea, 9);
        assert_eq!(dsi.next_vobu(), Some(10));
        assert!(dsi.validate().is_empty());
    }

    #[test]
    fn end_of_cell_sentinel() {
        let bytes = DsiSpec::new(0, 3).end_of_cell().encode();
        let dsi = parse_dsi(&bytes).expect("dsi");
        assert_eq!(dsi.vobu_sri.next_vobu, SRI_END_OF_CELL);
        assert_eq!(dsi.next_vobu(), None);
    }

    #[test]
    fn decodes_seamless_angles() {
        let bytes = DsiSpec::new(0, 3)
            .ilvu_ea(40)
            .angle(1, 0x8000_0020)
            .encode();
        let dsi = parse_dsi(&bytes).expect("dsi");
        assert_eq!(dsi.sml_pbi.ilvu_ea, 40);
        assert_eq!(dsi.sml_agli[1].address, 0x8000_0020);
        assert_eq!(dsi.sml_agli[0].address, 0);
    }

    #[test]
    fn rejects_short_payload() {
        assert!(matches!(
            parse_dsi(&[0u8; DSI_BYTES - 1]),
            Err(NavError::ShortPacket { packet: "dsi", .. })
        ));
    }
}
