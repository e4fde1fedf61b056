//! Presentation Control Information: highlight state and menu buttons.

use crate::bits::{BitReader, ByteCursor};
use crate::ifo::check::{Violation, ViolationKind};
use crate::ifo::time::DvdTime;

use super::NavError;

/// PCI payload length after the sub-stream id byte.
pub const PCI_BYTES: usize = 979;
pub const MAX_BUTTONS: usize = 36;
const BTNI_SIZE: usize = 18;
const PCI_PADDING: usize = 189;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PciGi {
    pub nv_pck_lbn: u32,
    pub vobu_cat: u16,
    pub zero1: u16,
    /// Prohibited user operations.
    pub vobu_uop_ctl: u32,
    pub vobu_s_ptm: u32,
    pub vobu_e_ptm: u32,
    pub vobu_se_e_ptm: u32,
    pub e_eltm: DvdTime,
    pub vobu_isrc: [u8; 32],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HlGi {
    pub zero1: u16,
    /// 0 = no highlight, 1 = new, 2 = same as previous VOBU, 3 = updated commands only.
    pub hli_ss: u8,
    pub hli_s_ptm: u32,
    pub hli_e_ptm: u32,
    pub btn_se_e_ptm: u32,
    pub zero2: u8,
    pub btngr_ns: u8,
    pub zero3: u8,
    pub btngr1_dsp_ty: u8,
    pub zero4: u8,
    pub btngr2_dsp_ty: u8,
    pub zero5: u8,
    pub btngr3_dsp_ty: u8,
    pub btn_ofn: u8,
    pub btn_ns: u8,
    pub nsl_btn_ns: u8,
    pub zero6: u8,
    /// Button to highlight on entry, 0 = keep the current one.
    pub fosl_btnn: u8,
    /// Button to activate automatically, 0 = none.
    pub foac_btnn: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Btni {
    pub btn_coln: u8,
    pub x_start: u16,
    pub zero1: u8,
    pub x_end: u16,
    /// 1 = activating the button on selection.
    pub auto_action_mode: u8,
    pub y_start: u16,
    pub zero2: u8,
    pub y_end: u16,
    pub zero3: u8,
    pub up: u8,
    pub zero4: u8,
    pub down: u8,
    pub zero5: u8,
    pub left: u8,
    pub zero6: u8,
    pub right: u8,
    pub cmd: u64,
}

impl Btni {
    pub fn contains(&self, x: u16, y: u16) -> bool {
        (self.x_start..=self.x_end).contains(&x) && (self.y_start..=self.y_end).contains(&y)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hli {
    pub hl_gi: HlGi,
    /// Selection and action colour for each of three colour groups.
    pub btn_colit: [[u32; 2]; 3],
    pub btnit: Vec<Btni>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pci {
    pub pci_gi: PciGi,
    /// Non-seamless angle destinations, bit 31 = backwards.
    pub nsml_agl_dsta: [u32; 9],
    pub hli: Hli,
}

impl Pci {
    /// Button for a 1-based button number.
    pub fn button(&self, n: usize) -> Option<&Btni> {
        n.checked_sub(1).and_then(|i| self.hli.btnit.get(i))
    }

    pub fn has_highlight(&self) -> bool {
        self.hli.hl_gi.hli_ss & 0x03 != 0
    }

    pub fn button_count(&self) -> u8 {
        self.hli.hl_gi.btn_ns
    }

    /// Diagnostic checks; real discs are known to fail some of them.
    pub fn validate(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        let mut push = |kind, check: &str, detail: String| {
            out.push(Violation {
                kind,
                table: "pci",
                check: check.to_string(),
                detail,
            })
        };
        let gi = &self.hli.hl_gi;

        for (name, value) in [
            ("pci_gi.zero1", self.pci_gi.zero1 as u32),
            ("hl_gi.zero1", gi.zero1 as u32),
            ("hl_gi.zero2", gi.zero2 as u32),
            ("hl_gi.zero3", gi.zero3 as u32),
            ("hl_gi.zero4", gi.zero4 as u32),
            ("hl_gi.zero5", gi.zero5 as u32),
            ("hl_gi.zero6", gi.zero6 as u32),
        ] {
            if value != 0 {
                push(ViolationKind::NonZero, name, value.to_string());
            }
        }

        if self.has_highlight() {
            if gi.btn_ns == 0 || gi.btngr_ns == 0 {
                push(
                    ViolationKind::Value,
                    "highlight defines buttons",
                    format!("btn_ns {} btngr_ns {}", gi.btn_ns, gi.btngr_ns),
                );
            }
        } else if (gi.btn_ns == 0) != (gi.btngr_ns == 0) {
            push(
                ViolationKind::Value,
                "btn_ns and btngr_ns both zero or both set",
                format!("btn_ns {} btngr_ns {}", gi.btn_ns, gi.btngr_ns),
            );
        }

        if gi.btngr_ns == 0 {
            return out;
        }
        let per_group = MAX_BUTTONS / gi.btngr_ns as usize;
        for group in 0..gi.btngr_ns as usize {
            for j in 0..per_group {
                let n = per_group * group + j;
                let Some(b) = self.hli.btnit.get(n) else { continue };
                if b.zero1 | b.zero2 | b.zero3 | b.zero4 | b.zero5 | b.zero6 != 0 {
                    push(ViolationKind::NonZero, "btni reserved bits", format!("button {}", n + 1));
                }
                if j < gi.btn_ns as usize {
                    if b.x_start > b.x_end || b.y_start > b.y_end {
                        push(ViolationKind::Value, "button geometry ordered", format!("button {}", n + 1));
                    }
                    if [b.up, b.down, b.left, b.right].iter().any(|&d| d > gi.btn_ns) {
                        push(
                            ViolationKind::Value,
                            "button neighbours <= btn_ns",
                            format!("button {}", n + 1),
                        );
                    }
                } else if *b != Btni::default() {
                    push(ViolationKind::Value, "unused button is zero", format!("button {}", n + 1));
                }
            }
        }
        out
    }
}

/// Decodes a PCI payload (the bytes after the 0x00 sub-stream id).
pub fn parse_pci(bytes: &[u8]) -> Result<Pci, NavError> {
    if bytes.len() < PCI_BYTES {
        return Err(NavError::ShortPacket {
            packet: "pci",
            len: bytes.len(),
            expected: PCI_BYTES,
        });
    }
    let mut c = ByteCursor::new(bytes.to_vec());
    let mut pci = Pci {
        pci_gi: PciGi {
            nv_pck_lbn: c.read_u32()?,
            vobu_cat: c.read_u16()?,
            zero1: c.read_u16()?,
            vobu_uop_ctl: c.read_u32()?,
            vobu_s_ptm: c.read_u32()?,
            vobu_e_ptm: c.read_u32()?,
            vobu_se_e_ptm: c.read_u32()?,
            e_eltm: DvdTime::from_bytes(c.read_array()?),
            vobu_isrc: c.read_array()?,
        },
        ..Default::default()
    };
    for slot in pci.nsml_agl_dsta.iter_mut() {
        *slot = c.read_u32()?;
    }

    let mut bits = BitReader::new();
    let hli_word = c.read_u16()?;
    let gi = &mut pci.hli.hl_gi;
    gi.zero1 = hli_word >> 2;
    gi.hli_ss = (hli_word & 0x03) as u8;
    gi.hli_s_ptm = c.read_u32()?;
    gi.hli_e_ptm = c.read_u32()?;
    gi.btn_se_e_ptm = c.read_u32()?;
    gi.zero2 = bits.read(&mut c, 2)? as u8;
    gi.btngr_ns = bits.read(&mut c, 2)? as u8;
    gi.zero3 = bits.read(&mut c, 1)? as u8;
    gi.btngr1_dsp_ty = bits.read(&mut c, 3)? as u8;
    gi.zero4 = bits.read(&mut c, 1)? as u8;
    gi.btngr2_dsp_ty = bits.read(&mut c, 3)? as u8;
    gi.zero5 = bits.read(&mut c, 1)? as u8;
    gi.btngr3_dsp_ty = bits.read(&mut c, 3)? as u8;
    gi.btn_ofn = c.read_u8()?;
    gi.btn_ns = c.read_u8()?;
    gi.nsl_btn_ns = c.read_u8()?;
    gi.zero6 = c.read_u8()?;
    gi.fosl_btnn = c.read_u8()?;
    gi.foac_btnn = c.read_u8()?;

    for group in pci.hli.btn_colit.iter_mut() {
        for slot in group.iter_mut() {
            *slot = c.read_u32()?;
        }
    }

    pci.hli.btnit = Vec::with_capacity(MAX_BUTTONS);
    for _ in 0..MAX_BUTTONS {
        let start = c.position();
        let mut b = Btni {
            btn_coln: bits.read(&mut c, 2)? as u8,
            x_start: bits.read(&mut c, 10)? as u16,
            zero1: bits.read(&mut c, 2)? as u8,
            x_end: bits.read(&mut c, 10)? as u16,
            auto_action_mode: bits.read(&mut c, 2)? as u8,
            y_start: bits.read(&mut c, 10)? as u16,
            zero2: bits.read(&mut c, 2)? as u8,
            y_end: bits.read(&mut c, 10)? as u16,
            ..Default::default()
        };
        b.zero3 = bits.read(&mut c, 2)? as u8;
        b.up = bits.read(&mut c, 6)? as u8;
        b.zero4 = bits.read(&mut c, 2)? as u8;
        b.down = bits.read(&mut c, 6)? as u8;
        b.zero5 = bits.read(&mut c, 2)? as u8;
        b.left = bits.read(&mut c, 6)? as u8;
        b.zero6 = bits.read(&mut c, 2)? as u8;
        b.right = bits.read(&mut c, 6)? as u8;
        b.cmd = c.read_u64()?;
        debug_assert_eq!(c.position() - start, BTNI_SIZE);
        pci.hli.btnit.push(b);
    }
    debug_assert_eq!(c.position() + PCI_PADDING, PCI_BYTES);
    Ok(pci)
}
