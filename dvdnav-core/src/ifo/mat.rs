//! VMGI_MAT and VTSI_MAT, the fixed headers at sector 0 of every IFO.
//!
//! Sector pointers count 2048-byte blocks from the start of the IFO, except
//! `first_play_pgc` which is a byte offset. Zero means the table is absent.

use serde::Serialize;

use crate::bits::ByteCursor;

use super::attributes::{
    read_audio_attr, read_audio_attrs, read_subp_attr, read_subp_attrs, read_video_attr, AudioAttr,
    SubpAttr, VideoAttr, MULTICHANNEL_EXT_SIZE,
};
use super::check::{Checker, StrictnessPolicy};
use super::{IfoError, DVD_BLOCK_LEN};

pub const VMGI_MAT_SIZE: usize = 0x200;
pub const VTSI_MAT_SIZE: usize = 0x3D8;

#[derive(Debug, Clone, Default, Serialize)]
pub struct VmgiMat {
    pub identifier: String,
    pub vmg_last_sector: u32,
    pub vmgi_last_sector: u32,
    pub specification_version: u8,
    pub vmg_category: u32,
    pub vmg_nr_of_volumes: u16,
    pub vmg_this_volume_nr: u16,
    pub disc_side: u8,
    pub vmg_nr_of_title_sets: u16,
    pub provider_identifier: String,
    pub vmg_pos_code: u64,
    pub vmgi_last_byte: u32,
    /// Byte offset.
    pub first_play_pgc: u32,
    pub vmgm_vobs: u32,
    pub tt_srpt: u32,
    pub vmgm_pgci_ut: u32,
    pub ptl_mait: u32,
    pub vts_atrt: u32,
    pub txtdt_mgi: u32,
    pub vmgm_c_adt: u32,
    pub vmgm_vobu_admap: u32,
    pub vmgm_video_attr: VideoAttr,
    pub nr_of_vmgm_audio_streams: u8,
    pub vmgm_audio_attr: AudioAttr,
    pub nr_of_vmgm_subp_streams: u8,
    pub vmgm_subp_attr: SubpAttr,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VtsiMat {
    pub identifier: String,
    pub vts_last_sector: u32,
    pub vtsi_last_sector: u32,
    pub specification_version: u8,
    pub vts_category: u32,
    pub vtsi_last_byte: u32,
    pub vtsm_vobs: u32,
    pub vtstt_vobs: u32,
    pub vts_ptt_srpt: u32,
    pub vts_pgcit: u32,
    pub vtsm_pgci_ut: u32,
    pub vts_tmapt: u32,
    pub vtsm_c_adt: u32,
    pub vtsm_vobu_admap: u32,
    pub vts_c_adt: u32,
    pub vts_vobu_admap: u32,
    pub vtsm_video_attr: VideoAttr,
    pub nr_of_vtsm_audio_streams: u8,
    pub vtsm_audio_attr: AudioAttr,
    pub nr_of_vtsm_subp_streams: u8,
    pub vtsm_subp_attr: SubpAttr,
    pub vts_video_attr: VideoAttr,
    pub nr_of_vts_audio_streams: u8,
    pub vts_audio_attr: Vec<AudioAttr>,
    pub nr_of_vts_subp_streams: u8,
    pub vts_subp_attr: Vec<SubpAttr>,
    pub vts_mu_audio_attr: Vec<[u8; MULTICHANNEL_EXT_SIZE]>,
}

/// Start of a menu/title VOB area must lie between the IFO and the end of the set.
fn vob_in_range(vobs: u32, info_last: u32, set_last: u32) -> bool {
    vobs == 0 || (vobs > info_last && vobs < set_last)
}

pub fn read_vmgi_mat(cursor: &mut ByteCursor, policy: &dyn StrictnessPolicy) -> Result<VmgiMat, IfoError> {
    let check = Checker::new(policy, "vmgi_mat");
    cursor.seek(0)?;

    let mut mat = VmgiMat {
        identifier: cursor.read_string(12)?,
        vmg_last_sector: cursor.read_u32()?,
        ..Default::default()
    };
    check.zero_bytes("zero_1", &cursor.read_bytes(12)?)?;
    mat.vmgi_last_sector = cursor.read_u32()?;
    check.zero("zero_2", cursor.read_u8()?)?;
    mat.specification_version = cursor.read_u8()?;
    mat.vmg_category = cursor.read_u32()?;
    mat.vmg_nr_of_volumes = cursor.read_u16()?;
    mat.vmg_this_volume_nr = cursor.read_u16()?;
    mat.disc_side = cursor.read_u8()?;
    check.zero_bytes("zero_3", &cursor.read_bytes(19)?)?;
    mat.vmg_nr_of_title_sets = cursor.read_u16()?;
    mat.provider_identifier = cursor.read_string(32)?;
    mat.vmg_pos_code = cursor.read_u64()?;
    check.zero_bytes("zero_4", &cursor.read_bytes(24)?)?;
    mat.vmgi_last_byte = cursor.read_u32()?;
    mat.first_play_pgc = cursor.read_u32()?;
    check.zero_bytes("zero_5", &cursor.read_bytes(56)?)?;
    mat.vmgm_vobs = cursor.read_u32()?;
    mat.tt_srpt = cursor.read_u32()?;
    mat.vmgm_pgci_ut = cursor.read_u32()?;
    mat.ptl_mait = cursor.read_u32()?;
    mat.vts_atrt = cursor.read_u32()?;
    mat.txtdt_mgi = cursor.read_u32()?;
    mat.vmgm_c_adt = cursor.read_u32()?;
    mat.vmgm_vobu_admap = cursor.read_u32()?;
    check.zero_bytes("zero_6", &cursor.read_bytes(32)?)?;
    mat.vmgm_video_attr = read_video_attr(cursor)?;
    check.zero("zero_7", cursor.read_u8()?)?;
    mat.nr_of_vmgm_audio_streams = cursor.read_u8()?;
    mat.vmgm_audio_attr = read_audio_attr(cursor)?;
    check.zero_bytes("zero_8", &cursor.read_bytes(56)?)?;
    check.zero_bytes("zero_9", &cursor.read_bytes(17)?)?;
    mat.nr_of_vmgm_subp_streams = cursor.read_u8()?;
    mat.vmgm_subp_attr = read_subp_attr(cursor)?;
    check.zero_bytes("zero_10", &cursor.read_bytes(164)?)?;
    debug_assert_eq!(cursor.position(), VMGI_MAT_SIZE);

    check.value(
        u64::from(mat.vmgi_last_sector) * 2 <= u64::from(mat.vmg_last_sector),
        "vmgi_last_sector * 2 <= vmg_last_sector",
        format_args!("{} vs {}", mat.vmgi_last_sector, mat.vmg_last_sector),
    )?;
    check.value(mat.vmg_nr_of_volumes != 0, "vmg_nr_of_volumes != 0", 0)?;
    check.value(
        mat.vmg_this_volume_nr != 0 && mat.vmg_this_volume_nr <= mat.vmg_nr_of_volumes,
        "1 <= vmg_this_volume_nr <= vmg_nr_of_volumes",
        format_args!("{}/{}", mat.vmg_this_volume_nr, mat.vmg_nr_of_volumes),
    )?;
    check.value(
        mat.disc_side == 1 || mat.disc_side == 2,
        "disc_side in 1..=2",
        mat.disc_side,
    )?;
    check.value(mat.vmg_nr_of_title_sets != 0, "vmg_nr_of_title_sets != 0", 0)?;
    check.value(mat.vmgi_last_byte >= 341, "vmgi_last_byte >= 341", mat.vmgi_last_byte)?;
    check.value(
        mat.vmgi_last_byte as usize / DVD_BLOCK_LEN <= mat.vmgi_last_sector as usize,
        "vmgi_last_byte / 2048 <= vmgi_last_sector",
        mat.vmgi_last_byte,
    )?;
    check.value(
        mat.first_play_pgc < mat.vmgi_last_byte,
        "first_play_pgc < vmgi_last_byte",
        mat.first_play_pgc,
    )?;
    check.value(
        vob_in_range(mat.vmgm_vobs, mat.vmgi_last_sector, mat.vmg_last_sector),
        "vmgm_vobs inside the VMG",
        mat.vmgm_vobs,
    )?;
    for (name, sector) in [
        ("tt_srpt", mat.tt_srpt),
        ("vmgm_pgci_ut", mat.vmgm_pgci_ut),
        ("ptl_mait", mat.ptl_mait),
        ("vts_atrt", mat.vts_atrt),
        ("txtdt_mgi", mat.txtdt_mgi),
        ("vmgm_c_adt", mat.vmgm_c_adt),
        ("vmgm_vobu_admap", mat.vmgm_vobu_admap),
    ] {
        check.value(sector <= mat.vmgi_last_sector, name, format_args!("sector {sector} beyond IFO"))?;
    }
    check.value(
        mat.nr_of_vmgm_audio_streams <= 1,
        "nr_of_vmgm_audio_streams <= 1",
        mat.nr_of_vmgm_audio_streams,
    )?;
    check.value(
        mat.nr_of_vmgm_subp_streams <= 1,
        "nr_of_vmgm_subp_streams <= 1",
        mat.nr_of_vmgm_subp_streams,
    )?;

    Ok(mat)
}

pub fn read_vtsi_mat(cursor: &mut ByteCursor, policy: &dyn StrictnessPolicy) -> Result<VtsiMat, IfoError> {
    let check = Checker::new(policy, "vtsi_mat");
    cursor.seek(0)?;

    let mut mat = VtsiMat {
        identifier: cursor.read_string(12)?,
        vts_last_sector: cursor.read_u32()?,
        ..Default::default()
    };
    check.zero_bytes("zero_1", &cursor.read_bytes(12)?)?;
    mat.vtsi_last_sector = cursor.read_u32()?;
    check.zero("zero_2", cursor.read_u8()?)?;
    mat.specification_version = cursor.read_u8()?;
    mat.vts_category = cursor.read_u32()?;
    check.zero("zero_3", cursor.read_u16()?)?;
    check.zero("zero_4", cursor.read_u16()?)?;
    check.zero("zero_5", cursor.read_u8()?)?;
    check.zero_bytes("zero_6", &cursor.read_bytes(19)?)?;
    check.zero("zero_7", cursor.read_u16()?)?;
    check.zero_bytes("zero_8", &cursor.read_bytes(32)?)?;
    check.zero("zero_9", cursor.read_u64()?)?;
    check.zero_bytes("zero_10", &cursor.read_bytes(24)?)?;
    mat.vtsi_last_byte = cursor.read_u32()?;
    check.zero("zero_11", cursor.read_u32()?)?;
    check.zero_bytes("zero_12", &cursor.read_bytes(56)?)?;
    mat.vtsm_vobs = cursor.read_u32()?;
    mat.vtstt_vobs = cursor.read_u32()?;
    mat.vts_ptt_srpt = cursor.read_u32()?;
    mat.vts_pgcit = cursor.read_u32()?;
    mat.vtsm_pgci_ut = cursor.read_u32()?;
    mat.vts_tmapt = cursor.read_u32()?;
    mat.vtsm_c_adt = cursor.read_u32()?;
    mat.vtsm_vobu_admap = cursor.read_u32()?;
    mat.vts_c_adt = cursor.read_u32()?;
    mat.vts_vobu_admap = cursor.read_u32()?;
    check.zero_bytes("zero_13", &cursor.read_bytes(24)?)?;

    mat.vtsm_video_attr = read_video_attr(cursor)?;
    check.zero("zero_14", cursor.read_u8()?)?;
    mat.nr_of_vtsm_audio_streams = cursor.read_u8()?;
    mat.vtsm_audio_attr = read_audio_attr(cursor)?;
    check.zero_bytes("zero_15", &cursor.read_bytes(56)?)?;
    check.zero_bytes("zero_16", &cursor.read_bytes(17)?)?;
    mat.nr_of_vtsm_subp_streams = cursor.read_u8()?;
    mat.vtsm_subp_attr = read_subp_attr(cursor)?;
    check.zero_bytes("zero_17", &cursor.read_bytes(164)?)?;

    mat.vts_video_attr = read_video_attr(cursor)?;
    check.zero("zero_18", cursor.read_u8()?)?;
    mat.nr_of_vts_audio_streams = cursor.read_u8()?;
    mat.vts_audio_attr = read_audio_attrs(cursor, 8)?;
    check.zero_bytes("zero_19", &cursor.read_bytes(17)?)?;
    mat.nr_of_vts_subp_streams = cursor.read_u8()?;
    mat.vts_subp_attr = read_subp_attrs(cursor, 32)?;
    check.zero("zero_20", cursor.read_u16()?)?;
    mat.vts_mu_audio_attr = (0..8)
        .map(|_| cursor.read_array::<MULTICHANNEL_EXT_SIZE>())
        .collect::<Result<_, _>>()?;
    debug_assert_eq!(cursor.position(), VTSI_MAT_SIZE);

    check.value(
        u64::from(mat.vtsi_last_sector) * 2 <= u64::from(mat.vts_last_sector),
        "vtsi_last_sector * 2 <= vts_last_sector",
        format_args!("{} vs {}", mat.vtsi_last_sector, mat.vts_last_sector),
    )?;
    check.value(
        mat.vtsi_last_byte as usize / DVD_BLOCK_LEN <= mat.vtsi_last_sector as usize,
        "vtsi_last_byte / 2048 <= vtsi_last_sector",
        mat.vtsi_last_byte,
    )?;
    check.value(
        vob_in_range(mat.vtsm_vobs, mat.vtsi_last_sector, mat.vts_last_sector),
        "vtsm_vobs inside the VTS",
        mat.vtsm_vobs,
    )?;
    check.value(
        vob_in_range(mat.vtstt_vobs, mat.vtsi_last_sector, mat.vts_last_sector),
        "vtstt_vobs inside the VTS",
        mat.vtstt_vobs,
    )?;
    for (name, sector) in [
        ("vts_ptt_srpt", mat.vts_ptt_srpt),
        ("vts_pgcit", mat.vts_pgcit),
        ("vtsm_pgci_ut", mat.vtsm_pgci_ut),
        ("vts_tmapt", mat.vts_tmapt),
        ("vtsm_c_adt", mat.vtsm_c_adt),
        ("vtsm_vobu_admap", mat.vtsm_vobu_admap),
        ("vts_c_adt", mat.vts_c_adt),
        ("vts_vobu_admap", mat.vts_vobu_admap),
    ] {
        check.value(sector <= mat.vtsi_last_sector, name, format_args!("sector {sector} beyond IFO"))?;
    }
    check.value(
        mat.nr_of_vtsm_audio_streams <= 1,
        "nr_of_vtsm_audio_streams <= 1",
        mat.nr_of_vtsm_audio_streams,
    )?;
    check.value(
        mat.nr_of_vtsm_subp_streams <= 1,
        "nr_of_vtsm_subp_streams <= 1",
        mat.nr_of_vtsm_subp_streams,
    )?;
    check.value(
        mat.nr_of_vts_audio_streams <= 8,
        "nr_of_vts_audio_streams <= 8",
        mat.nr_of_vts_audio_streams,
    )?;
    check.value(
        mat.nr_of_vts_subp_streams <= 32,
        "nr_of_vts_subp_streams <= 32",
        mat.nr_of_vts_subp_streams,
    )?;

    Ok(mat)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ifo::check::{Lenient, Strict, Violation, ViolationKind};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Violation>>);

    impl StrictnessPolicy for Recorder {
        fn on_violation(&self, violation: Violation) -> Result<(), IfoError> {
            self.0.lock().expect("lock").push(violation);
            Ok(())
        }
    }

    fn minimal_vmgi() -> Vec<u8> {
        let mut buf = vec![0u8; 2048];
        buf[..12].copy_from_slice(b"DVDVIDEO-VMG");
        buf[0x0C..0x10].copy_from_slice(&100u32.to_be_bytes());
        buf[0x1C..0x20].copy_from_slice(&10u32.to_be_bytes());
        buf[0x3E..0x40].copy_from_slice(&1u16.to_be_bytes());
        buf
    }

    #[test]
    fn minimal_vmgi_header() {
        let recorder = Recorder::default();
        let mat = read_vmgi_mat(&mut ByteCursor::new(minimal_vmgi()), &recorder).expect("mat");
        assert_eq!(mat.identifier, "DVDVIDEO-VMG");
        assert_eq!(mat.vmg_nr_of_title_sets, 1);
        assert_eq!(mat.vmg_last_sector, 100);
        assert_eq!(mat.vmgi_last_sector, 10);

        let violations = recorder.0.into_inner().expect("lock");
        assert!(violations.iter().all(|v| v.kind == ViolationKind::Value));
        assert!(!violations
            .iter()
            .any(|v| v.check == "vmgi_last_sector * 2 <= vmg_last_sector"));
    }

    #[test]
    fn nonzero_reserved_field_is_reported() {
        let mut buf = minimal_vmgi();
        buf[0x10] = 0xAA;
        assert!(read_vmgi_mat(&mut ByteCursor::new(buf.clone()), &Lenient).is_ok());
        match read_vmgi_mat(&mut ByteCursor::new(buf), &Strict) {
            Err(IfoError::Strict(v)) => assert_eq!(v.check, "zero_1"),
            other => panic!("expected zero_1 violation, got {other:?}"),
        }
    }

    #[test]
    fn vtsi_header_layout() {
        let mut buf = vec![0u8; 2048];
        buf[..12].copy_from_slice(b"DVDVIDEO-VTS");
        buf[0x0C..0x10].copy_from_slice(&500u32.to_be_bytes());
        buf[0x1C..0x20].copy_from_slice(&3u32.to_be_bytes());
        buf[0xC8..0xCC].copy_from_slice(&1u32.to_be_bytes());
        buf[0xE4..0xE8].copy_from_slice(&2u32.to_be_bytes());
        buf[0x203] = 2;
        buf[0x204] = 0b100_0_01_00;
        buf[0x206..0x208].copy_from_slice(b"fr");
        buf[0x255] = 1;
        let mat = read_vtsi_mat(&mut ByteCursor::new(buf), &Strict).expect("mat");
        assert_eq!(mat.vts_last_sector, 500);
        assert_eq!(mat.vts_ptt_srpt, 1);
        assert_eq!(mat.vts_vobu_admap, 2);
        assert_eq!(mat.nr_of_vts_audio_streams, 2);
        assert_eq!(mat.vts_audio_attr.len(), 8);
        assert_eq!(mat.vts_audio_attr[0].language(), "fr");
        assert_eq!(mat.vts_subp_attr.len(), 32);
        assert_eq!(mat.vts_mu_audio_attr.len(), 8);
    }

    #[test]
    fn truncated_header_is_an_error() {
        let err = read_vmgi_mat(&mut ByteCursor::new(vec![0u8; 100]), &Lenient).unwrap_err();
        assert!(matches!(err, IfoError::Cursor(_)));
    }
}
