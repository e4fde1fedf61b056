//! NAV pack demultiplexing.
//!
//! A NAV pack is one 2048-byte sector holding a program stream pack header,
//! a system header and two private stream 2 PES packets. The first PES
//! payload starts with sub-stream id 0x00 (PCI), the second with 0x01 (DSI).

use bytes::Bytes;

use super::NavError;

pub const PACK_START_CODE: u8 = 0xBA;
pub const SYSTEM_HEADER_START_CODE: u8 = 0xBB;
pub const PROGRAM_END_CODE: u8 = 0xB9;
pub const PRIVATE_STREAM_2: u8 = 0xBF;

pub const PCI_SUBSTREAM: u8 = 0x00;
pub const DSI_SUBSTREAM: u8 = 0x01;

/// Fixed positions inside a well-formed NAV pack.
pub const PCI_START_BYTE: usize = 0x2D;
pub const DSI_START_BYTE: usize = 0x407;

/// Raw PCI and DSI payloads, sub-stream id stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavPacketBytes {
    pub pci: Bytes,
    pub dsi: Bytes,
}

fn has_start_code(data: &[u8], pos: usize) -> bool {
    data.len() >= pos + 4 && data[pos] == 0x00 && data[pos + 1] == 0x00 && data[pos + 2] == 0x01
}

/// Length of the pack header at the start of `data`.
fn pack_header_len(data: &[u8]) -> Result<usize, NavError> {
    if !has_start_code(data, 0) || data[3] != PACK_START_CODE {
        return Err(NavError::NotNavPack("missing pack header"));
    }
    if data.len() < 14 {
        return Err(NavError::NotNavPack("truncated pack header"));
    }
    match data[4] >> 4 {
        // MPEG-2: '01' marker, stuffing length in the low bits of byte 13
        0x4..=0x7 => Ok(14 + (data[13] & 0x07) as usize),
        // MPEG-1: '0010' marker
        0x2 => Ok(12),
        _ => Err(NavError::NotNavPack("unknown pack header version")),
    }
}

/// Cheap test on the fixed layout, without walking the packets.
pub fn looks_like_nav_pack(sector: &[u8]) -> bool {
    sector.len() > DSI_START_BYTE
        && has_start_code(sector, 0x26)
        && sector[0x29] == PRIVATE_STREAM_2
        && sector[PCI_START_BYTE - 1] == PCI_SUBSTREAM
        && has_start_code(sector, 0x400)
        && sector[0x403] == PRIVATE_STREAM_2
        && sector[DSI_START_BYTE - 1] == DSI_SUBSTREAM
}

/// Walks the PES packets of a NAV sector and returns its PCI and DSI payloads.
pub fn split_nav_pack(sector: &Bytes) -> Result<NavPacketBytes, NavError> {
    let data = &sector[..];
    let mut pos = pack_header_len(data)?;
    let mut pci = None;
    let mut dsi = None;

    while pos + 6 <= data.len() && (pci.is_none() || dsi.is_none()) {
        if !has_start_code(data, pos) {
            return Err(NavError::NotNavPack("lost packet sync"));
        }
        let stream_id = data[pos + 3];
        if stream_id == PROGRAM_END_CODE {
            break;
        }
        let len = ((data[pos + 4] as usize) << 8) | data[pos + 5] as usize;
        let start = pos + 6;
        let end = (start + len).min(data.len());

        if stream_id == PRIVATE_STREAM_2 && end > start {
            let payload = sector.slice(start + 1..end);
            match data[start] {
                PCI_SUBSTREAM => pci = Some(payload),
                DSI_SUBSTREAM => dsi = Some(payload),
                other => tracing::debug!(target: "dvdnav::nav", "ignoring private stream 2 sub-id {:#04x}", other),
            }
        }
        pos = start + len;
    }

    match (pci, dsi) {
        (Some(pci), Some(dsi)) => Ok(NavPacketBytes { pci, dsi }),
        (None, _) => Err(NavError::MissingPacket("pci")),
        (_, None) => Err(NavError::MissingPacket("dsi")),
    }
}
