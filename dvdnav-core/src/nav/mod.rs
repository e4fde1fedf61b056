//! NAV packet reader.
//!
//! Every VOBU starts with a NAV pack carrying a PCI (highlight and buttons)
//! and a DSI (addressing and angle tables). `demux` finds the two payloads in
//! a sector; `pci` and `dsi` decode them.

pub mod demux;
pub mod dsi;
pub mod pci;

use thiserror::Error;

use crate::bits::CursorError;
use crate::ifo::check::Violation;

pub use demux::{split_nav_pack, NavPacketBytes};
pub use dsi::{parse_dsi, Dsi, SRI_END_OF_CELL};
pub use pci::{parse_pci, Btni, Pci};

#[derive(Debug, Error)]
pub enum NavError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("not a NAV pack: {0}")]
    NotNavPack(&'static str),
    #[error("NAV pack has no {0} packet")]
    MissingPacket(&'static str),
    #[error("{packet} payload is {len} bytes, expected {expected}")]
    ShortPacket {
        packet: &'static str,
        len: usize,
        expected: usize,
    },
}

/// Decodes both halves of a NAV pack.
pub fn decode_nav_packet(packets: &NavPacketBytes) -> Result<(Pci, Dsi), NavError> {
    Ok((parse_pci(&packets.pci)?, parse_dsi(&packets.dsi)?))
}

/// Runs the diagnostic checks of both packets and logs what fails.
pub fn report_violations(pci: &Pci, dsi: &Dsi) -> Vec<Violation> {
    let mut all = pci.validate();
    all.extend(dsi.validate());
    for v in &all {
        tracing::debug!(target: "dvdnav::nav", "NAV anomaly at lbn {}: {}", pci.pci_gi.nv_pck_lbn, v);
    }
    all
}
