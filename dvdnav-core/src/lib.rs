//! # dvdnav core
//!
//! DVD-Video navigation: IFO and NAV packet parsing, the navigation VM and
//! the event-driven navigator that ties them to a disc image.
//!
//! ## Layers
//! - `bits` / `schema`: big-endian cursors and the declarative record parser
//! - `ifo`: VMGI / VTSI management information
//! - `nav`: PCI and DSI from the NAV pack at the start of every VOBU
//! - `vm`: registers, command interpreter and the playback state machine
//! - `navigator`: turns VM state and VOBUs into a stream of [`Event`]s
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//! use dvdnav_core::{DirSource, Event, NavConfig, Navigator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(DirSource::open("/media/dvd").await?);
//! let mut nav = Navigator::open(source, NavConfig::default()).await?;
//! loop {
//!     match nav.next_event().await? {
//!         Event::Stop => break,
//!         Event::Wait => nav.skip_wait(),
//!         Event::StillFrame { .. } => nav.skip_still(),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Parsing
// ============================================================================

pub mod bits;
pub mod schema;
pub mod ifo;
pub mod nav;

// ============================================================================
// Virtual Machine
// ============================================================================

pub mod vm;

// ============================================================================
// Disc Access & Playback
// ============================================================================

pub mod config;
pub mod source;
pub mod disc;
pub mod navigator;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, NavConfig};
pub use disc::{load_disc, summarize, DiscError, DiscImage, DiscSummary};
pub use navigator::{CellChange, Event, HighlightArea, HighlightMode, NavPacket, Navigator, NavigatorError};
pub use source::{ByteSource, DirSource, MemorySource, SourceError};
pub use vm::{Domain, Vm, VmError};
