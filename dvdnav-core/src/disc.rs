//! Whole-disc IFO image and title/chapter summary.
//!
//! `load_disc` pulls every IFO (and its `.BUP`) out of a `ByteSource` once,
//! so the VM can switch title sets without going back to the source.
//! `summarize` walks the title table and the part-of-title tables to list
//! titles with their chapters and durations.

use serde::Serialize;
use thiserror::Error;

use crate::ifo::pgc::{BLOCK_MODE_FIRST_CELL, BLOCK_MODE_NOT_IN_BLOCK, BLOCK_TYPE_ANGLE_BLOCK};
use crate::ifo::time::format_pts;
use crate::ifo::{self, IfoError, IfoFiles, Pgc, StrictnessPolicy, TitleInfo, VmgiHandle, VtsiHandle};
use crate::source::{ByteSource, SourceError};

#[derive(Debug, Error)]
pub enum DiscError {
    #[error(transparent)]
    Ifo(#[from] IfoError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Raw IFO bytes of a disc. Title set `n` lives at `title_sets[n - 1]`.
#[derive(Debug, Clone, Default)]
pub struct DiscImage {
    pub vmg: IfoFiles,
    pub title_sets: Vec<IfoFiles>,
}

impl DiscImage {
    /// Files of title set `vts_n` (1-based).
    pub fn title_set(&self, vts_n: u8) -> Option<&IfoFiles> {
        usize::from(vts_n).checked_sub(1).and_then(|i| self.title_sets.get(i))
    }

    pub fn nr_of_title_sets(&self) -> usize {
        self.title_sets.len()
    }
}

async fn read_optional(source: &dyn ByteSource, title: u8, backup: bool) -> Result<Option<bytes::Bytes>, DiscError> {
    match source.read_ifo(title, backup).await {
        Ok(data) => Ok(Some(data)),
        Err(SourceError::NotFound(name)) => {
            tracing::debug!(target: "dvdnav::disc", "{} not found", name);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn read_files(source: &dyn ByteSource, title: u8) -> Result<IfoFiles, DiscError> {
    let files = IfoFiles {
        ifo: read_optional(source, title, false).await?,
        bup: read_optional(source, title, true).await?,
    };
    if files.ifo.is_none() && files.bup.is_none() {
        tracing::warn!(target: "dvdnav::disc", "neither {} nor its backup exist", ifo::ifo_file_name(title, false));
    }
    Ok(files)
}

/// Reads the video manager and every title set IFO the manager announces.
///
/// A title set whose files are absent is kept as an empty entry; the error
/// surfaces only when playback tries to enter it.
pub async fn load_disc(source: &dyn ByteSource, policy: &dyn StrictnessPolicy) -> Result<DiscImage, DiscError> {
    let vmg = read_files(source, 0).await?;
    let vmgi = open_vmgi(&vmg, policy)?;
    let count = vmgi.mat.vmg_nr_of_title_sets.min(99) as u8;

    let mut title_sets = Vec::with_capacity(count as usize);
    for vts in 1..=count {
        title_sets.push(read_files(source, vts).await?);
    }
    tracing::info!(
        target: "dvdnav::disc",
        "disc loaded: {} titles in {} title sets",
        vmgi.tt_srpt.titles.len(),
        count
    );
    Ok(DiscImage { vmg, title_sets })
}

fn open_vmgi(files: &IfoFiles, policy: &dyn StrictnessPolicy) -> Result<VmgiHandle, IfoError> {
    ifo::open(files, 0, policy)?.into_vmgi().ok_or(IfoError::WrongVariant {
        title: 0,
        found: "VTSI",
    })
}

fn open_vtsi(files: &IfoFiles, vts: u8, policy: &dyn StrictnessPolicy) -> Result<VtsiHandle, IfoError> {
    ifo::open(files, vts, policy)?.into_vtsi().ok_or(IfoError::WrongVariant { title: vts, found: "VMGI" })
}

// ============================================================================
// Summary
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DiscSummary {
    pub provider: String,
    pub title_sets: u16,
    pub menus_available: bool,
    pub titles: Vec<TitleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleSummary {
    pub number: u16,
    pub title_set: u8,
    pub angles: u8,
    /// 90 kHz ticks.
    pub duration_ticks: u64,
    pub duration: String,
    pub resolution: Option<(u32, u32)>,
    pub audio_languages: Vec<String>,
    pub subtitle_languages: Vec<String>,
    pub chapters: Vec<ChapterSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterSummary {
    pub number: u16,
    pub start_ticks: u64,
    pub start: String,
    pub duration_ticks: u64,
    pub duration: String,
}

impl TitleSummary {
    fn new(number: u16, info: &TitleInfo) -> Self {
        Self {
            number,
            title_set: info.title_set_nr,
            angles: info.nr_of_angles,
            duration_ticks: 0,
            duration: format_pts(0),
            resolution: None,
            audio_languages: Vec::new(),
            subtitle_languages: Vec::new(),
            chapters: Vec::new(),
        }
    }
}

/// Ticks of cells `first..=last` (1-based), counting only the first angle
/// of each angle block.
fn cells_duration(pgc: &Pgc, first: usize, last: usize) -> u64 {
    (first..=last)
        .filter_map(|n| pgc.cell(n))
        .filter(|cell| {
            cell.block_type != BLOCK_TYPE_ANGLE_BLOCK
                || cell.block_mode == BLOCK_MODE_NOT_IN_BLOCK
                || cell.block_mode == BLOCK_MODE_FIRST_CELL
        })
        .map(|cell| cell.playback_time.to_pts())
        .sum()
}

fn chapters_of(vtsi: &VtsiHandle, vts_ttn: u8) -> Vec<ChapterSummary> {
    let Some(ttu) = vtsi.vts_ptt_srpt.title(vts_ttn as usize) else {
        return Vec::new();
    };

    let mut start = 0u64;
    let mut chapters = Vec::with_capacity(ttu.ptts.len());
    for (i, ptt) in ttu.ptts.iter().enumerate() {
        let Some(pgc) = vtsi.vts_pgcit.pgc(ptt.pgcn as usize) else {
            tracing::warn!(target: "dvdnav::disc", "chapter {} points at missing PGC {}", i + 1, ptt.pgcn);
            continue;
        };
        let Some(first) = pgc.program_entry_cell(ptt.pgn as usize) else {
            tracing::warn!(target: "dvdnav::disc", "chapter {} points at missing program {}", i + 1, ptt.pgn);
            continue;
        };
        let last = pgc
            .program_entry_cell(ptt.pgn as usize + 1)
            .map_or(pgc.nr_of_cells as usize, |next| (next as usize).saturating_sub(1));
        let duration = cells_duration(pgc, first as usize, last);
        chapters.push(ChapterSummary {
            number: (i + 1) as u16,
            start_ticks: start,
            start: format_pts(start),
            duration_ticks: duration,
            duration: format_pts(duration),
        });
        start += duration;
    }
    chapters
}

/// Lists titles and chapters. Title sets that cannot be opened produce
/// titles without chapters.
pub fn summarize(disc: &DiscImage, policy: &dyn StrictnessPolicy) -> Result<DiscSummary, DiscError> {
    let vmgi = open_vmgi(&disc.vmg, policy)?;
    let mut vtsis: Vec<Option<Option<VtsiHandle>>> = vec![None; disc.nr_of_title_sets()];

    let mut titles = Vec::with_capacity(vmgi.tt_srpt.titles.len());
    for (i, info) in vmgi.tt_srpt.titles.iter().enumerate() {
        let mut title = TitleSummary::new((i + 1) as u16, info);
        let slot = usize::from(info.title_set_nr).checked_sub(1).and_then(|s| vtsis.get_mut(s));
        let vtsi = match (slot, disc.title_set(info.title_set_nr)) {
            (Some(slot), Some(files)) => slot
                .get_or_insert_with(|| match open_vtsi(files, info.title_set_nr, policy) {
                    Ok(vtsi) => Some(vtsi),
                    Err(e) => {
                        tracing::warn!(target: "dvdnav::disc", "skipping title set {}: {}", info.title_set_nr, e);
                        None
                    }
                })
                .as_ref(),
            _ => None,
        };

        if let Some(vtsi) = vtsi {
            title.chapters = chapters_of(vtsi, info.vts_ttn);
            title.duration_ticks = title.chapters.iter().map(|c| c.duration_ticks).sum();
            title.duration = format_pts(title.duration_ticks);
            title.resolution = Some(vtsi.mat.vts_video_attr.resolution());
            title.audio_languages = vtsi
                .mat
                .vts_audio_attr
                .iter()
                .take(vtsi.mat.nr_of_vts_audio_streams as usize)
                .map(|a| a.language())
                .collect();
            title.subtitle_languages = vtsi
                .mat
                .vts_subp_attr
                .iter()
                .take(vtsi.mat.nr_of_vts_subp_streams as usize)
                .map(|s| s.language())
                .collect();
        }
        titles.push(title);
    }

    Ok(DiscSummary {
        provider: vmgi.mat.provider_identifier.trim().to_string(),
        title_sets: vmgi.mat.vmg_nr_of_title_sets,
        menus_available: vmgi.pgci_ut.is_some() || vmgi.first_play_pgc.is_some(),
        titles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifo::time::PTS_HZ;
    use crate::ifo::Lenient;
    use crate::testing::{CellSpec, DiscBuilder, PgcSpec, TitleSpec};

    fn chaptered() -> DiscBuilder {
        // chapters of 10s, 20s and 30s, the last one inside a two angle block
        let pgc = PgcSpec::new(vec![
            CellSpec::new(0, 9).seconds(10),
            CellSpec::new(10, 19).seconds(5),
            CellSpec::new(20, 29).seconds(15),
            CellSpec::new(30, 39)
                .seconds(30)
                .block(BLOCK_MODE_FIRST_CELL, BLOCK_TYPE_ANGLE_BLOCK),
            CellSpec::new(40, 49)
                .seconds(30)
                .block(crate::ifo::pgc::BLOCK_MODE_LAST_CELL, BLOCK_TYPE_ANGLE_BLOCK),
        ])
        .programs(vec![1, 2, 4]);
        DiscBuilder::new()
            .title(TitleSpec::new(vec![pgc]).angles(2))
            .title(TitleSpec::linear(1))
    }

    #[tokio::test]
    async fn loads_every_title_set() {
        let source = chaptered().build().source();
        let disc = load_disc(&source, &Lenient).await.expect("disc");
        assert_eq!(disc.nr_of_title_sets(), 2);
        assert!(disc.title_set(2).and_then(|f| f.ifo.as_ref()).is_some());
        assert!(disc.title_set(0).is_none());
        assert!(disc.title_set(3).is_none());
    }

    #[tokio::test]
    async fn missing_ifo_uses_backup() {
        let mut source = chaptered().build().source();
        source.remove_ifo(0, false);
        source.remove_ifo(2, false);
        source.remove_ifo(2, true);
        let disc = load_disc(&source, &Lenient).await.expect("disc");
        assert!(disc.vmg.ifo.is_none() && disc.vmg.bup.is_some());
        assert!(disc.title_set(2).is_some_and(|f| f.ifo.is_none() && f.bup.is_none()));

        let summary = summarize(&disc, &Lenient).expect("summary");
        assert_eq!(summary.titles.len(), 2);
        assert!(summary.titles[1].chapters.is_empty());
    }

    #[tokio::test]
    async fn missing_video_manager_fails() {
        let mut source = chaptered().build().source();
        source.remove_ifo(0, false);
        source.remove_ifo(0, true);
        let err = load_disc(&source, &Lenient).await.unwrap_err();
        assert!(matches!(err, DiscError::Ifo(IfoError::CannotOpenTitle { title: 0, .. })));
    }

    #[test]
    fn chapters_and_durations() {
        let disc = chaptered().build().into_image();
        let summary = summarize(&disc, &Lenient).expect("summary");
        assert_eq!(summary.title_sets, 2);

        let title = &summary.titles[0];
        assert_eq!((title.number, title.title_set, title.angles), (1, 1, 2));
        let starts: Vec<u64> = title.chapters.iter().map(|c| c.start_ticks / PTS_HZ).collect();
        let lengths: Vec<u64> = title.chapters.iter().map(|c| c.duration_ticks / PTS_HZ).collect();
        assert_eq!(starts, vec![0, 10, 30]);
        assert_eq!(lengths, vec![10, 20, 30]);
        assert_eq!(title.duration_ticks, 60 * PTS_HZ);
        assert_eq!(title.duration, "00:01:00.000");
        assert_eq!(title.chapters[2].start, "00:00:30.000");
    }

    #[test]
    fn summary_serializes() {
        let disc = chaptered().build().into_image();
        let summary = summarize(&disc, &Lenient).expect("summary");
        let json = serde_json::to_value(&summary).expect("json");
        assert_eq!(json["titles"][1]["chapters"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["titles"][0]["resolution"][0], 720);
    }
}
