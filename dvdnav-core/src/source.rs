//! Byte sources: where IFO images and VOB sectors come from.
//!
//! The navigator never touches files itself. It asks a [`ByteSource`] for
//! IFO images and for sectors of a VOB, which may live on a local disc, in
//! memory, or behind a network transport.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::ifo::{ifo_file_name, DVD_BLOCK_LEN};
use crate::nav::{split_nav_pack, NavError, NavPacketBytes};

/// Title VOBs are split over at most this many files.
const MAX_TITLE_VOB_PARTS: u8 = 9;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("sector {sector} is past the end of {file}")]
    OutOfRange { file: VobFile, sector: u32 },
    #[error("bad NAV sector: {0}")]
    Nav(#[from] NavError),
}

/// One VOB sector space: the video manager menus (`vts == 0`), the menus of
/// a title set, or its titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VobFile {
    pub vts: u8,
    pub menu: bool,
}

impl VobFile {
    pub fn vmgm() -> Self {
        Self { vts: 0, menu: true }
    }

    pub fn menu(vts: u8) -> Self {
        Self { vts, menu: true }
    }

    pub fn title(vts: u8) -> Self {
        Self { vts, menu: false }
    }

    /// On-disc file names making up this sector space, in order.
    pub fn file_names(&self) -> Vec<String> {
        match (self.vts, self.menu) {
            (0, _) => vec!["VIDEO_TS.VOB".to_string()],
            (vts, true) => vec![format!("VTS_{vts:02}_0.VOB")],
            (vts, false) => (1..=MAX_TITLE_VOB_PARTS)
                .map(|part| format!("VTS_{vts:02}_{part}.VOB"))
                .collect(),
        }
    }
}

impl std::fmt::Display for VobFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.vts, self.menu) {
            (0, _) => write!(f, "VIDEO_TS.VOB"),
            (vts, true) => write!(f, "VTS_{vts:02} menu VOB"),
            (vts, false) => write!(f, "VTS_{vts:02} title VOBs"),
        }
    }
}

#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Whole IFO (or `.BUP` copy) of `title`, 0 being the video manager.
    async fn read_ifo(&self, title: u8, backup: bool) -> Result<Bytes, SourceError>;

    /// `count` sectors starting at `sector` of `file`. May return fewer at
    /// the end of the file, but never zero.
    async fn read_sectors(&self, file: VobFile, sector: u32, count: u32) -> Result<Bytes, SourceError>;

    /// NAV pack at `sector`, split into its PCI and DSI payloads.
    async fn read_nav_packet(&self, file: VobFile, sector: u32) -> Result<NavPacketBytes, SourceError> {
        let data = self.read_sectors(file, sector, 1).await?;
        Ok(split_nav_pack(&data)?)
    }

    /// The sectors of a VOBU following its NAV pack.
    async fn read_video_chunk(&self, file: VobFile, sector: u32, count: u32) -> Result<Bytes, SourceError> {
        if count == 0 {
            return Ok(Bytes::new());
        }
        self.read_sectors(file, sector, count).await
    }
}

// ============================================================================
// In-memory source
// ============================================================================

/// Source backed by byte images held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    ifos: HashMap<(u8, bool), Bytes>,
    vobs: HashMap<VobFile, Bytes>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ifo(&mut self, title: u8, backup: bool, data: impl Into<Bytes>) {
        self.ifos.insert((title, backup), data.into());
    }

    pub fn remove_ifo(&mut self, title: u8, backup: bool) {
        self.ifos.remove(&(title, backup));
    }

    pub fn insert_vob(&mut self, file: VobFile, data: impl Into<Bytes>) {
        self.vobs.insert(file, data.into());
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_ifo(&self, title: u8, backup: bool) -> Result<Bytes, SourceError> {
        self.ifos
            .get(&(title, backup))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(ifo_file_name(title, backup)))
    }

    async fn read_sectors(&self, file: VobFile, sector: u32, count: u32) -> Result<Bytes, SourceError> {
        let data = self.vobs.get(&file).ok_or_else(|| SourceError::NotFound(file.to_string()))?;
        let start = sector as usize * DVD_BLOCK_LEN;
        if start >= data.len() {
            return Err(SourceError::OutOfRange { file, sector });
        }
        let end = (start + count as usize * DVD_BLOCK_LEN).min(data.len());
        Ok(data.slice(start..end))
    }
}

// ============================================================================
// Filesystem source
// ============================================================================

/// One file of a VOB sector space and the sectors it holds.
#[derive(Debug, Clone)]
struct VobPart {
    path: PathBuf,
    sectors: u64,
}

/// Reads a `VIDEO_TS` directory tree.
#[derive(Debug)]
pub struct DirSource {
    video_ts: PathBuf,
    parts: Mutex<HashMap<VobFile, Vec<VobPart>>>,
}

impl DirSource {
    /// Accepts the disc root (holding `VIDEO_TS/`) or the `VIDEO_TS` directory itself.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref();
        for candidate in [root.join("VIDEO_TS"), root.join("video_ts"), root.to_path_buf()] {
            if find_file(&candidate, "VIDEO_TS.IFO").await.is_some() || find_file(&candidate, "VIDEO_TS.BUP").await.is_some() {
                tracing::info!(target: "dvdnav::source", "reading disc from {}", candidate.display());
                return Ok(Self {
                    video_ts: candidate,
                    parts: Mutex::new(HashMap::new()),
                });
            }
        }
        Err(SourceError::NotFound(format!("VIDEO_TS under {}", root.display())))
    }

    pub fn video_ts(&self) -> &Path {
        &self.video_ts
    }

    async fn vob_parts(&self, file: VobFile) -> Result<Vec<VobPart>, SourceError> {
        let mut cache = self.parts.lock().await;
        if let Some(parts) = cache.get(&file) {
            return Ok(parts.clone());
        }
        let mut parts = Vec::new();
        for name in file.file_names() {
            let Some(path) = find_file(&self.video_ts, &name).await else {
                // title VOB parts are consecutive
                break;
            };
            let meta = tokio::fs::metadata(&path).await.map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            })?;
            parts.push(VobPart {
                path,
                sectors: meta.len() / DVD_BLOCK_LEN as u64,
            });
        }
        if parts.is_empty() {
            return Err(SourceError::NotFound(file.to_string()));
        }
        tracing::debug!(target: "dvdnav::source", "{} spans {} files", file, parts.len());
        cache.insert(file, parts.clone());
        Ok(parts)
    }
}

#[async_trait]
impl ByteSource for DirSource {
    async fn read_ifo(&self, title: u8, backup: bool) -> Result<Bytes, SourceError> {
        let name = ifo_file_name(title, backup);
        let path = find_file(&self.video_ts, &name)
            .await
            .ok_or_else(|| SourceError::NotFound(name.clone()))?;
        let data = tokio::fs::read(&path).await.map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Bytes::from(data))
    }

    async fn read_sectors(&self, file: VobFile, sector: u32, count: u32) -> Result<Bytes, SourceError> {
        let parts = self.vob_parts(file).await?;
        let mut out = Vec::with_capacity(count as usize * DVD_BLOCK_LEN);
        let mut next = u64::from(sector);
        let mut remaining = u64::from(count);
        let mut base = 0u64;

        for part in &parts {
            if remaining == 0 {
                break;
            }
            if next >= base + part.sectors {
                base += part.sectors;
                continue;
            }
            let offset = next - base;
            let take = remaining.min(part.sectors - offset);
            let io_err = |source| SourceError::Io {
                path: part.path.display().to_string(),
                source,
            };
            let mut f = tokio::fs::File::open(&part.path).await.map_err(io_err)?;
            f.seek(std::io::SeekFrom::Start(offset * DVD_BLOCK_LEN as u64))
                .await
                .map_err(io_err)?;
            let start = out.len();
            out.resize(start + (take as usize) * DVD_BLOCK_LEN, 0);
            f.read_exact(&mut out[start..]).await.map_err(io_err)?;

            next += take;
            remaining -= take;
            base += part.sectors;
        }

        if out.is_empty() {
            return Err(SourceError::OutOfRange { file, sector });
        }
        Ok(Bytes::from(out))
    }
}

/// Finds `name` in `dir`, ignoring case.
async fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let exact = dir.join(name);
    if tokio::fs::try_exists(&exact).await.unwrap_or(false) {
        return Some(exact);
    }
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{nav_sector, DsiSpec, PciSpec};

    fn sectors(tags: &[u8]) -> Vec<u8> {
        tags.iter().flat_map(|&t| vec![t; DVD_BLOCK_LEN]).collect()
    }

    #[test]
    fn vob_file_names() {
        assert_eq!(VobFile::vmgm().file_names(), vec!["VIDEO_TS.VOB"]);
        assert_eq!(VobFile::menu(3).file_names(), vec!["VTS_03_0.VOB"]);
        let title = VobFile::title(12).file_names();
        assert_eq!(title.len(), 9);
        assert_eq!(title[0], "VTS_12_1.VOB");
        assert_eq!(title[8], "VTS_12_9.VOB");
    }

    #[tokio::test]
    async fn memory_source_reads_sectors_and_nav_packs() {
        let mut source = MemorySource::new();
        let mut vob = nav_sector(&PciSpec::default().lbn(0), &DsiSpec::new(0, 2)).to_vec();
        vob.extend(sectors(&[1, 2]));
        source.insert_vob(VobFile::title(1), vob);
        source.insert_ifo(0, false, vec![9u8; 4]);

        let nav = source.read_nav_packet(VobFile::title(1), 0).await.expect("nav");
        assert_eq!(&nav.dsi[8..12], &2u32.to_be_bytes());

        let chunk = source.read_video_chunk(VobFile::title(1), 1, 5).await.expect("chunk");
        assert_eq!(chunk.len(), 2 * DVD_BLOCK_LEN);
        assert_eq!(chunk[DVD_BLOCK_LEN], 2);

        assert!(matches!(
            source.read_sectors(VobFile::title(1), 3, 1).await,
            Err(SourceError::OutOfRange { sector: 3, .. })
        ));
        assert!(matches!(source.read_ifo(0, true).await, Err(SourceError::NotFound(ref n)) if n == "VIDEO_TS.BUP"));
        assert!(source.read_ifo(0, false).await.is_ok());
    }

    #[tokio::test]
    async fn dir_source_spans_title_vob_parts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let video_ts = dir.path().join("VIDEO_TS");
        std::fs::create_dir(&video_ts).expect("mkdir");
        std::fs::write(video_ts.join("VIDEO_TS.IFO"), b"ifo").expect("write");
        std::fs::write(video_ts.join("vts_01_0.ifo"), b"vts").expect("write");
        std::fs::write(video_ts.join("VTS_01_1.VOB"), sectors(&[10, 11])).expect("write");
        std::fs::write(video_ts.join("VTS_01_2.VOB"), sectors(&[12, 13, 14])).expect("write");

        let source = DirSource::open(dir.path()).await.expect("open");
        assert_eq!(&source.read_ifo(0, false).await.expect("ifo")[..], b"ifo");
        // lower case names are found too
        assert_eq!(&source.read_ifo(1, false).await.expect("vts")[..], b"vts");

        let data = source.read_sectors(VobFile::title(1), 1, 3).await.expect("read");
        let tags: Vec<u8> = data.chunks(DVD_BLOCK_LEN).map(|s| s[0]).collect();
        assert_eq!(tags, vec![11, 12, 13]);

        let tail = source.read_sectors(VobFile::title(1), 4, 8).await.expect("tail");
        assert_eq!(tail.len(), DVD_BLOCK_LEN);
        assert!(source.read_sectors(VobFile::title(1), 5, 1).await.is_err());
        assert!(matches!(
            source.read_sectors(VobFile::menu(1), 0, 1).await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn dir_source_requires_video_ts() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(DirSource::open(dir.path()).await, Err(SourceError::NotFound(_))));
    }
}
