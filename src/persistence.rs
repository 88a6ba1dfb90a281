use crate::descriptor::Resolution;
use crate::error::RollupError;
use crate::time_range::TimeRanges;
use crate::types::{HistoryBucket, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SNAP_MAGIC: [u8; 8] = *b"TSRSNP01";
const SNAP_VERSION: u32 = 1;
const HEADER_LEN: usize = 32;

/// Everything needed to resume rollups after a restart: all stored buckets and the ranges that
/// were still waiting to be aggregated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub buckets: Vec<HistoryBucket>,
    pub dirty: Vec<(Resolution, TimeRanges)>,
}

/// Fixed little-endian prefix of every snapshot file.
struct SnapshotHeader {
    timestamp: Timestamp,
    payload_len: u64,
    crc: u32,
}

impl SnapshotHeader {
    fn for_payload(timestamp: Timestamp, payload: &[u8]) -> Self {
        SnapshotHeader {
            timestamp,
            payload_len: payload.len() as u64,
            crc: crc32fast::hash(payload),
        }
    }

    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(&SNAP_MAGIC);
        out[8..12].copy_from_slice(&SNAP_VERSION.to_le_bytes());
        out[12..20].copy_from_slice(&self.timestamp.to_le_bytes());
        out[20..28].copy_from_slice(&self.payload_len.to_le_bytes());
        out[28..].copy_from_slice(&self.crc.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8; HEADER_LEN], path: &Path) -> Result<Self, RollupError> {
        let corrupt = |details: String| RollupError::Corruption {
            details,
            timestamp: None,
        };
        if bytes[..8] != SNAP_MAGIC {
            return Err(corrupt(format!("Bad snapshot magic in {:?}", path)));
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let u64_at = |at: usize| u64::from(u32_at(at)) | (u64::from(u32_at(at + 4)) << 32);

        let version = u32_at(8);
        if version != SNAP_VERSION {
            return Err(corrupt(format!("Unsupported snapshot version {} in {:?}", version, path)));
        }
        Ok(SnapshotHeader {
            timestamp: u64_at(12),
            payload_len: u64_at(20),
            crc: u32_at(28),
        })
    }
}

/// Writes and reads checksummed snapshot files.
///
/// File layout: magic, version, timestamp, payload length, CRC32 of the payload, then the
/// bincode-encoded [`SnapshotState`]. Files are installed atomically via a temp file and rename.
#[derive(Debug)]
pub struct Snapshotter {
    snapshot_dir: PathBuf,
}

impl Snapshotter {
    pub fn new<P: AsRef<Path>>(snapshot_dir: P) -> Result<Self, RollupError> {
        let snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Snapshotter { snapshot_dir })
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Writes `state` as `snapshot_<timestamp>.bin` and returns its path and size in bytes.
    pub fn create_snapshot(
        &self,
        state: &SnapshotState,
        timestamp: Timestamp,
    ) -> Result<(PathBuf, u64), RollupError> {
        let payload = bincode::serialize(state)?;
        let header = SnapshotHeader::for_payload(timestamp, &payload);

        let target = self.snapshot_dir.join(format!("snapshot_{}.bin", timestamp));
        let staging = self.snapshot_dir.join(format!(".tmp_snapshot_{}.bin", timestamp));
        {
            let mut out = BufWriter::new(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&staging)?,
            );
            out.write_all(&header.encode())?;
            out.write_all(&payload)?;
            out.flush()?;
            out.get_ref().sync_data()?;
        }
        // Readers only ever see complete files.
        fs::rename(&staging, &target)?;
        File::open(&self.snapshot_dir)?.sync_data()?;

        Ok((target, (HEADER_LEN + payload.len()) as u64))
    }

    /// Loads the newest snapshot, if any.
    pub fn load_latest_snapshot(&self) -> Result<Option<SnapshotState>, RollupError> {
        match self.newest_first()?.first() {
            Some((_, path)) => read_snapshot(path).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_latest_snapshot_timestamp(&self) -> Result<Option<Timestamp>, RollupError> {
        Ok(self.newest_first()?.first().map(|(ts, _)| *ts))
    }

    /// Deletes all but the newest `keep` snapshots. Returns how many were removed.
    pub fn prune(&self, keep: usize) -> Result<usize, RollupError> {
        let mut snapshots = self.newest_first()?;
        let keep = keep.max(1);
        let stale = if snapshots.len() > keep {
            snapshots.split_off(keep)
        } else {
            Vec::new()
        };
        for (_, path) in &stale {
            fs::remove_file(path)?;
        }
        Ok(stale.len())
    }

    /// `snapshot_<ns>.bin` files by descending timestamp. Temp files and strays are skipped.
    fn newest_first(&self) -> Result<Vec<(Timestamp, PathBuf)>, RollupError> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.snapshot_dir)? {
            let path = entry?.path();
            let timestamp = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("snapshot_"))
                .and_then(|n| n.strip_suffix(".bin"))
                .and_then(|n| n.parse::<Timestamp>().ok());
            if let Some(ts) = timestamp {
                found.push((ts, path));
            }
        }
        found.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        Ok(found)
    }
}

fn read_snapshot(path: &Path) -> Result<SnapshotState, RollupError> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut raw_header = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw_header)?;
    let header = SnapshotHeader::decode(&raw_header, path)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload)?;
    if crc32fast::hash(&payload) != header.crc {
        return Err(RollupError::Corruption {
            details: format!("Snapshot payload CRC mismatch in {:?}", path),
            timestamp: Some(header.timestamp),
        });
    }

    Ok(bincode::deserialize(&payload)?)
}
