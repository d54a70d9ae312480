//! Durable snapshots of market state: ledger balances plus every recorded
//! proposal, framed as MAGIC + version + length + bincode payload + CRC32
//! and written with a tmp-file rename so readers never observe a torn file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Proposal;

const MAGIC: [u8; 4] = *b"BMKT";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("bad magic")]
    BadMagic,
    #[error("bad crc")]
    BadCrc,
    #[error("unsupported snapshot version {found}")]
    UnsupportedVersion { found: u16 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub balances: HashMap<String, u64>,
    pub proposals: Vec<Proposal>,
    pub next_proposal_id: u64,
}

pub fn save(path: &Path, snapshot: &MarketSnapshot) -> Result<(), SnapshotError> {
    let payload =
        bincode::serialize(snapshot).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    write_atomic(path, &encode_frame(&payload))
}

pub fn load(path: &Path) -> Result<MarketSnapshot, SnapshotError> {
    let bytes = fs::read(path)?;
    let payload = decode_frame(&bytes)?;
    bincode::deserialize(payload).map_err(|e| SnapshotError::Serialization(e.to_string()))
}

fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);

    let mut hasher = Hasher::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    buf
}

fn decode_frame(bytes: &[u8]) -> Result<&[u8], SnapshotError> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(SnapshotError::BadCrc);
    }
    if bytes[0..4] != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let payload_end = HEADER_LEN + len;
    if bytes.len() != payload_end + 4 {
        return Err(SnapshotError::BadCrc);
    }
    let stored_crc = u32::from_le_bytes([
        bytes[payload_end],
        bytes[payload_end + 1],
        bytes[payload_end + 2],
        bytes[payload_end + 3],
    ]);
    let mut hasher = Hasher::new();
    hasher.update(&bytes[..payload_end]);
    if hasher.finalize() != stored_crc {
        return Err(SnapshotError::BadCrc);
    }
    if version != VERSION {
        return Err(SnapshotError::UnsupportedVersion { found: version });
    }
    Ok(&bytes[HEADER_LEN..payload_end])
}

/// Write to `<path>.tmp`, fsync, then rename over `path`. The parent
/// directory is fsynced where the platform supports it.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    fsync_parent(path)?;
    Ok(())
}

#[cfg(target_family = "unix")]
fn fsync_parent(path: &Path) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    File::open(parent)?.sync_all()
}

#[cfg(not(target_family = "unix"))]
fn fsync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProposalStatus;
    use tempfile::tempdir;

    fn sample() -> MarketSnapshot {
        MarketSnapshot {
            balances: HashMap::from([("a1".to_string(), 7)]),
            proposals: vec![Proposal {
                id: 1,
                listing_id: "l1".to_string(),
                agent_id: "a1".to_string(),
                base_cost: 2,
                boost: 1,
                tokens_spent: 3,
                created_at: 42,
                status: ProposalStatus::Pending,
            }],
            next_proposal_id: 2,
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market.snap");
        save(&path, &sample()).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.balances.get("a1"), Some(&7));
        assert_eq!(loaded.proposals.len(), 1);
        assert_eq!(loaded.next_proposal_id, 2);
        assert!(!path.with_extension("snap.tmp").exists());
    }

    #[test]
    fn corrupted_payload_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market.snap");
        save(&path, &sample()).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(load(&path), Err(SnapshotError::BadCrc)));
    }

    #[test]
    fn wrong_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market.snap");
        save(&path, &sample()).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(load(&path), Err(SnapshotError::BadMagic)));
    }

    #[test]
    fn truncated_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market.snap");
        save(&path, &sample()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(load(&path), Err(SnapshotError::BadCrc)));
    }
}
