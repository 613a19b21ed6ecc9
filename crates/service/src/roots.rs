//! Root Provider
//!
//! Chooses the `(prev, latest)` pair of finalized roots for the next
//! cycle and persists the last processed root. The previous root comes
//! from, in order: the persisted value, a configured bootstrap
//! root/slot/epoch, or the lookback window.

use crate::deadlines::BeaconConfig;
use anyhow::{Context, Result};
use proof_gen::{BeaconClient, BeaconClientError, BeaconHeaderInfo, BlockId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const SKIP_SLOT_ATTEMPTS: u32 = 32;

/// The single persisted value, overwritten atomically after a successful
/// cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRoot {
    pub root: String,
    pub slot: u64,
}

impl PersistedRoot {
    fn from_header(info: &BeaconHeaderInfo) -> Self {
        Self {
            root: format!("0x{}", hex::encode(info.root)),
            slot: info.header.slot,
        }
    }

    fn parse_root(&self) -> Result<[u8; 32]> {
        let stripped = self.root.strip_prefix("0x").unwrap_or(&self.root);
        let bytes = hex::decode(stripped).context("persisted root is not hex")?;
        bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("persisted root is not 32 bytes"))
    }
}

/// Configured fallback for the previous root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    Root([u8; 32]),
    Slot(u64),
    Epoch(u64),
    Lookback,
}

impl Bootstrap {
    /// Root takes precedence over slot over epoch; none of them means the
    /// lookback window.
    pub fn from_options(
        start_root: Option<&str>,
        start_slot: Option<u64>,
        start_epoch: Option<u64>,
    ) -> Result<Self> {
        if let Some(root) = start_root {
            let stripped = root.strip_prefix("0x").unwrap_or(root);
            let bytes = hex::decode(stripped).context("invalid start root")?;
            let root: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("start root is not 32 bytes"))?;
            return Ok(Self::Root(root));
        }
        if let Some(slot) = start_slot {
            return Ok(Self::Slot(slot));
        }
        if let Some(epoch) = start_epoch {
            return Ok(Self::Epoch(epoch));
        }
        Ok(Self::Lookback)
    }
}

pub struct RootProvider {
    cl: BeaconClient,
    config: BeaconConfig,
    bootstrap: Bootstrap,
    lookback_days: u64,
    state_file: PathBuf,
    saved: Option<PersistedRoot>,
}

impl RootProvider {
    /// Load the persisted root (if any) and set up the fallbacks.
    pub fn load(
        cl: BeaconClient,
        config: BeaconConfig,
        bootstrap: Bootstrap,
        lookback_days: u64,
        state_file: PathBuf,
    ) -> Self {
        let saved = read_state_file(&state_file);
        if let Some(saved) = &saved {
            info!(root = %saved.root, slot = saved.slot, "loaded persisted root");
        }
        Self {
            cl,
            config,
            bootstrap,
            lookback_days,
            state_file,
            saved,
        }
    }

    /// The `(prev, latest)` headers for the next cycle, or `None` when a
    /// fetch failed and the driver should sleep.
    pub async fn next_roots(&self) -> Option<(BeaconHeaderInfo, BeaconHeaderInfo)> {
        let latest = match self.cl.get_beacon_header(BlockId::Finalized).await {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "finalized header unavailable");
                return None;
            }
        };

        let prev = match self.resolve_prev().await {
            Ok(prev) => prev,
            Err(e) => {
                warn!(error = %e, "previous root unavailable");
                return None;
            }
        };
        Some((prev, latest))
    }

    async fn resolve_prev(&self) -> Result<BeaconHeaderInfo> {
        if let Some(saved) = &self.saved {
            let root = saved.parse_root()?;
            match self.cl.get_beacon_header(BlockId::Root(root)).await {
                Ok(header) => return Ok(header),
                // A pruned or unknown root falls through to the bootstrap.
                Err(BeaconClientError::SlotSkipped(_)) => {
                    warn!(root = %saved.root, "persisted root no longer resolves");
                }
                Err(other) => return Err(other.into()),
            }
        }

        match self.bootstrap {
            Bootstrap::Root(root) => Ok(self.cl.get_beacon_header(BlockId::Root(root)).await?),
            Bootstrap::Slot(slot) => self.header_at_or_after(slot).await,
            Bootstrap::Epoch(epoch) => {
                self.header_at_or_after(epoch * self.config.slots_per_epoch)
                    .await
            }
            Bootstrap::Lookback => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .context("system clock before unix epoch")?
                    .as_secs();
                let lookback = self.lookback_days * 24 * 3600;
                let slot = self.config.timestamp_to_slot(now.saturating_sub(lookback));
                self.header_at_or_after(slot).await
            }
        }
    }

    async fn header_at_or_after(&self, slot: u64) -> Result<BeaconHeaderInfo> {
        let (_, header) = self
            .cl
            .find_next_available_slot(slot, SKIP_SLOT_ATTEMPTS)
            .await?;
        Ok(header)
    }

    /// Overwrite the persisted root. Written to a temp file first so the
    /// value on disk is always complete.
    pub fn persist(&mut self, latest: &BeaconHeaderInfo) -> Result<()> {
        let value = PersistedRoot::from_header(latest);
        write_state_file(&self.state_file, &value)?;
        info!(root = %value.root, slot = value.slot, "persisted last processed root");
        self.saved = Some(value);
        Ok(())
    }

    #[must_use]
    pub fn saved(&self) -> Option<&PersistedRoot> {
        self.saved.as_ref()
    }
}

fn read_state_file(path: &Path) -> Option<PersistedRoot> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file corrupt, ignoring");
            None
        }
    }
}

fn write_state_file(path: &Path, value: &PersistedRoot) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let encoded = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, encoded)
        .with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "exit-delay-roots-{name}-{}.json",
            std::process::id()
        ))
    }

    #[test]
    fn bootstrap_precedence() {
        let root_hex = format!("0x{}", "11".repeat(32));
        let chosen =
            Bootstrap::from_options(Some(&root_hex), Some(5), Some(9)).expect("parse");
        assert_eq!(chosen, Bootstrap::Root([0x11; 32]));

        assert_eq!(
            Bootstrap::from_options(None, Some(5), Some(9)).unwrap(),
            Bootstrap::Slot(5)
        );
        assert_eq!(
            Bootstrap::from_options(None, None, Some(9)).unwrap(),
            Bootstrap::Epoch(9)
        );
        assert_eq!(
            Bootstrap::from_options(None, None, None).unwrap(),
            Bootstrap::Lookback
        );
    }

    #[test]
    fn bootstrap_rejects_bad_root() {
        assert!(Bootstrap::from_options(Some("0x1234"), None, None).is_err());
        assert!(Bootstrap::from_options(Some("zz"), None, None).is_err());
    }

    #[test]
    fn persisted_root_roundtrips_through_disk() {
        let path = temp_path("roundtrip");
        let value = PersistedRoot {
            root: format!("0x{}", "ab".repeat(32)),
            slot: 123_456,
        };
        write_state_file(&path, &value).expect("write");
        let loaded = read_state_file(&path).expect("read");
        assert_eq!(loaded, value);
        assert_eq!(loaded.parse_root().unwrap(), [0xab; 32]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_state_file_is_absent_not_error() {
        assert!(read_state_file(Path::new("/nonexistent/exit-delay.json")).is_none());
    }

    #[test]
    fn corrupt_state_file_is_ignored() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"not json").unwrap();
        assert!(read_state_file(&path).is_none());
        let _ = std::fs::remove_file(&path);
    }
}
