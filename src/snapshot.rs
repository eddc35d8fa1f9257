//! Save/restore of guest-visible controller and PCI state (`spec.md` §5 design note on
//! persistence; `SPEC_FULL.md` §2 test tooling).
//!
//! Backed by `bincode`, the same binary framing used across the corpus for anything
//! that needs fast, compact (de)serialization rather than the human-readable JSON
//! `config.rs` uses. The backing-store file itself is never part of a snapshot — its
//! bytes already live on disk; only the fact that it was open is recorded.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::ControllerState;
use crate::pci::PciConfigSpace;

/// Bumped whenever the on-disk layout of [`DeviceSnapshot`] changes incompatibly.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("snapshot file is truncated")]
    Truncated,
    #[error("failed to decode snapshot: {0}")]
    Decode(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct DeviceSnapshot {
    version: u32,
    controller: ControllerState,
    pci: PciConfigSpace,
}

/// Serialize `controller`/`pci` state and write it to `path`, overwriting any existing
/// file.
pub fn save_state(path: &Path, controller: &ControllerState, pci: &PciConfigSpace) -> Result<(), SnapshotError> {
    let snapshot = DeviceSnapshot {
        version: SNAPSHOT_VERSION,
        controller: controller.clone(),
        pci: pci.clone(),
    };
    let bytes = bincode::serialize(&snapshot).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Load and validate a snapshot previously written by [`save_state`].
pub fn load_state(path: &Path) -> Result<(ControllerState, PciConfigSpace), SnapshotError> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(SnapshotError::Truncated);
    }
    let snapshot: DeviceSnapshot =
        bincode::deserialize(&bytes).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: snapshot.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok((snapshot.controller, snapshot.pci))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{DiskGeometry, NvmeController};
    use crate::hostio::{InterruptSink, TimerHost};
    use crate::pci::PciConfigSpace;
    use crate::regs;
    use tempfile::tempdir;

    struct NullSink;
    impl InterruptSink for NullSink {
        fn raise_msix(&mut self, _vector: u16) {}
    }

    struct NullTimer;
    impl TimerHost for NullTimer {
        fn now_ns(&self) -> u64 {
            0
        }
        fn schedule_after_ns(&mut self, _ns: u64) {}
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempdir().unwrap();
        let controller = NvmeController::new(
            regs::default_table(),
            DiskGeometry::default(),
            Box::new(NullSink),
            Box::new(NullTimer),
        );
        let pci = PciConfigSpace::new(16 * 1024);
        let state = controller.export_state();

        let path = dir.path().join("snap.bin");
        save_state(&path, &state, &pci).unwrap();
        let (loaded_state, loaded_pci) = load_state(&path).unwrap();

        assert_eq!(loaded_pci.bar0_len(), pci.bar0_len());
        assert_eq!(format!("{loaded_state:?}").is_empty(), false);
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, []).unwrap();
        assert!(matches!(load_state(&path), Err(SnapshotError::Truncated)));
    }

    #[test]
    fn rejects_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad_version.bin");
        let bogus = DeviceSnapshot {
            version: SNAPSHOT_VERSION + 1,
            controller: NvmeController::new(
                regs::default_table(),
                DiskGeometry::default(),
                Box::new(NullSink),
                Box::new(NullTimer),
            )
            .export_state(),
            pci: PciConfigSpace::new(16 * 1024),
        };
        let bytes = bincode::serialize(&bogus).unwrap();
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            load_state(&path),
            Err(SnapshotError::VersionMismatch { .. })
        ));
    }
}
