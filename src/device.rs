//! Ties [`PciConfigSpace`] and [`NvmeController`] together into the single PCI
//! function a host attaches (`spec.md` §1, §6, §7).
//!
//! This is the only type most hosts need to touch directly: construct it, route PCI
//! config-space accesses and BAR0 MMIO accesses to it, and call [`NvmePciDevice::process`]
//! whenever the scheduler timer it armed fires.

use crate::config::{Config, ConfigError};
use crate::controller::{DiskGeometry, NvmeController, MAX_QID};
use crate::hostio::{InterruptSink, MemoryBus, TimerHost};
use crate::pci::PciConfigSpace;
use crate::regs::{self, RegisterFieldSpec};

/// BAR0 size: the 4 KiB register window, the doorbell region immediately above it
/// (`8 * MAX_QID` bytes), and the single-entry MSI-X table/PBA at the tail, rounded
/// up to a power of two (`spec.md` §6).
pub const BAR0_LEN: u32 = 16 * 1024;

const DOORBELL_REGION_LEN: u16 = 8 * MAX_QID as u16;

pub struct NvmePciDevice {
    config: PciConfigSpace,
    pub controller: NvmeController,
}

impl NvmePciDevice {
    pub fn new(
        register_table: Vec<RegisterFieldSpec>,
        geometry: DiskGeometry,
        interrupt_sink: Box<dyn InterruptSink>,
        timer: Box<dyn TimerHost>,
    ) -> Self {
        Self {
            config: PciConfigSpace::new(BAR0_LEN),
            controller: NvmeController::new(register_table, geometry, interrupt_sink, timer),
        }
    }

    /// Build a device from a loaded configuration file, falling back to the built-in
    /// register table and a default 1 GiB backing image for whatever the config doesn't
    /// override (`SPEC_FULL.md` §2 `config` module).
    pub fn from_config(
        config: &Config,
        interrupt_sink: Box<dyn InterruptSink>,
        timer: Box<dyn TimerHost>,
    ) -> Result<Self, ConfigError> {
        let table = config.effective_register_table();
        let geometry = match &config.backing_file {
            Some(bf) => DiskGeometry {
                path: bf.path.clone(),
                size_bytes: bf.size_bytes,
                block_size: bf.block_size,
            },
            None => DiskGeometry::default(),
        };
        Ok(Self::new(table, geometry, interrupt_sink, timer))
    }

    pub fn config(&self) -> &PciConfigSpace {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PciConfigSpace {
        &mut self.config
    }

    /// Read from PCI configuration space (not BAR0 — the host's config-space access
    /// mechanism, e.g. ECAM, dispatches here directly).
    pub fn read_config(&self, off: u16, len: u8) -> u32 {
        self.config.read(off, len)
    }

    pub fn write_config(&mut self, off: u16, len: u8, val: u32) {
        self.config.write(off, len, val);
    }

    /// Read from BAR0 MMIO space. Returns 0 if memory space decoding is currently
    /// disabled in the PCI Command register, matching how real hardware ignores
    /// accesses to a BAR the guest hasn't enabled yet.
    pub fn read(&self, off: u16, len: u8) -> u64 {
        if !self.config.memory_space_enabled() {
            return 0;
        }
        // INTMS/INTMC are undefined (read as 0) once MSI-X is enabled, since interrupt
        // masking then happens through the MSI-X table's per-vector mask bit instead
        // (`spec.md` §4.1). The register file has no visibility into PCI capability
        // state, so this lives at the device layer where `config` does.
        if (off == regs::OFF_INTMS || off == regs::OFF_INTMC) && len == 4 {
            let msix_enabled = self.config.msix_state().map_or(false, |s| s.enabled);
            if msix_enabled {
                return 0;
            }
        }
        self.controller.mmio_read(off, len)
    }

    /// Write to BAR0 MMIO space. Dropped if memory space decoding is disabled.
    pub fn write(&mut self, off: u16, len: u8, val: u64) {
        if !self.config.memory_space_enabled() {
            tracing::warn!("bar0 write while memory space decoding disabled, dropping");
            return;
        }
        self.controller.mmio_write(off, len, val);
    }

    /// Drain pending submission queue entries; forwarded to the controller, gated on
    /// PCI bus mastering being enabled (no DMA without it, `spec.md` §6).
    pub fn process(&mut self, bus: &mut dyn MemoryBus) {
        if !self.config.bus_master_enabled() {
            return;
        }
        self.controller.process(bus);
    }

    /// Full PCI-level reset (function-level reset / device attach): config space goes
    /// back to its power-on defaults and the controller performs a hard reset.
    pub fn reset(&mut self) {
        self.config = PciConfigSpace::new(BAR0_LEN);
        self.controller.hard_reset();
    }
}

/// The canonical doorbell region length, exposed for hosts that need to size a BAR0
/// MMIO trap range without reaching into `controller`.
pub fn doorbell_region_len() -> u16 {
    DOORBELL_REGION_LEN
}

/// Convenience constructor using the built-in register table (`regs::default_table`).
pub fn new_default(
    geometry: DiskGeometry,
    interrupt_sink: Box<dyn InterruptSink>,
    timer: Box<dyn TimerHost>,
) -> NvmePciDevice {
    NvmePciDevice::new(regs::default_table(), geometry, interrupt_sink, timer)
}
