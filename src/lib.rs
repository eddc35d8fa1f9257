//! Emulated NVMe storage controller for a PCIe-attached virtual machine.
//!
//! The crate models a single-namespace, single-MSI-X-vector NVMe 1.4-ish controller:
//! the 4 KiB register window and doorbells (`regs`, `queue`), the PCI Type 0 function
//! it's attached behind (`pci`), the admin/I/O command engine and doorbell-driven
//! scheduler (`controller`), and the glue that ties all of it into one attachable
//! device (`device`). A host integrates by implementing the three traits in `hostio`
//! and driving [`device::NvmePciDevice`] from its own PCI config-space and MMIO
//! dispatch, plus a timer callback.

pub mod cmd;
pub mod config;
pub mod controller;
pub mod device;
pub mod disk;
pub mod features;
pub mod hostio;
pub mod identify;
pub mod pci;
pub mod queue;
pub mod regs;
pub mod snapshot;

pub use controller::{DiskGeometry, NvmeController, MAX_QID};
pub use device::NvmePciDevice;
pub use hostio::{InterruptSink, MemoryBus, TimerHost};
