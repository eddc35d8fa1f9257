//! Traits the controller uses to reach back into the host hypervisor framework.
//!
//! The controller never performs guest memory access, interrupt delivery, or timer
//! scheduling itself — it only calls through these three traits. A host integrates the
//! crate by implementing them and handing boxed instances to `NvmePciDevice`.

/// Guest physical memory access, as routed by the host's DMA engine.
///
/// Implementations are expected to bounds-check against guest RAM themselves; the
/// controller only ever issues reads/writes whose length and alignment it has already
/// derived from guest-programmed addresses and sizes.
pub trait MemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);
}

/// MSI-X delivery, as routed by the host's interrupt controller.
///
/// The host owns the MSI-X table/PBA memory (it is mapped into the BAR region the host
/// manages); the controller only ever asks for a vector index to be raised.
pub trait InterruptSink {
    fn raise_msix(&mut self, vector: u16);
}

/// A single-shot wakeup facility plus a clock, used to drive the doorbell scheduler.
///
/// `schedule_after_ns` requests that the host invoke [`crate::device::NvmePciDevice::process`]
/// once `ns` nanoseconds have elapsed. Only one outstanding request is ever live; the host
/// may coalesce repeated calls made before the previous one fires.
pub trait TimerHost {
    fn now_ns(&self) -> u64;
    fn schedule_after_ns(&mut self, ns: u64);
}
