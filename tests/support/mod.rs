//! Shared test doubles for the three host traits plus a flat guest-memory bus.

use std::cell::RefCell;
use std::rc::Rc;

use vnvme::device::NvmePciDevice;
use vnvme::{DiskGeometry, InterruptSink, MemoryBus};

pub const PCI_COMMAND_OFFSET: u16 = 0x04;
pub const CMD_MEM_SPACE: u32 = 1 << 1;
pub const CMD_BUS_MASTER: u32 = 1 << 2;

pub const ASQ_BASE: u64 = 0x1_0000;
pub const ACQ_BASE: u64 = 0x1_1000;
pub const ADMIN_QUEUE_SLOTS: u16 = 8;

pub const MEM_LEN: usize = 4 * 1024 * 1024;

/// A flat byte array standing in for guest physical RAM. Large enough to hold a few
/// queues plus PRP lists/data buffers at well-separated base addresses.
pub struct FlatMemory {
    bytes: Vec<u8>,
}

impl FlatMemory {
    pub fn new(len: usize) -> Self {
        Self { bytes: vec![0u8; len] }
    }

    pub fn write_u32(&mut self, addr: u64, val: u32) {
        self.write_physical(addr, &val.to_le_bytes());
    }

    pub fn write_u64(&mut self, addr: u64, val: u64) {
        self.write_physical(addr, &val.to_le_bytes());
    }

    pub fn read_u32(&mut self, addr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(addr, &mut buf);
        u32::from_le_bytes(buf)
    }
}

impl MemoryBus for FlatMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        let off = paddr as usize;
        buf.copy_from_slice(&self.bytes[off..off + buf.len()]);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        let off = paddr as usize;
        self.bytes[off..off + buf.len()].copy_from_slice(buf);
    }
}

/// Records every MSI-X vector raised, for assertions.
#[derive(Clone, Default)]
pub struct RecordingInterruptSink {
    pub raised: Rc<RefCell<Vec<u16>>>,
}

impl InterruptSink for RecordingInterruptSink {
    fn raise_msix(&mut self, vector: u16) {
        self.raised.borrow_mut().push(vector);
    }
}

/// A timer double that never actually sleeps — `process()` is called directly by
/// tests instead of waiting for a callback, but the controller still needs something
/// to hand a monotonic clock to.
#[derive(Clone, Default)]
pub struct ManualTimer {
    pub now: Rc<RefCell<u64>>,
    pub scheduled: Rc<RefCell<Vec<u64>>>,
}

impl vnvme::TimerHost for ManualTimer {
    fn now_ns(&self) -> u64 {
        *self.now.borrow()
    }

    fn schedule_after_ns(&mut self, ns: u64) {
        self.scheduled.borrow_mut().push(ns);
    }
}

/// Build a 64-byte NVMe submission entry, little-endian.
pub fn build_command(
    opcode: u8,
    cid: u16,
    nsid: u32,
    prp1: u64,
    prp2: u64,
    cdw10: u32,
    cdw11: u32,
    cdw12: u32,
) -> [u8; 64] {
    let mut raw = [0u8; 64];
    raw[0] = opcode;
    raw[2..4].copy_from_slice(&cid.to_le_bytes());
    raw[4..8].copy_from_slice(&nsid.to_le_bytes());
    raw[24..32].copy_from_slice(&prp1.to_le_bytes());
    raw[32..40].copy_from_slice(&prp2.to_le_bytes());
    raw[40..44].copy_from_slice(&cdw10.to_le_bytes());
    raw[44..48].copy_from_slice(&cdw11.to_le_bytes());
    raw[48..52].copy_from_slice(&cdw12.to_le_bytes());
    raw
}

/// A ready-to-submit-commands test device: PCI command register set to enable
/// memory space and bus mastering, admin queue pair programmed and `CC.EN` set.
pub struct Harness {
    pub device: NvmePciDevice,
    pub mem: FlatMemory,
    pub sink: RecordingInterruptSink,
    pub timer: ManualTimer,
    _backing: tempfile::NamedTempFile,
}

impl Harness {
    pub fn new() -> Self {
        let backing = tempfile::NamedTempFile::new().unwrap();
        let geometry = DiskGeometry {
            path: backing.path().to_path_buf(),
            size_bytes: 1024 * 1024,
            block_size: 512,
        };
        let sink = RecordingInterruptSink::default();
        let timer = ManualTimer::default();
        let mut device = vnvme::device::new_default(geometry, Box::new(sink.clone()), Box::new(timer.clone()));
        let mem = FlatMemory::new(MEM_LEN);

        device.write_config(
            PCI_COMMAND_OFFSET,
            2,
            CMD_MEM_SPACE | CMD_BUS_MASTER,
        );

        let asqs0 = u32::from(ADMIN_QUEUE_SLOTS - 1);
        let acqs0 = u32::from(ADMIN_QUEUE_SLOTS - 1);
        device.write(vnvme::regs::OFF_AQA, 4, u64::from(asqs0 | (acqs0 << 16)));
        device.write(vnvme::regs::OFF_ASQ, 4, ASQ_BASE);
        device.write(vnvme::regs::OFF_ASQ + 4, 4, 0);
        device.write(vnvme::regs::OFF_ACQ, 4, ACQ_BASE);
        device.write(vnvme::regs::OFF_ACQ + 4, 4, 0);
        device.write(vnvme::regs::OFF_CC, 4, 1);

        let csts = device.read(vnvme::regs::OFF_CSTS, 4) as u32;
        assert_eq!(csts & vnvme::regs::CSTS_RDY, vnvme::regs::CSTS_RDY, "controller failed to come ready");

        Self {
            device,
            mem,
            sink,
            timer,
            _backing: backing,
        }
    }

    /// Write `cmd` into admin SQ slot `slot` and ring the doorbell so `tail = slot + 1`.
    pub fn submit_admin(&mut self, slot: u16, cmd: &[u8; 64]) {
        self.mem.write_physical(ASQ_BASE + u64::from(slot) * 64, cmd);
        self.device.write(0x1000, 4, u64::from(slot) + 1);
    }

    pub fn process(&mut self) {
        self.device.process(&mut self.mem);
    }

    pub fn admin_completion(&mut self, slot: u16) -> (u32, u16, u16, bool) {
        read_completion(&mut self.mem, ACQ_BASE + u64::from(slot) * 16)
    }

    /// Write `cmd` into an arbitrary (non-admin) SQ's slot and ring its tail doorbell.
    pub fn submit_io(&mut self, qid: u16, sq_base: u64, slot: u16, cmd: &[u8; 64]) {
        self.mem.write_physical(sq_base + u64::from(slot) * 64, cmd);
        self.device.write(0x1000 + u64::from(qid) * 8, 4, u64::from(slot) + 1);
    }

    /// Decode the completion at `slot` of an arbitrary CQ's base address.
    pub fn cq_completion(&mut self, cq_base: u64, slot: u16) -> (u32, u16, u16, bool) {
        read_completion(&mut self.mem, cq_base + u64::from(slot) * 16)
    }

    /// Ring a CQ head doorbell directly, as a driver would after consuming completions.
    pub fn ring_cq_head(&mut self, qid: u16, head: u16) {
        self.device.write(0x1000 + u64::from(qid) * 8 + 4, 4, u64::from(head));
    }
}

/// Pack a command-specific status code (SCT = 1) the way a completion's full 15-bit
/// Status Field encodes it, for comparing against what `admin_completion`/`cq_completion`
/// decode back out.
pub fn specific_status(sc: u16) -> u16 {
    (1u16 << 8) | sc
}

/// Decode the 16-byte completion at `addr` into `(cdw0, status, cid, phase)`.
pub fn read_completion(mem: &mut FlatMemory, addr: u64) -> (u32, u16, u16, bool) {
    let mut raw = [0u8; 16];
    mem.read_physical(addr, &mut raw);
    let cdw0 = u32::from_le_bytes(raw[0..4].try_into().unwrap());
    let cid = u16::from_le_bytes(raw[12..14].try_into().unwrap());
    let dw3_hi = u16::from_le_bytes(raw[14..16].try_into().unwrap());
    let status = dw3_hi >> 1;
    let phase = dw3_hi & 1 != 0;
    (cdw0, status, cid, phase)
}
