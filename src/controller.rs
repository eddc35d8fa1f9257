//! The NVMe controller state machine: registers, queues, the doorbell-driven
//! scheduler, and the admin/I/O command engine (`spec.md` §4.2-§4.5).
//!
//! [`NvmeController`] is deliberately ignorant of PCI config space and BAR
//! sizing — [`crate::device::NvmePciDevice`] layers that on top. Everything here
//! operates purely in terms of the 4 KiB register window, the doorbell region
//! immediately above it, and the three host traits in `hostio.rs`.

use std::path::PathBuf;

use crate::cmd::{
    opcode_admin, opcode_io, pack_status, status_generic, status_specific, Command, Completion,
};
use crate::disk::BackingStore;
use crate::features::Features;
use crate::hostio::{InterruptSink, MemoryBus, TimerHost};
use crate::identify;
use crate::queue::{CompletionQueue, SubmissionQueue};
use crate::regs::{self, RegisterFieldSpec, RegisterFile};
use serde::{Deserialize, Serialize};

/// Number of queue-id slots, admin queue included at index 0 (`spec.md` §3).
pub const MAX_QID: usize = 64;
/// Global cap on simultaneously outstanding ABORT markers (`spec.md` §3).
pub const ABORT_COMMAND_LIMIT: u32 = 10;
/// Commands drained per scheduler tick, across all submission queues (`spec.md` §4.4).
pub const ENTRIES_TO_PROCESS: usize = 4;
/// Deferred scheduler tick delay after a submission-queue doorbell write (`spec.md` §4.4).
pub const DOORBELL_TICK_NS: u64 = 5_000;
/// Maximum Queue Entries Supported, 0-based (`spec.md` §6 CAP encoding).
pub const MQES: u32 = 1023;
/// Sector size in bytes for the single namespace (`spec.md` §6).
pub const SECTOR_SIZE: u32 = 512;
/// Default backing-file size when no configuration overrides it (`spec.md` §6).
pub const DEFAULT_IMAGE_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

const DOORBELL_BASE: u16 = 0x1000;
const DOORBELL_LEN: u16 = 8 * MAX_QID as u16;

/// Backing-store location/sizing a controller was constructed with. Stored so the
/// Controller FSM can (re)open the same file across `CC.EN` 0→1 transitions.
#[derive(Debug, Clone)]
pub struct DiskGeometry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub block_size: u32,
}

impl Default for DiskGeometry {
    fn default() -> Self {
        Self {
            path: PathBuf::from("disk.img"),
            size_bytes: DEFAULT_IMAGE_SIZE_BYTES,
            block_size: SECTOR_SIZE,
        }
    }
}

pub struct NvmeController {
    regs: RegisterFile,
    sqs: Vec<Option<SubmissionQueue>>,
    cqs: Vec<Option<CompletionQueue>>,
    features: Features,
    abort_inflight: u32,
    disk: Option<BackingStore>,
    geometry: DiskGeometry,
    sched_deadline_ns: u64,
    interrupt_sink: Box<dyn InterruptSink>,
    timer: Box<dyn TimerHost>,
}

impl NvmeController {
    pub fn new(
        register_table: Vec<RegisterFieldSpec>,
        geometry: DiskGeometry,
        interrupt_sink: Box<dyn InterruptSink>,
        timer: Box<dyn TimerHost>,
    ) -> Self {
        Self {
            regs: RegisterFile::new(register_table),
            sqs: vec![None; MAX_QID],
            cqs: vec![None; MAX_QID],
            features: Features::default(),
            abort_inflight: 0,
            disk: None,
            geometry,
            sched_deadline_ns: 0,
            interrupt_sink,
            timer,
        }
    }

    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn sched_deadline_ns(&self) -> u64 {
        self.sched_deadline_ns
    }

    pub fn is_ready(&self) -> bool {
        self.regs.read(regs::OFF_CSTS, 4) as u32 & regs::CSTS_RDY != 0
    }

    pub fn abort_inflight(&self) -> u32 {
        self.abort_inflight
    }

    pub fn sq(&self, qid: usize) -> Option<&SubmissionQueue> {
        self.sqs.get(qid).and_then(|s| s.as_ref())
    }

    pub fn cq(&self, qid: usize) -> Option<&CompletionQueue> {
        self.cqs.get(qid).and_then(|c| c.as_ref())
    }

    /// Dispatch a BAR0 MMIO write, routing to the register window, the doorbell
    /// region, or dropping it silently if out of range (`spec.md` §4.1, §4.4, §7).
    pub fn mmio_write(&mut self, off: u16, len: u8, val: u64) {
        if (off as usize) < regs::REG_WINDOW_LEN {
            let was_enabled = self.cc_enabled();
            self.regs.write(off, len, val);
            let now_enabled = self.cc_enabled();
            match (was_enabled, now_enabled) {
                (false, true) => self.enable(),
                (true, false) => self.disable(),
                _ => {}
            }
        } else if off >= DOORBELL_BASE && off < DOORBELL_BASE + DOORBELL_LEN {
            self.doorbell_write(off - DOORBELL_BASE, val as u32);
        } else {
            tracing::warn!("mmio write to out-of-range offset {off:#x} dropped");
        }
    }

    pub fn mmio_read(&self, off: u16, len: u8) -> u64 {
        if (off as usize) < regs::REG_WINDOW_LEN {
            self.regs.read(off, len)
        } else {
            // Doorbells are write-only from the guest's perspective.
            0
        }
    }

    fn cc_enabled(&self) -> bool {
        self.regs.read(regs::OFF_CC, 4) & 1 != 0
    }

    fn doorbell_write(&mut self, rel_off: u16, val: u32) {
        let qid = (rel_off / 8) as usize;
        let is_cq_doorbell = (rel_off / 4) % 2 == 1;
        if qid >= MAX_QID {
            tracing::warn!("doorbell write for out-of-range queue id {qid}, dropping");
            return;
        }
        if is_cq_doorbell {
            match self.cqs[qid].as_mut() {
                Some(cq) => cq.set_head(val),
                None => tracing::warn!("cq doorbell write for non-existent cq {qid}"),
            }
        } else {
            match self.sqs[qid].as_mut() {
                Some(sq) => {
                    sq.set_tail(val);
                    self.arm_scheduler_if_idle();
                }
                None => tracing::warn!("sq doorbell write for non-existent sq {qid}"),
            }
        }
    }

    fn arm_scheduler_if_idle(&mut self) {
        if self.sched_deadline_ns == 0 {
            self.sched_deadline_ns = self.timer.now_ns() + DOORBELL_TICK_NS;
            self.timer.schedule_after_ns(DOORBELL_TICK_NS);
        }
    }

    /// `CC.EN: 0→1` (`spec.md` §4.3). Validates `ASQ`/`ACQ`/page size, opens the
    /// backing store, and brings up the admin queue pair.
    fn enable(&mut self) {
        let cc = self.regs.read(regs::OFF_CC, 4) as u32;
        // CC.MPS occupies bits [10:7] (CC.CSS sits below it at bits [6:4]).
        let mps = (cc >> 7) & 0xF;
        if mps != 0 {
            // CAP.MPSMIN == CAP.MPSMAX == 0: only a 4 KiB page size is supported
            // (`SPEC_FULL.md` §4 supplement 1).
            tracing::warn!("guest requested unsupported CC.MPS={mps}, refusing to come ready");
            self.regs.set_csts_bit(regs::CSTS_CFS, true);
            self.regs.set_csts_bit(regs::CSTS_RDY, false);
            return;
        }

        let asq = self.regs.read(regs::OFF_ASQ, 8);
        let acq = self.regs.read(regs::OFF_ACQ, 8);
        if asq == 0 || acq == 0 {
            tracing::warn!("CC.EN set with ASQ/ACQ unprogrammed, leaving CSTS.RDY clear");
            return;
        }

        let aqa = self.regs.read(regs::OFF_AQA, 4) as u32;
        // Both fields are 12 bits wide; widen to u32 before the +1 so a guest (or
        // fuzzer) writing all-ones into AQA cannot overflow a u16 computation
        // (`SPEC_FULL.md` §4 supplement 2).
        let asqs0 = aqa & 0xFFF;
        let acqs0 = (aqa >> 16) & 0xFFF;

        match BackingStore::open(&self.geometry.path, self.geometry.size_bytes, self.geometry.block_size) {
            Ok(store) => {
                self.disk = Some(store);
                self.sqs[0] = Some(SubmissionQueue::new(0, 0, asq, (asqs0 + 1) as u16));
                self.cqs[0] = Some(CompletionQueue::new(0, acq, (acqs0 + 1) as u16, 0, true));
                self.regs.set_csts_bit(regs::CSTS_RDY, true);
                self.regs.set_csts_bit(regs::CSTS_CFS, false);
                tracing::debug!("controller enabled: admin sq/cq bring-up complete");
            }
            Err(e) => {
                tracing::warn!("failed to open backing store {:?}: {e}", self.geometry.path);
            }
        }
    }

    /// `CC.EN: 1→0` (`spec.md` §4.3). Cancels the scheduler, discards all queue
    /// descriptors and in-flight abort bookkeeping, closes the backing store, and
    /// resets registers while preserving the admin queue config the guest already
    /// programmed.
    fn disable(&mut self) {
        self.sched_deadline_ns = 0;
        for sq in self.sqs.iter_mut() {
            *sq = None;
        }
        for cq in self.cqs.iter_mut() {
            *cq = None;
        }
        self.abort_inflight = 0;
        self.disk = None;
        self.regs.reset_preserving_admin_queue_config();
        tracing::debug!("controller disabled");
    }

    /// A full controller reset (PCI-level reset/device attach), distinct from the
    /// `CC.EN` soft-disable path: registers go all the way back to defaults,
    /// including `AQA`/`ASQ`/`ACQ`. The attached backing-store geometry survives —
    /// only the open file handle/mmap does not.
    pub fn hard_reset(&mut self) {
        self.sched_deadline_ns = 0;
        for sq in self.sqs.iter_mut() {
            *sq = None;
        }
        for cq in self.cqs.iter_mut() {
            *cq = None;
        }
        self.abort_inflight = 0;
        self.disk = None;
        self.features = Features::default();
        self.regs.reset_to_table();
    }

    /// Drain up to `ENTRIES_TO_PROCESS` commands across all submission queues in
    /// round-robin order, post their completions, and raise interrupts
    /// (`spec.md` §4.4). Re-arms the scheduler timer if work remains.
    pub fn process(&mut self, bus: &mut dyn MemoryBus) {
        if !self.is_ready() {
            return;
        }

        let mut budget = ENTRIES_TO_PROCESS;
        'outer: for qid in 0..MAX_QID {
            while budget > 0 {
                let has_work = match self.sqs[qid].as_ref() {
                    Some(sq) => !sq.is_empty(),
                    None => false,
                };
                if !has_work {
                    break;
                }
                let cqid = self.sqs[qid].as_ref().unwrap().cqid as usize;
                let cq_full = match self.cqs.get(cqid).and_then(|c| c.as_ref()) {
                    Some(cq) => cq.is_full(),
                    None => true,
                };
                if cq_full {
                    // Leave this entry at the head for a later tick.
                    break;
                }

                let cmd = self.sqs[qid].as_mut().unwrap().pop(bus).expect("checked non-empty above");
                budget -= 1;
                let cid = cmd.cid();

                let aborted = self.sqs[qid].as_mut().unwrap().take_abort_match(cid);
                if aborted {
                    self.abort_inflight = self.abort_inflight.saturating_sub(1);
                    continue;
                }

                let (sct, sc, cdw0, more, dnr) = if qid == 0 {
                    self.dispatch_admin(&cmd, bus)
                } else {
                    self.dispatch_io(&cmd, bus)
                };
                let new_head = self.sqs[qid].as_ref().unwrap().head;
                let status = pack_status(sct, sc, more, dnr);
                let cqe = Completion::new(cid, qid as u16, new_head, cdw0, status);

                let pushed = {
                    let cq = self.cqs[cqid].as_mut().unwrap();
                    cq.push(bus, cqe)
                };
                debug_assert!(pushed, "cq fullness was already checked before popping");

                let (vector, should_raise) = {
                    let cq = self.cqs[cqid].as_ref().unwrap();
                    (cq.irq_vector, qid == 0 || cq.irq_enabled)
                };
                // INTMS/INTMC only cover vectors 0..31 (`spec.md` §4.1); a guest-supplied
                // IV from CREATE CQ is unvalidated and may be ≥32, which INTMS simply
                // cannot mask (`1 << vector` would overflow `u32` for those).
                let masked = vector < 32 && self.regs.interrupt_mask_vector() & (1u32 << vector) != 0;
                if should_raise && !masked {
                    self.interrupt_sink.raise_msix(vector);
                }
            }
            if budget == 0 {
                break 'outer;
            }
        }

        let pending = self.sqs.iter().flatten().any(|sq| !sq.is_empty());
        if pending {
            self.sched_deadline_ns = self.timer.now_ns() + DOORBELL_TICK_NS;
            self.timer.schedule_after_ns(DOORBELL_TICK_NS);
        } else {
            self.sched_deadline_ns = 0;
        }
    }

    fn total_blocks(&self) -> u64 {
        self.disk.as_ref().map(BackingStore::total_sectors).unwrap_or(0)
    }

    /// Snapshot everything that logically belongs to guest-visible controller state
    /// (`spec.md` §5 open question on persistence). Deliberately excludes the open
    /// backing-store handle and the host trait objects — those are reconstructed by
    /// the host at restore time, not serialized with the rest.
    pub fn export_state(&self) -> ControllerState {
        ControllerState {
            regs: self.regs.clone(),
            sqs: self.sqs.clone(),
            cqs: self.cqs.clone(),
            features: self.features.clone(),
            abort_inflight: self.abort_inflight,
            sched_deadline_ns: self.sched_deadline_ns,
            disk_open: self.disk.is_some(),
        }
    }

    /// Restore previously exported state. If the snapshot was taken while `CC.EN` was
    /// set, reopens the backing store at the controller's configured geometry so DMA
    /// keeps working; a failure to reopen leaves the controller not-ready, the same way
    /// a failed `enable()` would.
    pub fn import_state(&mut self, state: ControllerState) {
        self.regs = state.regs;
        self.sqs = state.sqs;
        self.cqs = state.cqs;
        self.features = state.features;
        self.abort_inflight = state.abort_inflight;
        self.sched_deadline_ns = state.sched_deadline_ns;
        self.disk = if state.disk_open {
            match BackingStore::open(&self.geometry.path, self.geometry.size_bytes, self.geometry.block_size) {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!("snapshot restore: failed to reopen backing store: {e}");
                    self.regs.set_csts_bit(regs::CSTS_RDY, false);
                    None
                }
            }
        } else {
            None
        };
    }

    // ---- Admin command engine (`spec.md` §4.5) ----------------------------------

    fn dispatch_admin(&mut self, cmd: &Command, bus: &mut dyn MemoryBus) -> (u16, u16, u32, bool, bool) {
        tracing::trace!("admin dispatch opcode={:#x} cid={}", cmd.opcode(), cmd.cid());
        match cmd.opcode() {
            opcode_admin::CREATE_SQ => self.admin_create_sq(cmd),
            opcode_admin::CREATE_CQ => self.admin_create_cq(cmd),
            opcode_admin::DELETE_SQ => self.admin_delete_sq(cmd),
            opcode_admin::DELETE_CQ => self.admin_delete_cq(cmd),
            opcode_admin::IDENTIFY => self.admin_identify(cmd, bus),
            opcode_admin::ABORT => self.admin_abort(cmd, bus),
            opcode_admin::SET_FEATURES => self.admin_set_features(cmd),
            opcode_admin::GET_FEATURES => self.admin_get_features(cmd),
            opcode_admin::ASYNC_EVENT_REQUEST => ok(0),
            opcode_admin::GET_LOG_PAGE => self.admin_get_log_page(cmd, bus),
            _ => generic(status_generic::INVALID_OPCODE),
        }
    }

    fn admin_create_cq(&mut self, cmd: &Command) -> (u16, u16, u32, bool, bool) {
        let qid = (cmd.cdw10() & 0xFFFF) as u16;
        let qsize0 = (cmd.cdw10() >> 16) & 0xFFFF;
        let pc = cmd.cdw11() & 0x1 != 0;
        let ien = (cmd.cdw11() >> 1) & 0x1 != 0;
        let iv = ((cmd.cdw11() >> 16) & 0xFFFF) as u16;
        let prp1 = cmd.prp1();

        if qid == 0 || qid as usize >= MAX_QID {
            return specific(status_specific::INVALID_QUEUE_IDENTIFIER);
        }
        if self.cqs[qid as usize].is_some() {
            return specific(status_specific::INVALID_QUEUE_IDENTIFIER);
        }
        if qsize0 > MQES {
            return specific(status_specific::MAX_QUEUE_SIZE_EXCEEDED);
        }
        if !pc || prp1 == 0 {
            return generic(status_generic::INVALID_FIELD);
        }

        self.cqs[qid as usize] = Some(CompletionQueue::new(qid, prp1, (qsize0 + 1) as u16, iv, ien));
        tracing::debug!("created cq {qid} size={} iv={iv} ien={ien}", qsize0 + 1);
        ok(0)
    }

    fn admin_create_sq(&mut self, cmd: &Command) -> (u16, u16, u32, bool, bool) {
        let qid = (cmd.cdw10() & 0xFFFF) as u16;
        let qsize0 = (cmd.cdw10() >> 16) & 0xFFFF;
        let pc = cmd.cdw11() & 0x1 != 0;
        let cqid = ((cmd.cdw11() >> 16) & 0xFFFF) as u16;
        let prp1 = cmd.prp1();

        if qid == 0 || qid as usize >= MAX_QID {
            return specific(status_specific::INVALID_QUEUE_IDENTIFIER);
        }
        if self.sqs[qid as usize].is_some() {
            return specific(status_specific::INVALID_QUEUE_IDENTIFIER);
        }
        if cqid as usize >= MAX_QID || self.cqs[cqid as usize].is_none() {
            return specific(status_specific::COMPLETION_QUEUE_INVALID);
        }
        if qsize0 > MQES {
            return specific(status_specific::MAX_QUEUE_SIZE_EXCEEDED);
        }
        if !pc || prp1 == 0 {
            return generic(status_generic::INVALID_FIELD);
        }

        self.sqs[qid as usize] = Some(SubmissionQueue::new(qid, cqid, prp1, (qsize0 + 1) as u16));
        self.cqs[cqid as usize].as_mut().unwrap().bind_sq();
        tracing::debug!("created sq {qid} size={} cqid={cqid}", qsize0 + 1);
        ok(0)
    }

    fn admin_delete_sq(&mut self, cmd: &Command) -> (u16, u16, u32, bool, bool) {
        let qid = (cmd.cdw10() & 0xFFFF) as u16;
        if qid == 0 || qid as usize >= MAX_QID || self.sqs[qid as usize].is_none() {
            return specific(status_specific::INVALID_QUEUE_IDENTIFIER);
        }
        let sq = self.sqs[qid as usize].take().unwrap();
        if let Some(cq) = self.cqs.get_mut(sq.cqid as usize).and_then(|c| c.as_mut()) {
            cq.unbind_sq();
        }
        tracing::debug!("deleted sq {qid}");
        ok(0)
    }

    fn admin_delete_cq(&mut self, cmd: &Command) -> (u16, u16, u32, bool, bool) {
        let qid = (cmd.cdw10() & 0xFFFF) as u16;
        if qid == 0 || qid as usize >= MAX_QID || self.cqs[qid as usize].is_none() {
            return specific(status_specific::INVALID_QUEUE_IDENTIFIER);
        }
        if self.cqs[qid as usize].as_ref().unwrap().usage_cnt > 0 {
            return generic(status_generic::INVALID_FIELD);
        }
        self.cqs[qid as usize] = None;
        tracing::debug!("deleted cq {qid}");
        ok(0)
    }

    fn admin_identify(&mut self, cmd: &Command, bus: &mut dyn MemoryBus) -> (u16, u16, u32, bool, bool) {
        let cns = cmd.cdw10() & 0xFF;
        let buf = if cns == 1 {
            identify::controller_identify()
        } else {
            identify::namespace_identify(self.total_blocks())
        };
        crate::cmd::write_via_prp(bus, cmd.prp1(), cmd.prp2(), &buf);
        ok(0)
    }

    fn admin_abort(&mut self, cmd: &Command, bus: &mut dyn MemoryBus) -> (u16, u16, u32, bool, bool) {
        let target_cid = (cmd.cdw10() & 0xFFFF) as u16;
        let target_sqid = ((cmd.cdw10() >> 16) & 0xFFFF) as u16;

        if target_sqid == 0 {
            return specific(status_specific::REQ_CMD_TO_ABORT_NOT_FOUND);
        }
        if self.abort_inflight >= ABORT_COMMAND_LIMIT {
            return specific(status_specific::ABORT_CMD_LIMIT_EXCEEDED);
        }
        let Some(sq) = self.sqs.get_mut(target_sqid as usize).and_then(|s| s.as_mut()) else {
            return specific(status_specific::REQ_CMD_TO_ABORT_NOT_FOUND);
        };
        if !sq.contains_inflight_cid(bus, target_cid) {
            return specific(status_specific::REQ_CMD_TO_ABORT_NOT_FOUND);
        }
        sq.mark_abort(target_cid);
        self.abort_inflight += 1;
        tracing::debug!("marked cid {target_cid} on sq {target_sqid} for abort");
        // DW0 bit0 clear signals the target was successfully marked (NVMe Abort convention).
        ok(0)
    }

    fn admin_set_features(&mut self, cmd: &Command) -> (u16, u16, u32, bool, bool) {
        let fid = cmd.cdw10() & 0xFF;
        if self.features.set(fid, cmd.cdw11()) {
            ok(0)
        } else {
            generic(status_generic::INVALID_FIELD)
        }
    }

    fn admin_get_features(&mut self, cmd: &Command) -> (u16, u16, u32, bool, bool) {
        let fid = cmd.cdw10() & 0xFF;
        match self.features.get(fid) {
            Some(v) => ok(v),
            None => generic(status_generic::INVALID_FIELD),
        }
    }

    fn admin_get_log_page(&mut self, cmd: &Command, bus: &mut dyn MemoryBus) -> (u16, u16, u32, bool, bool) {
        let numd = (cmd.cdw10() >> 16) & 0xFFF;
        let len = ((numd + 1) * 4) as usize;
        let zeros = vec![0u8; len];
        crate::cmd::write_via_prp(bus, cmd.prp1(), cmd.prp2(), &zeros);
        ok(0)
    }

    // ---- I/O command engine (`spec.md` §4.5) -------------------------------------

    fn dispatch_io(&mut self, cmd: &Command, bus: &mut dyn MemoryBus) -> (u16, u16, u32, bool, bool) {
        tracing::trace!("io dispatch opcode={:#x} cid={}", cmd.opcode(), cmd.cid());
        match cmd.opcode() {
            opcode_io::FLUSH => self.io_flush(),
            opcode_io::WRITE => self.io_rw(cmd, bus, true),
            opcode_io::READ => self.io_rw(cmd, bus, false),
            _ => generic(status_generic::INVALID_OPCODE),
        }
    }

    fn io_flush(&mut self) -> (u16, u16, u32, bool, bool) {
        match self.disk.as_ref() {
            Some(disk) => match disk.flush() {
                Ok(()) => ok(0),
                Err(e) => {
                    tracing::warn!("flush failed: {e}");
                    generic(status_generic::INTERNAL)
                }
            },
            None => generic(status_generic::NS_NOT_READY),
        }
    }

    fn io_rw(&mut self, cmd: &Command, bus: &mut dyn MemoryBus, is_write: bool) -> (u16, u16, u32, bool, bool) {
        let Some(disk) = self.disk.as_mut() else {
            return generic(status_generic::NS_NOT_READY);
        };

        let slba = (u64::from(cmd.cdw11()) << 32) | u64::from(cmd.cdw10());
        let nlb = u64::from(cmd.cdw12() & 0xFFFF) + 1;
        let total_blocks = disk.total_sectors();
        if slba.checked_add(nlb).map_or(true, |end| end > total_blocks) {
            return generic(status_generic::LBA_RANGE);
        }

        let total_bytes = (nlb * u64::from(SECTOR_SIZE)) as usize;
        if is_write {
            let mut buf = vec![0u8; total_bytes];
            crate::cmd::read_via_prp(bus, cmd.prp1(), cmd.prp2(), &mut buf);
            match disk.write_sectors(slba, nlb, &buf) {
                Ok(()) => ok(0),
                Err(e) => {
                    tracing::warn!("write failed: {e}");
                    generic(status_generic::INTERNAL)
                }
            }
        } else {
            let mut buf = vec![0u8; total_bytes];
            match disk.read_sectors(slba, nlb, &mut buf) {
                Ok(()) => {
                    crate::cmd::write_via_prp(bus, cmd.prp1(), cmd.prp2(), &buf);
                    ok(0)
                }
                Err(e) => {
                    tracing::warn!("read failed: {e}");
                    generic(status_generic::INTERNAL)
                }
            }
        }
    }
}

/// The serializable subset of [`NvmeController`] state, used by `snapshot.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    regs: RegisterFile,
    sqs: Vec<Option<SubmissionQueue>>,
    cqs: Vec<Option<CompletionQueue>>,
    features: Features,
    abort_inflight: u32,
    sched_deadline_ns: u64,
    disk_open: bool,
}

fn ok(cdw0: u32) -> (u16, u16, u32, bool, bool) {
    (crate::cmd::SCT_GENERIC, status_generic::SUCCESS, cdw0, false, false)
}

fn generic(sc: u16) -> (u16, u16, u32, bool, bool) {
    (crate::cmd::SCT_GENERIC, sc, 0, false, false)
}

fn specific(sc: u16) -> (u16, u16, u32, bool, bool) {
    (crate::cmd::SCT_SPECIFIC, sc, 0, false, false)
}
