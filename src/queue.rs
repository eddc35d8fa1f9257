//! Submission/completion queue descriptors and phase-tag bookkeeping (`spec.md` §3, §4.2).

use crate::cmd::{Command, Completion};
use crate::hostio::MemoryBus;
use serde::{Deserialize, Serialize};

/// A guest-resident submission queue. The controller tracks only the consumer side
/// (`head`); the guest-visible tail is read straight off the doorbell register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionQueue {
    pub qid: u16,
    pub cqid: u16,
    pub base: u64,
    pub size: u16,
    pub head: u16,
    pub tail: u16,
    /// Command IDs marked by an ABORT admin command (`spec.md` §4.5, §9). The scheduler
    /// checks this list head-side as it pops each entry and silently drops a match
    /// instead of executing it. Bounded in practice by the controller's global
    /// `abort_inflight ≤ ABORT_COMMAND_LIMIT` invariant, not by a fixed-size array here.
    pub abort_cmd_ids: Vec<u16>,
}

impl SubmissionQueue {
    pub fn new(qid: u16, cqid: u16, base: u64, size: u16) -> Self {
        Self {
            qid,
            cqid,
            base,
            size,
            head: 0,
            tail: 0,
            abort_cmd_ids: Vec::new(),
        }
    }

    /// Record `cid` as marked for abort; the scheduler will drop it without a
    /// completion when it reaches the head of the queue (`spec.md` §4.5 ABORT).
    pub fn mark_abort(&mut self, cid: u16) {
        self.abort_cmd_ids.push(cid);
    }

    /// Scan the still-pending entries between `head` and `tail` for `cid`, the way
    /// ABORT needs to confirm a target command actually exists before marking it
    /// (`spec.md` §4.5 ABORT).
    pub fn contains_inflight_cid(&self, bus: &mut dyn MemoryBus, cid: u16) -> bool {
        let mut idx = self.head;
        while idx != self.tail {
            let addr = self.entry_addr(idx);
            let mut raw = [0u8; 64];
            bus.read_physical(addr, &mut raw);
            if u16::from_le_bytes([raw[2], raw[3]]) == cid {
                return true;
            }
            idx = (idx + 1) % self.size;
        }
        false
    }

    /// If `cid` is marked for abort, clear the mark and report the match so the
    /// caller can decrement `abort_inflight` (`spec.md` §4.2 `abort_match`).
    pub fn take_abort_match(&mut self, cid: u16) -> bool {
        if let Some(pos) = self.abort_cmd_ids.iter().position(|&c| c == cid) {
            self.abort_cmd_ids.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Entries currently pending between `head` and the last-known `tail`.
    pub fn pending(&self) -> u16 {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.size - self.head + self.tail
        }
    }

    fn entry_addr(&self, index: u16) -> u64 {
        self.base + u64::from(index) * 64
    }

    /// Fetch and consume the command at `head`, advancing `head` with wraparound.
    pub fn pop(&mut self, bus: &mut dyn MemoryBus) -> Option<Command> {
        if self.is_empty() {
            return None;
        }
        let addr = self.entry_addr(self.head);
        let mut raw = [0u8; 64];
        bus.read_physical(addr, &mut raw);
        let cmd = Command::from_bytes(raw, self.qid, self.head);
        self.head = (self.head + 1) % self.size;
        Some(cmd)
    }

    /// Update the guest-visible tail from a doorbell write. Out-of-range values are
    /// clamped rather than rejected — the NVMe spec leaves guest misbehavior here
    /// undefined, and the doorbell register itself has no room to report an error.
    pub fn set_tail(&mut self, tail: u32) {
        if tail < u32::from(self.size) {
            self.tail = tail as u16;
        } else {
            tracing::warn!(
                "sq {} doorbell write {} out of range (size {})",
                self.qid,
                tail,
                self.size
            );
        }
    }
}

/// A guest-resident completion queue, including the phase tag the controller owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionQueue {
    pub qid: u16,
    pub base: u64,
    pub size: u16,
    pub head: u16,
    pub tail: u16,
    pub phase: bool,
    pub irq_vector: u16,
    pub irq_enabled: bool,
    /// Count of live SQs bound to this CQ (`spec.md` §3). A CQ may only be deleted
    /// once this drops back to zero.
    pub usage_cnt: u16,
}

impl CompletionQueue {
    pub fn new(qid: u16, base: u64, size: u16, irq_vector: u16, irq_enabled: bool) -> Self {
        Self {
            qid,
            base,
            size,
            head: 0,
            tail: 0,
            phase: true,
            irq_vector,
            irq_enabled,
            usage_cnt: 0,
        }
    }

    pub fn bind_sq(&mut self) {
        self.usage_cnt += 1;
    }

    pub fn unbind_sq(&mut self) {
        self.usage_cnt = self.usage_cnt.saturating_sub(1);
    }

    fn entry_addr(&self, index: u16) -> u64 {
        self.base + u64::from(index) * 16
    }

    /// True once `tail` would catch up to the guest-acknowledged `head`.
    pub fn is_full(&self) -> bool {
        (self.tail + 1) % self.size == self.head
    }

    /// Post a completion at `tail`, flipping the phase bit on wraparound, per `spec.md`
    /// §4.2. Returns `false` (without writing anything) if the queue is full; callers
    /// must retry the same completion on a later scheduler tick.
    pub fn push(&mut self, bus: &mut dyn MemoryBus, mut cqe: Completion) -> bool {
        if self.is_full() {
            return false;
        }
        cqe.set_phase(self.phase);
        let addr = self.entry_addr(self.tail);
        bus.write_physical(addr, &cqe.to_bytes());
        self.tail = (self.tail + 1) % self.size;
        if self.tail == 0 {
            self.phase = !self.phase;
        }
        true
    }

    /// Update `head` from a CQ doorbell write, same clamping behavior as the SQ side.
    pub fn set_head(&mut self, head: u32) {
        if head < u32::from(self.size) {
            self.head = head as u16;
        } else {
            tracing::warn!(
                "cq {} doorbell write {} out of range (size {})",
                self.qid,
                head,
                self.size
            );
        }
    }
}
