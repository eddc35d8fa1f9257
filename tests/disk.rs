//! I/O command engine: WRITE/READ round-trips, LBA bounds, FLUSH, and PRP-list
//! addressing including chained lists (`spec.md` §4.5, §8 scenario 5).

mod support;

use support::{build_command, Harness};
use vnvme::cmd::{opcode_admin, opcode_io, status_generic};
use vnvme::hostio::MemoryBus;

const IO_CQ_BASE: u64 = 0x3_0000;
const IO_SQ_BASE: u64 = 0x3_1000;
const IO_QID: u16 = 1;

/// Create I/O CQ/SQ pair with id 1, 64-entry, bound to each other, IEN off (admin CQ
/// always raises vector 0 regardless; I/O path is exercised separately in `interrupts.rs`).
fn create_io_queues(h: &mut Harness) {
    let create_cq = build_command(opcode_admin::CREATE_CQ, 900, 0, IO_CQ_BASE, 0, (63 << 16) | u32::from(IO_QID), 0b001, 0);
    h.submit_admin(0, &create_cq);
    h.process();
    assert_eq!(h.admin_completion(0).1, status_generic::SUCCESS);

    let create_sq = build_command(
        opcode_admin::CREATE_SQ,
        901,
        0,
        IO_SQ_BASE,
        0,
        (63 << 16) | u32::from(IO_QID),
        (u32::from(IO_QID) << 16) | 1,
        0,
    );
    h.submit_admin(1, &create_sq);
    h.process();
    assert_eq!(h.admin_completion(1).1, status_generic::SUCCESS);
}

#[test]
fn write_then_read_round_trips_identical_bytes() {
    let mut h = Harness::new();
    create_io_queues(&mut h);

    const WRITE_BUF: u64 = 0x10_0000;
    const READ_BUF: u64 = 0x11_0000;
    let pattern: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    h.mem.write_physical(WRITE_BUF, &pattern);

    // 8 blocks of 512 bytes = 4 KiB, slba=0.
    let write_cmd = build_command(opcode_io::WRITE, 1, 1, WRITE_BUF, 0, 0, 0, 7);
    h.submit_io(IO_QID, IO_SQ_BASE, 0, &write_cmd);
    h.process();
    assert_eq!(h.cq_completion(IO_CQ_BASE, 0).1, status_generic::SUCCESS);

    let read_cmd = build_command(opcode_io::READ, 2, 1, READ_BUF, 0, 0, 0, 7);
    h.submit_io(IO_QID, IO_SQ_BASE, 1, &read_cmd);
    h.process();
    assert_eq!(h.cq_completion(IO_CQ_BASE, 1).1, status_generic::SUCCESS);

    let mut readback = [0u8; 4096];
    h.mem.read_physical(READ_BUF, &mut readback);
    assert_eq!(&readback[..], &pattern[..]);
}

#[test]
fn write_past_capacity_is_rejected_with_lba_range() {
    let mut h = Harness::new();
    create_io_queues(&mut h);

    // Harness backing store is 1 MiB / 512 = 2048 sectors; slba+nlb overruns that.
    let write_cmd = build_command(opcode_io::WRITE, 3, 1, 0x10_0000, 0, 2040, 0, 15);
    h.submit_io(IO_QID, IO_SQ_BASE, 0, &write_cmd);
    h.process();
    assert_eq!(h.cq_completion(IO_CQ_BASE, 0).1, status_generic::LBA_RANGE);
}

#[test]
fn flush_succeeds_once_backing_store_is_open() {
    let mut h = Harness::new();
    create_io_queues(&mut h);

    let flush_cmd = build_command(opcode_io::FLUSH, 4, 1, 0, 0, 0, 0, 0);
    h.submit_io(IO_QID, IO_SQ_BASE, 0, &flush_cmd);
    h.process();
    assert_eq!(h.cq_completion(IO_CQ_BASE, 0).1, status_generic::SUCCESS);
}

/// PRP2-as-second-page: a transfer spanning exactly two 4 KiB pages, unaligned within
/// the first page, exercises the "PRP2 is a second data page" branch rather than a list.
#[test]
fn two_page_unaligned_transfer_uses_prp2_as_second_page() {
    let mut h = Harness::new();
    create_io_queues(&mut h);

    // prp1 not page-aligned: the first chunk only covers the remainder of its page.
    const WRITE_BUF: u64 = 0x10_0010;
    const PRP2_PAGE: u64 = 0x20_1000;
    let total = 4096usize; // 8 sectors
    let pattern: Vec<u8> = (0..total).map(|i| (i % 197) as u8).collect();

    // Write the pattern contiguously so readback (also split across two host buffers)
    // still reconstructs one contiguous byte sequence.
    h.mem.write_physical(WRITE_BUF, &pattern[..(4096 - 0x10)]);
    h.mem.write_physical(PRP2_PAGE, &pattern[(4096 - 0x10)..]);

    let write_cmd = build_command(opcode_io::WRITE, 5, 1, WRITE_BUF, PRP2_PAGE, 0, 0, 7);
    h.submit_io(IO_QID, IO_SQ_BASE, 0, &write_cmd);
    h.process();
    assert_eq!(h.cq_completion(IO_CQ_BASE, 0).1, status_generic::SUCCESS);

    const READ_BUF: u64 = 0x30_0010;
    const READ_PRP2_PAGE: u64 = 0x40_1000;
    let read_cmd = build_command(opcode_io::READ, 6, 1, READ_BUF, READ_PRP2_PAGE, 0, 0, 7);
    h.submit_io(IO_QID, IO_SQ_BASE, 1, &read_cmd);
    h.process();
    assert_eq!(h.cq_completion(IO_CQ_BASE, 1).1, status_generic::SUCCESS);

    let mut readback = vec![0u8; total];
    h.mem.read_physical(READ_BUF, &mut readback[..(4096 - 0x10)]);
    h.mem.read_physical(READ_PRP2_PAGE, &mut readback[(4096 - 0x10)..]);
    assert_eq!(readback, pattern);
}

/// A PRP list long enough to force chaining through its 512th entry (`spec.md` §9 design
/// note: chaining is detected by position, not content). Uses a dedicated larger backing
/// store and guest memory since the default harness geometry is too small.
#[test]
fn prp_list_chains_past_the_511th_entry() {
    use vnvme::cmd::{read_via_prp, write_via_prp};

    struct BigMemory {
        bytes: Vec<u8>,
    }
    impl MemoryBus for BigMemory {
        fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
            let off = paddr as usize;
            buf.copy_from_slice(&self.bytes[off..off + buf.len()]);
        }
        fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
            let off = paddr as usize;
            self.bytes[off..off + buf.len()].copy_from_slice(buf);
        }
    }

    const PAGE: u64 = 4096;
    // 513 data pages total: one covered directly by prp1, and 512 reached through the
    // PRP list at prp2 (511 entries in the first list page, one in a chained second
    // list page). `data_base` starts after both list pages so nothing overlaps.
    const DATA_PAGES: u64 = 513;
    let list1 = 0u64;
    let list2 = list1 + PAGE;
    let data_base = list2 + PAGE;
    let prp1 = data_base + DATA_PAGES * PAGE; // placed after all 512 list-addressed pages
    let mem_len = (prp1 + PAGE) as usize;
    let mut mem = BigMemory {
        bytes: vec![0u8; mem_len],
    };

    // List 1: entries 0..510 (511 of them) point at data pages 0..510; entry 511 chains
    // to list 2.
    for i in 0..511u64 {
        let page_addr = data_base + i * PAGE;
        mem.write_physical(list1 + i * 8, &page_addr.to_le_bytes());
    }
    mem.write_physical(list1 + 511 * 8, &list2.to_le_bytes());
    // List 2: one entry for the 512th list-addressed data page.
    let last_page_addr = data_base + 511 * PAGE;
    mem.write_physical(list2, &last_page_addr.to_le_bytes());

    let total_len = (DATA_PAGES * PAGE) as usize;
    let pattern: Vec<u8> = (0..total_len).map(|i| (i % 256) as u8).collect();

    // The first page of the transfer lives at prp1 itself; the remaining 512 pages live
    // at the list-addressed data pages, in list order.
    mem.write_physical(prp1, &pattern[..PAGE as usize]);
    for i in 0..512u64 {
        let page_addr = data_base + i * PAGE;
        let src = &pattern[((i + 1) * PAGE) as usize..((i + 2) * PAGE) as usize];
        mem.write_physical(page_addr, src);
    }

    let mut out = vec![0u8; total_len];
    read_via_prp(&mut mem, prp1, list1, &mut out);
    assert_eq!(out, pattern, "chained PRP list must reconstruct the full transfer in order");

    // Same layout, opposite direction: write_via_prp must fan the same pattern back out
    // across prp1 plus all 512 list-addressed pages.
    for b in mem.bytes.iter_mut() {
        *b = 0;
    }
    for i in 0..511u64 {
        let page_addr = data_base + i * PAGE;
        mem.write_physical(list1 + i * 8, &page_addr.to_le_bytes());
    }
    mem.write_physical(list1 + 511 * 8, &list2.to_le_bytes());
    mem.write_physical(list2, &last_page_addr.to_le_bytes());

    write_via_prp(&mut mem, prp1, list1, &pattern);

    let mut out2 = vec![0u8; total_len];
    read_via_prp(&mut mem, prp1, list1, &mut out2);
    assert_eq!(out2, pattern);
}
