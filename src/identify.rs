//! IDENTIFY CONTROLLER / IDENTIFY NAMESPACE data structures (`spec.md` §4.5).
//!
//! Both are fixed-size 4 KiB buffers with the byte offsets fixed by the NVMe
//! specification; filled here with the constant values `spec.md` calls out, not
//! derived from any runtime state beyond namespace size.

pub const IDENTIFY_LEN: usize = 4096;

const VID: u16 = 0x8086;
const SSVID: u16 = 0x0111;
const SERIAL_NUMBER: &[u8] = b"000000000000";
const MODEL_NUMBER: &[u8] = b"Qemu NVMe Ctrl";
const FIRMWARE_REVISION: &[u8] = b"1.0 ";

fn write_ascii(buf: &mut [u8], offset: usize, field_len: usize, text: &[u8]) {
    let field = &mut buf[offset..offset + field_len];
    field.fill(b' ');
    let n = text.len().min(field_len);
    field[..n].copy_from_slice(&text[..n]);
}

/// Build the 4 KiB IDENTIFY CONTROLLER structure (`CNS == 1`).
pub fn controller_identify() -> [u8; IDENTIFY_LEN] {
    let mut buf = [0u8; IDENTIFY_LEN];

    buf[0..2].copy_from_slice(&VID.to_le_bytes());
    buf[2..4].copy_from_slice(&SSVID.to_le_bytes());
    write_ascii(&mut buf, 4, 20, SERIAL_NUMBER);
    write_ascii(&mut buf, 24, 40, MODEL_NUMBER);
    write_ascii(&mut buf, 64, 8, FIRMWARE_REVISION);

    // RAB (Recommended Arbitration Burst): offset 72.
    buf[72] = 6;
    // CNTLID (Controller ID): offset 78.
    buf[78..80].copy_from_slice(&0u16.to_le_bytes());
    // VER: offset 80, mirrors the `VER` register reset value (`spec.md` §6).
    buf[80..84].copy_from_slice(&0x0001_0000u32.to_le_bytes());

    // OACS (Optional Admin Command Support): offset 256 — none advertised.
    buf[256..258].copy_from_slice(&0u16.to_le_bytes());
    // ACL (Abort Command Limit, 0-based): offset 258.
    buf[258] = 10;
    // AERL (Asynchronous Event Request Limit, 0-based): offset 259.
    buf[259] = 4;
    // FRMW: offset 260 — no firmware slots (`spec.md` §1 Non-goals: no firmware update).
    buf[260] = 0;
    // LPA (Log Page Attributes): offset 261 — none beyond the mandatory error log.
    buf[261] = 0;

    // NN (Number of Namespaces): offset 516 — single namespace (`spec.md` §1).
    buf[516..520].copy_from_slice(&1u32.to_le_bytes());

    // SQES/CQES (offset 512/513): required and maximum entry size, log2-encoded.
    // 0x66 => required=6 (64 bytes), max=6; 0x44 => required=4 (16 bytes), max=4.
    buf[512] = 0x66;
    buf[513] = 0x44;

    buf
}

/// Build the 4 KiB IDENTIFY NAMESPACE structure (`CNS == 0`) for the single
/// namespace, sized from the backing store's block count.
pub fn namespace_identify(total_blocks: u64) -> [u8; IDENTIFY_LEN] {
    let mut buf = [0u8; IDENTIFY_LEN];

    // NSZE / NCAP / NUSE: offsets 0, 8, 16 — size == capacity == utilization for a
    // plain fixed-size image with no thin provisioning.
    buf[0..8].copy_from_slice(&total_blocks.to_le_bytes());
    buf[8..16].copy_from_slice(&total_blocks.to_le_bytes());
    buf[16..24].copy_from_slice(&total_blocks.to_le_bytes());

    // NLBAF (Number of LBA Formats, 0-based): offset 25 — only LBAF0.
    buf[25] = 0;
    // FLBAS (Formatted LBA Size): offset 26 — LBAF0 selected, no metadata.
    buf[26] = 0;

    // LBAF0 at offset 128: MS (u16) | LBADS (u8) | RP (u8).
    let lbaf0: u32 = (9u32) << 16; // LBADS = 9 => 512-byte blocks, MS=0, RP=0
    buf[128..132].copy_from_slice(&lbaf0.to_le_bytes());

    buf
}
