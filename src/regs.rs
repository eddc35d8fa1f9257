//! Byte-addressable controller register window (`spec.md` §4.1).
//!
//! Every byte of the 4 KiB window below the doorbells carries four independent mask
//! bits: read-write, write-1-to-clear, write-1-to-set, and "used" (live vs. reserved).
//! `write()` applies all three write-kind masks in the order the NVMe spec requires;
//! `read()` never consults the masks at all (reads are always a plain byte load, save
//! for the `INTMS`/`INTMC` redirection to the shadow interrupt-mask vector). The
//! further spec rule that `INTMS`/`INTMC` read as 0 once MSI-X is enabled lives in
//! [`crate::device::NvmePciDevice::read`] instead — this type has no visibility into
//! PCI capability state to apply it here.

use serde::{Deserialize, Serialize};

pub const REG_WINDOW_LEN: usize = 4096;

pub const OFF_CAP: u16 = 0x00;
pub const OFF_VER: u16 = 0x08;
pub const OFF_INTMS: u16 = 0x0C;
pub const OFF_INTMC: u16 = 0x10;
pub const OFF_CC: u16 = 0x14;
pub const OFF_CSTS: u16 = 0x1C;
pub const OFF_AQA: u16 = 0x24;
pub const OFF_ASQ: u16 = 0x28;
pub const OFF_ACQ: u16 = 0x30;

/// CSTS bit 0: Ready. Driven entirely by the Controller FSM, never by guest writes
/// (`spec.md` §4.3).
pub const CSTS_RDY: u32 = 1 << 0;
/// CSTS bit 1: Controller Fatal Status (`spec.md` §4.3, `SPEC_FULL.md` §4 supplement 1).
pub const CSTS_CFS: u32 = 1 << 1;

/// One row of the declarative reset/mask table described in `spec.md` §6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterFieldSpec {
    pub offset: u16,
    pub len: u8,
    pub reset: u64,
    pub rw_mask: u64,
    pub rwc_mask: u64,
    pub rws_mask: u64,
}

fn apply_field(
    bytes: &mut [u8; REG_WINDOW_LEN],
    rw: &mut [u8; REG_WINDOW_LEN],
    rwc: &mut [u8; REG_WINDOW_LEN],
    rws: &mut [u8; REG_WINDOW_LEN],
    used: &mut [u8; REG_WINDOW_LEN],
    field: &RegisterFieldSpec,
) {
    let reset = field.reset.to_le_bytes();
    let rw_m = field.rw_mask.to_le_bytes();
    let rwc_m = field.rwc_mask.to_le_bytes();
    let rws_m = field.rws_mask.to_le_bytes();
    for i in 0..field.len as usize {
        let off = field.offset as usize + i;
        bytes[off] = reset[i];
        rw[off] = rw_m[i];
        rwc[off] = rwc_m[i];
        rws[off] = rws_m[i];
        used[off] = 0xFF;
    }
}

/// The canonical register table from `spec.md` §6.
pub fn default_table() -> Vec<RegisterFieldSpec> {
    vec![
        RegisterFieldSpec {
            offset: 0x00,
            len: 4,
            reset: 0x0F01_03FF,
            rw_mask: 0,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x04,
            len: 4,
            reset: 0x0000_0020,
            rw_mask: 0,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x08,
            len: 4,
            reset: 0x0001_0000,
            rw_mask: 0,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x0C,
            len: 4,
            reset: 0,
            rw_mask: 0,
            rwc_mask: 0,
            rws_mask: 0xFFFF_FFFF,
        },
        RegisterFieldSpec {
            offset: 0x10,
            len: 4,
            reset: 0,
            rw_mask: 0,
            rwc_mask: 0xFFFF_FFFF,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x14,
            len: 4,
            reset: 0,
            rw_mask: 0x00FF_FFF1,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x1C,
            len: 4,
            reset: 0,
            rw_mask: 0,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x24,
            len: 4,
            reset: 0,
            rw_mask: 0x0FFF_0FFF,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x28,
            len: 4,
            reset: 0,
            rw_mask: 0xFFFF_F000,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x2C,
            len: 4,
            reset: 0,
            rw_mask: 0xFFFF_FFFF,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x30,
            len: 4,
            reset: 0,
            rw_mask: 0xFFFF_F000,
            rwc_mask: 0,
            rws_mask: 0,
        },
        RegisterFieldSpec {
            offset: 0x34,
            len: 4,
            reset: 0,
            rw_mask: 0xFFFF_FFFF,
            rwc_mask: 0,
            rws_mask: 0,
        },
        // Command-set-specific: reads return 0x1000 (SQ0 doorbell offset), per `spec.md` §6.
        RegisterFieldSpec {
            offset: 0x0F00,
            len: 4,
            reset: 0x0000_1000,
            rw_mask: 0,
            rwc_mask: 0,
            rws_mask: 0,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFile {
    #[serde(with = "big_array")]
    bytes: [u8; REG_WINDOW_LEN],
    #[serde(with = "big_array")]
    rw_mask: [u8; REG_WINDOW_LEN],
    #[serde(with = "big_array")]
    rwc_mask: [u8; REG_WINDOW_LEN],
    #[serde(with = "big_array")]
    rws_mask: [u8; REG_WINDOW_LEN],
    #[serde(with = "big_array")]
    used_mask: [u8; REG_WINDOW_LEN],
    /// Shadow vector for INTMS/INTMC reads/writes (`spec.md` §4.1).
    intr_vect: u32,
    table: Vec<RegisterFieldSpec>,
}

mod big_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8; 4096], s: S) -> Result<S::Ok, S::Error> {
        data.as_slice().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 4096], D::Error> {
        let v = Vec::<u8>::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 4096-byte register window"))
    }
}

impl RegisterFile {
    pub fn new(table: Vec<RegisterFieldSpec>) -> Self {
        let mut bytes = [0u8; REG_WINDOW_LEN];
        let mut rw_mask = [0u8; REG_WINDOW_LEN];
        let mut rwc_mask = [0u8; REG_WINDOW_LEN];
        let mut rws_mask = [0u8; REG_WINDOW_LEN];
        let mut used_mask = [0u8; REG_WINDOW_LEN];
        for field in &table {
            apply_field(
                &mut bytes,
                &mut rw_mask,
                &mut rwc_mask,
                &mut rws_mask,
                &mut used_mask,
                field,
            );
        }
        Self {
            bytes,
            rw_mask,
            rwc_mask,
            rws_mask,
            used_mask,
            intr_vect: 0,
            table,
        }
    }

    /// Reset every register byte back to its table-specified value, without touching
    /// the mask arrays or the stored table (masks never change at runtime).
    pub fn reset_to_table(&mut self) {
        self.bytes = [0u8; REG_WINDOW_LEN];
        for field in &self.table.clone() {
            let reset = field.reset.to_le_bytes();
            for i in 0..field.len as usize {
                self.bytes[field.offset as usize + i] = reset[i];
            }
        }
        self.intr_vect = 0;
    }

    /// Reset but preserve the current AQA/ASQ/ACQ values (`spec.md` §4.3, `CC.EN: 1→0`).
    pub fn reset_preserving_admin_queue_config(&mut self) {
        let aqa = self.read(OFF_AQA, 4);
        let asq = self.read(OFF_ASQ, 8);
        let acq = self.read(OFF_ACQ, 8);
        self.reset_to_table();
        self.force_write(OFF_AQA, aqa, 4);
        self.force_write(OFF_ASQ, asq, 8);
        self.force_write(OFF_ACQ, acq, 8);
    }

    /// Write bytes directly, bypassing masks. Used only to restore snapshotted/preserved
    /// values that are logically resets, not guest-visible writes.
    fn force_write(&mut self, off: u16, val: u64, len: u8) {
        let v = val.to_le_bytes();
        for i in 0..len as usize {
            self.bytes[off as usize + i] = v[i];
        }
    }

    fn clip_len(off: u16, len: u8) -> u8 {
        let off = off as usize;
        let remaining = REG_WINDOW_LEN.saturating_sub(off);
        (len as usize).min(remaining) as u8
    }

    /// Read `len` (1, 2, or 4... up to 8 for convenience) bytes little-endian at `off`.
    pub fn read(&self, off: u16, len: u8) -> u64 {
        debug_assert!(matches!(len, 1 | 2 | 4 | 8));
        let off_usize = off as usize;
        if off_usize >= REG_WINDOW_LEN {
            return 0;
        }
        let len = Self::clip_len(off, len);

        if (off == OFF_INTMS || off == OFF_INTMC) && len == 4 {
            return u64::from(self.intr_vect);
        }

        let mut out = [0u8; 8];
        for i in 0..len as usize {
            out[i] = self.bytes[off_usize + i];
        }
        u64::from_le_bytes(out)
    }

    /// Apply a masked write at `off` for `len` bytes, per the per-byte algorithm in
    /// `spec.md` §4.1. Asserts `len in {1,2,4}`; `off+len` is tail-clipped to the window.
    pub fn write(&mut self, off: u16, len: u8, val: u64) {
        debug_assert!(matches!(len, 1 | 2 | 4));
        let off_usize = off as usize;
        if off_usize >= REG_WINDOW_LEN {
            return;
        }
        let len = Self::clip_len(off, len);
        let val_bytes = val.to_le_bytes();

        if (off == OFF_INTMS || off == OFF_INTMC) && len == 4 {
            let val_byte = val as u32;
            if off == OFF_INTMS {
                self.intr_vect |= val_byte;
            } else {
                self.intr_vect &= !val_byte;
            }
            return;
        }

        for i in 0..len as usize {
            let b = off_usize + i;
            let val_byte = val_bytes[i];
            let cur = self.bytes[b];
            let rw = self.rw_mask[b];
            let used = self.used_mask[b];
            let mut next = (cur & (!rw | !used)) | (val_byte & rw);
            next &= !(val_byte & self.rwc_mask[b]);
            next |= val_byte & self.rws_mask[b];
            self.bytes[b] = next;
        }
    }

    /// Interrupt mask vector, independent of whatever `INTMS`/`INTMC` currently read as.
    pub fn interrupt_mask_vector(&self) -> u32 {
        self.intr_vect
    }

    /// Set or clear a CSTS bit directly, bypassing the (all-zero) write masks that make
    /// CSTS read-only to the guest. Used by the Controller FSM to drive `RDY`/`CFS`.
    pub fn set_csts_bit(&mut self, bit: u32, set: bool) {
        let mut v = self.read(OFF_CSTS, 4) as u32;
        if set {
            v |= bit;
        } else {
            v &= !bit;
        }
        self.force_write(OFF_CSTS, u64::from(v), 4);
    }
}
