//! PCI configuration space and BAR0/MMIO gating (`spec.md` §4 "PCI/MMIO Surface", §6).
//!
//! The byte-mask technique here is the same one `regs.rs` uses for the NVMe register
//! window — PCI config space is itself just another byte-addressable register file with
//! per-byte RW/RWC masks, plus a couple of fields (the BARs) that need bespoke sizing
//! logic no mask can express.

use serde::{Deserialize, Serialize};

pub const CONFIG_LEN: usize = 4096;

pub const VENDOR_ID: u16 = 0x8086;
pub const DEVICE_ID: u16 = 0x0111;
pub const SUBSYSTEM_VENDOR_ID: u16 = 0x8086;
pub const SUBSYSTEM_ID: u16 = 0x0111;
pub const CLASS_BASE_STORAGE: u8 = 0x01;
pub const CLASS_SUB_NVM: u8 = 0x08;
pub const PROG_IF_NVME: u8 = 0x02;
pub const REVISION_ID: u8 = 0x01;
pub const HEADER_TYPE: u8 = 0x00;
pub const INTERRUPT_PIN_A: u8 = 0x01;

pub const CAP_ID_PM: u8 = 0x01;
pub const CAP_ID_MSI: u8 = 0x05;
pub const CAP_ID_PCIE: u8 = 0x10;
pub const CAP_ID_MSIX: u8 = 0x11;

const OFF_VENDOR_ID: u16 = 0x00;
const OFF_DEVICE_ID: u16 = 0x02;
const OFF_COMMAND: u16 = 0x04;
const OFF_STATUS: u16 = 0x06;
const OFF_REVISION_ID: u16 = 0x08;
const OFF_PROG_IF: u16 = 0x09;
const OFF_SUBCLASS: u16 = 0x0A;
const OFF_BASECLASS: u16 = 0x0B;
const OFF_HEADER_TYPE: u16 = 0x0E;
const OFF_BIST: u16 = 0x0F;
const OFF_BAR0: u16 = 0x10;
const OFF_BAR1: u16 = 0x14;
const OFF_BAR2: u16 = 0x18;
const OFF_SUBSYSTEM_VENDOR_ID: u16 = 0x2C;
const OFF_SUBSYSTEM_ID: u16 = 0x2E;
const OFF_ROM_ADDRESS: u16 = 0x30;
const OFF_CAP_PTR: u16 = 0x34;
const OFF_INTERRUPT_LINE: u16 = 0x3C;
const OFF_INTERRUPT_PIN: u16 = 0x3D;

const OFF_CAP_PM: u16 = 0x40;
const OFF_CAP_MSI: u16 = 0x50;
const OFF_CAP_MSIX: u16 = 0x60;
const OFF_CAP_PCIE: u16 = 0x70;
const OFF_CAP_AER: u16 = 0x100;

const CMD_IO_SPACE: u16 = 1 << 0;
const CMD_MEM_SPACE: u16 = 1 << 1;
const CMD_BUS_MASTER: u16 = 1 << 2;
const CMD_INTX_DISABLE: u16 = 1 << 10;
const CMD_RW_MASK: u16 = CMD_MEM_SPACE | CMD_BUS_MASTER | CMD_INTX_DISABLE;

const STATUS_CAP_LIST: u16 = 1 << 4;

/// Mask bits used by [`PciConfigSpace::write`], mirroring `regs::RegisterFile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MaskedWindow {
    #[serde(with = "big_array")]
    bytes: [u8; CONFIG_LEN],
    #[serde(with = "big_array")]
    rw_mask: [u8; CONFIG_LEN],
    #[serde(with = "big_array")]
    rwc_mask: [u8; CONFIG_LEN],
}

mod big_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8; super::CONFIG_LEN], s: S) -> Result<S::Ok, S::Error> {
        data.as_slice().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; super::CONFIG_LEN], D::Error> {
        let v = Vec::<u8>::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 4096-byte PCI config window"))
    }
}

impl MaskedWindow {
    fn new() -> Self {
        Self {
            bytes: [0; CONFIG_LEN],
            rw_mask: [0; CONFIG_LEN],
            rwc_mask: [0; CONFIG_LEN],
        }
    }

    fn set_byte_mask(&mut self, off: u16, val: u8, rw: u8, rwc: u8) {
        let off = off as usize;
        self.bytes[off] = val;
        self.rw_mask[off] = rw;
        self.rwc_mask[off] = rwc;
    }

    fn set_u16(&mut self, off: u16, val: u16, rw: u16, rwc: u16) {
        let v = val.to_le_bytes();
        let m = rw.to_le_bytes();
        let c = rwc.to_le_bytes();
        self.set_byte_mask(off, v[0], m[0], c[0]);
        self.set_byte_mask(off + 1, v[1], m[1], c[1]);
    }

    fn set_u32(&mut self, off: u16, val: u32, rw: u32, rwc: u32) {
        let v = val.to_le_bytes();
        let m = rw.to_le_bytes();
        let c = rwc.to_le_bytes();
        for i in 0..4 {
            self.set_byte_mask(off + i as u16, v[i], m[i], c[i]);
        }
    }

    fn raw_read(&self, off: u16, len: u8) -> u32 {
        let mut out = [0u8; 4];
        for i in 0..len as usize {
            out[i] = self.bytes[off as usize + i];
        }
        u32::from_le_bytes(out)
    }

    fn masked_write(&mut self, off: u16, len: u8, val: u32) {
        let v = val.to_le_bytes();
        for i in 0..len as usize {
            let b = off as usize + i;
            let cur = self.bytes[b];
            let rw = self.rw_mask[b];
            let mut next = (cur & !rw) | (v[i] & rw);
            next &= !(v[i] & self.rwc_mask[b]);
            self.bytes[b] = next;
        }
    }
}

/// Standard PCI Type 0 configuration space for the NVMe function, with BAR0 sizing and
/// the capability chain described in `spec.md` §6: PM → MSI → MSI-X → PCI-Express, plus
/// an AER extended capability at 0x100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PciConfigSpace {
    win: MaskedWindow,
    bar0_addr: u64,
    bar0_sizing: bool,
    bar0_len: u32,
}

impl PciConfigSpace {
    pub fn new(bar0_len: u32) -> Self {
        assert!(bar0_len.is_power_of_two() && bar0_len >= 8192);
        let mut win = MaskedWindow::new();

        win.set_u16(OFF_VENDOR_ID, VENDOR_ID, 0, 0);
        win.set_u16(OFF_DEVICE_ID, DEVICE_ID, 0, 0);
        win.set_u16(OFF_COMMAND, 0, CMD_RW_MASK, 0);
        win.set_u16(OFF_STATUS, STATUS_CAP_LIST, 0, 0xFFF0);
        win.set_byte_mask(OFF_REVISION_ID, REVISION_ID, 0, 0);
        win.set_byte_mask(OFF_PROG_IF, PROG_IF_NVME, 0, 0);
        win.set_byte_mask(OFF_SUBCLASS, CLASS_SUB_NVM, 0, 0);
        win.set_byte_mask(OFF_BASECLASS, CLASS_BASE_STORAGE, 0, 0);
        win.set_byte_mask(OFF_HEADER_TYPE, HEADER_TYPE, 0, 0);
        win.set_byte_mask(OFF_BIST, 0, 0, 0);
        win.set_u16(OFF_SUBSYSTEM_VENDOR_ID, SUBSYSTEM_VENDOR_ID, 0, 0);
        win.set_u16(OFF_SUBSYSTEM_ID, SUBSYSTEM_ID, 0, 0);
        win.set_u32(OFF_ROM_ADDRESS, 0, 0, 0);
        win.set_byte_mask(OFF_CAP_PTR, OFF_CAP_PM as u8, 0, 0);
        win.set_byte_mask(OFF_INTERRUPT_LINE, 0, 0xFF, 0);
        win.set_byte_mask(OFF_INTERRUPT_PIN, INTERRUPT_PIN_A, 0, 0);

        // BAR0 low dword: space=mem(0), type=64-bit(0b10), non-prefetchable(0) => 0x4.
        win.set_u32(OFF_BAR0, BAR_FLAGS, 0, 0);
        win.set_u32(OFF_BAR1, 0, 0, 0);
        win.set_u32(OFF_BAR2, 0, 0, 0);

        install_pm_capability(&mut win, OFF_CAP_PM, OFF_CAP_MSI as u8);
        install_msi_capability(&mut win, OFF_CAP_MSI, OFF_CAP_MSIX as u8);
        install_msix_capability(&mut win, OFF_CAP_MSIX, OFF_CAP_PCIE as u8, bar0_len);
        install_pcie_capability(&mut win, OFF_CAP_PCIE, 0);
        install_aer_extended_capability(&mut win, OFF_CAP_AER);

        Self {
            win,
            bar0_addr: 0,
            bar0_sizing: false,
            bar0_len,
        }
    }

    pub fn bar0_len(&self) -> u32 {
        self.bar0_len
    }

    pub fn command(&self) -> u16 {
        self.win.raw_read(OFF_COMMAND, 2) as u16
    }

    pub fn set_command(&mut self, cmd: u16) {
        self.win.masked_write(OFF_COMMAND, 2, u32::from(cmd & CMD_RW_MASK));
    }

    pub fn memory_space_enabled(&self) -> bool {
        self.command() & CMD_MEM_SPACE != 0
    }

    pub fn bus_master_enabled(&self) -> bool {
        self.command() & CMD_BUS_MASTER != 0
    }

    /// Walk the capability linked list for `cap_id`, returning its config-space offset.
    pub fn find_capability(&self, cap_id: u8) -> Option<u16> {
        let mut off = self.win.raw_read(OFF_CAP_PTR, 1) as u16;
        let mut guard = 0;
        while off != 0 && guard < 64 {
            let id = self.win.raw_read(off, 1) as u8;
            if id == cap_id {
                return Some(off);
            }
            off = self.win.raw_read(off + 1, 1) as u16;
            guard += 1;
        }
        None
    }

    pub fn read(&self, off: u16, len: u8) -> u32 {
        match off {
            OFF_BAR0 if len == 4 => self.read_bar0_low(),
            OFF_BAR1 if len == 4 => self.read_bar0_high(),
            _ => {
                if (off as usize + len as usize) > CONFIG_LEN {
                    return 0;
                }
                self.win.raw_read(off, len)
            }
        }
    }

    pub fn write(&mut self, off: u16, len: u8, val: u32) {
        match off {
            OFF_BAR0 if len == 4 => self.write_bar0_low(val),
            OFF_BAR1 if len == 4 => self.write_bar0_high(val),
            OFF_BAR2 => { /* unused BAR, always reads 0; writes have no effect */ }
            OFF_ROM_ADDRESS => { /* expansion ROM unused; forced to 0 */ }
            OFF_BIST => { /* BIST unused; forced to 0 */ }
            _ => {
                if (off as usize + len as usize) <= CONFIG_LEN {
                    self.win.masked_write(off, len, val);
                }
            }
        }
    }

    fn addr_mask_lo(&self) -> u32 {
        !(self.bar0_len - 1) & 0xFFFF_FFF0
    }

    fn read_bar0_low(&self) -> u32 {
        if self.bar0_sizing {
            self.addr_mask_lo() | BAR_FLAGS
        } else {
            (self.bar0_addr as u32 & self.addr_mask_lo()) | BAR_FLAGS
        }
    }

    fn read_bar0_high(&self) -> u32 {
        if self.bar0_sizing {
            0xFFFF_FFFF
        } else {
            (self.bar0_addr >> 32) as u32
        }
    }

    fn write_bar0_low(&mut self, val: u32) {
        if val == 0xFFFF_FFFF {
            self.bar0_sizing = true;
        } else {
            self.bar0_sizing = false;
            let base = u64::from(val & self.addr_mask_lo());
            self.bar0_addr = (self.bar0_addr & !0xFFFF_FFFF) | base;
        }
    }

    fn write_bar0_high(&mut self, val: u32) {
        self.bar0_addr = (self.bar0_addr & 0xFFFF_FFFF) | (u64::from(val) << 32);
    }

    /// MSI message address/data/enable, as last programmed by the guest.
    pub fn msi_state(&self) -> Option<MsiState> {
        let off = self.find_capability(CAP_ID_MSI)?;
        let ctrl = self.win.raw_read(off + 2, 2) as u16;
        let addr_lo = self.win.raw_read(off + 4, 4) as u64;
        let addr_hi = self.win.raw_read(off + 8, 4) as u64;
        let data = self.win.raw_read(off + 12, 2) as u16;
        Some(MsiState {
            enabled: ctrl & 1 != 0,
            address: (addr_hi << 32) | addr_lo,
            data,
        })
    }

    /// MSI-X enable bit and the (BIR, offset) of the table/PBA, as advertised by this
    /// controller. With a single-vector model the table always has exactly one entry.
    pub fn msix_state(&self) -> Option<MsixState> {
        let off = self.find_capability(CAP_ID_MSIX)?;
        let ctrl = self.win.raw_read(off + 2, 2) as u16;
        let table = self.win.raw_read(off + 4, 4);
        let pba = self.win.raw_read(off + 8, 4);
        Some(MsixState {
            enabled: ctrl & (1 << 15) != 0,
            function_masked: ctrl & (1 << 14) != 0,
            table_bir: (table & 0x7) as u8,
            table_offset: table & !0x7,
            pba_bir: (pba & 0x7) as u8,
            pba_offset: pba & !0x7,
        })
    }
}

pub struct MsiState {
    pub enabled: bool,
    pub address: u64,
    pub data: u16,
}

pub struct MsixState {
    pub enabled: bool,
    pub function_masked: bool,
    pub table_bir: u8,
    pub table_offset: u32,
    pub pba_bir: u8,
    pub pba_offset: u32,
}

const BAR_FLAGS: u32 = 0x4; // mem space, 64-bit, non-prefetchable

fn install_pm_capability(win: &mut MaskedWindow, off: u16, next: u8) {
    win.set_byte_mask(off, CAP_ID_PM, 0, 0);
    win.set_byte_mask(off + 1, next, 0, 0);
    win.set_u16(off + 2, 0x0003, 0, 0); // PMC: version 3, no PME support
    win.set_u16(off + 4, 0, 0x0003, 0); // PMCSR: power state RW (D0/D3hot)
    win.set_u16(off + 6, 0, 0, 0);
}

fn install_msi_capability(win: &mut MaskedWindow, off: u16, next: u8) {
    win.set_byte_mask(off, CAP_ID_MSI, 0, 0);
    win.set_byte_mask(off + 1, next, 0, 0);
    // Message Control: bit7 64-bit capable (RO=1); bit0 MSI enable (RW).
    win.set_u16(off + 2, 0x0080, 0x0001, 0);
    win.set_u32(off + 4, 0, 0xFFFF_FFFF, 0); // address low
    win.set_u32(off + 8, 0, 0xFFFF_FFFF, 0); // address high
    win.set_u16(off + 12, 0, 0xFFFF, 0); // data
    win.set_u16(off + 14, 0, 0, 0);
}

fn install_msix_capability(win: &mut MaskedWindow, off: u16, next: u8, bar0_len: u32) {
    win.set_byte_mask(off, CAP_ID_MSIX, 0, 0);
    win.set_byte_mask(off + 1, next, 0, 0);
    // Table Size field holds (N-1); single-vector model => 0.
    win.set_u16(off + 2, 0, 0xC000, 0); // bits 14 (func mask) and 15 (enable) RW
    let table_off = bar0_len - 32; // table + PBA live at the tail of BAR0
    win.set_u32(off + 4, table_off, 0, 0); // BIR=0
    win.set_u32(off + 8, table_off + 16, 0, 0); // BIR=0, PBA 16 bytes after table
}

fn install_pcie_capability(win: &mut MaskedWindow, off: u16, next: u8) {
    win.set_byte_mask(off, CAP_ID_PCIE, 0, 0);
    win.set_byte_mask(off + 1, next, 0, 0);
    win.set_u16(off + 2, 0x0002, 0, 0); // capability version 2, native endpoint
    win.set_u32(off + 4, 0, 0, 0); // device capabilities
    win.set_u16(off + 8, 0, 0xFFFF, 0); // device control RW
    win.set_u16(off + 10, 0, 0, 0); // device status
    win.set_u32(off + 12, 0, 0, 0); // link capabilities
    win.set_u16(off + 16, 0, 0xFFFF, 0); // link control RW
    win.set_u16(off + 18, 0, 0, 0); // link status
}

fn install_aer_extended_capability(win: &mut MaskedWindow, off: u16) {
    const AER_CAP_ID: u16 = 0x0001;
    let header = u32::from(AER_CAP_ID) | (2 << 16); // version 2, next offset = 0 (end of list)
    win.set_u32(off, header, 0, 0);
}
