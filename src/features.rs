//! Settable/gettable feature state for the GET FEATURES / SET FEATURES admin
//! commands (`spec.md` §3, §4.5).
//!
//! Each field mirrors one NVMe Feature Identifier. Values are stored and returned
//! verbatim; none of them change controller behavior beyond what's documented here
//! (the stub features — LBA range type, async event config — are accepted and
//! echoed back but otherwise inert, matching `spec.md` §4.5's "stubbed"/"accept"
//! language for GET LOG PAGE and ASYNC EVENT REQUEST).

use serde::{Deserialize, Serialize};

pub mod fid {
    pub const ARBITRATION: u32 = 0x01;
    pub const POWER_MANAGEMENT: u32 = 0x02;
    pub const LBA_RANGE_TYPE: u32 = 0x03;
    pub const TEMPERATURE_THRESHOLD: u32 = 0x04;
    pub const ERROR_RECOVERY: u32 = 0x05;
    pub const VOLATILE_WRITE_CACHE: u32 = 0x06;
    pub const NUMBER_OF_QUEUES: u32 = 0x07;
    pub const INTERRUPT_COALESCING: u32 = 0x08;
    pub const INTERRUPT_VECTOR_CONFIG: u32 = 0x09;
    pub const WRITE_ATOMICITY: u32 = 0x0A;
    pub const ASYNC_EVENT_CONFIG: u32 = 0x0B;
    pub const SOFTWARE_PROGRESS_MARKER: u32 = 0x80;
}

/// Default composite temperature threshold: 0x0157 Kelvin (~100C), the usual QEMU-style
/// stand-in value used when the source doesn't otherwise model thermal sensors.
const DEFAULT_TEMP_THRESHOLD: u32 = 0x0157;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Features {
    pub arbitration: u32,
    pub power_management: u32,
    pub lba_range_type: u32,
    pub temperature_threshold: u32,
    pub error_recovery: u32,
    pub volatile_write_cache: u32,
    pub number_of_queues: u32,
    pub interrupt_coalescing: u32,
    pub interrupt_vector_config: u32,
    pub write_atomicity: u32,
    pub async_event_config: u32,
    pub software_progress_marker: u32,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            arbitration: 0,
            power_management: 0,
            lba_range_type: 0,
            temperature_threshold: DEFAULT_TEMP_THRESHOLD,
            error_recovery: 0,
            volatile_write_cache: 0,
            // Guest requests queue counts via SET FEATURES(0x07); until it does, report
            // 255 submission and 255 completion queues allocated (0-based), matching
            // the generous default QEMU-style controllers hand back before negotiation.
            number_of_queues: 0x00ff_00ff,
            interrupt_coalescing: 0,
            interrupt_vector_config: 0,
            write_atomicity: 0,
            async_event_config: 0,
            software_progress_marker: 0,
        }
    }
}

impl Features {
    pub fn get(&self, fid: u32) -> Option<u32> {
        Some(match fid {
            self::fid::ARBITRATION => self.arbitration,
            self::fid::POWER_MANAGEMENT => self.power_management,
            self::fid::LBA_RANGE_TYPE => self.lba_range_type,
            self::fid::TEMPERATURE_THRESHOLD => self.temperature_threshold,
            self::fid::ERROR_RECOVERY => self.error_recovery,
            self::fid::VOLATILE_WRITE_CACHE => self.volatile_write_cache,
            self::fid::NUMBER_OF_QUEUES => self.number_of_queues,
            self::fid::INTERRUPT_COALESCING => self.interrupt_coalescing,
            self::fid::INTERRUPT_VECTOR_CONFIG => self.interrupt_vector_config,
            self::fid::WRITE_ATOMICITY => self.write_atomicity,
            self::fid::ASYNC_EVENT_CONFIG => self.async_event_config,
            self::fid::SOFTWARE_PROGRESS_MARKER => self.software_progress_marker,
            _ => return None,
        })
    }

    pub fn set(&mut self, fid: u32, value: u32) -> bool {
        match fid {
            self::fid::ARBITRATION => self.arbitration = value,
            self::fid::POWER_MANAGEMENT => self.power_management = value,
            self::fid::LBA_RANGE_TYPE => self.lba_range_type = value,
            self::fid::TEMPERATURE_THRESHOLD => self.temperature_threshold = value,
            self::fid::ERROR_RECOVERY => self.error_recovery = value,
            self::fid::VOLATILE_WRITE_CACHE => self.volatile_write_cache = value,
            self::fid::NUMBER_OF_QUEUES => self.number_of_queues = value,
            self::fid::INTERRUPT_COALESCING => self.interrupt_coalescing = value,
            self::fid::INTERRUPT_VECTOR_CONFIG => self.interrupt_vector_config = value,
            self::fid::WRITE_ATOMICITY => self.write_atomicity = value,
            self::fid::ASYNC_EVENT_CONFIG => self.async_event_config = value,
            self::fid::SOFTWARE_PROGRESS_MARKER => self.software_progress_marker = value,
            _ => return false,
        }
        true
    }
}
