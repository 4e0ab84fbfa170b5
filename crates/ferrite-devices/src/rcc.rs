//! Reset/clock-control bank.
//!
//! Oscillator and PLL hardware is not modeled; requesting an oscillator
//! reports the matching ready flag immediately so firmware ready-polling
//! loops terminate. Actual frequency derivation lives in the platform clock
//! tree, not here.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use crate::Device;
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

pub const RCC_MMIO_SIZE: u32 = 0x400;

pub const RCC_CR: u32 = 0x00;
pub const RCC_PLLCFGR: u32 = 0x04;
pub const RCC_CFGR: u32 = 0x08;
pub const RCC_CIR: u32 = 0x0C;
pub const RCC_AHB1ENR: u32 = 0x30;
pub const RCC_APB1ENR: u32 = 0x40;
pub const RCC_APB2ENR: u32 = 0x44;
pub const RCC_BDCR: u32 = 0x70;
pub const RCC_CSR: u32 = 0x74;

pub const RCC_CR_HSION: u32 = 1 << 0;
pub const RCC_CR_HSIRDY: u32 = 1 << 1;
pub const RCC_CR_HSEON: u32 = 1 << 16;
pub const RCC_CR_HSERDY: u32 = 1 << 17;
pub const RCC_CR_PLLON: u32 = 1 << 24;
pub const RCC_CR_PLLRDY: u32 = 1 << 25;

const RCC_REGS: &[RegDef] = &[
    RegDef::new(RCC_CR, "CR", 0x0000_0083, WritePolicy::Replace),
    RegDef::new(RCC_PLLCFGR, "PLLCFGR", 0x2400_3010, WritePolicy::Replace),
    RegDef::new(RCC_CFGR, "CFGR", 0, WritePolicy::Replace),
    RegDef::new(RCC_CIR, "CIR", 0, WritePolicy::Replace),
    RegDef::new(RCC_AHB1ENR, "AHB1ENR", 0, WritePolicy::Replace),
    RegDef::new(RCC_APB1ENR, "APB1ENR", 0, WritePolicy::Replace),
    RegDef::new(RCC_APB2ENR, "APB2ENR", 0, WritePolicy::Replace),
    RegDef::new(RCC_BDCR, "BDCR", 0, WritePolicy::Replace),
    RegDef::new(RCC_CSR, "CSR", 0, WritePolicy::Replace),
];

pub struct Rcc {
    regs: RegisterBank,
}

impl Rcc {
    pub fn new() -> Self {
        Self {
            regs: RegisterBank::new("rcc", RCC_REGS),
        }
    }

    fn sync_ready_flags(&mut self) {
        let mut cr = self.regs.get(RCC_CR);
        for (on, rdy) in [
            (RCC_CR_HSION, RCC_CR_HSIRDY),
            (RCC_CR_HSEON, RCC_CR_HSERDY),
            (RCC_CR_PLLON, RCC_CR_PLLRDY),
        ] {
            if cr & on != 0 {
                cr |= rdy;
            } else {
                cr &= !rdy;
            }
        }
        self.regs.set(RCC_CR, cr);
    }
}

impl Default for Rcc {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Rcc {
    fn name(&self) -> &'static str {
        self.regs.name()
    }

    fn read(&mut self, offset: u32, size: usize) -> u32 {
        if !check_access(self.regs.name(), offset, size) {
            return 0;
        }
        self.regs.read(offset)
    }

    fn write(&mut self, offset: u32, size: usize, value: u32) {
        if !check_access(self.regs.name(), offset, size) {
            return;
        }
        self.regs.write(offset, value);
        if offset == RCC_CR {
            self.sync_ready_flags();
        }
    }

    fn reset(&mut self) {
        self.regs.reset();
    }

    fn save_state(&self) -> Vec<u8> {
        IoSnapshot::save_state(self)
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        IoSnapshot::load_state(self, bytes)
    }
}

const TAG_REGS_BASE: u16 = 0x10;

impl IoSnapshot for Rcc {
    const DEVICE_ID: [u8; 4] = *b"RCC ";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        self.regs.save_fields(&mut w, TAG_REGS_BASE);
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;
        self.regs.load_fields(&r, TAG_REGS_BASE)
    }
}
