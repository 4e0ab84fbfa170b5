//! Flash-interface register bank.
//!
//! Control/status bits are sticky (accumulate-OR): real hardware latches them
//! until an explicit clear sequence, and the program/erase state machine
//! itself is not modeled.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use crate::Device;
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

pub const FLASH_MMIO_SIZE: u32 = 0x400;

pub const FLASH_ACR: u32 = 0x00;
pub const FLASH_KEYR: u32 = 0x04;
pub const FLASH_OPTKEYR: u32 = 0x08;
pub const FLASH_SR: u32 = 0x0C;
pub const FLASH_CR: u32 = 0x10;
pub const FLASH_AR: u32 = 0x14;
pub const FLASH_OBR: u32 = 0x18;
pub const FLASH_WRPR: u32 = 0x20;

const FLASH_REGS: &[RegDef] = &[
    RegDef::new(FLASH_ACR, "ACR", 0x0000_0030, WritePolicy::SetBits),
    RegDef::new(FLASH_KEYR, "KEYR", 0, WritePolicy::SetBits),
    RegDef::new(FLASH_OPTKEYR, "OPTKEYR", 0, WritePolicy::SetBits),
    RegDef::new(FLASH_SR, "SR", 0, WritePolicy::SetBits),
    RegDef::new(FLASH_CR, "CR", 0, WritePolicy::SetBits),
    RegDef::new(FLASH_AR, "AR", 0x0FFF_AAED, WritePolicy::SetBits),
    RegDef::new(FLASH_OBR, "OBR", 0x0FFF_0000, WritePolicy::SetBits),
    RegDef::new(FLASH_WRPR, "WRPR", 0x0FFF_0000, WritePolicy::SetBits),
];

pub struct FlashCtrl {
    regs: RegisterBank,
}

impl FlashCtrl {
    pub fn new() -> Self {
        Self {
            regs: RegisterBank::new("flash_ctrl", FLASH_REGS),
        }
    }
}

impl Default for FlashCtrl {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for FlashCtrl {
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

impl IoSnapshot for FlashCtrl {
    const DEVICE_ID: [u8; 4] = *b"FLSH";
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
