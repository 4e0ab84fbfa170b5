//! USART register surface.
//!
//! The byte transport itself is an external collaborator; this models only
//! the register bank so firmware can program baud/control registers and poll
//! status without faulting. SR resets with TXE|TC set so polled transmit
//! loops complete immediately.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use crate::Device;
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

pub const USART_MMIO_SIZE: u32 = 0x400;

pub const USART_SR: u32 = 0x00;
pub const USART_DR: u32 = 0x04;
pub const USART_BRR: u32 = 0x08;
pub const USART_CR1: u32 = 0x0C;
pub const USART_CR2: u32 = 0x10;
pub const USART_CR3: u32 = 0x14;
pub const USART_GTPR: u32 = 0x18;

const USART_REGS: &[RegDef] = &[
    RegDef::new(USART_SR, "SR", 0x0000_00C0, WritePolicy::Replace),
    RegDef::new(USART_DR, "DR", 0, WritePolicy::Replace),
    RegDef::new(USART_BRR, "BRR", 0, WritePolicy::Replace),
    RegDef::new(USART_CR1, "CR1", 0, WritePolicy::Replace),
    RegDef::new(USART_CR2, "CR2", 0, WritePolicy::Replace),
    RegDef::new(USART_CR3, "CR3", 0, WritePolicy::Replace),
    RegDef::new(USART_GTPR, "GTPR", 0, WritePolicy::Replace),
];

pub struct Usart {
    regs: RegisterBank,
}

impl Usart {
    pub fn new(name: &'static str) -> Self {
        Self {
            regs: RegisterBank::new(name, USART_REGS),
        }
    }
}

impl Device for Usart {
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

impl IoSnapshot for Usart {
    const DEVICE_ID: [u8; 4] = *b"USRT";
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sr_resets_with_txe_and_tc() {
        let mut usart = Usart::new("usart1");
        assert_eq!(usart.read(USART_SR, 4), 0x0000_00C0);
    }

    #[test]
    fn control_registers_store_programmed_values() {
        let mut usart = Usart::new("usart1");
        usart.write(USART_BRR, 4, 0x0683); // 16 MHz / 9600 baud
        usart.write(USART_CR1, 4, 1 << 13);
        assert_eq!(usart.read(USART_BRR, 4), 0x0683);
        assert_eq!(usart.read(USART_CR1, 4), 1 << 13);
    }
}
