//! Power-control bank.
//!
//! Regulator state machines are not modeled: requesting over-drive reports
//! ready immediately in CSR, which is all firmware polls for.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use crate::Device;
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

pub const PWR_MMIO_SIZE: u32 = 0x400;

pub const PWR_CR: u32 = 0x00;
pub const PWR_CSR: u32 = 0x04;

pub const PWR_CR_ODEN: u32 = 1 << 16;
pub const PWR_CR_ODSWEN: u32 = 1 << 17;
pub const PWR_CSR_ODRDY: u32 = 1 << 16;
pub const PWR_CSR_ODSWRDY: u32 = 1 << 17;

const PWR_REGS: &[RegDef] = &[
    RegDef::new(PWR_CR, "CR", 0x0000_C000, WritePolicy::Replace),
    RegDef::new(PWR_CSR, "CSR", 0, WritePolicy::Replace),
];

pub struct Pwr {
    regs: RegisterBank,
}

impl Pwr {
    pub fn new() -> Self {
        Self {
            regs: RegisterBank::new("pwr", PWR_REGS),
        }
    }
}

impl Default for Pwr {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Pwr {
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

        if offset == PWR_CR {
            let mut csr = self.regs.get(PWR_CSR);
            if value & PWR_CR_ODEN != 0 {
                csr |= PWR_CSR_ODRDY;
            }
            if value & PWR_CR_ODSWEN != 0 {
                csr |= PWR_CSR_ODSWRDY;
            }
            self.regs.set(PWR_CSR, csr);
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

impl IoSnapshot for Pwr {
    const DEVICE_ID: [u8; 4] = *b"PWR ";
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
