//! System-configuration controller.
//!
//! Besides plain register storage, SYSCFG owns the EXTI source selection: the
//! EXTICR nibbles decide which GPIO port drives each of the 16 external
//! interrupt lines.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use crate::Device;
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

pub const SYSCFG_MMIO_SIZE: u32 = 0x400;

pub const SYSCFG_MEMRMP: u32 = 0x00;
pub const SYSCFG_PMC: u32 = 0x04;
pub const SYSCFG_EXTICR1: u32 = 0x08;
pub const SYSCFG_EXTICR2: u32 = 0x0C;
pub const SYSCFG_EXTICR3: u32 = 0x10;
pub const SYSCFG_EXTICR4: u32 = 0x14;
pub const SYSCFG_CMPCR: u32 = 0x20;

const SYSCFG_REGS: &[RegDef] = &[
    RegDef::new(SYSCFG_MEMRMP, "MEMRMP", 0, WritePolicy::Replace),
    RegDef::new(SYSCFG_PMC, "PMC", 0, WritePolicy::Replace),
    RegDef::new(SYSCFG_EXTICR1, "EXTICR1", 0, WritePolicy::Replace),
    RegDef::new(SYSCFG_EXTICR2, "EXTICR2", 0, WritePolicy::Replace),
    RegDef::new(SYSCFG_EXTICR3, "EXTICR3", 0, WritePolicy::Replace),
    RegDef::new(SYSCFG_EXTICR4, "EXTICR4", 0, WritePolicy::Replace),
    RegDef::new(SYSCFG_CMPCR, "CMPCR", 0, WritePolicy::Replace),
];

pub struct Syscfg {
    regs: RegisterBank,
}

impl Syscfg {
    pub fn new() -> Self {
        Self {
            regs: RegisterBank::new("syscfg", SYSCFG_REGS),
        }
    }

    /// Selected GPIO port index (0 = A) for EXTI line `line` (0..16).
    pub fn exti_port(&self, line: usize) -> u8 {
        debug_assert!(line < 16);
        let reg = SYSCFG_EXTICR1 + 4 * (line as u32 / 4);
        let nibble = (line as u32 % 4) * 4;
        ((self.regs.get(reg) >> nibble) & 0xF) as u8
    }
}

impl Default for Syscfg {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Syscfg {
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

impl IoSnapshot for Syscfg {
    const DEVICE_ID: [u8; 4] = *b"SCFG";
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
