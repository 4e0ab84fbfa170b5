//! GPIO port register bank.
//!
//! Pure register storage plus an input-pin injection hook; pin electrical
//! behavior is not modeled. Activation requires the port's bus clock to be
//! wired, which is the composition-time validity check for clock-dependent
//! devices.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use crate::{ActivateError, Device};
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};
use ferrite_platform::clock_tree::{ClockId, ClockTree};

pub const GPIO_MMIO_SIZE: u32 = 0x400;

pub const GPIO_MODER: u32 = 0x00;
pub const GPIO_OTYPER: u32 = 0x04;
pub const GPIO_OSPEEDR: u32 = 0x08;
pub const GPIO_PUPDR: u32 = 0x0C;
pub const GPIO_IDR: u32 = 0x10;
pub const GPIO_ODR: u32 = 0x14;
pub const GPIO_BSRR: u32 = 0x18;
pub const GPIO_LCKR: u32 = 0x1C;
pub const GPIO_AFRL: u32 = 0x20;
pub const GPIO_AFRH: u32 = 0x24;

const GPIO_REGS: &[RegDef] = &[
    RegDef::new(GPIO_MODER, "MODER", 0, WritePolicy::Replace),
    RegDef::new(GPIO_OTYPER, "OTYPER", 0, WritePolicy::Replace),
    RegDef::new(GPIO_OSPEEDR, "OSPEEDR", 0, WritePolicy::Replace),
    RegDef::new(GPIO_PUPDR, "PUPDR", 0, WritePolicy::Replace),
    RegDef::new(GPIO_IDR, "IDR", 0, WritePolicy::Replace),
    RegDef::new(GPIO_ODR, "ODR", 0, WritePolicy::Replace),
    RegDef::new(GPIO_BSRR, "BSRR", 0, WritePolicy::Replace),
    RegDef::new(GPIO_LCKR, "LCKR", 0, WritePolicy::Replace),
    RegDef::new(GPIO_AFRL, "AFRL", 0, WritePolicy::Replace),
    RegDef::new(GPIO_AFRH, "AFRH", 0, WritePolicy::Replace),
];

pub struct Gpio {
    regs: RegisterBank,
    clk: ClockId,
}

impl Gpio {
    pub fn new(name: &'static str, clk: ClockId) -> Self {
        Self {
            regs: RegisterBank::new(name, GPIO_REGS),
            clk,
        }
    }

    /// Fallible one-time setup: the port is unusable until its clock input is
    /// connected.
    pub fn activate(&mut self, tree: &ClockTree) -> Result<(), ActivateError> {
        if !tree.has_source(self.clk) {
            return Err(ActivateError::ClockNotWired {
                device: self.regs.name(),
                clock: "clk",
            });
        }
        Ok(())
    }

    /// Drives an external input pin; reflected in IDR.
    pub fn set_input_pin(&mut self, pin: u8, level: bool) {
        let bit = 1u32 << (pin & 0xF);
        let idr = self.regs.get(GPIO_IDR);
        self.regs
            .set(GPIO_IDR, if level { idr | bit } else { idr & !bit });
    }

    pub fn input_pin(&self, pin: u8) -> bool {
        self.regs.get(GPIO_IDR) & (1 << (pin & 0xF)) != 0
    }
}

impl Device for Gpio {
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

impl IoSnapshot for Gpio {
    const DEVICE_ID: [u8; 4] = *b"GPIO";
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
