//! External-interrupt router.
//!
//! Sixteen input lines, each selected from a GPIO port by SYSCFG, feed
//! sixteen outputs onto CPU interrupt inputs through the board's static
//! fan-in table (several of the high-numbered lines share one input; that
//! grouping mirrors the hardware and is preserved exactly). Edges matching
//! RTSR/FTSR on unmasked lines latch into PR and emit one pulse.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};
use ferrite_platform::irq::IrqSink;

pub const EXTI_MMIO_SIZE: u32 = 0x400;
pub const EXTI_NUM_LINES: usize = 16;

pub const EXTI_IMR: u32 = 0x00;
pub const EXTI_EMR: u32 = 0x04;
pub const EXTI_RTSR: u32 = 0x08;
pub const EXTI_FTSR: u32 = 0x0C;
pub const EXTI_SWIER: u32 = 0x10;
pub const EXTI_PR: u32 = 0x14;

const EXTI_REGS: &[RegDef] = &[
    RegDef::new(EXTI_IMR, "IMR", 0, WritePolicy::Replace),
    RegDef::new(EXTI_EMR, "EMR", 0, WritePolicy::Replace),
    RegDef::new(EXTI_RTSR, "RTSR", 0, WritePolicy::Replace),
    RegDef::new(EXTI_FTSR, "FTSR", 0, WritePolicy::Replace),
    // SWIER and PR have side effects handled in `mmio_write`.
    RegDef::new(EXTI_SWIER, "SWIER", 0, WritePolicy::Replace),
    RegDef::new(EXTI_PR, "PR", 0, WritePolicy::Replace),
];

pub struct Exti {
    regs: RegisterBank,
    /// Current level of each input line, for edge detection.
    levels: u16,
    /// Controller input index for each of the 16 outputs.
    irq_lines: [u16; EXTI_NUM_LINES],
}

impl Exti {
    pub fn new(irq_lines: [u16; EXTI_NUM_LINES]) -> Self {
        Self {
            regs: RegisterBank::new("exti", EXTI_REGS),
            levels: 0,
            irq_lines,
        }
    }

    pub fn irq_lines(&self) -> &[u16; EXTI_NUM_LINES] {
        &self.irq_lines
    }

    fn pend_and_pulse(&mut self, line: usize, sink: &mut dyn IrqSink) {
        let bit = 1u32 << line;
        self.regs.set(EXTI_PR, self.regs.get(EXTI_PR) | bit);
        sink.pulse_irq(self.irq_lines[line]);
    }

    /// Drives input line `line` from its selected GPIO source. Edges matching
    /// the trigger-selection registers on unmasked lines latch and pulse.
    pub fn set_line(&mut self, line: usize, level: bool, sink: &mut dyn IrqSink) {
        debug_assert!(line < EXTI_NUM_LINES);
        let bit = 1u16 << line;
        let was = self.levels & bit != 0;
        if was == level {
            return;
        }
        self.levels = if level {
            self.levels | bit
        } else {
            self.levels & !bit
        };

        if self.regs.get(EXTI_IMR) & (1 << line) == 0 {
            return;
        }
        let rising = level && self.regs.get(EXTI_RTSR) & (1 << line) != 0;
        let falling = !level && self.regs.get(EXTI_FTSR) & (1 << line) != 0;
        if rising || falling {
            self.pend_and_pulse(line, sink);
        }
    }

    pub fn mmio_read(&mut self, offset: u32, size: usize) -> u32 {
        if !check_access("exti", offset, size) {
            return 0;
        }
        self.regs.read(offset)
    }

    pub fn mmio_write(&mut self, offset: u32, size: usize, value: u32, sink: &mut dyn IrqSink) {
        if !check_access("exti", offset, size) {
            return;
        }
        match offset {
            EXTI_SWIER => {
                let old = self.regs.get(EXTI_SWIER);
                self.regs.write(EXTI_SWIER, value);
                // Software trigger: 0 -> 1 transitions on unmasked lines.
                let fired = value & !old & self.regs.get(EXTI_IMR);
                for line in 0..EXTI_NUM_LINES {
                    if fired & (1 << line) != 0 {
                        self.pend_and_pulse(line, sink);
                    }
                }
            }
            EXTI_PR => {
                // Write-1-to-acknowledge; clearing a pending bit also drops
                // the matching software-trigger latch.
                self.regs.set(EXTI_PR, self.regs.get(EXTI_PR) & !value);
                self.regs
                    .set(EXTI_SWIER, self.regs.get(EXTI_SWIER) & !value);
            }
            _ => {
                self.regs.write(offset, value);
            }
        }
    }

    pub fn reset(&mut self) {
        self.regs.reset();
        self.levels = 0;
    }
}

const TAG_LEVELS: u16 = 1;
const TAG_REGS_BASE: u16 = 0x10;

impl IoSnapshot for Exti {
    const DEVICE_ID: [u8; 4] = *b"EXTI";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_u16(TAG_LEVELS, self.levels);
        self.regs.save_fields(&mut w, TAG_REGS_BASE);
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;
        self.regs.load_fields(&r, TAG_REGS_BASE)?;
        self.levels = r.u16(TAG_LEVELS)?.unwrap_or(0);
        Ok(())
    }
}
