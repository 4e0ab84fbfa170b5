//! CPU-core collaborator surface.
//!
//! Instruction execution and NVIC priority resolution are external to this
//! crate; the machine only needs the core's construction parameters and an
//! interrupt-input sink that records what the peripheral layer delivers.

use ferrite_platform::irq::IrqSink;
use std::collections::BTreeSet;

/// Construction parameters for the Cortex-M core handle.
#[derive(Debug, Clone)]
pub struct CortexM4Config {
    /// NVIC external interrupt input count.
    pub num_irq: u16,
    /// Implemented priority bits.
    pub prio_bits: u8,
    /// Core variant identifier.
    pub cpu_type: &'static str,
    /// Bit-banded SRAM/peripheral addressing enabled.
    pub enable_bitband: bool,
}

impl Default for CortexM4Config {
    fn default() -> Self {
        Self {
            num_irq: 98,
            prio_bits: 4,
            cpu_type: "cortex-m4",
            enable_bitband: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    Raise(u16),
    Lower(u16),
}

/// NVIC input side: pending-line latch plus an event log for integrations
/// and tests. Priority logic and vectoring live in the external core.
#[derive(Debug)]
pub struct Nvic {
    num_irq: u16,
    pending: BTreeSet<u16>,
    events: Vec<IrqEvent>,
}

impl Nvic {
    pub fn new(num_irq: u16) -> Self {
        Self {
            num_irq,
            pending: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    pub fn num_irq(&self) -> u16 {
        self.num_irq
    }

    pub fn is_pending(&self, line: u16) -> bool {
        self.pending.contains(&line)
    }

    /// Lowest pending input, for a simple fetch-and-acknowledge loop.
    pub fn next_pending(&self) -> Option<u16> {
        self.pending.iter().next().copied()
    }

    pub fn acknowledge(&mut self, line: u16) {
        self.pending.remove(&line);
    }

    pub fn take_events(&mut self) -> Vec<IrqEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.events.clear();
    }
}

impl IrqSink for Nvic {
    fn raise_irq(&mut self, line: u16) {
        if line >= self.num_irq {
            tracing::warn!(line, num_irq = self.num_irq, "interrupt line out of range");
            return;
        }
        self.pending.insert(line);
        self.events.push(IrqEvent::Raise(line));
    }

    fn lower_irq(&mut self, line: u16) {
        if line >= self.num_irq {
            return;
        }
        self.events.push(IrqEvent::Lower(line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_latches_pending_and_returns_line_to_idle() {
        let mut nvic = Nvic::new(98);
        nvic.pulse_irq(28);

        // The pulse is an edge: raise then lower, but pending stays latched
        // until acknowledged.
        assert_eq!(nvic.take_events(), vec![IrqEvent::Raise(28), IrqEvent::Lower(28)]);
        assert!(nvic.is_pending(28));
        nvic.acknowledge(28);
        assert!(!nvic.is_pending(28));
    }

    #[test]
    fn out_of_range_lines_are_dropped() {
        let mut nvic = Nvic::new(98);
        nvic.raise_irq(98);
        assert!(nvic.take_events().is_empty());
        assert_eq!(nvic.next_pending(), None);
    }
}
