//! Shared register-bank pattern.
//!
//! Every peripheral decodes the same way: an ordered table of named 32-bit
//! registers at fixed byte offsets, each with a reset value and a write
//! policy. Unknown offsets are not registers — reads answer 0, writes are
//! discarded, and both are logged so guest probes never fault the simulation.

use ferrite_io_snapshot::state::{SnapshotReader, SnapshotResult, SnapshotWriter};

/// Per-register write semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Writes are discarded.
    ReadOnly,
    /// New value fully overwrites the stored value.
    Replace,
    /// `stored |= new` — sticky control/status bits that hardware only clears
    /// explicitly.
    SetBits,
    /// `stored &= new` — the write-to-acknowledge idiom: writing 0 in a bit
    /// position clears it, writing 1 leaves it unchanged.
    ClearMask,
}

/// Static description of one register.
#[derive(Debug, Clone, Copy)]
pub struct RegDef {
    pub offset: u32,
    pub name: &'static str,
    pub reset: u32,
    pub policy: WritePolicy,
}

impl RegDef {
    pub const fn new(offset: u32, name: &'static str, reset: u32, policy: WritePolicy) -> Self {
        Self {
            offset,
            name,
            reset,
            policy,
        }
    }
}

/// Address-decoded register file: the `read`/`write`/`reset`/snapshot core
/// reused by every peripheral bank.
#[derive(Debug)]
pub struct RegisterBank {
    name: &'static str,
    defs: &'static [RegDef],
    values: Vec<u32>,
}

impl RegisterBank {
    pub fn new(name: &'static str, defs: &'static [RegDef]) -> Self {
        Self {
            name,
            defs,
            values: defs.iter().map(|d| d.reset).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn index_of(&self, offset: u32) -> Option<usize> {
        self.defs.iter().position(|d| d.offset == offset)
    }

    /// Raw accessor for device-side logic. Panics on an offset that is not in
    /// the table; device code only uses its own register constants.
    pub fn get(&self, offset: u32) -> u32 {
        let idx = self.index_of(offset).expect("known register offset");
        self.values[idx]
    }

    /// Raw setter bypassing the write policy, for device-side state updates
    /// (e.g. hardware-set status bits).
    pub fn set(&mut self, offset: u32, value: u32) {
        let idx = self.index_of(offset).expect("known register offset");
        self.values[idx] = value;
    }

    pub fn read(&self, offset: u32) -> u32 {
        match self.index_of(offset) {
            Some(idx) => self.values[idx],
            None => {
                tracing::debug!(
                    bank = self.name,
                    offset = format_args!("0x{offset:02x}"),
                    "bad offset read"
                );
                0
            }
        }
    }

    /// Applies the register's write policy. Returns `true` when the offset
    /// decoded to a register (whether or not the value changed).
    pub fn write(&mut self, offset: u32, value: u32) -> bool {
        let Some(idx) = self.index_of(offset) else {
            tracing::debug!(
                bank = self.name,
                offset = format_args!("0x{offset:02x}"),
                value = format_args!("0x{value:08x}"),
                "bad offset write"
            );
            return false;
        };

        let stored = &mut self.values[idx];
        match self.defs[idx].policy {
            WritePolicy::ReadOnly => {}
            WritePolicy::Replace => *stored = value,
            WritePolicy::SetBits => *stored |= value,
            WritePolicy::ClearMask => *stored &= value,
        }
        true
    }

    pub fn reset(&mut self) {
        for (value, def) in self.values.iter_mut().zip(self.defs) {
            *value = def.reset;
        }
    }

    /// Serializes every register, in table order, as one snapshot field each.
    /// `base_tag` partitions the bank's tags from the owning device's own.
    pub fn save_fields(&self, w: &mut SnapshotWriter, base_tag: u16) {
        for (idx, value) in self.values.iter().enumerate() {
            w.field_u32(base_tag + idx as u16, *value);
        }
    }

    /// Restores registers from snapshot fields. Registers absent from the
    /// snapshot keep their reset value.
    pub fn load_fields(&mut self, r: &SnapshotReader<'_>, base_tag: u16) -> SnapshotResult<()> {
        self.reset();
        for idx in 0..self.values.len() {
            if let Some(value) = r.u32(base_tag + idx as u16)? {
                self.values[idx] = value;
            }
        }
        Ok(())
    }
}

/// Shared guard for the fixed-width access contract: banks hold 32-bit
/// registers at natural alignment, so anything but an aligned 4-byte access
/// is answered with the default.
pub fn check_access(bank: &'static str, offset: u32, size: usize) -> bool {
    if size != 4 || offset % 4 != 0 {
        tracing::debug!(bank, offset = format_args!("0x{offset:02x}"), size, "unsupported access width");
        return false;
    }
    true
}
