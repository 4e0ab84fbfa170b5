//! Algebraic properties of the per-register write policies.

use ferrite_devices::regbank::{RegDef, RegisterBank, WritePolicy};
use proptest::prelude::*;

const DEFS: &[RegDef] = &[
    RegDef::new(0x00, "replace", 0, WritePolicy::Replace),
    RegDef::new(0x04, "sticky", 0, WritePolicy::SetBits),
    RegDef::new(0x08, "ack", 0, WritePolicy::ClearMask),
    RegDef::new(0x0C, "ro", 0x1234_5678, WritePolicy::ReadOnly),
];

fn bank_with(offset: u32, prior: u32) -> RegisterBank {
    let mut bank = RegisterBank::new("prop", DEFS);
    bank.set(offset, prior);
    bank
}

proptest! {
    #[test]
    fn replace_stores_exactly_the_written_value(p: u32, v: u32) {
        let mut bank = bank_with(0x00, p);
        bank.write(0x00, v);
        prop_assert_eq!(bank.read(0x00), v);
    }

    #[test]
    fn accumulate_or_yields_prior_or_value(p: u32, v: u32) {
        let mut bank = bank_with(0x04, p);
        bank.write(0x04, v);
        prop_assert_eq!(bank.read(0x04), p | v);
    }

    #[test]
    fn and_mask_clear_yields_prior_and_value(p: u32, v: u32) {
        let mut bank = bank_with(0x08, p);
        bank.write(0x08, v);
        prop_assert_eq!(bank.read(0x08), p & v);
    }

    #[test]
    fn and_mask_all_ones_is_identity_and_zero_clears(p: u32) {
        let mut bank = bank_with(0x08, p);
        bank.write(0x08, u32::MAX);
        prop_assert_eq!(bank.read(0x08), p);
        bank.write(0x08, 0);
        prop_assert_eq!(bank.read(0x08), 0);
    }

    #[test]
    fn read_only_ignores_writes(p: u32, v: u32) {
        let mut bank = bank_with(0x0C, p);
        bank.write(0x0C, v);
        prop_assert_eq!(bank.read(0x0C), p);
    }

    #[test]
    fn unknown_offsets_never_change_state(v: u32, offset in 0x10u32..0x400) {
        let mut bank = RegisterBank::new("prop", DEFS);
        let before: Vec<u32> = DEFS.iter().map(|d| bank.read(d.offset)).collect();

        prop_assume!(DEFS.iter().all(|d| d.offset != offset));
        prop_assert_eq!(bank.read(offset), 0);
        bank.write(offset, v);

        let after: Vec<u32> = DEFS.iter().map(|d| bank.read(d.offset)).collect();
        prop_assert_eq!(before, after);
    }
}
