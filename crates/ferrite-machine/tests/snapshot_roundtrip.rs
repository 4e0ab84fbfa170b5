//! Machine-level save/restore: register state, timing state, and pending
//! deadlines must all survive bit-exactly.

use ferrite_io_snapshot::state::IoSnapshot;
use ferrite_machine::{IrqEvent, Soc, SocConfig, PWR_BASE, TIM_ADDR, TIM_IRQ};

const TIM_CR1: u32 = 0x00;
const TIM_DIER: u32 = 0x0C;
const TIM_CNT: u32 = 0x24;
const TIM_PSC: u32 = 0x28;
const TIM_ARR: u32 = 0x2C;

const CR1_CEN: u32 = 1 << 0;
const DIER_UIE: u32 = 1 << 0;

fn soc() -> Soc {
    Soc::assemble(SocConfig {
        sysclk_hz: Some(168_000_000),
        ..SocConfig::default()
    })
    .unwrap()
}

#[test]
fn snapshot_bytes_are_deterministic() {
    let mut soc = soc();
    soc.write_u32(PWR_BASE, 0x0001_0000);
    soc.advance(500);

    assert_eq!(soc.save_state(), soc.save_state());
}

#[test]
fn restore_reproduces_register_and_timing_state() {
    let mut baseline = soc();
    let tim2 = TIM_ADDR[0];

    baseline.write_u32(PWR_BASE, 0x0003_0000);
    baseline.write_u32(tim2 + TIM_ARR, 1_000);
    baseline.write_u32(tim2 + TIM_PSC, 1); // divide by 2
    baseline.write_u32(tim2 + TIM_DIER, DIER_UIE);
    baseline.write_u32(tim2 + TIM_CR1, CR1_CEN);
    baseline.advance(700);
    baseline.take_irq_events();

    let snapshot = baseline.save_state();

    let mut restored = soc();
    restored.load_state(&snapshot).unwrap();

    // Visible registers match.
    assert_eq!(restored.now_ns(), 700);
    assert_eq!(restored.read_u32(PWR_BASE), 0x0003_0000);
    assert_eq!(restored.read_u32(tim2 + TIM_ARR), 1_000);
    assert_eq!(restored.read_u32(tim2 + TIM_PSC), 1);

    // Counter continuity: the tick baseline came across, not just the
    // register file.
    assert_eq!(restored.read_u32(tim2 + TIM_CNT), 350);

    // And the pending deadline fires at the same virtual instant in both
    // machines (update after 1000 divided ticks = 2000 ns).
    baseline.advance(1_300);
    restored.advance(1_300);
    let expected = vec![IrqEvent::Raise(TIM_IRQ[0]), IrqEvent::Lower(TIM_IRQ[0])];
    assert_eq!(baseline.take_irq_events(), expected);
    assert_eq!(restored.take_irq_events(), expected);

    // Subsequent snapshots of both machines agree.
    assert_eq!(baseline.save_state(), restored.save_state());
}

#[test]
fn restore_into_a_dirtied_machine_overwrites_its_state() {
    let mut baseline = soc();
    baseline.write_u32(PWR_BASE, 0x0001_0000);
    let snapshot = baseline.save_state();

    let mut other = soc();
    other.write_u32(PWR_BASE, 0x0002_0000);
    other.write_u32(TIM_ADDR[1] + TIM_ARR, 55);
    other.advance(9_999);

    other.load_state(&snapshot).unwrap();
    assert_eq!(other.now_ns(), 0);
    assert_eq!(other.read_u32(PWR_BASE), 0x0001_0000);
    assert_eq!(other.read_u32(TIM_ADDR[1] + TIM_ARR), 0);
    assert_eq!(other.save_state(), snapshot);
}
