//! Synthetic guest programming the timers through the address map.

use ferrite_machine::{IrqEvent, Soc, SocConfig, TIM_ADDR, TIM_IRQ};

const TIM_CR1: u32 = 0x00;
const TIM_DIER: u32 = 0x0C;
const TIM_SR: u32 = 0x10;
const TIM_EGR: u32 = 0x14;
const TIM_CNT: u32 = 0x24;
const TIM_PSC: u32 = 0x28;
const TIM_ARR: u32 = 0x2C;

const CR1_CEN: u32 = 1 << 0;
const DIER_UIE: u32 = 1 << 0;
const SR_UIF: u32 = 1 << 0;
const EGR_UG: u32 = 1 << 0;

fn soc() -> Soc {
    Soc::assemble(SocConfig {
        sysclk_hz: Some(168_000_000),
        ..SocConfig::default()
    })
    .unwrap()
}

#[test]
fn guest_receives_one_pulse_per_reload_period() {
    let mut soc = soc();
    let tim2 = TIM_ADDR[0];

    soc.write_u32(tim2 + TIM_ARR, 1_000);
    soc.write_u32(tim2 + TIM_DIER, DIER_UIE);
    soc.write_u32(tim2 + TIM_CR1, CR1_CEN);
    soc.take_irq_events();

    soc.advance(999);
    assert!(soc.take_irq_events().is_empty());
    assert_eq!(soc.read_u32(tim2 + TIM_SR) & SR_UIF, 0);

    soc.advance(1);
    assert_eq!(
        soc.take_irq_events(),
        vec![IrqEvent::Raise(TIM_IRQ[0]), IrqEvent::Lower(TIM_IRQ[0])]
    );
    assert_ne!(soc.read_u32(tim2 + TIM_SR) & SR_UIF, 0);
    assert!(soc.irq_pending(TIM_IRQ[0]));

    // Acknowledge in the controller and the status register separately:
    // the pending bit is sticky until the guest writes 0 to it.
    soc.acknowledge_irq(TIM_IRQ[0]);
    soc.write_u32(tim2 + TIM_SR, !SR_UIF);
    assert_eq!(soc.read_u32(tim2 + TIM_SR) & SR_UIF, 0);

    // Periodic: the next pulse lands exactly one period later.
    soc.advance(1_000);
    assert_eq!(
        soc.take_irq_events(),
        vec![IrqEvent::Raise(TIM_IRQ[0]), IrqEvent::Lower(TIM_IRQ[0])]
    );
}

#[test]
fn counter_follows_the_closed_form_through_the_bus() {
    let mut soc = soc();
    let tim3 = TIM_ADDR[1];

    soc.write_u32(tim3 + TIM_ARR, 0xFFFF_0000);
    soc.write_u32(tim3 + TIM_CR1, CR1_CEN);

    soc.advance(12_345);
    assert_eq!(soc.read_u32(tim3 + TIM_CNT), 12_345);

    // Counter monotonicity across reads.
    let a = soc.read_u32(tim3 + TIM_CNT);
    soc.advance(10);
    let b = soc.read_u32(tim3 + TIM_CNT);
    assert!(b >= a);

    // CNT is computed, not stored: writes are discarded.
    soc.write_u32(tim3 + TIM_CNT, 0);
    assert_eq!(soc.read_u32(tim3 + TIM_CNT), 12_355);
}

#[test]
fn prescaler_change_keeps_the_counter_continuous() {
    let mut soc = soc();
    let tim4 = TIM_ADDR[2];

    soc.write_u32(tim4 + TIM_ARR, 0xFFFF_0000);
    soc.write_u32(tim4 + TIM_CR1, CR1_CEN);
    soc.advance(2_000);
    assert_eq!(soc.read_u32(tim4 + TIM_CNT), 2_000);

    soc.write_u32(tim4 + TIM_PSC, 3);
    assert_eq!(soc.read_u32(tim4 + TIM_CNT), 2_000);
    soc.advance(40);
    assert_eq!(soc.read_u32(tim4 + TIM_CNT), 2_010);

    soc.write_u32(tim4 + TIM_PSC, 7);
    assert_eq!(soc.read_u32(tim4 + TIM_CNT), 2_010);
    soc.advance(80);
    assert_eq!(soc.read_u32(tim4 + TIM_CNT), 2_020);
}

#[test]
fn forced_resynchronization_rebases_the_counter() {
    let mut soc = soc();
    let tim5 = TIM_ADDR[3];

    soc.write_u32(tim5 + TIM_ARR, 0xFFFF_0000);
    soc.write_u32(tim5 + TIM_CR1, CR1_CEN);
    soc.advance(500);
    assert_eq!(soc.read_u32(tim5 + TIM_CNT), 500);

    soc.write_u32(tim5 + TIM_EGR, EGR_UG);
    assert_eq!(soc.read_u32(tim5 + TIM_CNT), 0);
}

#[test]
fn each_timer_pulses_its_own_interrupt_line() {
    let mut soc = soc();

    for &base in &TIM_ADDR {
        soc.write_u32(base + TIM_ARR, 100);
        soc.write_u32(base + TIM_DIER, DIER_UIE);
        soc.write_u32(base + TIM_CR1, CR1_CEN);
    }
    soc.take_irq_events();

    soc.advance(100);
    for &irq in &TIM_IRQ {
        assert!(soc.irq_pending(irq), "line {irq} not pending");
    }
}

#[test]
fn zero_reload_arms_nothing() {
    let mut soc = soc();
    let tim2 = TIM_ADDR[0];

    soc.write_u32(tim2 + TIM_DIER, DIER_UIE);
    soc.write_u32(tim2 + TIM_CR1, CR1_CEN);

    soc.advance(1_000_000);
    assert!(soc.take_irq_events().is_empty());
}
