//! GPIO edge → SYSCFG selection → EXTI → NVIC delivery.

use ferrite_machine::{IrqEvent, Soc, SocConfig, EXTI_BASE, SYSCFG_BASE};

const SYSCFG_EXTICR1: u32 = 0x08;
const EXTI_IMR: u32 = 0x00;
const EXTI_RTSR: u32 = 0x08;
const EXTI_FTSR: u32 = 0x0C;
const EXTI_SWIER: u32 = 0x10;
const EXTI_PR: u32 = 0x14;

fn soc() -> Soc {
    Soc::assemble(SocConfig {
        sysclk_hz: Some(168_000_000),
        ..SocConfig::default()
    })
    .unwrap()
}

#[test]
fn selected_port_edge_reaches_the_nvic() {
    let mut soc = soc();

    // Line 0 sourced from port C (index 2); rising edges, unmasked.
    soc.write_u32(SYSCFG_BASE + SYSCFG_EXTICR1, 0x0000_0002);
    soc.write_u32(EXTI_BASE + EXTI_IMR, 1 << 0);
    soc.write_u32(EXTI_BASE + EXTI_RTSR, 1 << 0);
    soc.take_irq_events();

    // Edge on the selected port fires EXTI0 -> NVIC input 6.
    soc.gpio_input(2, 0, true);
    assert_eq!(
        soc.take_irq_events(),
        vec![IrqEvent::Raise(6), IrqEvent::Lower(6)]
    );
    assert_eq!(soc.read_u32(EXTI_BASE + EXTI_PR), 1 << 0);

    // The same pin on a non-selected port does nothing.
    soc.gpio_input(0, 0, true);
    assert!(soc.take_irq_events().is_empty());
}

#[test]
fn falling_edges_require_ftsr() {
    let mut soc = soc();

    soc.write_u32(EXTI_BASE + EXTI_IMR, 1 << 4);
    soc.write_u32(EXTI_BASE + EXTI_FTSR, 1 << 4);
    soc.take_irq_events();

    // Rising edge: not selected, silent (port A is the reset-default source).
    soc.gpio_input(0, 4, true);
    assert!(soc.take_irq_events().is_empty());

    // Falling edge: fires EXTI4 -> NVIC input 10.
    soc.gpio_input(0, 4, false);
    assert_eq!(
        soc.take_irq_events(),
        vec![IrqEvent::Raise(10), IrqEvent::Lower(10)]
    );
}

#[test]
fn grouped_lines_share_one_controller_input() {
    let mut soc = soc();

    soc.write_u32(EXTI_BASE + EXTI_IMR, (1 << 5) | (1 << 9) | (1 << 12));
    soc.take_irq_events();

    // Software triggers on lines 5 and 9 both land on input 23, line 12 on 40.
    soc.write_u32(EXTI_BASE + EXTI_SWIER, (1 << 5) | (1 << 9) | (1 << 12));
    let events = soc.take_irq_events();
    let raised: Vec<u16> = events
        .iter()
        .filter_map(|e| match e {
            IrqEvent::Raise(line) => Some(*line),
            IrqEvent::Lower(_) => None,
        })
        .collect();
    assert_eq!(raised, vec![23, 23, 40]);

    assert_eq!(
        soc.read_u32(EXTI_BASE + EXTI_PR),
        (1 << 5) | (1 << 9) | (1 << 12)
    );

    // Write-1-to-acknowledge.
    soc.write_u32(EXTI_BASE + EXTI_PR, (1 << 5) | (1 << 9) | (1 << 12));
    assert_eq!(soc.read_u32(EXTI_BASE + EXTI_PR), 0);
}
