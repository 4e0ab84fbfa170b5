use ferrite_io_snapshot::state::IoSnapshot;
use ferrite_machine::{Soc, SocConfig, FLASH_CTRL_BASE, PWR_BASE, RCC_BASE, TIM_ADDR};

const TIM_CR1: u32 = 0x00;
const TIM_CNT: u32 = 0x24;
const TIM_ARR: u32 = 0x2C;

fn soc() -> Soc {
    Soc::assemble(SocConfig {
        sysclk_hz: Some(168_000_000),
        ..SocConfig::default()
    })
    .unwrap()
}

#[test]
fn reset_twice_is_identical_to_reset_once() {
    let mut soc = soc();

    // Dirty a representative spread of device state.
    soc.write_u32(PWR_BASE, 0x0001_0000);
    soc.write_u32(RCC_BASE, 0x0001_0001);
    soc.write_u32(FLASH_CTRL_BASE + 0x10, 0x0101);
    soc.write_u32(TIM_ADDR[0] + TIM_ARR, 500);
    soc.write_u32(TIM_ADDR[0] + TIM_CR1, 1);
    soc.advance(123);

    soc.reset();
    let once = soc.save_state();
    soc.reset();
    let twice = soc.save_state();

    assert_eq!(once, twice);
}

#[test]
fn reset_rebases_timers_to_the_reset_instant() {
    let mut soc = soc();
    let tim2 = TIM_ADDR[0];

    soc.write_u32(tim2 + TIM_ARR, 0xFFFF_0000);
    soc.write_u32(tim2 + TIM_CR1, 1);
    soc.advance(777);
    assert_eq!(soc.read_u32(tim2 + TIM_CNT), 777);

    soc.reset();
    // Counter reads 0 immediately after reset, and its baseline is the time
    // of the *last* reset call, not machine construction.
    assert_eq!(soc.read_u32(tim2 + TIM_CNT), 0);

    soc.advance(10);
    soc.reset();
    assert_eq!(soc.read_u32(tim2 + TIM_CNT), 0);

    // Documented reset values reappear.
    assert_eq!(soc.read_u32(PWR_BASE), 0x0000_C000);
    assert_eq!(soc.read_u32(FLASH_CTRL_BASE), 0x0000_0030);
    assert_eq!(soc.read_u32(FLASH_CTRL_BASE + 0x14), 0x0FFF_AAED);
}
