//! Bus-window adapters.
//!
//! The system bus dispatches on `MmioHandler`, which carries no scheduler or
//! interrupt-sink parameter; these wrappers bundle the shared device handle
//! with whatever collaborators its access path needs.

use ferrite_devices::exti::Exti;
use ferrite_devices::{Device, Tim};
use ferrite_platform::clock::ManualClock;
use ferrite_platform::timers::TimerQueue;
use memory::MmioHandler;
use std::cell::RefCell;
use std::rc::Rc;

use crate::cpu::Nvic;

/// Plain register-bank window.
pub(crate) struct BankWindow {
    pub dev: Rc<RefCell<dyn Device>>,
}

impl MmioHandler for BankWindow {
    fn read(&mut self, offset: u32, size: usize) -> u32 {
        self.dev.borrow_mut().read(offset, size)
    }

    fn write(&mut self, offset: u32, size: usize, value: u32) {
        self.dev.borrow_mut().write(offset, size, value);
    }
}

/// Timer window: register writes can (re-)arm deadlines in the shared queue.
pub(crate) struct TimWindow {
    pub tim: Rc<RefCell<Tim<ManualClock>>>,
    pub queue: Rc<RefCell<TimerQueue<usize>>>,
}

impl MmioHandler for TimWindow {
    fn read(&mut self, offset: u32, size: usize) -> u32 {
        self.tim.borrow_mut().mmio_read(offset, size)
    }

    fn write(&mut self, offset: u32, size: usize, value: u32) {
        self.tim
            .borrow_mut()
            .mmio_write(offset, size, value, &mut self.queue.borrow_mut());
    }
}

/// EXTI window: software-trigger writes pulse controller inputs.
pub(crate) struct ExtiWindow {
    pub exti: Rc<RefCell<Exti>>,
    pub nvic: Rc<RefCell<Nvic>>,
}

impl MmioHandler for ExtiWindow {
    fn read(&mut self, offset: u32, size: usize) -> u32 {
        self.exti.borrow_mut().mmio_read(offset, size)
    }

    fn write(&mut self, offset: u32, size: usize, value: u32) {
        self.exti
            .borrow_mut()
            .mmio_write(offset, size, value, &mut *self.nvic.borrow_mut());
    }
}
