//! STM32F407 SoC composition.
//!
//! `Soc::assemble` builds the whole machine from a fixed board description:
//! boot flash (mapped at its primary base and aliased at 0), SRAM and CCM
//! RAM, the derived clock tree, the Cortex-M core handle with its NVIC input
//! collaborator, and every modeled peripheral at its documented base, wired
//! to controller inputs through one static interrupt table. Assembly is the
//! only fallible phase: the first validation or activation failure aborts the
//! whole machine, and an assembled machine's peripheral layer cannot fail.
//!
//! Time is virtual and pull-based. `advance` moves the shared clock and
//! drains due timer deadlines; nothing polls.

#![forbid(unsafe_code)]

pub mod cpu;
mod mmio;

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ferrite_devices::exti::{Exti, EXTI_MMIO_SIZE, EXTI_NUM_LINES};
use ferrite_devices::flash_ctrl::{FlashCtrl, FLASH_MMIO_SIZE};
use ferrite_devices::gpio::{Gpio, GPIO_MMIO_SIZE};
use ferrite_devices::pwr::{Pwr, PWR_MMIO_SIZE};
use ferrite_devices::rcc::{Rcc, RCC_MMIO_SIZE};
use ferrite_devices::syscfg::{Syscfg, SYSCFG_MMIO_SIZE};
use ferrite_devices::tim::TIM_MMIO_SIZE;
use ferrite_devices::unimplemented::Unimplemented;
use ferrite_devices::usart::{Usart, USART_MMIO_SIZE};
use ferrite_devices::{ActivateError, Device, Tim};
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};
use ferrite_platform::clock::{Clock, ManualClock};
use ferrite_platform::clock_tree::{ClockError, ClockId, ClockTree};
use ferrite_platform::irq::InterruptMap;
use ferrite_platform::timers::TimerQueue;
use memory::{DenseMemory, GuestMemoryError, MapError, RegionKind, SystemBus};

pub use cpu::{CortexM4Config, IrqEvent, Nvic};

use mmio::{BankWindow, ExtiWindow, TimWindow};

pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SIZE: u32 = 0x0010_0000;
pub const SRAM_BASE: u32 = 0x2000_0000;
pub const SRAM_SIZE: u32 = 0x0100_0000;
pub const CCM_BASE: u32 = 0x1000_0000;
pub const CCM_SIZE: u32 = 0x0001_0000;

pub const RCC_BASE: u32 = 0x4002_3800;
pub const SYSCFG_BASE: u32 = 0x4001_3800;
pub const EXTI_BASE: u32 = 0x4001_3C00;
pub const PWR_BASE: u32 = 0x4000_7000;
pub const FLASH_CTRL_BASE: u32 = 0x4002_3C00;

pub const NUM_USARTS: usize = 4;
pub const USART_ADDR: [u32; NUM_USARTS] = [0x4001_1000, 0x4000_4400, 0x4000_4800, 0x4001_1400];
const USART_NAMES: [&str; NUM_USARTS] = ["usart1", "usart2", "usart3", "usart6"];
pub const USART_IRQ: [u16; NUM_USARTS] = [37, 38, 39, 71];

pub const NUM_TIMERS: usize = 4;
pub const TIM_ADDR: [u32; NUM_TIMERS] = [0x4000_0000, 0x4000_0400, 0x4000_0800, 0x4000_0C00];
const TIM_NAMES: [&str; NUM_TIMERS] = ["tim2", "tim3", "tim4", "tim5"];
pub const TIM_IRQ: [u16; NUM_TIMERS] = [28, 29, 30, 50];
/// Timer counter clock, matching the board's fixed timer clocking.
pub const TIMER_FREQ_HZ: u64 = 1_000_000_000;

pub const NUM_GPIOS: usize = 11;
const GPIO_NAMES: [&str; NUM_GPIOS] = [
    "gpioa", "gpiob", "gpioc", "gpiod", "gpioe", "gpiof", "gpiog", "gpioh", "gpioi", "gpioj",
    "gpiok",
];

pub const SYSCFG_IRQ: u16 = 71;
/// EXTI output fan-in onto NVIC inputs. The repeated entries are the
/// hardware's grouped lines (EXTI9_5 and EXTI15_10), not an error.
pub const EXTI_IRQ: [u16; EXTI_NUM_LINES] =
    [6, 7, 8, 9, 10, 23, 23, 23, 23, 23, 40, 40, 40, 40, 40, 40];

const fn gpio_base(index: usize) -> u32 {
    0x4002_0000 + 0x400 * index as u32
}

/// Address windows present on the part but not modeled; served by named stub
/// responders so firmware probes are answered (0 / discard) and logged.
const UNIMPLEMENTED: &[(&str, u32, u32)] = &[
    ("TIM6", 0x4000_1000, 0x400),
    ("TIM7", 0x4000_1400, 0x400),
    ("TIM12", 0x4000_1800, 0x400),
    ("TIM13", 0x4000_1C00, 0x400),
    ("TIM14", 0x4000_2000, 0x400),
    ("RTC and BKP", 0x4000_2800, 0x400),
    ("WWDG", 0x4000_2C00, 0x400),
    ("IWDG", 0x4000_3000, 0x400),
    ("I2S2ext", 0x4000_3400, 0x400),
    ("I2S3ext", 0x4000_4000, 0x400),
    ("I2C1", 0x4000_5400, 0x400),
    ("I2C2", 0x4000_5800, 0x400),
    ("I2C3", 0x4000_5C00, 0x400),
    ("CAN1", 0x4000_6400, 0x400),
    ("CAN2", 0x4000_6800, 0x400),
    ("DAC", 0x4000_7400, 0x400),
    ("TIM1", 0x4001_0000, 0x400),
    ("TIM8", 0x4001_0400, 0x400),
    ("SDIO", 0x4001_2C00, 0x400),
    ("TIM9", 0x4001_4000, 0x400),
    ("TIM10", 0x4001_4400, 0x400),
    ("TIM11", 0x4001_4800, 0x400),
    ("CRC", 0x4002_3000, 0x400),
    ("BKPSRAM", 0x4002_4000, 0x400),
    ("DMA1", 0x4002_6000, 0x400),
    ("DMA2", 0x4002_6400, 0x400),
    ("Ethernet", 0x4002_8000, 0x1400),
    ("USB OTG HS", 0x4004_0000, 0x3_0000),
    ("USB OTG FS", 0x5000_0000, 0x3_1000),
    ("DCMI", 0x5005_0000, 0x400),
    ("RNG", 0x5006_0800, 0x400),
];

/// Board-level inputs to [`Soc::assemble`].
#[derive(Debug, Clone, Default)]
pub struct SocConfig {
    /// Boot flash contents, zero-padded to [`FLASH_SIZE`].
    pub flash_image: Vec<u8>,
    /// System clock frequency wired up by board code. Mandatory.
    pub sysclk_hz: Option<u64>,
    /// Reference clock wiring. Must stay `None`: refclk is produced
    /// internally as sysclk / 8 and is not an externally exposed clock.
    pub refclk_hz: Option<u64>,
}

/// Errors aborting SoC assembly. No partially-active machine survives any of
/// these; the half-built value is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocError {
    /// Board code wired up refclk, which this layer owns exclusively.
    RefClkWired,
    /// Board code did not wire up sysclk.
    SysClkNotWired,
    /// The boot image does not fit the flash region.
    FlashImageTooLarge { len: usize },
    Memory(GuestMemoryError),
    Map(MapError),
    Activate(ActivateError),
    Clock(ClockError),
}

impl fmt::Display for SocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocError::RefClkWired => {
                write!(f, "refclk clock must not be wired up by the board code")
            }
            SocError::SysClkNotWired => {
                write!(f, "sysclk clock must be wired up by the board code")
            }
            SocError::FlashImageTooLarge { len } => write!(
                f,
                "flash image of {len} bytes exceeds the {FLASH_SIZE}-byte flash region"
            ),
            SocError::Memory(e) => write!(f, "guest memory: {e}"),
            SocError::Map(e) => write!(f, "address map: {e}"),
            SocError::Activate(e) => write!(f, "device activation: {e}"),
            SocError::Clock(e) => write!(f, "clock tree: {e}"),
        }
    }
}

impl std::error::Error for SocError {}

impl From<GuestMemoryError> for SocError {
    fn from(e: GuestMemoryError) -> Self {
        SocError::Memory(e)
    }
}

impl From<MapError> for SocError {
    fn from(e: MapError) -> Self {
        SocError::Map(e)
    }
}

impl From<ActivateError> for SocError {
    fn from(e: ActivateError) -> Self {
        SocError::Activate(e)
    }
}

impl From<ClockError> for SocError {
    fn from(e: ClockError) -> Self {
        SocError::Clock(e)
    }
}

type SharedQueue = Rc<RefCell<TimerQueue<usize>>>;

/// Assembled STM32F407-class machine.
pub struct Soc {
    cpu: CortexM4Config,
    clock: ManualClock,
    clock_tree: ClockTree,
    sysclk: ClockId,
    refclk: ClockId,
    irq_map: InterruptMap,
    bus: SystemBus,
    queue: SharedQueue,
    nvic: Rc<RefCell<Nvic>>,

    rcc: Rc<RefCell<Rcc>>,
    syscfg: Rc<RefCell<Syscfg>>,
    pwr: Rc<RefCell<Pwr>>,
    flash_ctrl: Rc<RefCell<FlashCtrl>>,
    exti: Rc<RefCell<Exti>>,
    usart: Vec<Rc<RefCell<Usart>>>,
    timers: Vec<Rc<RefCell<Tim<ManualClock>>>>,
    gpio: Vec<Rc<RefCell<Gpio>>>,
}

impl core::fmt::Debug for Soc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Soc").finish_non_exhaustive()
    }
}

impl Soc {
    /// Builds and activates the whole machine. Validation is fail-fast: the
    /// first error aborts assembly and nothing stays active.
    pub fn assemble(cfg: SocConfig) -> Result<Self, SocError> {
        // Clock wiring checks come first; they gate everything else.
        if cfg.refclk_hz.is_some() {
            return Err(SocError::RefClkWired);
        }
        let Some(sysclk_hz) = cfg.sysclk_hz else {
            return Err(SocError::SysClkNotWired);
        };

        let mut clock_tree = ClockTree::new();
        let sysclk = clock_tree.add_node("sysclk");
        let refclk = clock_tree.add_node("refclk");
        let ahb = clock_tree.add_node("ahb");
        clock_tree.set_external_frequency(sysclk, sysclk_hz);
        // The refclk always runs at sysclk / 8.
        clock_tree.set_mul_div(refclk, 1, 8)?;
        clock_tree.set_source(refclk, sysclk)?;
        clock_tree.set_source(ahb, sysclk)?;
        clock_tree.propagate();

        if cfg.flash_image.len() > FLASH_SIZE as usize {
            return Err(SocError::FlashImageTooLarge {
                len: cfg.flash_image.len(),
            });
        }
        let mut flash = vec![0u8; FLASH_SIZE as usize];
        flash[..cfg.flash_image.len()].copy_from_slice(&cfg.flash_image);
        let flash: Arc<[u8]> = flash.into();

        let mut bus = SystemBus::new();
        bus.map_rom("flash", FLASH_BASE, Arc::clone(&flash))?;
        bus.map_rom("flash.alias", 0x0000_0000, flash)?;
        bus.map_ram("sram", SRAM_BASE, DenseMemory::new(SRAM_SIZE)?)?;
        bus.map_ram("ccm", CCM_BASE, DenseMemory::new(CCM_SIZE)?)?;

        let cpu = CortexM4Config::default();
        let nvic = Rc::new(RefCell::new(Nvic::new(cpu.num_irq)));

        let mut edges = vec![(("syscfg", 0u16), SYSCFG_IRQ)];
        for (i, &irq) in USART_IRQ.iter().enumerate() {
            edges.push(((USART_NAMES[i], 0), irq));
        }
        for (i, &irq) in TIM_IRQ.iter().enumerate() {
            edges.push(((TIM_NAMES[i], 0), irq));
        }
        for (line, &irq) in EXTI_IRQ.iter().enumerate() {
            edges.push((("exti", line as u16), irq));
        }
        let irq_map = InterruptMap::new(edges);

        let clock = ManualClock::new();
        let queue: SharedQueue = Rc::new(RefCell::new(TimerQueue::new()));

        let rcc = Rc::new(RefCell::new(Rcc::new()));
        bus.map_mmio(
            "rcc",
            RCC_BASE,
            RCC_MMIO_SIZE,
            Box::new(BankWindow { dev: rcc.clone() }),
        )?;

        let syscfg = Rc::new(RefCell::new(Syscfg::new()));
        bus.map_mmio(
            "syscfg",
            SYSCFG_BASE,
            SYSCFG_MMIO_SIZE,
            Box::new(BankWindow {
                dev: syscfg.clone(),
            }),
        )?;

        let pwr = Rc::new(RefCell::new(Pwr::new()));
        bus.map_mmio(
            "pwr",
            PWR_BASE,
            PWR_MMIO_SIZE,
            Box::new(BankWindow { dev: pwr.clone() }),
        )?;

        let flash_ctrl = Rc::new(RefCell::new(FlashCtrl::new()));
        bus.map_mmio(
            "flash_ctrl",
            FLASH_CTRL_BASE,
            FLASH_MMIO_SIZE,
            Box::new(BankWindow {
                dev: flash_ctrl.clone(),
            }),
        )?;

        let mut usart = Vec::with_capacity(NUM_USARTS);
        for (i, &base) in USART_ADDR.iter().enumerate() {
            let dev = Rc::new(RefCell::new(Usart::new(USART_NAMES[i])));
            bus.map_mmio(
                USART_NAMES[i],
                base,
                USART_MMIO_SIZE,
                Box::new(BankWindow { dev: dev.clone() }),
            )?;
            usart.push(dev);
        }

        let mut timers = Vec::with_capacity(NUM_TIMERS);
        for (i, &base) in TIM_ADDR.iter().enumerate() {
            let line = irq_map
                .input_for(TIM_NAMES[i], 0)
                .expect("timer present in the static interrupt table");
            let tim = Rc::new(RefCell::new(Tim::new(
                TIM_NAMES[i],
                clock.clone(),
                TIMER_FREQ_HZ,
                line,
                i,
            )));
            bus.map_mmio(
                TIM_NAMES[i],
                base,
                TIM_MMIO_SIZE,
                Box::new(TimWindow {
                    tim: tim.clone(),
                    queue: queue.clone(),
                }),
            )?;
            timers.push(tim);
        }

        // GPIO ports A..K, each mapped and activated at its own base.
        let mut gpio = Vec::with_capacity(NUM_GPIOS);
        for (i, &name) in GPIO_NAMES.iter().enumerate() {
            let mut port = Gpio::new(name, ahb);
            port.activate(&clock_tree)?;
            let port = Rc::new(RefCell::new(port));
            bus.map_mmio(
                name,
                gpio_base(i),
                GPIO_MMIO_SIZE,
                Box::new(BankWindow { dev: port.clone() }),
            )?;
            gpio.push(port);
        }

        let mut exti_lines = [0u16; EXTI_NUM_LINES];
        for (line, slot) in exti_lines.iter_mut().enumerate() {
            *slot = irq_map
                .input_for("exti", line as u16)
                .expect("exti line present in the static interrupt table");
        }
        let exti = Rc::new(RefCell::new(Exti::new(exti_lines)));
        bus.map_mmio(
            "exti",
            EXTI_BASE,
            EXTI_MMIO_SIZE,
            Box::new(ExtiWindow {
                exti: exti.clone(),
                nvic: nvic.clone(),
            }),
        )?;

        for &(name, base, size) in UNIMPLEMENTED {
            bus.map_mmio(name, base, size, Box::new(Unimplemented::new(name)))?;
        }

        Ok(Self {
            cpu,
            clock,
            clock_tree,
            sysclk,
            refclk,
            irq_map,
            bus,
            queue,
            nvic,
            rcc,
            syscfg,
            pwr,
            flash_ctrl,
            exti,
            usart,
            timers,
            gpio,
        })
    }

    pub fn cpu_config(&self) -> &CortexM4Config {
        &self.cpu
    }

    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    pub fn sysclk_hz(&self) -> Option<u64> {
        self.clock_tree.frequency(self.sysclk)
    }

    pub fn refclk_hz(&self) -> Option<u64> {
        self.clock_tree.frequency(self.refclk)
    }

    pub fn irq_map(&self) -> &InterruptMap {
        &self.irq_map
    }

    /// Mapped address windows, for introspection and layout checks.
    pub fn regions(&self) -> Vec<(&'static str, u32, u64, RegionKind)> {
        self.bus.regions().collect()
    }

    /// Guest access path: decoded by the address map and dispatched to the
    /// owning device or backing memory.
    pub fn read(&mut self, addr: u32, size: usize) -> u32 {
        self.bus.read(addr, size)
    }

    pub fn write(&mut self, addr: u32, size: usize, value: u32) {
        self.bus.write(addr, size, value);
    }

    pub fn read_u32(&mut self, addr: u32) -> u32 {
        self.bus.read_u32(addr)
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) {
        self.bus.write_u32(addr, value);
    }

    /// Bulk memory access for loaders and test harnesses.
    pub fn read_physical(&mut self, addr: u32, dst: &mut [u8]) {
        self.bus.read_physical(addr, dst);
    }

    pub fn write_physical(&mut self, addr: u32, src: &[u8]) {
        self.bus.write_physical(addr, src);
    }

    /// Advances virtual time and drains every deadline that came due,
    /// serialized on this single logical thread in non-decreasing deadline
    /// order.
    pub fn advance(&mut self, delta_ns: u64) {
        self.clock.advance_ns(delta_ns);
        let now = self.clock.now_ns();

        loop {
            let due = self.queue.borrow_mut().pop_due(now);
            let Some((_id, _deadline, slot)) = due else {
                break;
            };
            let tim = self.timers[slot].clone();
            tim.borrow_mut()
                .handle_timer_event(&mut self.queue.borrow_mut(), &mut *self.nvic.borrow_mut());
        }
    }

    /// Drives an external GPIO input pin. If SYSCFG currently selects this
    /// port for the pin's EXTI line, the edge is routed into the EXTI.
    pub fn gpio_input(&mut self, port: usize, pin: u8, level: bool) {
        let Some(gpio) = self.gpio.get(port) else {
            return;
        };
        gpio.borrow_mut().set_input_pin(pin, level);

        let line = (pin & 0xF) as usize;
        if self.syscfg.borrow().exti_port(line) == port as u8 {
            self.exti
                .borrow_mut()
                .set_line(line, level, &mut *self.nvic.borrow_mut());
        }
    }

    pub fn irq_pending(&self, line: u16) -> bool {
        self.nvic.borrow().is_pending(line)
    }

    pub fn acknowledge_irq(&mut self, line: u16) {
        self.nvic.borrow_mut().acknowledge(line);
    }

    pub fn take_irq_events(&mut self) -> Vec<IrqEvent> {
        self.nvic.borrow_mut().take_events()
    }

    /// System reset: every peripheral returns to its power-on register state.
    /// Virtual time keeps running; still-pending timer deadlines are left to
    /// fire and find their enable bits clear.
    pub fn reset(&mut self) {
        self.rcc.borrow_mut().reset();
        self.syscfg.borrow_mut().reset();
        self.pwr.borrow_mut().reset();
        self.flash_ctrl.borrow_mut().reset();
        self.exti.borrow_mut().reset();
        for usart in &self.usart {
            usart.borrow_mut().reset();
        }
        for tim in &self.timers {
            tim.borrow_mut().reset();
        }
        for gpio in &self.gpio {
            gpio.borrow_mut().reset();
        }
        self.nvic.borrow_mut().clear();
    }
}

const TAG_CLOCK_NS: u16 = 1;
const TAG_RCC: u16 = 0x10;
const TAG_SYSCFG: u16 = 0x11;
const TAG_PWR: u16 = 0x12;
const TAG_FLASH_CTRL: u16 = 0x13;
const TAG_EXTI: u16 = 0x14;
const TAG_USART_BASE: u16 = 0x20;
const TAG_TIM_BASE: u16 = 0x30;
const TAG_GPIO_BASE: u16 = 0x40;

impl IoSnapshot for Soc {
    const DEVICE_ID: [u8; 4] = *b"SOC ";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_u64(TAG_CLOCK_NS, self.clock.now_ns());

        w.field_bytes(TAG_RCC, Device::save_state(&*self.rcc.borrow()));
        w.field_bytes(TAG_SYSCFG, Device::save_state(&*self.syscfg.borrow()));
        w.field_bytes(TAG_PWR, Device::save_state(&*self.pwr.borrow()));
        w.field_bytes(TAG_FLASH_CTRL, Device::save_state(&*self.flash_ctrl.borrow()));
        w.field_bytes(TAG_EXTI, self.exti.borrow().save_state());
        for (i, usart) in self.usart.iter().enumerate() {
            w.field_bytes(TAG_USART_BASE + i as u16, Device::save_state(&*usart.borrow()));
        }
        for (i, tim) in self.timers.iter().enumerate() {
            w.field_bytes(TAG_TIM_BASE + i as u16, tim.borrow().save_state());
        }
        for (i, gpio) in self.gpio.iter().enumerate() {
            w.field_bytes(TAG_GPIO_BASE + i as u16, Device::save_state(&*gpio.borrow()));
        }
        w.finish()
    }

    /// Restores into an already-assembled machine of the same board
    /// description: register and timing state (including each timer's tick
    /// baseline) comes back bit-exact, and pending deadlines are re-entered
    /// into a fresh queue.
    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        if let Some(now_ns) = r.u64(TAG_CLOCK_NS)? {
            self.clock.set_ns(now_ns);
        }

        if let Some(b) = r.bytes(TAG_RCC) {
            Device::load_state(&mut *self.rcc.borrow_mut(), b)?;
        }
        if let Some(b) = r.bytes(TAG_SYSCFG) {
            Device::load_state(&mut *self.syscfg.borrow_mut(), b)?;
        }
        if let Some(b) = r.bytes(TAG_PWR) {
            Device::load_state(&mut *self.pwr.borrow_mut(), b)?;
        }
        if let Some(b) = r.bytes(TAG_FLASH_CTRL) {
            Device::load_state(&mut *self.flash_ctrl.borrow_mut(), b)?;
        }
        if let Some(b) = r.bytes(TAG_EXTI) {
            self.exti.borrow_mut().load_state(b)?;
        }
        for (i, usart) in self.usart.iter().enumerate() {
            if let Some(b) = r.bytes(TAG_USART_BASE + i as u16) {
                Device::load_state(&mut *usart.borrow_mut(), b)?;
            }
        }
        for (i, tim) in self.timers.iter().enumerate() {
            if let Some(b) = r.bytes(TAG_TIM_BASE + i as u16) {
                tim.borrow_mut().load_state(b)?;
            }
        }
        for (i, gpio) in self.gpio.iter().enumerate() {
            if let Some(b) = r.bytes(TAG_GPIO_BASE + i as u16) {
                Device::load_state(&mut *gpio.borrow_mut(), b)?;
            }
        }

        // Pending deadlines live in device state; rebuild the queue and
        // re-establish the id mapping.
        *self.queue.borrow_mut() = TimerQueue::new();
        for tim in &self.timers {
            tim.borrow_mut().reschedule(&mut self.queue.borrow_mut());
        }
        self.nvic.borrow_mut().clear();

        Ok(())
    }
}
