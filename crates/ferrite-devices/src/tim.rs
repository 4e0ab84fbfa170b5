//! General-purpose counter/timer (TIM2..TIM5 class).
//!
//! The counter is pull-based: no periodic tick source increments it. Its value
//! is computed on demand from elapsed virtual time, and the update interrupt is
//! driven by a single one-shot deadline in the platform timer queue which the
//! device re-arms from its own fire path. `tick_offset` is the raw
//! (pre-prescaler) tick baseline; all rebase operations shift it rather than
//! zeroing the counter, which is what preserves counted-value continuity
//! across prescaler changes and resynchronization.

use crate::regbank::{check_access, RegDef, RegisterBank, WritePolicy};
use bitflags::bitflags;
use ferrite_io_snapshot::state::codec::{Decoder, Encoder};
use ferrite_io_snapshot::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};
use ferrite_platform::clock::Clock;
use ferrite_platform::irq::IrqSink;
use ferrite_platform::timers::{TimerId, TimerQueue};

pub const TIM_MMIO_SIZE: u32 = 0x400;

pub const TIM_CR1: u32 = 0x00;
pub const TIM_CR2: u32 = 0x04;
pub const TIM_SMCR: u32 = 0x08;
pub const TIM_DIER: u32 = 0x0C;
pub const TIM_SR: u32 = 0x10;
pub const TIM_EGR: u32 = 0x14;
pub const TIM_CCMR1: u32 = 0x18;
pub const TIM_CCMR2: u32 = 0x1C;
pub const TIM_CCER: u32 = 0x20;
pub const TIM_CNT: u32 = 0x24;
pub const TIM_PSC: u32 = 0x28;
pub const TIM_ARR: u32 = 0x2C;
pub const TIM_CCR1: u32 = 0x34;
pub const TIM_CCR2: u32 = 0x38;
pub const TIM_CCR3: u32 = 0x3C;
pub const TIM_CCR4: u32 = 0x40;
pub const TIM_DCR: u32 = 0x48;
pub const TIM_DMAR: u32 = 0x4C;
pub const TIM_OR: u32 = 0x50;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cr1: u32 {
        /// Counter enable.
        const CEN = 1 << 0;
        /// Update request source: only counter overflow generates an update.
        const URS = 1 << 2;
        /// Direction (down-count).
        const DIR = 1 << 4;
        /// Center-aligned mode selection.
        const CMS = 3 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Dier: u32 {
        const UIE = 1 << 0;
        const CC1IE = 1 << 1;
        const CC2IE = 1 << 2;
        const CC3IE = 1 << 3;
        const CC4IE = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ccmr1: u32 {
        /// Output compare 2 preload enable.
        const OC2PE = 1 << 11;
        const OC2M0 = 1 << 12;
        const OC2M1 = 1 << 13;
        const OC2M2 = 1 << 14;
    }
}

pub const SR_UIF: u32 = 1 << 0;
pub const EGR_UG: u32 = 1 << 0;
pub const CCER_CC2E: u32 = 1 << 4;

const PSC_MASK: u32 = 0xFFFF;
const NS_PER_SEC: u128 = 1_000_000_000;

/// Stored registers. CNT is absent on purpose: it is derived, not stored.
const TIM_REGS: &[RegDef] = &[
    RegDef::new(TIM_CR1, "CR1", 0, WritePolicy::SetBits),
    RegDef::new(TIM_CR2, "CR2", 0, WritePolicy::SetBits),
    RegDef::new(TIM_SMCR, "SMCR", 0, WritePolicy::SetBits),
    RegDef::new(TIM_DIER, "DIER", 0, WritePolicy::SetBits),
    // Set by hardware, cleared by software writing 0 to the bit.
    RegDef::new(TIM_SR, "SR", 0, WritePolicy::ClearMask),
    RegDef::new(TIM_EGR, "EGR", 0, WritePolicy::Replace),
    RegDef::new(TIM_CCMR1, "CCMR1", 0, WritePolicy::SetBits),
    RegDef::new(TIM_CCMR2, "CCMR2", 0, WritePolicy::SetBits),
    RegDef::new(TIM_CCER, "CCER", 0, WritePolicy::SetBits),
    RegDef::new(TIM_PSC, "PSC", 0, WritePolicy::SetBits),
    RegDef::new(TIM_ARR, "ARR", 0, WritePolicy::SetBits),
    RegDef::new(TIM_CCR1, "CCR1", 0, WritePolicy::SetBits),
    RegDef::new(TIM_CCR2, "CCR2", 0, WritePolicy::SetBits),
    RegDef::new(TIM_CCR3, "CCR3", 0, WritePolicy::SetBits),
    RegDef::new(TIM_CCR4, "CCR4", 0, WritePolicy::SetBits),
    RegDef::new(TIM_DCR, "DCR", 0, WritePolicy::SetBits),
    RegDef::new(TIM_DMAR, "DMAR", 0, WritePolicy::SetBits),
    RegDef::new(TIM_OR, "OR", 0, WritePolicy::SetBits),
];

#[derive(Debug, Clone, Copy)]
struct Armed {
    /// `None` only transiently after a snapshot restore, until
    /// [`Tim::reschedule`] assigns a fresh queue id.
    id: Option<TimerId>,
    /// Absolute raw tick at which the update fires.
    target_raw: u64,
    /// Armed period in raw ticks; the fire path advances `tick_offset` by
    /// exactly this much, which wraps the visible counter without drift.
    period_raw: u64,
}

pub struct Tim<C: Clock> {
    name: &'static str,
    clock: C,
    freq_hz: u64,
    irq_line: u16,
    /// Queue payload identifying this instance to the machine's dispatch.
    slot: usize,

    regs: RegisterBank,
    /// Virtual-time baseline in raw (pre-division) ticks.
    tick_offset: u64,
    armed: Option<Armed>,
}

impl<C: Clock> Tim<C> {
    pub fn new(name: &'static str, clock: C, freq_hz: u64, irq_line: u16, slot: usize) -> Self {
        let mut tim = Self {
            name,
            clock,
            freq_hz,
            irq_line,
            slot,
            regs: RegisterBank::new(name, TIM_REGS),
            tick_offset: 0,
            armed: None,
        };
        tim.tick_offset = tim.raw_ticks(tim.clock.now_ns());
        tim
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn irq_line(&self) -> u16 {
        self.irq_line
    }

    fn cr1(&self) -> Cr1 {
        Cr1::from_bits_retain(self.regs.get(TIM_CR1))
    }

    fn dier(&self) -> Dier {
        Dier::from_bits_retain(self.regs.get(TIM_DIER))
    }

    fn divider(&self) -> u64 {
        (self.regs.get(TIM_PSC) & PSC_MASK) as u64 + 1
    }

    fn running(&self) -> bool {
        self.cr1().contains(Cr1::CEN)
    }

    fn raw_ticks(&self, now_ns: u64) -> u64 {
        ((now_ns as u128 * self.freq_hz as u128) / NS_PER_SEC) as u64
    }

    fn ns_for_raw_ceil(&self, ticks: u64) -> u64 {
        let numer = ticks as u128 * NS_PER_SEC;
        let denom = self.freq_hz as u128;
        numer.div_ceil(denom) as u64
    }

    /// Live counter value, derived from elapsed virtual time. Not stored:
    /// while stopped the value stays at the last rebased reading because the
    /// baseline only moves on transition events.
    pub fn counter(&self, now_ns: u64) -> u32 {
        let raw = self.raw_ticks(now_ns).wrapping_sub(self.tick_offset);
        (raw / self.divider()) as u32
    }

    /// Arms the update deadline. Re-arming always cancels the previous
    /// pending entry first, so at most one deadline exists per timer.
    fn set_alarm(&mut self, now_ns: u64, queue: &mut TimerQueue<usize>) {
        let arr = self.regs.get(TIM_ARR) as u64;
        if arr == 0 {
            // A zero reload would be a degenerate zero-period timer.
            return;
        }

        if let Some(prev) = self.armed.take() {
            if let Some(id) = prev.id {
                queue.cancel(id);
            }
        }

        let div = self.divider();
        let raw_now = self.raw_ticks(now_ns);
        let counter = raw_now.wrapping_sub(self.tick_offset) / div;

        let arr_eff = if self.cr1().intersects(Cr1::CMS) {
            arr
        } else {
            arr - 1
        };
        // The update fires one divided tick after the counter reaches the
        // reload threshold; past thresholds wrap into the next period.
        let period = arr_eff + 1;
        let target_div = counter - (counter % period) + period;

        let target_raw = self.tick_offset.wrapping_add(target_div.wrapping_mul(div));
        let deadline_ns = self.ns_for_raw_ceil(target_raw);
        let id = queue.schedule(deadline_ns, self.slot);
        self.armed = Some(Armed {
            id: Some(id),
            target_raw,
            period_raw: period.wrapping_mul(div),
        });
    }

    pub fn mmio_read(&mut self, offset: u32, size: usize) -> u32 {
        if !check_access(self.name, offset, size) {
            return 0;
        }
        match offset {
            TIM_CNT => self.counter(self.clock.now_ns()),
            _ => self.regs.read(offset),
        }
    }

    pub fn mmio_write(
        &mut self,
        offset: u32,
        size: usize,
        value: u32,
        queue: &mut TimerQueue<usize>,
    ) {
        if !check_access(self.name, offset, size) {
            return;
        }
        let now = self.clock.now_ns();

        match offset {
            TIM_CR1 => {
                self.regs.write(TIM_CR1, value);
                if self.running() {
                    self.set_alarm(now, queue);
                }
            }
            TIM_EGR => {
                self.regs.write(TIM_EGR, value);
                if value & EGR_UG != 0 {
                    // Software-generated update: resynchronize the baseline.
                    self.tick_offset = self.raw_ticks(now);
                    if self.running() {
                        self.set_alarm(now, queue);
                    }
                }
            }
            TIM_PSC => {
                let counter = self.raw_ticks(now).wrapping_sub(self.tick_offset) / self.divider();
                self.regs.write(TIM_PSC, value & PSC_MASK);
                // Rebase so the divided value is unchanged under the new
                // divisor; the counter must not jump on a prescaler change.
                self.tick_offset = self
                    .raw_ticks(now)
                    .wrapping_sub(counter.wrapping_mul(self.divider()));
                if self.running() {
                    self.set_alarm(now, queue);
                }
            }
            TIM_CNT => {
                // The counter is derived state; stores to it are discarded.
            }
            _ => {
                self.regs.write(offset, value);
            }
        }
    }

    /// Deadline fire path, invoked by the machine when this timer's queue
    /// entry comes due. A stale fire (timer since stopped or reconfigured
    /// without re-arming) finds the enable bits clear and does nothing.
    pub fn handle_timer_event(&mut self, queue: &mut TimerQueue<usize>, sink: &mut dyn IrqSink) {
        let Some(armed) = self.armed.take() else {
            return;
        };

        let irq_enabled = self.dier().intersects(
            Dier::UIE | Dier::CC1IE | Dier::CC2IE | Dier::CC3IE | Dier::CC4IE,
        );
        if irq_enabled && self.running() {
            if !self.cr1().contains(Cr1::URS) {
                self.regs.set(TIM_SR, self.regs.get(TIM_SR) | SR_UIF);
                sink.pulse_irq(self.irq_line);
            }
            // Wrap the counter by the period that just elapsed, then re-arm:
            // recursive self-rescheduling models periodic firing without a
            // repeating host timer.
            self.tick_offset = self.tick_offset.wrapping_add(armed.period_raw);
            self.set_alarm(self.clock.now_ns(), queue);
        }

        let ccmr1 = Ccmr1::from_bits_retain(self.regs.get(TIM_CCMR1));
        if ccmr1.contains(Ccmr1::OC2M2 | Ccmr1::OC2M1)
            && !ccmr1.contains(Ccmr1::OC2M0)
            && ccmr1.contains(Ccmr1::OC2PE)
            && self.regs.get(TIM_CCER) & CCER_CC2E != 0
        {
            // PWM mode 1 on channel 2: derived duty cycle, observability only.
            let duty = self.regs.get(TIM_CCR2) / (100 * (self.regs.get(TIM_PSC) + 1));
            tracing::debug!(timer = self.name, duty_percent = duty, "pwm2 duty cycle");
        }
    }

    pub fn reset(&mut self) {
        self.regs.reset();
        self.tick_offset = self.raw_ticks(self.clock.now_ns());
        // A still-pending deadline is left to fire and find CEN clear.
    }

    /// Re-inserts the restored pending deadline into a fresh queue and
    /// re-establishes the id mapping. Must be called after `load_state`.
    pub fn reschedule(&mut self, queue: &mut TimerQueue<usize>) {
        if let Some(target_raw) = self.armed.as_ref().map(|armed| armed.target_raw) {
            let deadline_ns = self.ns_for_raw_ceil(target_raw);
            if let Some(armed) = &mut self.armed {
                armed.id = Some(queue.schedule(deadline_ns, self.slot));
            }
        }
    }
}

const TAG_TICK_OFFSET: u16 = 1;
const TAG_ARMED: u16 = 2;
const TAG_REGS_BASE: u16 = 0x20;

impl<C: Clock> IoSnapshot for Tim<C> {
    const DEVICE_ID: [u8; 4] = *b"TIM ";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_u64(TAG_TICK_OFFSET, self.tick_offset);

        let mut enc = Encoder::new().bool(self.armed.is_some());
        if let Some(armed) = &self.armed {
            enc = enc.u64(armed.target_raw).u64(armed.period_raw);
        }
        w.field_bytes(TAG_ARMED, enc.finish());

        self.regs.save_fields(&mut w, TAG_REGS_BASE);
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        self.regs.load_fields(&r, TAG_REGS_BASE)?;
        self.tick_offset = r
            .u64(TAG_TICK_OFFSET)?
            .unwrap_or_else(|| self.raw_ticks(self.clock.now_ns()));

        self.armed = None;
        if let Some(buf) = r.bytes(TAG_ARMED) {
            let mut d = Decoder::new(buf);
            if d.bool()? {
                let target_raw = d.u64()?;
                let period_raw = d.u64()?;
                // The queue id is re-established by `reschedule`.
                self.armed = Some(Armed {
                    id: None,
                    target_raw,
                    period_raw,
                });
            }
            d.finish()?;
        }

        Ok(())
    }
}
