//! Peripheral subsystem: interrupt controller, timer block, UART, VDU.
//!
//! All four live inside the single I/O segment (`config::segment::IO`) as
//! one `MmioRegion` backed by this module's `Peripherals` handler, which
//! dispatches a word offset to whichever peripheral's window it falls in.
//! The VDU's registers are halfword-wide; its sub-dispatch packs/unpacks a
//! word into the two halfwords the handler interface expects.

pub mod interrupt;
pub mod timer;
pub mod uart;
pub mod vdu;

pub use interrupt::InterruptController;
pub use timer::Timer;
pub use uart::Uart;
pub use vdu::Vdu;

use crate::config::io_offset;
use crate::miu::Miu;
use crate::region::MmioHandler;
use interrupt::{lines, RaiseOutcome};

const INTC_SIZE: u32 = 0x10;
const TIMER_SIZE: u32 = timer::Timer::CHANNEL_STRIDE * 3;
const UART_SIZE: u32 = 0x14;
const VDU_SIZE: u32 = 0x08;

/// Aggregate of every memory-mapped peripheral, plus the glue that turns a
/// timer compare-hit or a completed frame render into a CPU exception.
pub struct Peripherals {
    pub interrupt: InterruptController,
    pub timer: Timer,
    pub uart: Uart,
    pub vdu: Vdu,
}

impl Peripherals {
    pub fn new() -> Self {
        Self {
            interrupt: InterruptController::new(),
            timer: Timer::new(),
            uart: Uart::new(),
            vdu: Vdu::new(),
        }
    }

    pub fn reset(&mut self) {
        self.interrupt.reset();
        self.timer.reset();
        self.uart.reset();
        self.vdu.reset();
    }

    /// Advance the timer block by `cycles` engine cycles. If any channel's
    /// compare hit is IRQ-enabled, raises the timer line and returns the
    /// outcome so the engine can drive CPU exception entry.
    pub fn tick(&mut self, cycles: u32) -> Option<RaiseOutcome> {
        if self.timer.tick(cycles) {
            Some(self.interrupt.raise(lines::TIMER))
        } else {
            None
        }
    }

    /// Raise the vblank line and render the current frame's framebuffer into
    /// `dest`, in that order: the concurrency model's ordering guarantee
    /// ("vblank is raised ... before the frame's VDU render reads the
    /// framebuffer") takes precedence over the VDU procedure's own listing,
    /// which numbers the raise after the scan-out steps.
    pub fn render_frame(&mut self, miu: &mut Miu, dest: &mut [u32]) -> (vdu::RenderOutcome, RaiseOutcome) {
        let raise = self.interrupt.raise(lines::VBLANK);
        let outcome = self.vdu.render(miu, dest);
        (outcome, raise)
    }

    fn intc_base() -> (u32, u32) {
        (io_offset::TIMER_INTC_BASE + io_offset::INTC, INTC_SIZE)
    }

    fn timer_base() -> (u32, u32) {
        (io_offset::TIMER_INTC_BASE + io_offset::TIMER, TIMER_SIZE)
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioHandler for Peripherals {
    fn read_word(&mut self, word_offset: u32) -> u32 {
        let (intc_base, intc_size) = Self::intc_base();
        let (timer_base, timer_size) = Self::timer_base();
        if (intc_base..intc_base + intc_size).contains(&word_offset) {
            self.interrupt.read(word_offset - intc_base)
        } else if (timer_base..timer_base + timer_size).contains(&word_offset) {
            self.timer.read(word_offset - timer_base)
        } else if (io_offset::UART_BASE..io_offset::UART_BASE + UART_SIZE).contains(&word_offset) {
            self.uart.read(word_offset - io_offset::UART_BASE)
        } else if (io_offset::VDU_BASE..io_offset::VDU_BASE + VDU_SIZE).contains(&word_offset) {
            let rel = word_offset - io_offset::VDU_BASE;
            let lo = self.vdu.read(rel) as u32;
            let hi = self.vdu.read(rel + 2) as u32;
            lo | (hi << 16)
        } else {
            0
        }
    }

    fn write_word(&mut self, word_offset: u32, value: u32) {
        let (intc_base, intc_size) = Self::intc_base();
        let (timer_base, timer_size) = Self::timer_base();
        if (intc_base..intc_base + intc_size).contains(&word_offset) {
            self.interrupt.write(word_offset - intc_base, value);
        } else if (timer_base..timer_base + timer_size).contains(&word_offset) {
            self.timer.write(word_offset - timer_base, value);
        } else if (io_offset::UART_BASE..io_offset::UART_BASE + UART_SIZE).contains(&word_offset) {
            self.uart.write(word_offset - io_offset::UART_BASE, value);
        } else if (io_offset::VDU_BASE..io_offset::VDU_BASE + VDU_SIZE).contains(&word_offset) {
            let rel = word_offset - io_offset::VDU_BASE;
            self.vdu.write(rel, value as u16);
            self.vdu.write(rel + 2, (value >> 16) as u16);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{ArrayRegion, MmioRegion};

    fn setup_miu() -> Miu {
        let mut miu = Miu::new();
        let peripherals = Peripherals::new();
        let region = MmioRegion::new(crate::config::size::IO, Box::new(peripherals));
        miu.set_region(crate::config::segment::IO, Box::new(region), "io");
        miu
    }

    #[test]
    fn intc_register_round_trips_through_io_segment() {
        let mut miu = setup_miu();
        let addr = (crate::config::segment::IO as u32) << 24
            | io_offset::TIMER_INTC_BASE
            | interrupt::regs::MASK;
        miu.write32(addr, 0xFF);
        assert_eq!(miu.read32(addr), 0xFF);
    }

    #[test]
    fn uart_data_register_reachable_through_io_segment() {
        let mut miu = setup_miu();
        let addr = (crate::config::segment::IO as u32) << 24 | io_offset::UART_BASE | uart::regs::DATA;
        miu.write32(addr, 0x41);
        // TX write does not echo back through DATA; STATUS should still read
        // as reset (tx-empty) since our UART never blocks on writes.
        let status_addr =
            (crate::config::segment::IO as u32) << 24 | io_offset::UART_BASE | uart::regs::STATUS;
        assert_ne!(miu.read32(status_addr) & uart::status_bits::TX_EMPTY, 0);
    }

    #[test]
    fn vdu_halfword_registers_pack_into_one_word() {
        let mut miu = setup_miu();
        let base = (crate::config::segment::IO as u32) << 24 | io_offset::VDU_BASE;
        miu.write16(base + vdu::regs::CTRL, vdu::ctrl_bits::ENABLE);
        miu.write16(base + vdu::regs::STATUS, 0);
        assert_eq!(miu.read16(base + vdu::regs::CTRL), vdu::ctrl_bits::ENABLE);
    }

    #[test]
    fn peripherals_tick_raises_timer_irq() {
        let mut p = Peripherals::new();
        p.timer.write(timer::regs::CMP, 1);
        p.timer.write(
            timer::regs::CTRL,
            timer::ctrl_bits::ENABLE | timer::ctrl_bits::IRQ_ENABLE,
        );
        p.interrupt.write(interrupt::regs::MASK, 1 << lines::TIMER);
        let outcome = p.tick(1);
        assert!(outcome.is_some());
        assert!(outcome.unwrap().delivered);
    }

    #[test]
    fn render_frame_always_raises_vblank() {
        let mut p = Peripherals::new();
        p.interrupt.write(interrupt::regs::MASK, 1 << lines::VBLANK);
        let mut miu = Miu::new();
        miu.set_region(crate::config::segment::DRAM, Box::new(ArrayRegion::new(0x10)), "dram");
        let mut dest = vec![0u32; vdu::TARGET_WIDTH * vdu::TARGET_HEIGHT];
        let (_, raise) = p.render_frame(&mut miu, &mut dest);
        assert!(raise.delivered);
    }
}
